//! Windows symbol store: `symstore.exe` locally, HTTP upload remotely.

use crate::bundler::utils::http;
use crate::bundler::{HostPlatform, Invocation, ProcessRunner};
use crate::config::non_empty_env;
use crate::error::{Result, SymbolError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Default location of `symstore.exe` from the Windows SDK.
pub const SYMSTORE_EXE: &str = r"C:\Program Files (x86)\Windows Kits\10\Debuggers\x64\symstore.exe";

/// Transaction files fetched before uploading, so ids keep increasing.
const ADMIN_FILES: [&str; 3] = ["000Admin/lastid.txt", "000Admin/history.txt", "000Admin/server.txt"];

/// Remote symbol server.
#[derive(Clone)]
pub struct RemoteStore {
    base: Url,
    key: String,
}

impl std::fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStore")
            .field("base", &self.base.as_str())
            .field("key", &"***")
            .finish()
    }
}

impl RemoteStore {
    /// Store at `base`, authenticated with the bearer token `key`.
    pub fn new(base: &str, key: impl Into<String>) -> Result<Self> {
        let mut base = base.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Self {
            base: Url::parse(&base)?,
            key: key.into(),
        })
    }

    /// `ARTIFACTORY_SYMBOLS_URL` / `ARTIFACTORY_SYMBOLS_KEY`; `None` without a URL.
    pub fn from_env() -> Result<Option<Self>> {
        match non_empty_env("ARTIFACTORY_SYMBOLS_URL") {
            Some(url) => Ok(Some(Self::new(&url, non_empty_env("ARTIFACTORY_SYMBOLS_KEY").unwrap_or_default())?)),
            None => Ok(None),
        }
    }

    /// URL of a store-relative path. Separators are normalized to `/`.
    pub fn url_for(&self, relative: &Path) -> Result<Url> {
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Ok(self.base.join(&relative)?)
    }
}

/// Local symbol store plus optional remote mirror.
pub struct SymbolStore {
    runner: Arc<dyn ProcessRunner>,
    platform: HostPlatform,
    store_dir: PathBuf,
    executable: PathBuf,
    remote: Option<RemoteStore>,
}

impl std::fmt::Debug for SymbolStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolStore")
            .field("store_dir", &self.store_dir)
            .field("executable", &self.executable)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

impl SymbolStore {
    /// Store in `store_dir`.
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        platform: HostPlatform,
        store_dir: impl Into<PathBuf>,
        remote: Option<RemoteStore>,
    ) -> Self {
        Self {
            runner,
            platform,
            store_dir: store_dir.into(),
            executable: PathBuf::from(SYMSTORE_EXE),
            remote,
        }
    }

    /// Use a different `symstore.exe`.
    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Remote mirror, if configured.
    pub fn remote(&self) -> Option<&RemoteStore> {
        self.remote.as_ref()
    }

    /// `symstore.exe` exists on a Windows host.
    pub fn is_available(&self) -> bool {
        self.platform == HostPlatform::Windows && self.executable.is_file()
    }

    /// `symstore add` for one PDB.
    pub fn add_invocation(&self, pdb: &Path) -> Invocation {
        let title = pdb
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Invocation::new(self.executable.to_string_lossy())
            .arg("add")
            .arg("/s")
            .path(&self.store_dir)
            .args(["/compress", "/r", "/f"])
            .path(pdb)
            .arg("/t")
            .arg(title)
    }

    /// Add a PDB to the local store. No-op without `symstore.exe`.
    pub async fn add(&self, pdb: &Path) -> Result<()> {
        if !self.is_available() {
            log::debug!("symstore.exe is not available, not adding {}", pdb.display());
            return Ok(());
        }
        self.runner.run(&self.add_invocation(pdb)).await?;
        Ok(())
    }

    /// Fetch the remote `000Admin` files into the local store.
    ///
    /// History and server files are only fetched when `lastid.txt` exists.
    pub async fn download_admin(&self, remote: &RemoteStore) -> Result<()> {
        let [lastid, rest @ ..] = ADMIN_FILES;

        if !self.fetch(remote, lastid).await? {
            log::info!("Remote symbol store has no transactions yet");
            return Ok(());
        }
        for file in rest {
            self.fetch(remote, file).await?;
        }
        Ok(())
    }

    async fn fetch(&self, remote: &RemoteStore, file: &str) -> Result<bool> {
        let url = remote.url_for(Path::new(file))?;
        match http::download_to(url.as_str(), &self.store_dir.join(file)).await {
            Ok(found) => Ok(found),
            Err(e) => {
                log::warn!("{}", e);
                Ok(false)
            }
        }
    }

    /// Mirror the local store to the remote. Failed files are logged and skipped.
    pub async fn upload(&self) -> Result<()> {
        let Some(remote) = &self.remote else {
            log::info!("No remote symbol store configured, skipping upload");
            return Ok(());
        };

        self.download_admin(remote).await?;

        let files = crate::bundler::list_files(&self.store_dir)?;
        let client = reqwest::Client::new();
        let mut failed = 0;

        for file in &files {
            let relative = file.strip_prefix(&self.store_dir).unwrap_or(file);
            let url = remote.url_for(relative)?;
            log::info!("Uploading {}", url);

            match http::put_file(&client, url.as_str(), &remote.key, file).await {
                Ok(status) if (200..300).contains(&status) => {}
                Ok(status) => {
                    failed += 1;
                    log::error!("{}", SymbolError::UploadFailed { path: file.clone(), status });
                }
                Err(e) => {
                    failed += 1;
                    log::error!("{}", e);
                }
            }
        }

        log::info!("✓ Uploaded {} of {} symbol store files", files.len() - failed, files.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::SystemRunner;

    #[test]
    fn test_urls_are_relative_to_base() {
        let remote = RemoteStore::new("https://symbols.example.com/repo", "k").unwrap();
        let url = remote
            .url_for(Path::new("app.pdb/0123ABCD1/app.pd_"))
            .unwrap();
        assert_eq!(url.as_str(), "https://symbols.example.com/repo/app.pdb/0123ABCD1/app.pd_");
    }

    #[test]
    fn test_remote_debug_hides_key() {
        let remote = RemoteStore::new("https://symbols.example.com/", "topsecret").unwrap();
        assert!(!format!("{:?}", remote).contains("topsecret"));
    }

    #[test]
    fn test_add_invocation() {
        let store = SymbolStore::new(Arc::new(SystemRunner::new()), HostPlatform::Windows, "/sym", None)
            .with_executable("symstore.exe");
        assert_eq!(
            store.add_invocation(Path::new("/b/Release/app.pdb")).display(),
            "symstore.exe add /s /sym /compress /r /f /b/Release/app.pdb /t app"
        );
    }

    #[tokio::test]
    async fn test_add_is_noop_off_windows() {
        let store = SymbolStore::new(Arc::new(SystemRunner::new()), HostPlatform::Linux, "/sym", None);
        assert!(!store.is_available());
        store.add(Path::new("/b/app.pdb")).await.unwrap();
    }
}
