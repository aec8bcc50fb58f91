//! Debug file upload to Sentry with `sentry-cli`.

use crate::bundler::{HostPlatform, Invocation, ProcessRunner};
use crate::config::non_empty_env;
use crate::error::{Result, SymbolError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// sentry-cli release downloaded when none is installed.
pub const SENTRY_CLI_VERSION: &str = "1.71.0";

/// Sentry project coordinates.
#[derive(Clone)]
pub struct SentryConfig {
    /// API token (`SENTRY_AUTH_TOKEN`)
    pub auth_token: String,
    /// Server host (`SENTRY_HOST`), without scheme
    pub host: String,
    /// Organization slug (`SENTRY_ORG_SLUG`)
    pub org: String,
    /// Project slug (`SENTRY_PROJECT_SLUG`)
    pub project: String,
}

impl std::fmt::Debug for SentryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentryConfig")
            .field("auth_token", &"***")
            .field("host", &self.host)
            .field("org", &self.org)
            .field("project", &self.project)
            .finish()
    }
}

impl SentryConfig {
    /// Read from the environment. `None` unless every value is set.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            auth_token: non_empty_env("SENTRY_AUTH_TOKEN")?,
            host: non_empty_env("SENTRY_HOST")?,
            org: non_empty_env("SENTRY_ORG_SLUG")?,
            project: non_empty_env("SENTRY_PROJECT_SLUG")?,
        })
    }

    /// Server URL.
    pub fn url(&self) -> String {
        format!("https://{}", self.host)
    }

    /// `upload-dif` invocation for one file; the token is secret.
    pub fn upload_invocation(&self, cli: &Path, file: &Path) -> Invocation {
        Invocation::new(cli.to_string_lossy())
            .arg("--auth-token")
            .secret(&self.auth_token)
            .arg("--url")
            .arg(self.url())
            .args(["upload-dif", "--include-sources"])
            .arg("--org")
            .arg(&self.org)
            .arg("--project")
            .arg(&self.project)
            .path(file)
    }
}

/// Download URL of the sentry-cli build for `platform`.
pub fn download_url(platform: HostPlatform) -> String {
    let asset = match platform {
        HostPlatform::Windows => "sentry-cli-Windows-x86_64.exe",
        HostPlatform::MacOs => "sentry-cli-Darwin-universal",
        HostPlatform::Linux => "sentry-cli-Linux-x86_64",
    };
    format!("https://downloads.sentry-cdn.com/sentry-cli/{SENTRY_CLI_VERSION}/{asset}")
}

/// Uploads debug files; obtains sentry-cli at most once per process.
pub struct SentryUploader {
    runner: Arc<dyn ProcessRunner>,
    platform: HostPlatform,
    config: Option<SentryConfig>,
    cli: OnceCell<Option<PathBuf>>,
}

impl std::fmt::Debug for SentryUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentryUploader")
            .field("platform", &self.platform)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SentryUploader {
    /// Uploader for `config`; `None` disables uploads.
    pub fn new(runner: Arc<dyn ProcessRunner>, platform: HostPlatform, config: Option<SentryConfig>) -> Self {
        Self {
            runner,
            platform,
            config,
            cli: OnceCell::new(),
        }
    }

    /// Use an already known sentry-cli instead of looking it up.
    pub fn with_cli(self, cli: impl Into<PathBuf>) -> Self {
        Self {
            cli: OnceCell::new_with(Some(Some(cli.into()))),
            ..self
        }
    }

    /// Upload every file. Skips when unconfigured or sentry-cli is unavailable.
    pub async fn upload_all(&self, files: &[PathBuf]) -> Result<()> {
        let Some(config) = &self.config else {
            log::info!("Sentry is not configured, skipping upload of {} files", files.len());
            return Ok(());
        };

        let Some(cli) = self.cli().await else {
            return Ok(());
        };

        for file in files {
            self.runner.run(&config.upload_invocation(cli, file)).await?;
        }
        log::info!("✓ Uploaded {} debug files to Sentry", files.len());
        Ok(())
    }

    async fn cli(&self) -> Option<&Path> {
        self.cli
            .get_or_init(|| async {
                match locate_or_download(self.platform).await {
                    Ok(path) => Some(path),
                    Err(e) => {
                        log::error!("{}", e);
                        None
                    }
                }
            })
            .await
            .as_deref()
    }
}

async fn locate_or_download(platform: HostPlatform) -> Result<PathBuf> {
    if let Ok(path) = which::which("sentry-cli") {
        return Ok(path);
    }

    let name = match platform {
        HostPlatform::Windows => "sentry-cli.exe",
        _ => "sentry-cli",
    };
    let dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("desktop_ci_actions")
        .join(format!("sentry-cli-{SENTRY_CLI_VERSION}"));
    let path = dir.join(name);

    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Ok(path);
    }

    let data = crate::bundler::utils::http::download(&download_url(platform))
        .await
        .map_err(|e| SymbolError::SentryCliUnavailable { reason: e.to_string() })?;

    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(&path, data).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).await?;
    }

    log::info!("✓ Downloaded sentry-cli {} to {}", SENTRY_CLI_VERSION, path.display());
    Ok(path)
}
