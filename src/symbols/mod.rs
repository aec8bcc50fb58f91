//! Debug symbol processing.
//!
//! After a build, debug information is separated from the shipped binaries
//! and optionally uploaded:
//!
//! | Host | Split | Upload |
//! |------|-------|--------|
//! | Windows | PDBs already separate | `symstore.exe` + HTTP store, Sentry |
//! | macOS | `dsymutil` | Sentry |
//! | Linux | `objcopy` | Sentry |
//!
//! Conan dependencies are processed the same way by
//! [`SymbolProcessor::process_dependencies`].

pub mod matching;
pub mod sentry;
pub mod split;
pub mod symstore;

use crate::bundler::{HostPlatform, ProcessRunner};
use crate::config::ActionConfig;
use crate::error::Result;
use matching::{get_matching_files, glob_files, is_extensionless_executable, is_regular_file, rooted};
use sentry::{SentryConfig, SentryUploader};
use split::Splitter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use symstore::{RemoteStore, SymbolStore};

/// Conan cache used by dependencies built outside `CONAN_HOME` on Windows runners.
const WINDOWS_SYSTEM_CONAN: &str = "C:/.conan";

/// Splits and uploads debug information for one host.
pub struct SymbolProcessor {
    runner: Arc<dyn ProcessRunner>,
    platform: HostPlatform,
    conan_home: PathBuf,
    debug_dir: PathBuf,
    sentry: SentryUploader,
    symstore: SymbolStore,
}

impl std::fmt::Debug for SymbolProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolProcessor")
            .field("platform", &self.platform)
            .field("conan_home", &self.conan_home)
            .field("debug_dir", &self.debug_dir)
            .field("sentry", &self.sentry)
            .field("symstore", &self.symstore)
            .finish_non_exhaustive()
    }
}

impl SymbolProcessor {
    /// Processor configured from `config` and the Sentry/symbol store environment.
    pub fn new(config: &ActionConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        let remote = RemoteStore::from_env().unwrap_or_else(|e| {
            log::error!("Ignoring invalid symbol store URL: {}", e);
            None
        });

        Self {
            sentry: SentryUploader::new(runner.clone(), config.platform, SentryConfig::from_env()),
            symstore: SymbolStore::new(runner.clone(), config.platform, &config.symstore_dir, remote),
            runner,
            platform: config.platform,
            conan_home: config.conan_home.clone(),
            debug_dir: config.debug_dir.clone(),
        }
    }

    /// Replace the Sentry uploader.
    pub fn with_sentry(mut self, sentry: SentryUploader) -> Self {
        self.sentry = sentry;
        self
    }

    /// Replace the symbol store.
    pub fn with_symstore(mut self, symstore: SymbolStore) -> Self {
        self.symstore = symstore;
        self
    }

    fn splitter(&self) -> Splitter {
        match self.platform {
            HostPlatform::MacOs => Splitter::Dsym,
            _ => Splitter::Objcopy,
        }
    }

    /// Process the outputs of `build_type` in `build_dir`.
    pub async fn process_build_output(&self, build_dir: &Path, build_type: &str, upload: bool) -> Result<()> {
        match self.platform {
            HostPlatform::Windows => self.process_windows_output(&build_dir.join(build_type), upload).await,
            _ => self.process_unix_output(&build_dir.join("bin").join(build_type), upload).await,
        }
    }

    async fn process_windows_output(&self, dist_dir: &Path, upload: bool) -> Result<()> {
        let pdbs = glob_files(&[rooted(dist_dir, "**/*.pdb")])?;
        let dlls = glob_files(&[rooted(dist_dir, "**/*.dll")])?;
        let exes = glob_files(&[rooted(dist_dir, "**/*.exe")])?;

        if upload {
            let matched_dlls = get_matching_files(&dlls, &pdbs, true);
            let matched_exes = get_matching_files(&exes, &pdbs, true);

            for pdb in &pdbs {
                self.symstore.add(pdb).await?;
            }

            let files: Vec<PathBuf> = matched_dlls
                .into_iter()
                .chain(pdbs.iter().cloned())
                .chain(matched_exes)
                .collect();
            self.sentry.upload_all(&files).await?;
        }

        let binaries: Vec<PathBuf> = dlls.into_iter().chain(exes).collect();
        let orphan_pdbs = orphan_pdbs(&pdbs, &binaries);
        let misc = glob_files(&[
            rooted(dist_dir, "**/*.ipdb"),
            rooted(dist_dir, "**/*.iobj"),
            rooted(dist_dir, "**/*.ilk"),
        ])?;

        for file in orphan_pdbs.iter().chain(&misc) {
            tokio::fs::remove_file(file).await?;
        }
        log::info!(
            "✓ Removed {} intermediate files from {}",
            orphan_pdbs.len() + misc.len(),
            dist_dir.display()
        );
        Ok(())
    }

    async fn process_unix_output(&self, bin_dir: &Path, upload: bool) -> Result<()> {
        let splitter = self.splitter();
        let pattern = splitter.library_pattern();

        let executables: Vec<PathBuf> = glob_files(&[rooted(bin_dir, "**/*")])?
            .into_iter()
            .filter(|f| is_extensionless_executable(f))
            .collect();

        let candidates = glob_files(&[rooted(bin_dir, &format!("**/{pattern}"))])?;
        let conan_files = glob_files(&[rooted(&self.conan_home, &format!("**/package/**/{pattern}"))])?;
        let system_libraries = get_matching_files(&candidates, &conan_files, false);

        let libraries: Vec<PathBuf> = candidates
            .into_iter()
            .filter(|f| is_regular_file(f) && !system_libraries.contains(f))
            .collect();

        let binaries: Vec<PathBuf> = executables.into_iter().chain(libraries).collect();
        self.split_and_upload(splitter, binaries, upload).await
    }

    /// Process the Conan dependencies of the build.
    pub async fn process_dependencies(&self, upload: bool) -> Result<()> {
        match self.platform {
            HostPlatform::Windows => self.process_windows_dependencies(upload).await,
            _ => {
                let splitter = self.splitter();
                let pattern = splitter.library_pattern();
                let data = self.conan_home.join("data");

                let packaged = glob_files(&[rooted(&data, &format!("**/package/**/{pattern}"))])?;
                let built = glob_files(&[rooted(&data, &format!("**/build/**/{pattern}"))])?;
                let files = get_matching_files(&packaged, &built, false);

                self.split_and_upload(splitter, files, upload).await
            }
        }
    }

    async fn process_windows_dependencies(&self, upload: bool) -> Result<()> {
        if !upload || self.symstore.remote().is_none() {
            return Ok(());
        }
        if !self.symstore.is_available() {
            log::error!("symstore.exe is not available");
            return Ok(());
        }

        let data = self.conan_home.join("data");
        let pdbs = glob_files(&[
            rooted(&data, "**/build/**/*.pdb"),
            format!("{WINDOWS_SYSTEM_CONAN}/**/*.pdb"),
        ])?;

        for pdb in &pdbs {
            self.symstore.add(pdb).await?;
        }

        if pdbs.is_empty() {
            return Ok(());
        }

        self.symstore.upload().await?;

        let dlls = glob_files(&[
            rooted(&data, "**/build/**/*.dll"),
            format!("{WINDOWS_SYSTEM_CONAN}/**/*.dll"),
        ])?;
        let files: Vec<PathBuf> = pdbs.into_iter().chain(dlls).collect();
        self.sentry.upload_all(&files).await
    }

    async fn split_and_upload(&self, splitter: Splitter, binaries: Vec<PathBuf>, upload: bool) -> Result<()> {
        let mut debug_files = Vec::new();

        for file in &binaries {
            if let Some(debug) = splitter.split(self.runner.as_ref(), file, &self.debug_dir).await? {
                debug_files.push(debug);
            }
        }
        log::info!("✓ Split debug information of {} binaries", debug_files.len());

        if upload && !debug_files.is_empty() {
            let files: Vec<PathBuf> = debug_files.into_iter().chain(binaries).collect();
            self.sentry.upload_all(&files).await?;
        }
        Ok(())
    }
}

/// PDBs whose stem matches none of `binaries`.
pub fn orphan_pdbs(pdbs: &[PathBuf], binaries: &[PathBuf]) -> Vec<PathBuf> {
    let owned = get_matching_files(pdbs, binaries, true);
    pdbs.iter().filter(|p| !owned.contains(p)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orphan_pdbs() {
        let pdbs = vec![
            PathBuf::from("/b/Release/app.pdb"),
            PathBuf::from("/b/Release/lib-static.pdb"),
        ];
        let binaries = vec![PathBuf::from("/b/Release/app.exe")];

        assert_eq!(orphan_pdbs(&pdbs, &binaries), vec![PathBuf::from("/b/Release/lib-static.pdb")]);
    }
}
