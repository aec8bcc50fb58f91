//! Universal (fat) bundle assembly with Apple's `lipo` tool.
//!
//! Given N single-architecture builds of the same `.app`, produces one bundle
//! whose executables, framework libraries and modules contain every
//! architecture. Non-binary files are taken from the first input.

use crate::bundler::{
    error::{Error, ErrorExt, Result},
    platform::macos::inspect,
    process::{Invocation, ProcessRunner},
    utils::fs,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Suffix used for bundles holding more than one architecture.
pub const UNIVERSAL_SUFFIX: &str = "universal";

/// Localization directory that must exist for the system to pick English.
const DEFAULT_LOCALIZATION_DIR: &str = "Contents/Resources/en.lproj";

/// Merges per-architecture bundles into one universal bundle.
#[derive(Clone)]
pub struct UniversalBinaryMerger {
    runner: Arc<dyn ProcessRunner>,
    concurrency: usize,
}

impl std::fmt::Debug for UniversalBinaryMerger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniversalBinaryMerger")
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl UniversalBinaryMerger {
    /// Merger running up to one `lipo` per CPU.
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            concurrency: num_cpus::get().max(1),
        }
    }

    /// Override how many `lipo` processes may run at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Merge `inputs` into `target`.
    ///
    /// The first input is the reference: its misc files (symlinks included)
    /// are copied, and its binary list decides what gets merged. Every other
    /// input must have the same layout.
    ///
    /// # Errors
    /// - [`Error::Structure`] if the reference contains bundled frameworks
    /// - [`Error::Merge`] naming the first binary `lipo` could not merge;
    ///   partial output is left in place
    pub async fn merge(&self, target: &Path, inputs: &[PathBuf]) -> Result<PathBuf> {
        let Some(reference) = inputs.first() else {
            crate::bail!("no bundles given to merge into {}", target.display());
        };

        log::info!(
            "Creating universal bundle {} from {} input(s)",
            target.display(),
            inputs.len()
        );

        let classification = inspect::classify(reference)?;

        for file in &classification.misc {
            let relative = file.strip_prefix(reference)?;
            fs::copy_entry(file, &target.join(relative)).await?;
        }

        fs::create_dir_all(&target.join(DEFAULT_LOCALIZATION_DIR), false).await?;

        let binaries: Vec<PathBuf> = classification
            .binaries()
            .map(|p| p.strip_prefix(reference).map(Path::to_path_buf))
            .collect::<std::result::Result<_, _>>()?;

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for relative in binaries {
            let output = target.join(&relative);
            let sources: Vec<PathBuf> = inputs.iter().map(|input| input.join(&relative)).collect();
            let runner = Arc::clone(&self.runner);
            let permits = Arc::clone(&permits);

            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::GenericError(format!("merge limiter closed: {e}")))?;
                merge_binary(runner.as_ref(), &relative, &output, &sources).await
            });
        }

        let mut merged = 0usize;
        while let Some(joined) = tasks.join_next().await {
            joined??;
            merged += 1;
        }

        log::info!("✓ Merged {} binaries into {}", merged, target.display());
        Ok(target.to_path_buf())
    }

    /// Architectures of the bundle's main executable, as reported by `lipo -archs`.
    pub async fn architectures(&self, bundle: &Path) -> Result<Vec<String>> {
        let executable = first_executable(bundle).await?;
        let output = self
            .runner
            .capture(&Invocation::new("lipo").arg("-archs").path(&executable))
            .await?;
        let archs = parse_architectures(&output.stdout);
        if archs.is_empty() {
            return Err(Error::Parse {
                what: "lipo -archs output",
                detail: format!("no architectures reported for {}", executable.display()),
            });
        }
        Ok(archs)
    }

    /// `"universal"` for multi-architecture bundles, else the single architecture.
    pub async fn architecture_suffix(&self, bundle: &Path) -> Result<String> {
        let archs = self.architectures(bundle).await?;
        Ok(suffix_for(&archs))
    }
}

async fn merge_binary(
    runner: &dyn ProcessRunner,
    relative: &Path,
    output: &Path,
    sources: &[PathBuf],
) -> Result<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent, false).await?;
    }

    let invocation = Invocation::new("lipo")
        .arg("-create")
        .arg("-output")
        .path(output)
        .args(sources.iter().map(|s| s.to_string_lossy().into_owned()));

    runner.run(&invocation).await.map_err(|e| Error::Merge {
        path: relative.to_path_buf(),
        reason: e.to_string(),
    })?;

    log::debug!("✓ {}", relative.display());
    Ok(())
}

/// First entry of `Contents/MacOS` in name order.
async fn first_executable(bundle: &Path) -> Result<PathBuf> {
    let dir = bundle.join("Contents/MacOS");
    let mut entries = tokio::fs::read_dir(&dir)
        .await
        .fs_context("reading executables directory", &dir)?;

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .fs_context("reading executables directory", &dir)?
    {
        names.push(entry.path());
    }
    names.sort();

    names.into_iter().next().ok_or_else(|| Error::Structure {
        path: dir,
        reason: "no executable found".to_string(),
    })
}

/// Split `lipo -archs` output into architecture names, dropping duplicates.
pub fn parse_architectures(stdout: &str) -> Vec<String> {
    let mut archs: Vec<String> = Vec::new();
    for arch in stdout.split_whitespace() {
        if !archs.iter().any(|a| a == arch) {
            archs.push(arch.to_string());
        }
    }
    archs
}

/// Suffix used in artifact names for the given architecture list.
pub fn suffix_for(archs: &[String]) -> String {
    match archs {
        [single] => single.clone(),
        _ => UNIVERSAL_SUFFIX.to_string(),
    }
}
