//! Single-step macOS commands: `merge`, `sign`, `dmg` and `notarize`.
//!
//! These drive the bundler directly and exist mainly for debugging a
//! packaging job one step at a time.

use super::signing_backend;
use crate::bundler::{DiskImagePackager, ProcessRunner, UniversalBinaryMerger};
use crate::cli::args::SigningArgs;
use crate::cli::RuntimeConfig;
use crate::config::ActionConfig;
use crate::error::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub(super) async fn execute_merge(
    target: &Path,
    inputs: &[PathBuf],
    runner: Arc<dyn ProcessRunner>,
    config: &RuntimeConfig,
) -> Result<()> {
    let merger = UniversalBinaryMerger::new(runner);
    let merged = merger.merge(target, inputs).await?;
    let suffix = merger.architecture_suffix(&merged).await?;

    let _ = config.output().info(&format!("{} ({})", merged.display(), suffix));
    Ok(())
}

pub(super) async fn execute_sign(
    bundle: &Path,
    signing: &SigningArgs,
    action_config: &ActionConfig,
    runner: Arc<dyn ProcessRunner>,
    config: &RuntimeConfig,
) -> Result<()> {
    let backend = signing_backend(signing, action_config, runner);
    if !backend.can_sign() {
        let _ = config.output().warn("No signing identity configured");
    }
    backend.sign_bundle(bundle).await?;
    Ok(())
}

pub(super) async fn execute_dmg(
    output: &Path,
    bundle: &Path,
    action_config: &ActionConfig,
    runner: Arc<dyn ProcessRunner>,
    config: &RuntimeConfig,
) -> Result<()> {
    let mut packager = DiskImagePackager::new(runner).with_policy(action_config.dmg_retry);
    if action_config.dmg_background.is_file() {
        packager = packager.with_background(&action_config.dmg_background);
    }

    let image = packager.package(bundle, output).await?;
    let _ = config.output().info(&image.display().to_string());
    Ok(())
}

pub(super) async fn execute_notarize(
    dmg: &Path,
    signing: &SigningArgs,
    action_config: &ActionConfig,
    runner: Arc<dyn ProcessRunner>,
    config: &RuntimeConfig,
) -> Result<()> {
    let backend = signing_backend(signing, action_config, runner);
    match backend.notarize(dmg).await? {
        Some(result) => {
            let _ = config
                .output()
                .info(&format!("Submission {} finished with status {}", result.id, result.status));
        }
        None => {
            let _ = config.output().warn(&format!("Skipping notarization of {}", dmg.display()));
        }
    }
    Ok(())
}
