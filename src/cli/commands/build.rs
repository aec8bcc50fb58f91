//! `build` command.

use crate::actions::build::{self, BuildOptions};
use crate::bundler::ProcessRunner;
use crate::cli::args::{lines, BuildArgs, BuildTreeArgs};
use crate::cli::RuntimeConfig;
use crate::config::ActionConfig;
use crate::error::{CliError, Result};
use std::path::PathBuf;
use std::sync::Arc;

pub(super) async fn execute_build(
    args: &BuildArgs,
    action_config: &ActionConfig,
    runner: Arc<dyn ProcessRunner>,
    config: &RuntimeConfig,
) -> Result<()> {
    let mut options = BuildOptions::new(build_dir(&args.tree)?, &args.tree.build_type);
    options.build_level = args.tree.build_level;
    options.target = args.target.clone();
    options.cmake_options = lines(&args.cmake_options);

    let _ = config.output().section(&format!("Build {}", options.build_dir.display()));
    build::run(action_config, runner, &options).await?;
    let _ = config.output().verbose(&format!("{} jobs, {}", options.jobs, options.build_type));
    Ok(())
}

/// `--build-dir` / `BUILD_DIR`, which `configure` exports.
pub(super) fn build_dir(tree: &BuildTreeArgs) -> Result<PathBuf> {
    tree.build_dir.clone().ok_or_else(|| {
        CliError::MissingArgument {
            argument: "--build-dir (or BUILD_DIR from the configure step)".to_string(),
        }
        .into()
    })
}
