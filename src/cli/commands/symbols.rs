//! `symbols` command.

use super::build::build_dir;
use crate::bundler::ProcessRunner;
use crate::cli::args::BuildTreeArgs;
use crate::cli::RuntimeConfig;
use crate::config::ActionConfig;
use crate::error::Result;
use crate::symbols::SymbolProcessor;
use std::sync::Arc;

pub(super) async fn execute_symbols(
    dependencies: bool,
    tree: &BuildTreeArgs,
    upload: Option<bool>,
    action_config: &ActionConfig,
    runner: Arc<dyn ProcessRunner>,
    config: &RuntimeConfig,
) -> Result<()> {
    let upload = upload.unwrap_or(!tree.build_level.is_alpha());
    let processor = SymbolProcessor::new(action_config, runner);

    if dependencies {
        let _ = config.output().section("Dependency symbols");
        processor.process_dependencies(upload).await?;
    } else {
        let build_dir = build_dir(tree)?;
        let _ = config.output().section(&format!("Symbols of {}", build_dir.display()));
        processor.process_build_output(&build_dir, &tree.build_type, upload).await?;
    }

    if !upload {
        let _ = config.output().verbose("Upload disabled");
    }
    Ok(())
}
