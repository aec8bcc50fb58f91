//! `cache-key` command.

use crate::actions::{cache_key, env};
use crate::bundler::ProcessRunner;
use crate::cli::RuntimeConfig;
use crate::config::ActionConfig;
use crate::error::Result;
use std::sync::Arc;

pub(super) async fn execute_cache_key(
    generator: &str,
    action_config: &ActionConfig,
    runner: Arc<dyn ProcessRunner>,
    config: &RuntimeConfig,
) -> Result<()> {
    let key = cache_key::compute(action_config, runner.as_ref(), generator).await?;

    let output_file = action_config.output_file.as_deref();
    env::set_output(output_file, "cache-key", &key.key).await?;
    env::set_output(output_file, "cache-restore-key", key.restore_key()).await?;

    let _ = config.output().println(&serde_json::to_string_pretty(&key)?);
    Ok(())
}
