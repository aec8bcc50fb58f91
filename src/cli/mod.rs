//! Command line interface for the CI actions.
//!
//! Argument parsing, command dispatch and user-facing output.

mod args;
pub mod commands;
mod output;

pub use args::{
    lines, Args, BuildArgs, BuildTreeArgs, Command, ConfigureArgs, PackageArgs, RuntimeConfig, SigningArgs,
};
pub use commands::execute_command;
pub use output::OutputManager;

use crate::config::ActionConfig;
use crate::error::Result;

/// Main CLI entry point
pub async fn run(config: &ActionConfig) -> Result<i32> {
    let args = Args::parse_args();
    execute_command(args, config).await
}

/// Parse arguments without executing (for testing)
pub fn parse_args() -> Args {
    Args::parse_args()
}
