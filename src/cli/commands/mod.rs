//! Command execution.
//!
//! Each command builds its collaborators from the [`ActionConfig`] and the
//! parsed arguments, runs one action and prints a short summary.

mod build;
mod bundle;
mod cache_key;
mod configure;
mod package;
mod symbols;

use crate::bundler::{
    select_signing_backend, NotarizationCredentials, ProcessRunner, SigningBackend, SigningIdentity, SystemRunner,
};
use crate::cli::args::SigningArgs;
use crate::cli::{Args, Command, RuntimeConfig};
use crate::config::ActionConfig;
use crate::error::Result;
use std::sync::Arc;

/// Execute the parsed command. Returns the process exit code.
pub async fn execute_command(args: Args, action_config: &ActionConfig) -> Result<i32> {
    let config = RuntimeConfig::from(&args);
    let runner: Arc<dyn ProcessRunner> = Arc::new(SystemRunner::new());

    let result = match &args.command {
        Command::Configure(configure_args) => {
            configure::execute_configure(configure_args, action_config, runner, &config).await
        }
        Command::Build(build_args) => build::execute_build(build_args, action_config, runner, &config).await,
        Command::Package(package_args) => {
            package::execute_package(package_args, action_config, runner, &config).await
        }
        Command::CacheKey { generator } => {
            cache_key::execute_cache_key(generator, action_config, runner, &config).await
        }
        Command::Merge { target, inputs } => bundle::execute_merge(target, inputs, runner, &config).await,
        Command::Sign { bundle, signing } => {
            bundle::execute_sign(bundle, signing, action_config, runner, &config).await
        }
        Command::Dmg { output, bundle } => {
            bundle::execute_dmg(output, bundle, action_config, runner, &config).await
        }
        Command::Notarize { dmg, signing } => {
            bundle::execute_notarize(dmg, signing, action_config, runner, &config).await
        }
        Command::Symbols {
            dependencies,
            tree,
            upload,
        } => symbols::execute_symbols(*dependencies, tree, *upload, action_config, runner, &config).await,
    };

    match result {
        Ok(()) => {
            let _ = config
                .output()
                .success(&format!("Command '{}' completed successfully", args.command.name()));
            Ok(0)
        }
        Err(e) => {
            log::error!("{} failed: {}", args.command.name(), e);
            config
                .output()
                .error(&format!("Command '{}' failed: {}", args.command.name(), e));

            let suggestions = e.recovery_suggestions();
            if !suggestions.is_empty() {
                let _ = config.output().println("\n💡 Recovery suggestions:");
                for suggestion in suggestions {
                    let _ = config.output().println(&format!("  • {}", suggestion));
                }
            }
            if e.is_recoverable() {
                let _ = config.output().println("  • The failure may be transient; re-running the job can help");
            }

            Ok(1)
        }
    }
}

/// Identity and credentials from the command line.
fn signing_identity(args: &SigningArgs) -> SigningIdentity {
    SigningIdentity {
        identity: args.apple_codesign_identity.clone(),
        credentials: NotarizationCredentials::new(
            args.apple_notarization_user_name.clone(),
            args.apple_notarization_team_id.clone(),
            args.apple_notarization_password.clone(),
        ),
    }
}

/// Signing backend for this host.
fn signing_backend(
    args: &SigningArgs,
    action_config: &ActionConfig,
    runner: Arc<dyn ProcessRunner>,
) -> Box<dyn SigningBackend> {
    select_signing_backend(
        action_config.platform,
        runner,
        &action_config.entitlements,
        signing_identity(args),
    )
}
