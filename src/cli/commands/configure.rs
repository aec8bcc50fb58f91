//! `configure` command.

use crate::actions::configure::{self, ConfigureOptions};
use crate::bundler::ProcessRunner;
use crate::cli::args::{lines, ConfigureArgs};
use crate::cli::RuntimeConfig;
use crate::config::ActionConfig;
use crate::error::Result;
use std::sync::Arc;

pub(super) async fn execute_configure(
    args: &ConfigureArgs,
    action_config: &ActionConfig,
    runner: Arc<dyn ProcessRunner>,
    config: &RuntimeConfig,
) -> Result<()> {
    let mut options = ConfigureOptions::new(&args.generator, &args.arch);
    options.build_type = args.build_type.clone();
    options.build_level = args.build_level;
    if let Some(types) = &args.configuration_types {
        options.configuration_types = types.clone();
    }
    options.windows_certificate = args.windows_certificate.clone();
    options.windows_certificate_password = args.windows_certificate_password.clone();
    options.apple_codesign_identity = args.signing.apple_codesign_identity.clone();
    options.apple_notarization_user_name = args.signing.apple_notarization_user_name.clone();
    options.apple_notarization_password = args.signing.apple_notarization_password.clone();
    options.image_compiler = args.image_compiler.clone();
    options.cmake_options = lines(&args.cmake_options);

    let _ = config.output().section(&format!("Configure {} ({})", args.arch, args.generator));
    let key = configure::run(action_config, runner.as_ref(), &options).await?;

    let _ = config.output().indent(&format!("build dir: {}", action_config.build_dir(&args.arch).display()));
    let _ = config.output().indent(&format!("cache key: {}", key.key));
    Ok(())
}
