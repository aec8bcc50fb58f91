//! `package` command.

use super::{build::build_dir, signing_backend};
use crate::actions::package::{PackageDriver, PackageOptions};
use crate::bundler::{HostPlatform, ProcessRunner};
use crate::cli::args::{lines, PackageArgs};
use crate::cli::RuntimeConfig;
use crate::config::ActionConfig;
use crate::error::Result;
use std::sync::Arc;

pub(super) async fn execute_package(
    args: &PackageArgs,
    action_config: &ActionConfig,
    runner: Arc<dyn ProcessRunner>,
    config: &RuntimeConfig,
) -> Result<()> {
    // The build tree is only needed for CMake's package target.
    let build_dir = match action_config.platform {
        HostPlatform::MacOs => args
            .tree
            .build_dir
            .clone()
            .unwrap_or_else(|| action_config.build_dir(&args.arch)),
        HostPlatform::Windows | HostPlatform::Linux => build_dir(&args.tree)?,
    };

    let mut options = PackageOptions::new(build_dir, &args.tree.build_type, &args.arch);
    options.build_level = args.tree.build_level;
    options.postfix = args.postfix.clone();
    options.product = args.product.clone();
    options.cmake_options = lines(&args.cmake_options);
    let archs = lines(&args.archs);
    if !archs.is_empty() {
        options.archs = archs;
    }

    let signing = signing_backend(&args.signing, action_config, runner.clone());

    let _ = config.output().section("Package");
    let groups = PackageDriver::new(action_config, runner, signing).run(&options).await?;

    for group in &groups {
        let _ = config.output().info(&format!("{} ({} files)", group.name, group.files.len()));
        for file in &group.files {
            let _ = config.output().indent(&file.path.display().to_string());
        }
    }
    Ok(())
}
