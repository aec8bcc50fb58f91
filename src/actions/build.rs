//! `build` action: compile the configured tree and process debug symbols.

use crate::actions::build_level::BuildLevel;
use crate::bundler::{Invocation, ProcessRunner};
use crate::config::ActionConfig;
use crate::error::Result;
use crate::symbols::SymbolProcessor;
use std::path::PathBuf;
use std::sync::Arc;

/// Inputs of the build action.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Configured build tree (`BUILD_DIR` exported by configure)
    pub build_dir: PathBuf,
    /// Configuration to build (`BUILD_TYPE` exported by configure)
    pub build_type: String,
    /// Release channel; symbols are uploaded unless alpha
    pub build_level: BuildLevel,
    /// Single target to build
    pub target: Option<String>,
    /// Extra options appended verbatim
    pub cmake_options: Vec<String>,
    /// Parallel jobs
    pub jobs: usize,
}

impl BuildOptions {
    /// Options building everything in `build_dir` with one job per CPU.
    pub fn new(build_dir: impl Into<PathBuf>, build_type: impl Into<String>) -> Self {
        Self {
            build_dir: build_dir.into(),
            build_type: build_type.into(),
            build_level: BuildLevel::Alpha,
            target: None,
            cmake_options: Vec::new(),
            jobs: num_cpus::get(),
        }
    }

    /// `cmake --build` invocation.
    pub fn cmake_invocation(&self) -> Invocation {
        let mut cmake = Invocation::new("cmake")
            .arg("--build")
            .path(&self.build_dir)
            .arg("-j")
            .arg(self.jobs.to_string())
            .arg("--config")
            .arg(&self.build_type);

        if let Some(target) = self.target.as_deref().filter(|t| !t.is_empty()) {
            cmake = cmake.args(["--target", target]);
        }

        cmake.args(self.cmake_options.iter().cloned())
    }
}

/// Run the build action.
pub async fn run(config: &ActionConfig, runner: Arc<dyn ProcessRunner>, options: &BuildOptions) -> Result<()> {
    runner.run(&options.cmake_invocation()).await?;
    log::info!("✓ Built {} ({})", options.build_dir.display(), options.build_type);

    let upload = !options.build_level.is_alpha();
    SymbolProcessor::new(config, runner)
        .process_build_output(&options.build_dir, &options.build_type, upload)
        .await
}
