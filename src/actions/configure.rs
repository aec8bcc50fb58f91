//! `configure` action: export build settings and run the CMake configure step.

use crate::actions::{build_level::BuildLevel, cache_key, env};
use crate::bundler::{Invocation, ProcessRunner};
use crate::config::ActionConfig;
use crate::error::{ConfigError, Result};

/// Inputs of the configure action.
#[derive(Debug, Clone)]
pub struct ConfigureOptions {
    /// CMake generator (`Ninja`, `Xcode`, `Visual Studio 17 2022`, ...)
    pub generator: String,
    /// Target architecture label (`x64`, `x32`, `arm64`)
    pub arch: String,
    /// `CMAKE_BUILD_TYPE`
    pub build_type: String,
    /// Release channel
    pub build_level: BuildLevel,
    /// `CMAKE_CONFIGURATION_TYPES` for multi-config generators
    pub configuration_types: String,
    /// Prefix of the project's own CMake options (`<prefix>_use_pch`, ...)
    pub project_prefix: String,
    /// Windows signing certificate
    pub windows_certificate: Option<String>,
    /// Password of `windows_certificate`
    pub windows_certificate_password: Option<String>,
    /// Developer ID used by the Xcode build
    pub apple_codesign_identity: Option<String>,
    /// Apple ID for notarization during the build
    pub apple_notarization_user_name: Option<String>,
    /// App-specific password for `apple_notarization_user_name`
    pub apple_notarization_password: Option<String>,
    /// Image compiler executable for cross builds
    pub image_compiler: Option<String>,
    /// Extra options appended verbatim
    pub cmake_options: Vec<String>,
}

impl ConfigureOptions {
    /// Options for `generator` and `arch` with everything else defaulted.
    pub fn new(generator: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            generator: generator.into(),
            arch: arch.into(),
            build_type: "Release".to_string(),
            build_level: BuildLevel::Alpha,
            configuration_types: "Debug;Release;RelWithDebInfo;MinSizeRel".to_string(),
            project_prefix: "audacity".to_string(),
            windows_certificate: None,
            windows_certificate_password: None,
            apple_codesign_identity: None,
            apple_notarization_user_name: None,
            apple_notarization_password: None,
            image_compiler: None,
            cmake_options: Vec::new(),
        }
    }

    /// Generator is a Visual Studio one.
    pub fn is_visual_studio(&self) -> bool {
        self.generator.starts_with("Visual Studio")
    }

    /// Generator is Xcode.
    pub fn is_xcode(&self) -> bool {
        self.generator.starts_with("Xcode")
    }

    /// Generator builds several configurations from one tree.
    pub fn is_multi_config(&self) -> bool {
        self.is_visual_studio() || self.is_xcode()
    }

    fn windows_signing(&self) -> Option<(&str, &str)> {
        match (&self.windows_certificate, &self.windows_certificate_password) {
            (Some(cert), Some(password)) if !cert.is_empty() && !password.is_empty() => {
                Some((cert.as_str(), password.as_str()))
            }
            _ => None,
        }
    }

    fn invalid_arch(&self) -> ConfigError {
        ConfigError::InvalidArchitecture {
            arch: self.arch.clone(),
            generator: self.generator.clone(),
        }
    }

    /// The `cmake` configure invocation for the workspace in `config`.
    pub fn cmake_invocation(&self, config: &ActionConfig) -> Result<Invocation> {
        let prefix = &self.project_prefix;
        let upper = prefix.to_uppercase();

        let mut cmake = Invocation::new("cmake")
            .arg("-S")
            .path(&config.workspace_dir)
            .arg("-B")
            .path(config.build_dir(&self.arch))
            .arg("-G")
            .arg(&self.generator)
            .arg(format!("-DCMAKE_BUILD_TYPE={}", self.build_type))
            .arg(format!("-D{prefix}_use_pch=no"))
            .arg(format!("-D{prefix}_has_networking=yes"))
            .arg(format!("-D{prefix}_has_updates_check=yes"))
            .arg("-DSHOW_WHATS_NEW_SECTION=yes")
            .arg(format!("-D{upper}_BUILD_LEVEL={}", self.build_level.value()))
            .arg(format!("-D{upper}_ARCH_LABEL={}", self.arch));

        if self.is_multi_config() {
            cmake = cmake.arg(format!("-DCMAKE_CONFIGURATION_TYPES={}", self.configuration_types));
        }

        if self.is_visual_studio() {
            let platform = match self.arch.as_str() {
                "x32" => "Win32",
                "x64" => "x64",
                _ => return Err(self.invalid_arch().into()),
            };
            cmake = cmake.args(["-A", platform]);

            if self.windows_signing().is_some() {
                cmake = cmake.arg(format!("-D{prefix}_perform_codesign=yes"));
            }
        } else if self.is_xcode() {
            let architecture = match self.arch.as_str() {
                "arm64" => "arm64",
                "x64" => "x86_64",
                _ => return Err(self.invalid_arch().into()),
            };
            cmake = cmake.arg(format!("-DMACOS_ARCHITECTURE={architecture}"));

            if let Some(identity) = self.apple_codesign_identity.as_deref().filter(|s| !s.is_empty()) {
                cmake = cmake
                    .arg(format!("-D{prefix}_perform_codesign=yes"))
                    .arg(format!("-DAPPLE_CODESIGN_IDENTITY={identity}"));

                let user = self.apple_notarization_user_name.as_deref().unwrap_or_default();
                let password = self.apple_notarization_password.as_deref().unwrap_or_default();
                if !self.build_level.is_alpha() && !user.is_empty() && !password.is_empty() {
                    cmake = cmake
                        .arg(format!("-DAPPLE_NOTARIZATION_USER_NAME={user}"))
                        .secret(format!("-DAPPLE_NOTARIZATION_PASSWORD={password}"))
                        .arg(format!("-D{prefix}_perform_notarization=yes"));
                }
            }

            if let Some(compiler) = self.image_compiler.as_deref().filter(|s| !s.is_empty()) {
                cmake = cmake.arg(format!("-DIMAGE_COMPILER_EXECUTABLE={compiler}"));
            }
        }

        Ok(cmake.args(self.cmake_options.iter().cloned()))
    }
}

/// Architecture of the machine running the action, in the labels used by `arch`.
pub fn host_arch_label() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "x86" => "x32",
        other => other,
    }
}

/// Run the configure action. Returns the computed cache key.
pub async fn run(
    config: &ActionConfig,
    runner: &dyn ProcessRunner,
    options: &ConfigureOptions,
) -> Result<cache_key::CacheKey> {
    let env_file = config.env_file.as_deref();
    let build_dir = config.build_dir(&options.arch);

    env::export_variable(env_file, "CONAN_HOME", &config.conan_home.to_string_lossy()).await?;
    env::export_variable(env_file, "BUILD_DIR", &build_dir.to_string_lossy()).await?;
    env::export_variable(env_file, "BUILD_TYPE", &options.build_type).await?;
    env::export_variable(env_file, "BUILD_LEVEL", &options.build_level.value().to_string()).await?;
    env::export_variable(env_file, "BUILD_ARCH", &options.arch).await?;
    let cross_compiling = host_arch_label() != options.arch;
    env::export_variable(env_file, "CROSS_COMPILING", &cross_compiling.to_string()).await?;

    let key = cache_key::compute(config, runner, &options.generator).await?;
    let output_file = config.output_file.as_deref();
    env::set_output(output_file, "cache-key", &key.key).await?;
    env::set_output(output_file, "cache-restore-key", key.restore_key()).await?;

    let cmake = options.cmake_invocation(config)?;

    if let Some((certificate, password)) = options.windows_signing() {
        env::export_secret(env_file, "WINDOWS_CERTIFICATE", certificate).await?;
        env::export_secret(env_file, "WINDOWS_CERTIFICATE_PASSWORD", password).await?;
    }

    runner.run(&cmake).await?;
    log::info!("✓ Configured {}", build_dir.display());

    log::info!("Cleaning up conan build cache");
    runner
        .run(&Invocation::new("conan").args(["cache", "clean", "*"]))
        .await?;

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ActionConfig {
        ActionConfig::for_workspace("/work")
    }

    #[test]
    fn test_ninja_gets_ci_defaults() {
        let mut options = ConfigureOptions::new("Ninja", "x64");
        options.build_level = BuildLevel::Beta;
        options.cmake_options = vec!["-DFOO=1".to_string()];

        let cmake = options.cmake_invocation(&config()).unwrap();
        let args = cmake.arguments();

        assert_eq!(&args[..6], ["-S", "/work", "-B", "/work/.build.x64", "-G", "Ninja"]);
        assert!(args.contains(&"-Daudacity_use_pch=no".to_string()));
        assert!(args.contains(&"-DAUDACITY_BUILD_LEVEL=1".to_string()));
        assert!(args.contains(&"-DAUDACITY_ARCH_LABEL=x64".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("-DCMAKE_CONFIGURATION_TYPES")));
        assert_eq!(args.last().map(String::as_str), Some("-DFOO=1"));
    }

    #[test]
    fn test_visual_studio_platforms() {
        let cmake = ConfigureOptions::new("Visual Studio 17 2022", "x32")
            .cmake_invocation(&config())
            .unwrap();
        let line = cmake.display();
        assert!(line.contains("-A Win32"));
        assert!(line.contains("-DCMAKE_CONFIGURATION_TYPES="));

        let err = ConfigureOptions::new("Visual Studio 17 2022", "arm64").cmake_invocation(&config());
        assert!(err.is_err());
    }

    #[test]
    fn test_xcode_notarization_requires_non_alpha() {
        let mut options = ConfigureOptions::new("Xcode", "x64");
        options.apple_codesign_identity = Some("Developer ID".to_string());
        options.apple_notarization_user_name = Some("dev@example.com".to_string());
        options.apple_notarization_password = Some("hunter2".to_string());

        let alpha = options.cmake_invocation(&config()).unwrap();
        assert!(alpha.arguments().contains(&"-DMACOS_ARCHITECTURE=x86_64".to_string()));
        assert!(alpha.arguments().contains(&"-Daudacity_perform_codesign=yes".to_string()));
        assert!(!alpha.display().contains("perform_notarization"));

        options.build_level = BuildLevel::Release;
        let release = options.cmake_invocation(&config()).unwrap();
        assert!(release.display().contains("-Daudacity_perform_notarization=yes"));
        assert!(!release.display().contains("hunter2"));
    }

    #[test]
    fn test_xcode_rejects_unknown_arch() {
        assert!(ConfigureOptions::new("Xcode", "x32").cmake_invocation(&config()).is_err());
    }
}
