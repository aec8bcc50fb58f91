//! Process-wide configuration.
//!
//! [`ActionConfig`] is built once in `main` from the environment and passed
//! by reference to every action. Nothing reads ambient state afterwards.

use crate::bundler::{HostPlatform, RetryPolicy};
use std::path::{Path, PathBuf};

/// Immutable configuration shared by all actions.
#[derive(Debug, Clone)]
pub struct ActionConfig {
    /// Checkout root
    pub workspace_dir: PathBuf,
    /// Conan cache (`CONAN_HOME`)
    pub conan_home: PathBuf,
    /// Split debug information output
    pub debug_dir: PathBuf,
    /// Local Windows symbol store
    pub symstore_dir: PathBuf,
    /// Installer output directory
    pub package_dir: PathBuf,
    /// Entitlements plist used for hardened-runtime signing
    pub entitlements: PathBuf,
    /// DMG window background image
    pub dmg_background: PathBuf,
    /// Running inside CI
    pub running_on_ci: bool,
    /// File receiving `KEY=value` lines for later steps (`GITHUB_ENV`)
    pub env_file: Option<PathBuf>,
    /// File receiving step outputs (`GITHUB_OUTPUT`)
    pub output_file: Option<PathBuf>,
    /// Host the actions run on
    pub platform: HostPlatform,
    /// Retry policy for flaky disk image operations
    pub dmg_retry: RetryPolicy,
}

impl ActionConfig {
    /// Derive every path from `workspace_dir` with default settings.
    pub fn for_workspace(workspace_dir: impl Into<PathBuf>) -> Self {
        let workspace_dir = workspace_dir.into();
        let debug_dir = workspace_dir.join(".debug");
        Self {
            conan_home: workspace_dir.join(".conan"),
            symstore_dir: debug_dir.join("SymStore"),
            debug_dir,
            package_dir: workspace_dir.join(".package"),
            entitlements: workspace_dir.join("mac/Audacity.entitlements"),
            dmg_background: workspace_dir.join("mac/Resources/Audacity-DMG-background.png"),
            running_on_ci: false,
            env_file: None,
            output_file: None,
            platform: HostPlatform::current(),
            dmg_retry: RetryPolicy::default(),
            workspace_dir,
        }
    }

    /// Read the configuration from the environment.
    ///
    /// | Variable | Meaning |
    /// |----------|---------|
    /// | `GITHUB_WORKSPACE` | workspace root (default: current directory) |
    /// | `CI` | running on CI |
    /// | `GITHUB_ENV` | env-export file |
    /// | `GITHUB_OUTPUT` | step output file |
    /// | `MACOS_ENTITLEMENTS` | entitlements plist, relative to the workspace |
    /// | `DMG_BACKGROUND` | DMG background image, relative to the workspace |
    /// | `DMG_RETRY_ATTEMPTS`, `DMG_RETRY_DELAY_MS` | disk image retry policy |
    pub fn from_env() -> std::io::Result<Self> {
        let workspace_dir = match non_empty_env("GITHUB_WORKSPACE") {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir()?,
        };

        let mut config = Self::for_workspace(&workspace_dir);
        config.running_on_ci = non_empty_env("CI").is_some_and(|v| v != "false" && v != "0");
        config.env_file = non_empty_env("GITHUB_ENV").map(PathBuf::from);
        config.output_file = non_empty_env("GITHUB_OUTPUT").map(PathBuf::from);
        if let Some(path) = non_empty_env("MACOS_ENTITLEMENTS") {
            config.entitlements = workspace_dir.join(path);
        }
        if let Some(path) = non_empty_env("DMG_BACKGROUND") {
            config.dmg_background = workspace_dir.join(path);
        }
        config.dmg_retry = RetryPolicy::from_env();

        Ok(config)
    }

    /// Build tree for one architecture: `<workspace>/.build.<arch>`.
    pub fn build_dir(&self, arch: &str) -> PathBuf {
        self.workspace_dir.join(format!(".build.{arch}"))
    }

    /// Where per-architecture installs are staged before packaging.
    pub fn staging_dir(&self) -> PathBuf {
        self.package_dir.join("_CPack_Packages")
    }

    /// Resolve `path` against the workspace unless it is absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_dir.join(path)
        }
    }
}

/// Value of `name` if set and not blank.
pub fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_follow_workspace() {
        let config = ActionConfig::for_workspace("/work");
        assert_eq!(config.conan_home, PathBuf::from("/work/.conan"));
        assert_eq!(config.symstore_dir, PathBuf::from("/work/.debug/SymStore"));
        assert_eq!(config.build_dir("arm64"), PathBuf::from("/work/.build.arm64"));
        assert_eq!(
            config.staging_dir(),
            PathBuf::from("/work/.package/_CPack_Packages")
        );
    }

    #[test]
    fn test_resolve_keeps_absolute_paths() {
        let config = ActionConfig::for_workspace("/work");
        assert_eq!(config.resolve(Path::new("/abs/x")), PathBuf::from("/abs/x"));
        assert_eq!(config.resolve(Path::new("rel/x")), PathBuf::from("/work/rel/x"));
    }
}
