//! Command line argument parsing.
//!
//! Every option can also be given as a GitHub Actions input: clap reads
//! `INPUT_<NAME>` from the environment, so `with: build_type: Release`
//! in a workflow works without flags. Multi-line inputs (`cmake_options`,
//! `archs`) are split on newlines.

use crate::actions::BuildLevel;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// Build automation for the desktop application on CI
#[derive(Parser, Debug)]
#[command(
    name = "desktop_ci_actions",
    version,
    about = "Build automation for the desktop application on CI",
    long_about = "Configure, build and package the desktop application on CI.

The macOS packaging merges per-architecture bundles into a universal one,
signs and notarizes them and wraps each bundle into a DMG.

Usage:
  desktop_ci_actions configure --generator Xcode --arch arm64
  desktop_ci_actions build
  desktop_ci_actions package --archs arm64 --archs x64
  desktop_ci_actions dmg out.dmg .package/Audio.app"
)]
pub struct Args {
    /// Action to run
    #[command(subcommand)]
    pub command: Command,

    /// Show detailed output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Available actions
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Export build settings, compute the Conan cache key and configure CMake
    Configure(ConfigureArgs),

    /// Build the configured tree and process debug symbols
    Build(BuildArgs),

    /// Produce installers and write the artifact manifest
    Package(PackageArgs),

    /// Print the Conan cache key
    CacheKey {
        /// CMake generator
        #[arg(long, env = "INPUT_GENERATOR", default_value = "Ninja")]
        generator: String,
    },

    /// Merge per-architecture app bundles into a universal bundle
    Merge {
        /// Universal bundle to create
        target: PathBuf,
        /// Per-architecture bundles; the first one is the reference layout
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,
    },

    /// Fix load paths, sign and verify an app bundle
    Sign {
        /// App bundle
        bundle: PathBuf,
        /// Identity and credentials
        #[command(flatten)]
        signing: SigningArgs,
    },

    /// Package an app bundle into a compressed DMG
    Dmg {
        /// DMG to create
        output: PathBuf,
        /// App bundle
        bundle: PathBuf,
    },

    /// Notarize and staple a DMG
    Notarize {
        /// Disk image
        dmg: PathBuf,
        /// Identity and credentials
        #[command(flatten)]
        signing: SigningArgs,
    },

    /// Split and upload debug symbols
    Symbols {
        /// Process Conan dependencies instead of the build output
        #[arg(long)]
        dependencies: bool,
        /// Build tree
        #[command(flatten)]
        tree: BuildTreeArgs,
        /// Upload symbols (default: unless the build level is alpha)
        #[arg(long, env = "INPUT_UPLOAD_SYMBOLS")]
        upload: Option<bool>,
    },
}

impl Command {
    /// Name of the command as typed on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Configure(_) => "configure",
            Command::Build(_) => "build",
            Command::Package(_) => "package",
            Command::CacheKey { .. } => "cache-key",
            Command::Merge { .. } => "merge",
            Command::Sign { .. } => "sign",
            Command::Dmg { .. } => "dmg",
            Command::Notarize { .. } => "notarize",
            Command::Symbols { .. } => "symbols",
        }
    }
}

/// Apple signing identity and notarization credentials
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct SigningArgs {
    /// Developer ID signing identity
    #[arg(long, env = "INPUT_APPLE_CODESIGN_IDENTITY")]
    pub apple_codesign_identity: Option<String>,

    /// Apple ID used for notarization
    #[arg(long, env = "INPUT_APPLE_NOTARIZATION_USER_NAME")]
    pub apple_notarization_user_name: Option<String>,

    /// Team ID used for notarization
    #[arg(long, env = "INPUT_APPLE_NOTARIZATION_TEAM_ID")]
    pub apple_notarization_team_id: Option<String>,

    /// App-specific password of the Apple ID
    #[arg(long, env = "INPUT_APPLE_NOTARIZATION_PASSWORD", hide_env_values = true)]
    pub apple_notarization_password: Option<String>,
}

/// Configured build tree, as exported by `configure`
#[derive(ClapArgs, Debug, Clone)]
pub struct BuildTreeArgs {
    /// Build directory
    #[arg(long, env = "BUILD_DIR")]
    pub build_dir: Option<PathBuf>,

    /// Build configuration
    #[arg(long, env = "BUILD_TYPE", default_value = "Release")]
    pub build_type: String,

    /// Release channel: alpha, beta or release
    #[arg(long, env = "INPUT_BUILD_LEVEL", default_value = "alpha")]
    pub build_level: BuildLevel,
}

/// `configure` inputs
#[derive(ClapArgs, Debug, Clone)]
pub struct ConfigureArgs {
    /// CMake generator
    #[arg(long, env = "INPUT_GENERATOR", default_value = "Ninja")]
    pub generator: String,

    /// Target architecture: x64, x32 or arm64
    #[arg(long, env = "INPUT_ARCH", default_value = "x64")]
    pub arch: String,

    /// CMAKE_BUILD_TYPE
    #[arg(long, env = "INPUT_BUILD_TYPE", default_value = "Release")]
    pub build_type: String,

    /// Release channel: alpha, beta or release
    #[arg(long, env = "INPUT_BUILD_LEVEL", default_value = "alpha")]
    pub build_level: BuildLevel,

    /// CMAKE_CONFIGURATION_TYPES for multi-config generators
    #[arg(long, env = "INPUT_CONFIGURATION_TYPES")]
    pub configuration_types: Option<String>,

    /// Windows signing certificate
    #[arg(long, env = "INPUT_WINDOWS_CERTIFICATE", hide_env_values = true)]
    pub windows_certificate: Option<String>,

    /// Password of the Windows signing certificate
    #[arg(long, env = "INPUT_WINDOWS_CERTIFICATE_PASSWORD", hide_env_values = true)]
    pub windows_certificate_password: Option<String>,

    /// Apple identity and credentials
    #[command(flatten)]
    pub signing: SigningArgs,

    /// Image compiler executable for cross builds
    #[arg(long, env = "INPUT_IMAGE_COMPILER")]
    pub image_compiler: Option<String>,

    /// Extra CMake options, one per line
    #[arg(long, env = "INPUT_CMAKE_OPTIONS", value_delimiter = '\n', allow_hyphen_values = true)]
    pub cmake_options: Vec<String>,
}

/// `build` inputs
#[derive(ClapArgs, Debug, Clone)]
pub struct BuildArgs {
    /// Build tree
    #[command(flatten)]
    pub tree: BuildTreeArgs,

    /// Single target to build
    #[arg(long, env = "INPUT_TARGET")]
    pub target: Option<String>,

    /// Extra CMake options, one per line
    #[arg(long, env = "INPUT_CMAKE_OPTIONS", value_delimiter = '\n', allow_hyphen_values = true)]
    pub cmake_options: Vec<String>,
}

/// `package` inputs
#[derive(ClapArgs, Debug, Clone)]
pub struct PackageArgs {
    /// Build tree
    #[command(flatten)]
    pub tree: BuildTreeArgs,

    /// Architecture of the configured tree
    #[arg(long, env = "BUILD_ARCH", default_value = "x64")]
    pub arch: String,

    /// Architectures to install and merge on macOS, one per line
    #[arg(long, env = "INPUT_ARCHS", value_delimiter = '\n')]
    pub archs: Vec<String>,

    /// Appended to every artifact name
    #[arg(long, env = "INPUT_POSTFIX", default_value = "")]
    pub postfix: String,

    /// Product name leading DMG file names
    #[arg(long, env = "INPUT_PRODUCT", default_value = "audacity")]
    pub product: String,

    /// Apple identity and credentials
    #[command(flatten)]
    pub signing: SigningArgs,

    /// Extra CMake options, one per line
    #[arg(long, env = "INPUT_CMAKE_OPTIONS", value_delimiter = '\n', allow_hyphen_values = true)]
    pub cmake_options: Vec<String>,
}

/// Trimmed, non-empty lines of a multi-line input.
pub fn lines(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    output: super::OutputManager,
}

impl RuntimeConfig {
    /// Runtime configuration with the given verbosity
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            output: super::OutputManager::new(verbose, quiet),
        }
    }

    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        Self::new(args.verbose, args.quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_merge_requires_inputs() {
        assert!(Args::try_parse_from(["desktop_ci_actions", "merge", "out.app"]).is_err());

        let args = Args::try_parse_from(["desktop_ci_actions", "merge", "u/A.app", "x/A.app", "a/A.app"]).unwrap();
        match args.command {
            Command::Merge { target, inputs } => {
                assert_eq!(target, PathBuf::from("u/A.app"));
                assert_eq!(inputs.len(), 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_lines_drops_blanks() {
        let values = vec![" -DA=1 ".to_string(), String::new(), "-DB=2".to_string()];
        assert_eq!(lines(&values), vec!["-DA=1", "-DB=2"]);
    }
}
