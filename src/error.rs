//! Error types for the CI actions.
//!
//! This module defines the application error with actionable messages and
//! recovery suggestions. Bundle, signing and disk image failures keep their
//! own [`crate::bundler::Error`] and are wrapped here.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for action operations
pub type Result<T> = std::result::Result<T, ActionError>;

/// Main error type for all actions
#[derive(Error, Debug)]
pub enum ActionError {
    /// Bundle assembly, signing or packaging errors
    #[error("Bundler error: {0}")]
    Bundler(#[from] crate::bundler::Error),

    /// Build configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Debug symbol processing errors
    #[error("Symbol error: {0}")]
    Symbols(#[from] SymbolError),

    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Info.plist errors
    #[error("Property list error: {0}")]
    Plist(#[from] plist::Error),

    /// HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Glob pattern errors
    #[error("Glob pattern error: {0}")]
    GlobPattern(#[from] glob::PatternError),

    /// Archive extraction errors
    #[error("Archive error: {0}")]
    Archive(#[from] async_zip::error::ZipError),

    /// Generic errors from anyhow
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Build configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Architecture not valid for the chosen generator
    #[error("Invalid architecture '{arch}' for generator '{generator}'")]
    InvalidArchitecture {
        /// Requested architecture
        arch: String,
        /// CMake generator
        generator: String,
    },

    /// A file the action depends on is missing
    #[error("Missing {what} at {path}")]
    MissingFile {
        /// Description of the file
        what: &'static str,
        /// Expected location
        path: PathBuf,
    },

    /// Info.plist lacks a key or the key has an unexpected shape
    #[error("Info.plist at {path} has no usable {key}")]
    InfoPlist {
        /// Info.plist path
        path: PathBuf,
        /// Offending key
        key: &'static str,
    },

    /// Tool version could not be determined
    #[error("Could not determine version of {tool}: {reason}")]
    ToolVersion {
        /// Tool name
        tool: String,
        /// Reason for the error
        reason: String,
    },
}

/// Debug symbol processing errors
#[derive(Error, Debug)]
pub enum SymbolError {
    /// sentry-cli could not be found or downloaded
    #[error("sentry-cli is not available: {reason}")]
    SentryCliUnavailable {
        /// Reason for the error
        reason: String,
    },

    /// Symbol store upload returned a non-success status
    #[error("Symbol store upload of {path} failed with HTTP {status}")]
    UploadFailed {
        /// Local file
        path: PathBuf,
        /// HTTP status code
        status: u16,
    },
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Missing required argument
    #[error("Missing required argument: {argument}")]
    MissingArgument {
        /// Argument name
        argument: String,
    },

    /// Command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

impl ActionError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        use crate::bundler::Error as BundlerError;

        match self {
            ActionError::Bundler(BundlerError::Mount { .. })
            | ActionError::Bundler(BundlerError::Unmount { .. }) => vec![
                "List attached images: hdiutil info".to_string(),
                "Detach stale volumes: hdiutil detach /Volumes/<name> -force".to_string(),
            ],
            ActionError::Bundler(BundlerError::Structure { .. }) => vec![
                "Install libraries as plain .dylib files under Contents/Frameworks".to_string(),
            ],
            ActionError::Bundler(BundlerError::Verification { bundle, .. }) => vec![
                format!("Inspect the signature: codesign -dvvv {}", bundle.display()),
                "Check that every nested binary was signed with the same identity".to_string(),
            ],
            ActionError::Bundler(BundlerError::Notarization { id, .. }) => vec![
                format!("Fetch the full log: xcrun notarytool log {id}"),
                "Make sure the hardened runtime and a secure timestamp were used".to_string(),
            ],
            ActionError::Bundler(BundlerError::CommandFailed { command, .. }) => vec![
                format!("Check that the tool is installed and on PATH: {command}"),
            ],
            ActionError::Config(ConfigError::InvalidArchitecture { generator, .. }) => vec![
                format!("Use an architecture supported by {generator}"),
            ],
            ActionError::Symbols(SymbolError::SentryCliUnavailable { .. }) => vec![
                "Install sentry-cli or allow network access to download it".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }

    /// Check if this error is worth retrying the whole action for
    pub fn is_recoverable(&self) -> bool {
        use crate::bundler::Error as BundlerError;

        !matches!(
            self,
            ActionError::Bundler(BundlerError::Structure { .. })
                | ActionError::Bundler(BundlerError::Notarization { .. })
                | ActionError::Config(_)
                | ActionError::Cli(_)
        )
    }
}
