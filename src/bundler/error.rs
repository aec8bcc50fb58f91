//! Error types for bundle assembly, signing and disk image packaging.
//!
//! Provides contextual error chaining, filesystem errors that carry the
//! offending path, and one variant per failure class of the macOS pipeline.
//!
//! # Features
//!
//! - **Context trait**: Add context to errors similar to anyhow
//! - **ErrorExt trait**: Filesystem operations with automatic path context
//! - **bail! macro**: Early return with formatted error messages
//!
//! # Example
//!
//! ```no_run
//! use desktop_ci_actions::bundler::{Context, ErrorExt, Result};
//! use std::path::Path;
//!
//! fn read_info_plist(bundle: &Path) -> Result<Vec<u8>> {
//!     let path = bundle.join("Contents/Info.plist");
//!     let bytes = std::fs::read(&path).fs_context("reading Info.plist", &path)?;
//!     if bytes.is_empty() {
//!         desktop_ci_actions::bail!("empty Info.plist in {}", bundle.display());
//!     }
//!     Ok(bytes)
//! }
//! ```

use std::{
    fmt::Display,
    io,
    path::{self, PathBuf},
};
use thiserror::Error as DeriveError;

/// Errors returned by the bundler.
#[derive(Debug, DeriveError)]
#[non_exhaustive]
pub enum Error {
    /// Error with context. Created by the [`Context`] trait.
    #[error("{0}: {1}")]
    Context(String, Box<Self>),

    /// File system error with path context.
    ///
    /// Created by the [`ErrorExt`] trait's `fs_context` method.
    #[error("{context} {path}: {error}")]
    Fs {
        /// Context describing the operation (e.g., "copying misc file")
        context: &'static str,
        /// Path that was being accessed
        path: PathBuf,
        /// The underlying I/O error
        error: io::Error,
    },

    /// A child process could not be spawned.
    #[error("failed to run command {command}: {error}")]
    CommandFailed {
        /// Redacted command line
        command: String,
        /// The underlying error
        error: io::Error,
    },

    /// A child process ran but exited unsuccessfully.
    #[error("command `{command}` exited with {status}: {stderr}")]
    ToolFailed {
        /// Redacted command line
        command: String,
        /// Exit code, or "signal" when the process was killed
        status: String,
        /// Captured standard error, trimmed
        stderr: String,
    },

    /// Tool output did not contain what we expected.
    #[error("could not parse {what}: {detail}")]
    Parse {
        /// Which output was being parsed
        what: &'static str,
        /// The offending text or a short explanation
        detail: String,
    },

    /// Bundle layout cannot be handled (e.g. a bundled framework directory).
    #[error("unsupported bundle structure at {path}: {reason}")]
    Structure {
        /// Offending path inside the bundle
        path: PathBuf,
        /// What was found
        reason: String,
    },

    /// `lipo` failed for a binary while assembling a universal bundle.
    #[error("failed to merge {path}: {reason}")]
    Merge {
        /// Path relative to the bundle root
        path: PathBuf,
        /// Failure reported by lipo
        reason: String,
    },

    /// Code signature verification failed after signing.
    #[error("code signature verification failed for {bundle}: {reason}")]
    Verification {
        /// Signed bundle
        bundle: PathBuf,
        /// Verifier output
        reason: String,
    },

    /// Temporary disk image could not be created.
    #[error("failed to create disk image {path} after {attempts} attempts: {last}")]
    ImageCreation {
        /// Temporary image path
        path: PathBuf,
        /// Attempts made
        attempts: u32,
        /// Last failure
        last: Box<Self>,
    },

    /// Disk image could not be attached.
    #[error("failed to attach disk image {path} after {attempts} attempts: {last}")]
    Mount {
        /// Image being attached
        path: PathBuf,
        /// Attempts made
        attempts: u32,
        /// Last failure
        last: Box<Self>,
    },

    /// Volume could not be detached, even with force.
    #[error("failed to detach volume {mount_point}: {last}")]
    Unmount {
        /// Mount point of the volume
        mount_point: PathBuf,
        /// Failure of the forced detach
        last: Box<Self>,
    },

    /// Compressed image could not be produced.
    #[error("failed to convert disk image into {output} after {attempts} attempts: {last}")]
    Conversion {
        /// Final image path
        output: PathBuf,
        /// Attempts made
        attempts: u32,
        /// Last failure
        last: Box<Self>,
    },

    /// Notarization service did not accept the submission.
    #[error("notarization failed: {status} (submission {id})")]
    Notarization {
        /// Submission id reported by notarytool
        id: String,
        /// Final status reported by notarytool
        status: String,
    },

    /// Generic I/O error.
    #[error("{0}")]
    IoError(#[from] io::Error),

    /// Error walking a bundle directory.
    #[error("{0}")]
    WalkdirError(#[from] walkdir::Error),

    /// Path prefix stripping error.
    #[error("{0}")]
    StripError(#[from] path::StripPrefixError),

    /// JSON deserialization error (notarytool output).
    #[error("{0}")]
    JsonError(#[from] serde_json::error::Error),

    /// Regular expression error.
    #[error("{0}")]
    RegexError(#[from] regex::Error),

    /// Background task panicked or was cancelled.
    #[error("{0}")]
    JoinError(#[from] tokio::task::JoinError),

    /// Generic error with custom message.
    #[error("{0}")]
    GenericError(String),
}

/// Convenient type alias for Result.
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for adding context to errors.
///
/// Similar to `anyhow::Context` but integrated with bundler's Error type.
/// Works with both `Result<T, E>` and `Option<T>`.
pub trait Context<T> {
    /// Add context to an error.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;

    /// Add context to an error using a closure (lazy evaluation).
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> Context<T> for Result<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|e| Error::Context(context.to_string(), Box::new(e)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| Error::Context(f().to_string(), Box::new(e)))
    }
}

impl<T> Context<T> for Option<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::GenericError(f().to_string()))
    }
}

/// Extension trait for filesystem operations with automatic path context.
pub trait ErrorExt<T> {
    /// Add filesystem context to an I/O error.
    ///
    /// The `context` should be a present-tense verb phrase describing the operation,
    /// e.g., "reading file", "creating directory", "copying binary".
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context,
            path: path.into(),
            error,
        })
    }
}

/// Macro for early return with error.
///
/// Converts the message into a [`Error::GenericError`] and returns immediately.
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::bundler::error::Error::GenericError(format!($msg)))
    };
    ($err:expr $(,)?) => {
        return Err($crate::bundler::error::Error::GenericError($err.to_string()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::bundler::error::Error::GenericError(format!($fmt, $($arg)*)))
    };
}
