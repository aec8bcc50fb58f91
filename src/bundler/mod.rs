//! macOS bundle assembly, signing and disk image packaging.
//!
//! The pieces, leaves first:
//!
//! | Piece | Module | Tools |
//! |-------|--------|-------|
//! | Process execution | [`process`] | any |
//! | Retry with backoff | [`retry`] | - |
//! | Scoped releases | [`session`] | - |
//! | Bundle inspection | [`platform::macos::inspect`] | - |
//! | Universal merge | [`platform::macos::universal`] | `lipo` |
//! | Signing and notarization | [`platform::macos::sign`] | `codesign`, `notarytool` |
//! | Disk images | [`platform::macos::dmg`] | `hdiutil` |
//!
//! # Example
//!
//! ```no_run
//! use desktop_ci_actions::bundler::{DiskImagePackager, SystemRunner, UniversalBinaryMerger};
//! use std::path::{Path, PathBuf};
//! use std::sync::Arc;
//!
//! # async fn example() -> desktop_ci_actions::bundler::Result<()> {
//! let runner = Arc::new(SystemRunner::new());
//! let merger = UniversalBinaryMerger::new(runner.clone());
//! let app = merger
//!     .merge(
//!         Path::new("universal/Audio.app"),
//!         &[PathBuf::from("x86_64/Audio.app"), PathBuf::from("arm64/Audio.app")],
//!     )
//!     .await?;
//!
//! let suffix = merger.architecture_suffix(&app).await?;
//! DiskImagePackager::new(runner)
//!     .package(&app, Path::new(&format!("audio-{suffix}.dmg")))
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod platform;
pub mod process;
pub mod retry;
pub mod session;
pub(crate) mod utils;

pub use error::{Context, Error, ErrorExt, Result};
pub use platform::macos::dmg::{DiskImagePackager, FinderLayout};
pub use platform::macos::inspect::{classify, list_application_bundles, list_files, BundleClassification};
pub use platform::macos::sign::{
    CodeSigningService, NotarizationCredentials, NotarizationResult, SigningIdentity,
};
pub use platform::macos::universal::UniversalBinaryMerger;
pub use platform::{
    select_signing_backend, AppleSigningBackend, HostPlatform, NoopSigningBackend, SigningBackend,
};
pub use process::{Invocation, ProcessOutput, ProcessRunner, SystemRunner};
pub use retry::{RetryError, RetryPolicy};
pub use session::ResourceStack;
