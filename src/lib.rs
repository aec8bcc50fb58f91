//! # Desktop CI Actions
//!
//! Build automation for a CMake/Conan desktop application on CI runners.
//!
//! The crate covers the steps of a build job:
//!
//! - **configure**: export build settings, compute the Conan cache key and run CMake
//! - **build**: build the tree and split/upload debug symbols
//! - **package**: produce installers; on macOS merge per-architecture bundles
//!   into a universal one, sign, wrap into DMGs and notarize
//! - **symbols**: split and upload debug information of the build or its
//!   Conan dependencies
//!
//! ## Usage
//!
//! ```bash
//! desktop_ci_actions configure --generator Xcode --arch arm64
//! desktop_ci_actions build
//! desktop_ci_actions package --archs arm64 --archs x64
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod actions;
pub mod bundler;
pub mod cli;
pub mod config;
pub mod error;
pub mod symbols;

pub use actions::{BuildLevel, CacheKey};
pub use cli::Args;
pub use config::ActionConfig;
pub use error::{ActionError, CliError, ConfigError, Result, SymbolError};
