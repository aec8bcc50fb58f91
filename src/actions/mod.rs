//! CI actions.
//!
//! | Action | Module | Tools |
//! |--------|--------|-------|
//! | configure | [`configure`] | `cmake`, `conan`, `clang`/`gcc` |
//! | build | [`build`] | `cmake`, symbol tools |
//! | package | [`package`] | `cmake`, bundler, `git` |
//! | cache-key | [`cache_key`] | `conan`, `clang`/`gcc` |
//!
//! Values for later steps are handed over through [`env`]; packaged files
//! are described by the [`artifacts`] manifest.

pub mod artifacts;
pub mod build;
pub mod build_level;
pub mod cache_key;
pub mod configure;
pub mod env;
pub mod package;

pub use build_level::BuildLevel;
pub use cache_key::CacheKey;
