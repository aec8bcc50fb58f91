//! Shared helpers for bundling.

pub mod fs;
pub mod http;
