//! macOS bundle assembly, signing and DMG packaging.
//!
//! # Modules
//!
//! - [`inspect`]: classify bundle files, find `.app` bundles
//! - [`universal`]: merge per-architecture bundles with `lipo`
//! - [`sign`]: `codesign`, load path fixing, notarization
//! - [`dmg`]: `hdiutil` disk image packaging
//!
//! # Build Requirements
//!
//! | Step | Required Tools | Notes |
//! |------|----------------|-------|
//! | Merge | `lipo` | Xcode Command Line Tools |
//! | Signing | `codesign`, `otool`, `install_name_tool` | Developer ID identity |
//! | Notarization | `xcrun notarytool`, `xcrun stapler` | Apple ID + app password |
//! | DMG | `hdiutil`, `osascript` | Built into macOS |
//!
//! Everything runs through [`ProcessRunner`](crate::bundler::ProcessRunner),
//! so the modules compile and can be exercised on any host.

pub mod dmg;
pub mod inspect;
pub mod sign;
pub mod universal;
