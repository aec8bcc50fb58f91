//! Splitting debug information out of binaries.
//!
//! macOS uses `dsymutil`, Linux `objcopy`. Both write into the debug dir
//! and return the produced path, or `None` when nothing was split.

use crate::bundler::{Invocation, ProcessRunner};
use crate::error::Result;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Libraries that break when stripped.
static DO_NOT_STRIP: LazyLock<Vec<Regex>> =
    LazyLock::new(|| vec![Regex::new(r"libicu.+").expect("libicu regex is valid")]);

/// How debug information is separated on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Splitter {
    /// `dsymutil` into a `.dSYM` bundle
    Dsym,
    /// `objcopy` into a `.debug` file plus a debuglink
    Objcopy,
}

impl Splitter {
    /// Extension pattern of the shared libraries this splitter handles.
    pub fn library_pattern(&self) -> &'static str {
        match self {
            Splitter::Dsym => "*.dylib",
            Splitter::Objcopy => "*.so*",
        }
    }

    /// Split `file` into `debug_dir`.
    pub async fn split(&self, runner: &dyn ProcessRunner, file: &Path, debug_dir: &Path) -> Result<Option<PathBuf>> {
        match self {
            Splitter::Dsym => split_dsym(runner, file, debug_dir).await.map(Some),
            Splitter::Objcopy => Ok(split_debug_file(runner, file, debug_dir).await),
        }
    }
}

/// Whether `file` must be left untouched by `objcopy`.
pub fn skip_split(file: &Path) -> bool {
    let file = file.to_string_lossy();
    DO_NOT_STRIP.iter().any(|pattern| pattern.is_match(&file))
}

fn debug_path(file: &Path, debug_dir: &Path, extension: &str) -> PathBuf {
    let mut name = file.file_name().unwrap_or(file.as_os_str()).to_os_string();
    name.push(extension);
    debug_dir.join(name)
}

async fn split_dsym(runner: &dyn ProcessRunner, file: &Path, debug_dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(debug_dir).await?;

    log::info!("Calling dsymutil on {}", file.display());
    let dsym = debug_path(file, debug_dir, ".dSYM");
    runner
        .run(&Invocation::new("dsymutil").path(file).arg("-o").path(&dsym))
        .await?;

    Ok(dsym)
}

async fn split_debug_file(runner: &dyn ProcessRunner, file: &Path, debug_dir: &Path) -> Option<PathBuf> {
    if skip_split(file) {
        log::debug!("Not stripping {}", file.display());
        return None;
    }

    match try_split_debug_file(runner, file, debug_dir).await {
        Ok(path) => path,
        Err(e) => {
            log::error!("Failed to split debug information of {}: {}", file.display(), e);
            None
        }
    }
}

async fn try_split_debug_file(runner: &dyn ProcessRunner, file: &Path, debug_dir: &Path) -> Result<Option<PathBuf>> {
    tokio::fs::create_dir_all(debug_dir).await?;
    let debug = debug_path(file, debug_dir, ".debug");

    runner
        .run(
            &Invocation::new("objcopy")
                .args(["--only-keep-debug", "--compress-debug-section=zlib"])
                .path(file)
                .path(&debug),
        )
        .await?;

    if !tokio::fs::try_exists(&debug).await.unwrap_or(false) {
        return Ok(None);
    }

    runner
        .run(
            &Invocation::new("objcopy")
                .args(["--strip-debug", "--strip-unneeded"])
                .path(file),
        )
        .await?;
    runner
        .run(
            &Invocation::new("objcopy")
                .arg(format!("--add-gnu-debuglink={}", debug.display()))
                .path(file),
        )
        .await?;

    Ok(Some(debug))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icu_is_never_stripped() {
        assert!(skip_split(Path::new("/bin/Release/libicuuc.so.73")));
        assert!(skip_split(Path::new("/bin/Release/libicudata.so")));
        assert!(!skip_split(Path::new("/bin/Release/libwx.so")));
        assert!(!skip_split(Path::new("/bin/Release/libicu")));
    }

    #[test]
    fn test_debug_paths() {
        assert_eq!(
            debug_path(Path::new("/b/libfoo.so.1"), Path::new("/d"), ".debug"),
            PathBuf::from("/d/libfoo.so.1.debug")
        );
        assert_eq!(
            debug_path(Path::new("/b/Audio"), Path::new("/d"), ".dSYM"),
            PathBuf::from("/d/Audio.dSYM")
        );
    }
}
