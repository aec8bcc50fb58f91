//! File system helpers shared by the bundle, disk image and artifact code.
//!
//! Every helper attaches the offending path to its error and treats
//! symbolic links as links, never following them.

use crate::bundler::error::{Error, ErrorExt, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Creates all of the directories of the specified path, erasing it first if specified.
pub async fn create_dir_all(path: &Path, erase: bool) -> Result<()> {
    if erase {
        remove_dir_all(path).await?;
    }
    fs::create_dir_all(path)
        .await
        .fs_context("creating directory", path)
}

/// Removes the directory and its contents if it exists.
pub async fn remove_dir_all(path: &Path) -> Result<()> {
    if fs::symlink_metadata(path).await.is_ok() {
        fs::remove_dir_all(path)
            .await
            .fs_context("removing directory", path)?;
    }
    Ok(())
}

/// Removes a file or symlink if it exists.
pub async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Fs {
            context: "removing file",
            path: path.to_path_buf(),
            error: e,
        }),
    }
}

/// Whether anything (file, directory or dangling link) exists at `path`.
pub async fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).await.is_ok()
}

/// Makes a symbolic link at `link` pointing to `target`.
#[cfg(unix)]
pub async fn symlink(target: &Path, link: &Path) -> Result<()> {
    fs::symlink(target, link)
        .await
        .fs_context("creating symlink", link)
}

/// Makes a symbolic link at `link` pointing to `target`.
#[cfg(windows)]
pub async fn symlink(target: &Path, link: &Path) -> Result<()> {
    if fs::metadata(target).await.map(|m| m.is_dir()).unwrap_or(false) {
        fs::symlink_dir(target, link).await
    } else {
        fs::symlink_file(target, link).await
    }
    .fs_context("creating symlink", link)
}

/// Copies a regular file from one path to another, creating any parent
/// directories of the destination path as necessary.
///
/// Fails if the source path is a directory or doesn't exist.
pub async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    let metadata = fs::metadata(from)
        .await
        .fs_context("reading metadata of", from)?;
    if !metadata.is_file() {
        return Err(Error::GenericError(format!("{from:?} is not a file")));
    }
    if let Some(dest_dir) = to.parent() {
        fs::create_dir_all(dest_dir)
            .await
            .fs_context("creating directory", dest_dir)?;
    }
    fs::copy(from, to).await.fs_context("copying file to", to)?;
    Ok(())
}

/// Copies one bundle entry, recreating a symlink as a symlink with the same
/// target instead of copying what it points at.
pub async fn copy_entry(from: &Path, to: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(from)
        .await
        .fs_context("reading metadata of", from)?;
    if !metadata.file_type().is_symlink() {
        return copy_file(from, to).await;
    }

    let target = fs::read_link(from).await.fs_context("reading symlink", from)?;
    if let Some(dest_dir) = to.parent() {
        fs::create_dir_all(dest_dir)
            .await
            .fs_context("creating directory", dest_dir)?;
    }
    remove_file_if_exists(to).await?;
    symlink(&target, to).await
}

/// Sum of `lstat` sizes of the given paths.
pub async fn total_size(paths: &[PathBuf]) -> Result<u64> {
    let mut total = 0u64;
    for path in paths {
        let metadata = fs::symlink_metadata(path)
            .await
            .fs_context("reading metadata of", path)?;
        total = total.saturating_add(metadata.len());
    }
    Ok(total)
}
