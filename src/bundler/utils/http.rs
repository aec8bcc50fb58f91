//! HTTP and archive helpers.
//!
//! Downloading tools (sentry-cli), uploading symbol store files and
//! extracting packaged ZIP archives.

use crate::bundler::error::{Error, Result};
use sha2::Digest as _;
use std::path::{Path, PathBuf};

/// Downloads a file from a URL.
///
/// Returns the file contents as a byte vector. Non-success statuses are errors.
pub async fn download(url: &str) -> Result<Vec<u8>> {
    log::info!("Downloading {}", url);

    let response = reqwest::get(url)
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::GenericError(format!("Download failed: {}", e)))?;

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::GenericError(format!("Failed to read response: {}", e)))?;

    Ok(bytes.to_vec())
}

/// Downloads `url` into `dest`. Returns `false` on 404.
pub async fn download_to(url: &str, dest: &Path) -> Result<bool> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| Error::GenericError(format!("Download of {} failed: {}", url, e)))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(false);
    }

    let response = response
        .error_for_status()
        .map_err(|e| Error::GenericError(format!("Download of {} failed: {}", url, e)))?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::GenericError(format!("Failed to read response: {}", e)))?;

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(dest, &bytes).await?;
    Ok(true)
}

/// `PUT`s the contents of `file` to `url` with a bearer token.
///
/// Returns the HTTP status code.
pub async fn put_file(client: &reqwest::Client, url: &str, token: &str, file: &Path) -> Result<u16> {
    let body = tokio::fs::read(file).await?;
    let response = client
        .put(url)
        .bearer_auth(token)
        .body(body)
        .send()
        .await
        .map_err(|e| Error::GenericError(format!("Upload to {} failed: {}", url, e)))?;

    Ok(response.status().as_u16())
}

/// Lowercase hex SHA-256 of a file.
///
/// Hashing runs on the blocking pool.
pub async fn sha256_file(path: &Path) -> Result<String> {
    let data = tokio::fs::read(path).await?;

    tokio::task::spawn_blocking(move || {
        let mut hasher = sha2::Sha256::new();
        hasher.update(&data);
        format!("{:x}", hasher.finalize())
    })
    .await
    .map_err(|e| Error::GenericError(format!("Hash task failed: {}", e)))
}

/// Extracts a ZIP archive from memory into a destination directory.
///
/// Returns the extracted files. Entries with `..` or absolute paths are
/// rejected.
pub async fn extract_zip(data: &[u8], dest: &Path) -> Result<Vec<PathBuf>> {
    use async_zip::base::read::mem::ZipFileReader;
    use futures_lite::io::AsyncReadExt as _;

    let reader = ZipFileReader::new(data.to_vec())
        .await
        .map_err(|e| Error::GenericError(format!("Failed to read ZIP archive: {}", e)))?;

    let mut extracted = Vec::new();

    for i in 0..reader.file().entries().len() {
        let entry = reader
            .file()
            .entries()
            .get(i)
            .ok_or_else(|| Error::GenericError(format!("Failed to get ZIP entry {}", i)))?;

        let filename = entry
            .filename()
            .as_str()
            .map_err(|e| Error::GenericError(format!("Invalid filename in ZIP: {}", e)))?
            .to_string();

        if filename.contains("..") || filename.starts_with('/') || filename.starts_with('\\') {
            return Err(Error::GenericError(format!(
                "Invalid ZIP entry path (potential traversal attack): {}",
                filename
            )));
        }

        if entry
            .dir()
            .map_err(|e| Error::GenericError(format!("Failed to check if entry is directory: {}", e)))?
        {
            tokio::fs::create_dir_all(dest.join(&filename)).await?;
            continue;
        }

        let file_path = dest.join(&filename);
        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut entry_reader = reader
            .reader_with_entry(i)
            .await
            .map_err(|e| Error::GenericError(format!("Failed to read ZIP entry: {}", e)))?;
        let mut content = Vec::new();
        entry_reader.read_to_end(&mut content).await?;

        tokio::fs::write(&file_path, content).await?;
        extracted.push(file_path);
    }

    Ok(extracted)
}
