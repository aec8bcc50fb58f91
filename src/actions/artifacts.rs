//! Collecting packaged files into named artifacts.
//!
//! Every file in the package dir becomes part of the artifact
//! `<stem><postfix>`. ZIP archives are extracted and contribute their
//! contents instead of themselves. The result is written as
//! `artifacts.json` for the CI provider's upload step.

use crate::bundler::utils::http::{extract_zip, sha256_file};
use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the manifest written into the package dir.
pub const MANIFEST_NAME: &str = "artifacts.json";

/// One file of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactFile {
    /// Absolute path
    pub path: PathBuf,
    /// Lowercase hex SHA-256
    pub sha256: String,
}

/// Files uploaded together under one name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactGroup {
    /// Artifact name
    pub name: String,
    /// Member files
    pub files: Vec<ArtifactFile>,
}

/// Artifact name of a packaged file: its stem plus `postfix`.
pub fn artifact_name(file_name: &str, postfix: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    format!("{stem}{postfix}")
}

/// Group the top-level files of `package_dir`, extracting ZIP archives in place.
pub async fn collect(package_dir: &Path, postfix: &str) -> Result<Vec<ArtifactGroup>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(package_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name != MANIFEST_NAME {
            names.push(name);
        }
    }
    names.sort();

    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

    for name in names {
        let path = package_dir.join(&name);
        let files = groups.entry(artifact_name(&name, postfix)).or_default();

        if path.extension().is_some_and(|ext| ext == "zip") {
            let data = tokio::fs::read(&path).await?;
            let extracted = extract_zip(&data, package_dir).await?;
            log::info!("Extracted {} files from {}", extracted.len(), name);
            files.extend(extracted);
        } else {
            files.push(path);
        }
    }

    let mut result = Vec::with_capacity(groups.len());
    for (name, paths) in groups {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            if tokio::fs::metadata(&path).await?.is_dir() {
                log::debug!("Skipping directory {} in artifact {}", path.display(), name);
                continue;
            }
            files.push(ArtifactFile {
                sha256: sha256_file(&path).await?,
                path,
            });
        }
        log::info!("Artifact {}: {} files", name, files.len());
        result.push(ArtifactGroup { name, files });
    }

    Ok(result)
}

/// Write `groups` as pretty JSON to `<package_dir>/artifacts.json`.
pub async fn write_manifest(package_dir: &Path, groups: &[ArtifactGroup]) -> Result<PathBuf> {
    let path = package_dir.join(MANIFEST_NAME);
    tokio::fs::write(&path, serde_json::to_vec_pretty(groups)?).await?;
    log::info!("✓ Wrote artifact manifest {}", path.display());
    Ok(path)
}
