//! Finding build outputs and pairing them with their counterparts.

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Glob pattern rooted at `dir`, with `dir` escaped.
pub fn rooted(dir: &Path, pattern: &str) -> String {
    let root = glob::Pattern::escape(&dir.to_string_lossy());
    format!("{}/{}", root.trim_end_matches(['/', '\\']), pattern)
}

/// All non-symlink paths matching any of `patterns`, sorted and deduplicated.
pub fn glob_files<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for pattern in patterns {
        for entry in glob::glob(pattern.as_ref())? {
            match entry {
                Ok(path) => {
                    let is_symlink = std::fs::symlink_metadata(&path)
                        .map(|m| m.file_type().is_symlink())
                        .unwrap_or(true);
                    if !is_symlink {
                        files.push(path);
                    }
                }
                Err(e) => log::debug!("Skipping unreadable glob entry: {}", e),
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Files of `main` whose name occurs in the path of any `control` file.
///
/// With `skip_extension` only the file stem has to occur, which pairs
/// `foo.dll` with `foo.pdb`.
pub fn get_matching_files(main: &[PathBuf], control: &[PathBuf], skip_extension: bool) -> Vec<PathBuf> {
    let control: Vec<String> = control
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();

    main.iter()
        .filter(|file| {
            let name = if skip_extension {
                file.file_stem()
            } else {
                file.file_name()
            };
            let Some(name) = name.map(|n| n.to_string_lossy()) else {
                return false;
            };
            control.iter().any(|c| c.contains(name.as_ref()))
        })
        .cloned()
        .collect()
}

/// Regular file with the owner-execute bit and no extension.
#[cfg(unix)]
pub fn is_extensionless_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    if path.extension().is_some() {
        return false;
    }
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_file() && m.permissions().mode() & 0o100 != 0)
        .unwrap_or(false)
}

/// Regular file with the owner-execute bit and no extension.
#[cfg(not(unix))]
pub fn is_extensionless_executable(_path: &Path) -> bool {
    false
}

/// Regular file, not a symlink.
pub fn is_regular_file(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_file())
        .unwrap_or(false)
}
