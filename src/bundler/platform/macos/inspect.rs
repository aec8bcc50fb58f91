//! Application bundle inspection.
//!
//! Classifies the files of a `.app` by location:
//!
//! | Location | Class |
//! |----------|-------|
//! | `Contents/MacOS/**` | executable |
//! | `Contents/Frameworks/**` regular file | framework library |
//! | `Contents/Frameworks/**` symlink | misc |
//! | `Contents/modules/**` | module |
//! | anything else | misc |
//!
//! Anything else under `Contents/Frameworks` (a subdirectory such as a
//! bundled `.framework`, a socket, ...) is rejected with [`Error::Structure`].

use crate::bundler::error::{Error, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const EXECUTABLES_DIR: &str = "Contents/MacOS";
const FRAMEWORKS_DIR: &str = "Contents/Frameworks";
const MODULES_DIR: &str = "Contents/modules";

/// Files of one bundle, split by how they must be merged and signed.
///
/// The four sets are disjoint and together hold every non-directory
/// entry of the bundle. Paths are absolute (bundle path joined).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleClassification {
    /// Main executables under `Contents/MacOS`.
    pub executables: Vec<PathBuf>,
    /// Regular files under `Contents/Frameworks`.
    pub framework_libraries: Vec<PathBuf>,
    /// Loadable modules under `Contents/modules`.
    pub modules: Vec<PathBuf>,
    /// Everything else, copied verbatim.
    pub misc: Vec<PathBuf>,
}

impl BundleClassification {
    /// All Mach-O files: executables, then libraries, then modules.
    pub fn binaries(&self) -> impl Iterator<Item = &PathBuf> {
        self.executables
            .iter()
            .chain(&self.framework_libraries)
            .chain(&self.modules)
    }

    /// Total number of classified files.
    pub fn len(&self) -> usize {
        self.executables.len() + self.framework_libraries.len() + self.modules.len() + self.misc.len()
    }

    /// Whether the bundle had no files at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Classify every file of `bundle`.
pub fn classify(bundle: &Path) -> Result<BundleClassification> {
    let mut classification = BundleClassification::default();

    for entry in WalkDir::new(bundle).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let relative = entry.path().strip_prefix(bundle)?;
        let file_type = entry.file_type();

        if relative.starts_with(FRAMEWORKS_DIR) {
            if file_type.is_symlink() {
                classification.misc.push(entry.into_path());
            } else if file_type.is_file() {
                classification.framework_libraries.push(entry.into_path());
            } else if relative != Path::new(FRAMEWORKS_DIR) {
                return Err(Error::Structure {
                    path: relative.to_path_buf(),
                    reason: "expected a library file or symlink".to_string(),
                });
            }
        } else if file_type.is_dir() {
            continue;
        } else if relative.starts_with(EXECUTABLES_DIR) {
            classification.executables.push(entry.into_path());
        } else if relative.starts_with(MODULES_DIR) {
            classification.modules.push(entry.into_path());
        } else {
            classification.misc.push(entry.into_path());
        }
    }

    log::debug!(
        "Classified {}: {} executables, {} libraries, {} modules, {} misc",
        bundle.display(),
        classification.executables.len(),
        classification.framework_libraries.len(),
        classification.modules.len(),
        classification.misc.len()
    );

    Ok(classification)
}

/// Every non-directory entry below `dir`, sorted, symlinks not followed.
///
/// A directory symlink shows up as an entry; its contents are not visited.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Every `.app` directory below `dir`, sorted. Found bundles are not
/// searched for nested bundles.
pub fn list_application_bundles(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut bundles = Vec::new();
    let mut walker = WalkDir::new(dir).follow_links(false).sort_by_file_name().into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry?;
        if !entry.file_type().is_dir() || entry.depth() == 0 {
            continue;
        }
        if entry.path().extension().is_some_and(|ext| ext == "app") {
            bundles.push(entry.into_path());
            walker.skip_current_dir();
        }
    }

    Ok(bundles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_list_application_bundles_stops_at_app() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("x64/Audio.app/Contents/MacOS/Audio"));
        touch(&dir.path().join("x64/Audio.app/Contents/Helpers/Inner.app/Contents/MacOS/Inner"));
        touch(&dir.path().join("arm64/Audio.app/Contents/MacOS/Audio"));
        touch(&dir.path().join("arm64/readme.txt"));

        let bundles = list_application_bundles(dir.path()).unwrap();
        assert_eq!(
            bundles,
            vec![
                dir.path().join("arm64/Audio.app"),
                dir.path().join("x64/Audio.app"),
            ]
        );
    }

    #[test]
    fn test_list_files_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b/file2"));
        touch(&dir.path().join("a/file1"));
        fs::create_dir_all(dir.path().join("empty")).unwrap();

        let files = list_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("a/file1"), dir.path().join("b/file2")]);
    }

    #[cfg(unix)]
    fn mixed_bundle(root: &Path) -> PathBuf {
        let bundle = root.join("Audio.app");
        touch(&bundle.join("Contents/MacOS/Audio"));
        touch(&bundle.join("Contents/Frameworks/libwx.dylib"));
        std::os::unix::fs::symlink("libwx.dylib", bundle.join("Contents/Frameworks/libwx.1.dylib")).unwrap();
        touch(&bundle.join("Contents/modules/mod-script.so"));
        touch(&bundle.join("Contents/Resources/a.txt"));
        touch(&bundle.join("Contents/Info.plist"));
        fs::create_dir_all(bundle.join("Contents/Resources/en.lproj")).unwrap();
        bundle
    }

    #[cfg(unix)]
    #[test]
    fn test_classification_partitions_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = mixed_bundle(dir.path());

        let classification = classify(&bundle).unwrap();
        assert_eq!(classification.executables, vec![bundle.join("Contents/MacOS/Audio")]);
        assert_eq!(classification.framework_libraries, vec![bundle.join("Contents/Frameworks/libwx.dylib")]);
        assert_eq!(classification.modules, vec![bundle.join("Contents/modules/mod-script.so")]);
        assert!(classification.misc.contains(&bundle.join("Contents/Frameworks/libwx.1.dylib")));

        let mut all: Vec<PathBuf> = classification
            .binaries()
            .chain(&classification.misc)
            .cloned()
            .collect();
        all.sort();
        let unique = all.len();
        all.dedup();
        assert_eq!(all.len(), unique, "sets overlap");
        assert_eq!(all, list_files(&bundle).unwrap());
    }

    #[test]
    fn test_frameworks_subdirectory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("Audio.app");
        touch(&bundle.join("Contents/MacOS/Audio"));
        touch(&bundle.join("Contents/Frameworks/plugins/libx.dylib"));

        match classify(&bundle).unwrap_err() {
            Error::Structure { path, .. } => assert_eq!(path, PathBuf::from("Contents/Frameworks/plugins")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_empty_frameworks_subdirectory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("Audio.app");
        touch(&bundle.join("Contents/MacOS/Audio"));
        fs::create_dir_all(bundle.join("Contents/Frameworks/sub")).unwrap();

        assert!(matches!(classify(&bundle), Err(Error::Structure { .. })));
    }

    #[test]
    fn test_empty_frameworks_directory_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("Audio.app");
        touch(&bundle.join("Contents/MacOS/Audio"));
        fs::create_dir_all(bundle.join("Contents/Frameworks")).unwrap();

        let classification = classify(&bundle).unwrap();
        assert_eq!(classification.len(), 1);
        assert!(classification.framework_libraries.is_empty());
    }
}
