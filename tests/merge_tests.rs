mod common;

#[cfg(test)]
mod tests {
    use super::common::{make_bundle, write_file, FakeToolchain};
    use desktop_ci_actions::bundler::{list_files, Error, UniversalBinaryMerger};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    fn inputs(root: &Path) -> Vec<PathBuf> {
        vec![
            make_bundle(&root.join("x86_64"), "Audio", "x86_64"),
            make_bundle(&root.join("arm64"), "Audio", "arm64"),
        ]
    }

    #[tokio::test]
    async fn test_merge_lipos_binaries_and_copies_the_rest() {
        let root = tempfile::tempdir().unwrap();
        let tools = Arc::new(FakeToolchain::new(&root.path().join("volumes")));
        let target = root.path().join("universal/Audio.app");
        let bundles = inputs(root.path());

        let merged = UniversalBinaryMerger::new(tools.clone())
            .merge(&target, &bundles)
            .await
            .unwrap();

        let relative_files = |bundle: &Path| -> Vec<PathBuf> {
            list_files(bundle)
                .unwrap()
                .into_iter()
                .map(|p| p.strip_prefix(bundle).unwrap().to_path_buf())
                .collect()
        };
        assert_eq!(relative_files(&target), relative_files(&bundles[0]));

        assert_eq!(merged, target);
        assert_eq!(tools.count("lipo -create"), 3);
        for binary in [
            "Contents/MacOS/Audio",
            "Contents/Frameworks/libwx.dylib",
            "Contents/modules/mod-script.so",
        ] {
            assert_eq!(
                std::fs::read_to_string(target.join(binary)).unwrap(),
                "fat binary of 2",
                "{binary}"
            );
        }

        assert_eq!(std::fs::read_to_string(target.join("Contents/Resources/a.txt")).unwrap(), "resource");
        assert!(target.join("Contents/Resources/en.lproj").is_dir());

        let link = target.join("Contents/Frameworks/libwx.1.dylib");
        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_link(&link).unwrap(), PathBuf::from("libwx.dylib"));
    }

    #[tokio::test]
    async fn test_merge_passes_every_input_in_order() {
        let root = tempfile::tempdir().unwrap();
        let tools = Arc::new(FakeToolchain::new(&root.path().join("volumes")));
        let bundles = inputs(root.path());

        UniversalBinaryMerger::new(tools.clone())
            .with_concurrency(1)
            .merge(&root.path().join("u/Audio.app"), &bundles)
            .await
            .unwrap();

        let executable = tools
            .calls()
            .into_iter()
            .find(|c| c.arguments().last().is_some_and(|a| a.ends_with("MacOS/Audio")))
            .unwrap();
        let args = executable.arguments();
        assert_eq!(args[args.len() - 2], bundles[0].join("Contents/MacOS/Audio").display().to_string());
        assert_eq!(args[args.len() - 1], bundles[1].join("Contents/MacOS/Audio").display().to_string());
    }

    #[tokio::test]
    async fn test_merge_rejects_bundled_frameworks() {
        let root = tempfile::tempdir().unwrap();
        let tools = Arc::new(FakeToolchain::new(&root.path().join("volumes")));
        let bundles = inputs(root.path());
        write_file(&bundles[0].join("Contents/Frameworks/Sparkle.framework/Sparkle"), "x");

        let err = UniversalBinaryMerger::new(tools.clone())
            .merge(&root.path().join("u/Audio.app"), &bundles)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Structure { .. }), "{err:?}");
        assert_eq!(tools.count("lipo -create"), 0);
    }

    #[tokio::test]
    async fn test_merge_failure_names_the_binary() {
        let root = tempfile::tempdir().unwrap();
        let tools = Arc::new(FakeToolchain::new(&root.path().join("volumes")).fail_matching("mod-script.so"));

        let err = UniversalBinaryMerger::new(tools)
            .merge(&root.path().join("u/Audio.app"), &inputs(root.path()))
            .await
            .unwrap_err();

        match err {
            Error::Merge { path, .. } => assert_eq!(path, PathBuf::from("Contents/modules/mod-script.so")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_merge_without_inputs_fails() {
        let root = tempfile::tempdir().unwrap();
        let tools = Arc::new(FakeToolchain::new(root.path()));

        assert!(UniversalBinaryMerger::new(tools)
            .merge(&root.path().join("u/Audio.app"), &[])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_architecture_suffix() {
        let root = tempfile::tempdir().unwrap();
        let bundle = make_bundle(root.path(), "Audio", "arm64");

        let fat = Arc::new(FakeToolchain::new(root.path()).with_archs("x86_64 arm64"));
        assert_eq!(
            UniversalBinaryMerger::new(fat).architecture_suffix(&bundle).await.unwrap(),
            "universal"
        );

        let thin = Arc::new(FakeToolchain::new(root.path()).with_archs("arm64"));
        assert_eq!(
            UniversalBinaryMerger::new(thin).architecture_suffix(&bundle).await.unwrap(),
            "arm64"
        );
    }
}
