mod common;

#[cfg(test)]
mod tests {
    use super::common::{write_file, FakeToolchain};
    use desktop_ci_actions::actions::cache_key::{self, DEPS_MANIFEST};
    use desktop_ci_actions::actions::configure::{self, ConfigureOptions};
    use desktop_ci_actions::actions::package::{PackageDriver, PackageOptions};
    use desktop_ci_actions::actions::BuildLevel;
    use desktop_ci_actions::bundler::{HostPlatform, NoopSigningBackend};
    use desktop_ci_actions::{ActionConfig, ActionError, ConfigError};
    use std::path::Path;
    use std::sync::Arc;

    fn workspace(root: &Path, platform: HostPlatform) -> ActionConfig {
        write_file(&root.join(DEPS_MANIFEST), "conan_add_remote()\n");
        let mut config = ActionConfig::for_workspace(root);
        config.platform = platform;
        config.env_file = Some(root.join("github_env"));
        config.output_file = Some(root.join("github_output"));
        config
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_cache_key_from_tools_and_manifest() {
        let root = tempfile::tempdir().unwrap();
        let config = workspace(root.path(), HostPlatform::Linux);
        let tools = FakeToolchain::new(root.path());

        let key = cache_key::compute(&config, &tools, "Ninja").await.unwrap();

        let md5 = cache_key::md5_hex(b"conan_add_remote()\n");
        assert_eq!(key.key, format!("conan-2.0.13-linux-gcc-15.0.0-{md5}"));
        assert_eq!(key.restore_key(), "conan-2.0.13-linux-gcc-15.0.0");
    }

    #[tokio::test]
    async fn test_cache_key_needs_the_manifest() {
        let root = tempfile::tempdir().unwrap();
        let mut config = ActionConfig::for_workspace(root.path());
        config.platform = HostPlatform::MacOs;
        let tools = FakeToolchain::new(root.path());

        let err = cache_key::compute(&config, &tools, "Xcode").await.unwrap_err();
        assert!(matches!(err, ActionError::Config(ConfigError::MissingFile { .. })), "{err:?}");
        assert!(tools.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cache_key_reports_tool_failures() {
        let root = tempfile::tempdir().unwrap();
        let config = workspace(root.path(), HostPlatform::Linux);
        let tools = FakeToolchain::new(root.path()).fail_matching("conan --version");

        let err = cache_key::compute(&config, &tools, "Ninja").await.unwrap_err();
        match err {
            ActionError::Config(ConfigError::ToolVersion { tool, .. }) => assert_eq!(tool, "conan"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_configure_exports_and_runs_cmake() {
        let root = tempfile::tempdir().unwrap();
        let config = workspace(root.path(), HostPlatform::Linux);
        let tools = FakeToolchain::new(root.path());

        let mut options = ConfigureOptions::new("Ninja", "x64");
        options.build_level = BuildLevel::Beta;
        let key = configure::run(&config, &tools, &options).await.unwrap();

        let env = read(&root.path().join("github_env"));
        assert!(env.contains(&format!("BUILD_DIR={}\n", config.build_dir("x64").display())));
        assert!(env.contains("BUILD_TYPE=Release\n"));
        assert!(env.contains("BUILD_LEVEL=1\n"));
        assert!(env.contains("BUILD_ARCH=x64\n"));
        assert!(env.contains(&format!("CONAN_HOME={}\n", config.conan_home.display())));

        let outputs = read(&root.path().join("github_output"));
        assert!(outputs.contains(&format!("cache-key={}\n", key.key)));
        assert!(outputs.contains(&format!("cache-restore-key={}\n", key.restore_key())));

        let lines = tools.command_lines();
        let cmake = lines.iter().position(|l| l.starts_with("cmake -S")).unwrap();
        let clean = lines.iter().position(|l| l == "conan cache clean *").unwrap();
        assert!(cmake < clean);
    }

    #[tokio::test]
    async fn test_configure_exports_windows_certificate_as_secret() {
        let root = tempfile::tempdir().unwrap();
        let config = workspace(root.path(), HostPlatform::Windows);
        let tools = FakeToolchain::new(root.path());

        let mut options = ConfigureOptions::new("Visual Studio 17 2022", "x64");
        options.windows_certificate = Some("base64cert".to_string());
        options.windows_certificate_password = Some("pfx-pass".to_string());
        configure::run(&config, &tools, &options).await.unwrap();

        let env = read(&root.path().join("github_env"));
        assert!(env.contains("WINDOWS_CERTIFICATE=base64cert\n"));
        assert!(env.contains("WINDOWS_CERTIFICATE_PASSWORD=pfx-pass\n"));
        assert!(tools.command_lines().iter().any(|l| l.contains("-Daudacity_perform_codesign=yes")));
    }

    #[tokio::test]
    async fn test_configure_rejects_unsupported_arch_before_cmake() {
        let root = tempfile::tempdir().unwrap();
        let config = workspace(root.path(), HostPlatform::MacOs);
        let tools = FakeToolchain::new(root.path());

        let err = configure::run(&config, &tools, &ConfigureOptions::new("Xcode", "x32"))
            .await
            .unwrap_err();

        assert!(matches!(err, ActionError::Config(ConfigError::InvalidArchitecture { .. })));
        assert!(!tools.command_lines().iter().any(|l| l.starts_with("cmake")));
    }

    #[tokio::test]
    async fn test_package_on_linux_builds_package_target() {
        let root = tempfile::tempdir().unwrap();
        let config = workspace(root.path(), HostPlatform::Linux);
        let tools = Arc::new(FakeToolchain::new(root.path()));
        let build_dir = config.build_dir("x64");
        write_file(&build_dir.join("package/audacity-linux-3.4.2.AppImage"), "image");

        let mut options = PackageOptions::new(&build_dir, "Release", "x64");
        options.build_level = BuildLevel::Beta;
        options.postfix = "-beta".to_string();
        let groups = PackageDriver::new(&config, tools.clone(), Box::new(NoopSigningBackend))
            .run(&options)
            .await
            .unwrap();

        assert_eq!(tools.count("cmake --build"), 1);
        assert!(tools.command_lines()[0].contains("--target package"));

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "audacity-linux-3.4.2-beta");
        assert_eq!(groups[0].files.len(), 1);
        assert_eq!(groups[0].files[0].sha256.len(), 64);

        let manifest = build_dir.join("package/artifacts.json");
        let json: serde_json::Value = serde_json::from_str(&read(&manifest)).unwrap();
        assert_eq!(json[0]["name"], "audacity-linux-3.4.2-beta");
        assert!(read(&root.path().join("github_output")).contains("artifacts-manifest="));
    }

    #[tokio::test]
    async fn test_package_on_windows_adds_installer_for_releases() {
        let root = tempfile::tempdir().unwrap();
        let config = workspace(root.path(), HostPlatform::Windows);
        let tools = Arc::new(FakeToolchain::new(root.path()));
        let build_dir = config.build_dir("x64");
        write_file(&build_dir.join("package/audacity-win-3.4.2-64bit.exe"), "exe");

        let mut options = PackageOptions::new(&build_dir, "Release", "x64");
        options.build_level = BuildLevel::Release;
        PackageDriver::new(&config, tools.clone(), Box::new(NoopSigningBackend))
            .run(&options)
            .await
            .unwrap();

        let lines = tools.command_lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("--target innosetup"));
        assert!(lines[1].contains("--target package"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_package_target_is_retried() {
        let root = tempfile::tempdir().unwrap();
        let config = workspace(root.path(), HostPlatform::Linux);
        let tools = Arc::new(FakeToolchain::new(root.path()).fail_times("cmake --build", 1));
        let build_dir = config.build_dir("x64");
        write_file(&build_dir.join("package/audacity.AppImage"), "image");

        PackageDriver::new(&config, tools.clone(), Box::new(NoopSigningBackend))
            .run(&PackageOptions::new(&build_dir, "Release", "x64"))
            .await
            .unwrap();

        assert_eq!(tools.count("cmake --build"), 2);
    }

    #[tokio::test]
    async fn test_package_on_macos_merges_and_wraps_every_bundle() {
        let root = tempfile::tempdir().unwrap();
        let config = workspace(root.path(), HostPlatform::MacOs);
        let tools = Arc::new(FakeToolchain::new(&root.path().join("volumes")).installing("Audacity"));

        let mut options = PackageOptions::new(config.build_dir("x64"), "Release", "x64");
        options.archs = vec!["x64".to_string(), "arm64".to_string()];
        options.build_level = BuildLevel::Release;

        let groups = PackageDriver::new(&config, tools.clone(), Box::new(NoopSigningBackend))
            .run(&options)
            .await
            .unwrap();

        assert_eq!(tools.count("cmake --install"), 2);
        assert_eq!(tools.count("lipo -create"), 3);
        assert_eq!(tools.count("hdiutil convert"), 3);
        assert_eq!(tools.count("git show"), 0, "release builds carry no suffix");

        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "audacity-macOS-3.4.2-arm64",
                "audacity-macOS-3.4.2-universal",
                "audacity-macOS-3.4.2-x86_64",
            ]
        );
        assert!(config.package_dir.join("audacity-macOS-3.4.2-universal.dmg").is_file());
        assert!(!config.staging_dir().exists());
    }

    #[tokio::test]
    async fn test_package_on_macos_without_bundles_fails() {
        let root = tempfile::tempdir().unwrap();
        let config = workspace(root.path(), HostPlatform::MacOs);
        let tools = Arc::new(FakeToolchain::new(&root.path().join("volumes")));

        let err = PackageDriver::new(&config, tools, Box::new(NoopSigningBackend))
            .run(&PackageOptions::new(config.build_dir("arm64"), "Release", "arm64"))
            .await
            .unwrap_err();

        assert!(matches!(err, ActionError::Config(ConfigError::MissingFile { .. })), "{err:?}");
    }

    #[tokio::test]
    async fn test_alpha_dmg_names_carry_the_revision() {
        let root = tempfile::tempdir().unwrap();
        let config = workspace(root.path(), HostPlatform::MacOs);
        let tools = Arc::new(FakeToolchain::new(&root.path().join("volumes")).installing("Audacity"));

        let groups = PackageDriver::new(&config, tools.clone(), Box::new(NoopSigningBackend))
            .run(&PackageOptions::new(config.build_dir("arm64"), "Release", "arm64"))
            .await
            .unwrap();

        assert_eq!(tools.count("lipo -create"), 0, "a single bundle is not merged");
        assert_eq!(groups.len(), 1);
        assert!(groups[0].name.starts_with("audacity-macOS-3.4.2-alpha-"));
        assert!(groups[0].name.ends_with("+abc1234-arm64"));
    }
}
