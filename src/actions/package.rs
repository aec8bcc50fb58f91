//! `package` action: produce installers and collect them as artifacts.
//!
//! On macOS the CMake/CPack DMG generator is bypassed: every architecture is
//! installed into a staging dir, the bundles are merged into a universal
//! one, and each bundle is packaged, signed and notarized by the bundler.
//! Other hosts build CMake's `package` target.

use crate::actions::{artifacts, build_level::BuildLevel, build_level::build_suffix, env};
use crate::bundler::retry::{self, RetryPolicy};
use crate::bundler::{
    list_application_bundles, DiskImagePackager, Error as BundlerError, HostPlatform, Invocation, ProcessRunner,
    SigningBackend, UniversalBinaryMerger,
};
use crate::config::ActionConfig;
use crate::error::{ConfigError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

static BUNDLE_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[1-9][0-9]*\.[0-9]+\.[0-9]+").expect("bundle version regex is valid"));

/// Inputs of the package action.
#[derive(Debug, Clone)]
pub struct PackageOptions {
    /// Configured build tree (`BUILD_DIR`)
    pub build_dir: PathBuf,
    /// Configuration to package (`BUILD_TYPE`)
    pub build_type: String,
    /// Release channel
    pub build_level: BuildLevel,
    /// Architectures installed and merged on macOS
    pub archs: Vec<String>,
    /// Appended to every artifact name
    pub postfix: String,
    /// Product name leading the DMG file name
    pub product: String,
    /// Extra options appended verbatim to CMake
    pub cmake_options: Vec<String>,
}

impl PackageOptions {
    /// Options for `build_dir` and `build_type` with one architecture.
    pub fn new(build_dir: impl Into<PathBuf>, build_type: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            build_dir: build_dir.into(),
            build_type: build_type.into(),
            build_level: BuildLevel::Alpha,
            archs: vec![arch.into()],
            postfix: String::new(),
            product: "audacity".to_string(),
            cmake_options: Vec::new(),
        }
    }
}

/// Values read from a bundle's `Info.plist`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInfo {
    /// `x.y.z` part of `CFBundleVersion`
    pub version: String,
    /// `CFBundleIdentifier`
    pub identifier: String,
}

/// `x.y.z` in a `CFBundleVersion` such as `3.4.2.0`.
pub fn bundle_version(cf_bundle_version: &str) -> Option<&str> {
    BUNDLE_VERSION_RE.find(cf_bundle_version).map(|m| m.as_str())
}

/// Read version and identifier from `<app>/Contents/Info.plist`.
pub fn read_bundle_info(app: &Path) -> Result<BundleInfo> {
    let path = app.join("Contents").join("Info.plist");
    let value = plist::Value::from_file(&path)?;
    let dict = value.as_dictionary().ok_or_else(|| ConfigError::InfoPlist {
        path: path.clone(),
        key: "root dictionary",
    })?;

    let string = |key: &'static str| {
        dict.get(key)
            .and_then(plist::Value::as_string)
            .ok_or_else(|| ConfigError::InfoPlist { path: path.clone(), key })
    };

    let version = bundle_version(string("CFBundleVersion")?)
        .ok_or_else(|| ConfigError::InfoPlist {
            path: path.clone(),
            key: "CFBundleVersion",
        })?
        .to_string();

    Ok(BundleInfo {
        version,
        identifier: string("CFBundleIdentifier")?.to_string(),
    })
}

/// `<product>-macOS-<version><suffix>-<arch suffix>.dmg`
pub fn dmg_name(product: &str, version: &str, suffix: &str, arch_suffix: &str) -> String {
    format!("{product}-macOS-{version}{suffix}-{arch_suffix}.dmg")
}

/// Where installers are written: `<workspace>/.package` on macOS,
/// `<build>/package` elsewhere.
pub fn package_dir(config: &ActionConfig, build_dir: &Path) -> PathBuf {
    match config.platform {
        HostPlatform::MacOs => config.package_dir.clone(),
        HostPlatform::Windows | HostPlatform::Linux => build_dir.join("package"),
    }
}

/// Runs the package action.
pub struct PackageDriver<'a> {
    config: &'a ActionConfig,
    runner: Arc<dyn ProcessRunner>,
    signing: Box<dyn SigningBackend>,
    merger: UniversalBinaryMerger,
    packager: DiskImagePackager,
}

impl std::fmt::Debug for PackageDriver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageDriver")
            .field("config", &self.config)
            .field("merger", &self.merger)
            .field("packager", &self.packager)
            .finish_non_exhaustive()
    }
}

impl<'a> PackageDriver<'a> {
    /// Driver for `config`, signing through `signing`.
    pub fn new(config: &'a ActionConfig, runner: Arc<dyn ProcessRunner>, signing: Box<dyn SigningBackend>) -> Self {
        let mut packager = DiskImagePackager::new(runner.clone()).with_policy(config.dmg_retry);
        if config.dmg_background.is_file() {
            packager = packager.with_background(&config.dmg_background);
        }

        Self {
            config,
            merger: UniversalBinaryMerger::new(runner.clone()),
            packager,
            runner,
            signing,
        }
    }

    /// Replace the disk image packager.
    pub fn with_packager(mut self, packager: DiskImagePackager) -> Self {
        self.packager = packager;
        self
    }

    /// Package and write the artifact manifest. Returns the artifact groups.
    pub async fn run(&self, options: &PackageOptions) -> Result<Vec<artifacts::ArtifactGroup>> {
        let package_dir = package_dir(self.config, &options.build_dir);
        let staging = package_dir.join("_CPack_Packages");

        remove_dir_if_exists(&staging).await?;

        if self.config.platform == HostPlatform::MacOs {
            self.package_macos(options, &package_dir, &staging).await?;
        } else {
            if !options.build_level.is_alpha() && self.config.platform == HostPlatform::Windows {
                self.cmake_package(options, "innosetup").await?;
            }
            self.cmake_package(options, "package").await?;
        }

        remove_dir_if_exists(&staging).await?;

        let groups = artifacts::collect(&package_dir, &options.postfix).await?;
        let manifest = artifacts::write_manifest(&package_dir, &groups).await?;
        env::set_output(
            self.config.output_file.as_deref(),
            "artifacts-manifest",
            &manifest.to_string_lossy(),
        )
        .await?;

        Ok(groups)
    }

    async fn package_macos(&self, options: &PackageOptions, package_dir: &Path, staging: &Path) -> Result<()> {
        for arch in &options.archs {
            self.install(options, arch, staging).await?;
        }

        let mut apps = list_application_bundles(staging)?;
        let Some(reference) = apps.first() else {
            return Err(ConfigError::MissingFile {
                what: "application bundle",
                path: staging.to_path_buf(),
            }
            .into());
        };

        let suffix = self.build_suffix(options.build_level).await?;

        if apps.len() > 1 {
            let name = reference.file_name().unwrap_or(reference.as_os_str());
            let universal = staging.join("universal").join(name);
            self.merger.merge(&universal, &apps).await?;
            self.signing.sign_bundle(&universal).await?;
            apps.push(universal);
        }

        for app in &apps {
            self.package_app(options, app, &suffix, package_dir).await?;
        }
        Ok(())
    }

    async fn install(&self, options: &PackageOptions, arch: &str, staging: &Path) -> Result<PathBuf> {
        let install_dir = staging.join(arch);
        let cmake = Invocation::new("cmake")
            .arg("--install")
            .path(self.config.build_dir(arch))
            .arg("--config")
            .arg(&options.build_type)
            .arg("--prefix")
            .path(&install_dir)
            .args(options.cmake_options.iter().cloned());
        self.runner.run(&cmake).await?;

        if self.signing.can_sign() {
            for app in list_application_bundles(&install_dir)? {
                self.signing.sign_bundle(&app).await?;
            }
        }

        log::info!("✓ Installed {} to {}", arch, install_dir.display());
        Ok(install_dir)
    }

    /// `-<level>-<date>+<revision>` for pre-releases, empty for releases.
    pub async fn build_suffix(&self, level: BuildLevel) -> Result<String> {
        if level == BuildLevel::Release {
            return Ok(String::new());
        }

        let git = Invocation::new("git")
            .args(["show", "-s", "--format=%h"])
            .current_dir(&self.config.workspace_dir);
        let revision = self.runner.capture(&git).await?.stdout;
        let today = chrono::Local::now().date_naive();

        Ok(build_suffix(level, today, &revision))
    }

    async fn package_app(&self, options: &PackageOptions, app: &Path, suffix: &str, package_dir: &Path) -> Result<PathBuf> {
        let info = read_bundle_info(app)?;
        let arch_suffix = self.merger.architecture_suffix(app).await?;
        let dmg = package_dir.join(dmg_name(&options.product, &info.version, suffix, &arch_suffix));

        self.packager.package(app, &dmg).await?;

        if self.signing.can_sign() {
            self.signing.sign_disk_image(&dmg, &info.identifier).await?;

            if !options.build_level.is_alpha() {
                self.signing.notarize(&dmg).await?;
            }
        }

        Ok(dmg)
    }

    async fn cmake_package(&self, options: &PackageOptions, target: &str) -> Result<()> {
        let cmake = Invocation::new("cmake")
            .arg("--build")
            .path(&options.build_dir)
            .arg("--target")
            .arg(target)
            .arg("--config")
            .arg(&options.build_type)
            .args(options.cmake_options.iter().cloned());

        let attempts = match self.config.platform {
            HostPlatform::MacOs => 10,
            HostPlatform::Windows | HostPlatform::Linux => 2,
        };
        let policy = RetryPolicy::new(attempts, Duration::from_millis(2000));
        let runner = self.runner.as_ref();
        let cmake = &cmake;

        retry::retry(&policy, &format!("Packaging target {target}"), retry::always, move |_| async move {
            runner.run(cmake).await
        })
        .await
        .map_err(|e| {
            e.into_error(|attempts, last| {
                BundlerError::Context(format!("packaging failed after {attempts} attempts"), Box::new(last))
            })
        })?;

        log::info!("✓ Built package target {}", target);
        Ok(())
    }
}

async fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
