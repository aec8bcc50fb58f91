//! macOS DMG disk image creator.
//!
//! Creates drag-to-install DMG files with the native `hdiutil` tool:
//!
//! 1. create a read/write (UDRW) image sized from the bundle
//! 2. attach it and locate the mounted volume
//! 3. populate it: background image, `/Applications` symlink, Finder layout
//! 4. detach
//! 5. convert to a compressed read-only image (UDZO, zlib level 9)
//!
//! The Finder layout in step 3 is best-effort: it needs a logged-in Finder
//! session, which headless runners lack. A failed layout is logged as an
//! error and the image is still produced, without a `.DS_Store`.
//!
//! Steps 1, 2, 4 and 5 are retried with [`RetryPolicy`]. The temporary image
//! and the mounted volume are registered on a [`ResourceStack`] as soon as
//! they exist and are always released, newest first.

use crate::bundler::{
    error::{Error, Result},
    platform::macos::inspect,
    process::{Invocation, ProcessRunner},
    retry::{self, RetryError, RetryPolicy},
    session::ResourceStack,
    utils::fs,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Headroom applied to the measured bundle size.
const SIZE_FACTOR: f64 = 1.5;

/// Finder window appearance of the mounted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinderLayout {
    /// Icon size in points
    pub icon_size: u32,
    /// Window top-left corner
    pub window_position: (u32, u32),
    /// Window width and height
    pub window_size: (u32, u32),
    /// Position of the application icon
    pub app_position: (u32, u32),
    /// Position of the `Applications` link
    pub applications_position: (u32, u32),
}

impl Default for FinderLayout {
    fn default() -> Self {
        Self {
            icon_size: 72,
            window_position: (400, 100),
            window_size: (600, 450),
            app_position: (170, 350),
            applications_position: (430, 350),
        }
    }
}

impl FinderLayout {
    /// AppleScript that makes Finder write the volume's `.DS_Store`.
    pub fn script(&self, volume_name: &str, app_name: &str, background: Option<&str>) -> String {
        let (left, top) = self.window_position;
        let (width, height) = self.window_size;
        let background_clause = background
            .map(|file| {
                format!(
                    r#"set background picture of viewOptions to file ".background:{}""#,
                    escape_applescript_string(file)
                )
            })
            .unwrap_or_default();

        format!(
            r#"
        tell application "Finder"
            tell disk "{volume}"
                open
                set current view of container window to icon view
                set toolbar visible of container window to false
                set statusbar visible of container window to false
                set bounds of container window to {{{left}, {top}, {right}, {bottom}}}
                set viewOptions to icon view options of container window
                set arrangement of viewOptions to not arranged
                set icon size of viewOptions to {icon_size}
                {background_clause}
                set position of item "{app}" to {{{app_x}, {app_y}}}
                set position of item "Applications" to {{{apps_x}, {apps_y}}}
                close
                open
                update without registering applications
                delay 2
            end tell
        end tell
        "#,
            volume = escape_applescript_string(volume_name),
            right = left + width,
            bottom = top + height,
            icon_size = self.icon_size,
            app = escape_applescript_string(app_name),
            app_x = self.app_position.0,
            app_y = self.app_position.1,
            apps_x = self.applications_position.0,
            apps_y = self.applications_position.1,
        )
    }
}

/// Escapes backslashes and double quotes for AppleScript string literals.
fn escape_applescript_string(s: &str) -> String {
    s.replace('\\', r"\\").replace('"', r#"\""#)
}

/// Builds compressed disk images from application bundles.
#[derive(Clone)]
pub struct DiskImagePackager {
    runner: Arc<dyn ProcessRunner>,
    policy: RetryPolicy,
    background: Option<PathBuf>,
    layout: FinderLayout,
}

impl std::fmt::Debug for DiskImagePackager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskImagePackager")
            .field("policy", &self.policy)
            .field("background", &self.background)
            .field("layout", &self.layout)
            .finish()
    }
}

impl DiskImagePackager {
    /// Packager using the default retry policy and layout, no background.
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            policy: RetryPolicy::default(),
            background: None,
            layout: FinderLayout::default(),
        }
    }

    /// Retry policy for create, attach, detach and convert.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Background image copied to `.background/bg.png`.
    pub fn with_background(mut self, background: impl Into<PathBuf>) -> Self {
        self.background = Some(background.into());
        self
    }

    /// Finder window layout.
    pub fn with_layout(mut self, layout: FinderLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Package `bundle` into a compressed image at `output`.
    ///
    /// The temporary image is removed and the volume detached whether or
    /// not packaging succeeds.
    pub async fn package(&self, bundle: &Path, output: &Path) -> Result<PathBuf> {
        log::info!("Creating DMG {} from {}", output.display(), bundle.display());

        let mut session = ResourceStack::new();
        let result = self.package_in(&mut session, bundle, output).await;
        session.release_all().await;

        if result.is_ok() {
            log::info!("✓ Created DMG: {}", output.display());
        }
        result
    }

    async fn package_in(&self, session: &mut ResourceStack, bundle: &Path, output: &Path) -> Result<PathBuf> {
        let volume_name = bundle
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| Error::GenericError(format!("invalid bundle path {}", bundle.display())))?;

        let size_kib = self.estimate_size_kib(bundle).await?;
        let image = self.create_image(session, bundle, &volume_name, size_kib).await?;
        let mount_point = self.attach(session, &image).await?;
        self.populate(&mount_point, bundle, &volume_name).await?;
        detach_volume(self.runner.as_ref(), &self.policy, &mount_point).await?;
        self.convert(&image, output).await?;

        Ok(output.to_path_buf())
    }

    /// `1.5 ×` the lstat size of the bundle's files plus the background, in KiB.
    pub async fn estimate_size_kib(&self, bundle: &Path) -> Result<u64> {
        let mut files = inspect::list_files(bundle)?;
        if let Some(background) = &self.background {
            files.push(background.clone());
        }
        let bytes = fs::total_size(&files).await?;
        Ok(size_with_headroom_kib(bytes))
    }

    async fn create_image(
        &self,
        session: &mut ResourceStack,
        bundle: &Path,
        volume_name: &str,
        size_kib: u64,
    ) -> Result<PathBuf> {
        let image = tempfile::Builder::new()
            .prefix("dmg-")
            .suffix(".dmg")
            .tempfile()?
            .into_temp_path()
            .keep()
            .map_err(|e| Error::GenericError(format!("failed to reserve temporary image path: {e}")))?;

        let registered = image.clone();
        session.push(format!("remove {}", image.display()), move || async move {
            fs::remove_file_if_exists(&registered).await
        });

        let source_dir = bundle.parent().unwrap_or_else(|| Path::new("."));
        let invocation = Invocation::new("hdiutil")
            .arg("create")
            .path(&image)
            .args(["-ov", "-format", "UDRW", "-fs", "HFS+", "-size"])
            .arg(format!("{size_kib}k"))
            .arg("-srcdir")
            .path(source_dir)
            .arg("-volname")
            .arg(volume_name);

        let runner = self.runner.as_ref();
        let invocation = &invocation;
        retry::retry(&self.policy, "create disk image", retry::always, move |_| async move {
            runner.run(invocation).await
        })
        .await
        .map_err(|e| {
            e.into_error(|attempts, last| Error::ImageCreation {
                path: image.clone(),
                attempts,
                last: Box::new(last),
            })
        })?;

        log::info!("✓ Created temporary image {} ({} KiB)", image.display(), size_kib);
        Ok(image)
    }

    async fn attach(&self, session: &mut ResourceStack, image: &Path) -> Result<PathBuf> {
        let invocation = Invocation::new("hdiutil")
            .arg("attach")
            .path(image)
            .args(["-nobrowse", "-noverify", "-noautoopen"]);

        let runner = self.runner.as_ref();
        let invocation = &invocation;
        let mount_point = retry::retry(&self.policy, "attach disk image", retry::always, move |_| async move {
            let output = runner.capture(invocation).await?;
            parse_mount_point(&output.stdout)
        })
        .await
        .map_err(|e| {
            e.into_error(|attempts, last| Error::Mount {
                path: image.to_path_buf(),
                attempts,
                last: Box::new(last),
            })
        })?;

        let runner = Arc::clone(&self.runner);
        let policy = self.policy;
        let registered = mount_point.clone();
        session.push(format!("detach {}", mount_point.display()), move || async move {
            detach_volume(runner.as_ref(), &policy, &registered).await
        });

        log::info!("✓ Attached at {}", mount_point.display());
        Ok(mount_point)
    }

    async fn populate(&self, mount_point: &Path, bundle: &Path, volume_name: &str) -> Result<()> {
        if let Some(background) = &self.background {
            fs::copy_file(background, &mount_point.join(".background/bg.png")).await?;
        }

        let applications = mount_point.join("Applications");
        fs::remove_file_if_exists(&applications).await?;
        fs::symlink(Path::new("/Applications"), &applications).await?;

        let app_name = bundle
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let script = self.layout.script(
            volume_name,
            &app_name,
            self.background.as_ref().map(|_| "bg.png"),
        );

        match self
            .runner
            .execute(&Invocation::new("osascript").arg("-e").arg(script))
            .await
        {
            Ok(output) if output.is_success() => {
                if mount_point.join(".DS_Store").exists() {
                    log::debug!("Finder layout written");
                } else {
                    log::warn!("Finder reported success but wrote no .DS_Store to {}", mount_point.display());
                }
            }
            Ok(output) => log::error!(
                "Finder layout not written, the image will open with default view settings: {}",
                output.stderr.trim()
            ),
            Err(e) => log::error!(
                "Finder layout not written, the image will open with default view settings: {}",
                e
            ),
        }

        Ok(())
    }

    async fn convert(&self, image: &Path, output: &Path) -> Result<()> {
        let invocation = Invocation::new("hdiutil")
            .arg("convert")
            .path(image)
            .args(["-format", "UDZO", "-imagekey", "zlib-level=9", "-o"])
            .path(output);

        let runner = self.runner.as_ref();
        let invocation = &invocation;
        let result = retry::retry(&self.policy, "convert disk image", retry::always, move |_| async move {
            fs::remove_file_if_exists(output).await?;
            runner.run(invocation).await
        })
        .await;

        let Err(e) = result else {
            return Ok(());
        };
        if fs::exists(output).await {
            log::warn!(
                "Conversion reported failure but {} exists, keeping it: {:?}",
                output.display(),
                e
            );
            return Ok(());
        }
        Err(e.into_error(|attempts, last| Error::Conversion {
            output: output.to_path_buf(),
            attempts,
            last: Box::new(last),
        }))
    }
}

/// Detach the volume at `mount_point`, forcing it after the policy is exhausted.
///
/// A mount point that no longer exists counts as detached, so this is safe
/// to call repeatedly.
pub async fn detach_volume(runner: &dyn ProcessRunner, policy: &RetryPolicy, mount_point: &Path) -> Result<()> {
    let result = retry::retry(policy, "detach volume", retry::always, move |_| async move {
        if !fs::exists(mount_point).await {
            log::info!("{} already detached", mount_point.display());
            return Ok(());
        }
        runner
            .run(&Invocation::new("hdiutil").arg("detach").path(mount_point))
            .await
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(RetryError::Fatal(e)) => Err(e),
        Err(RetryError::Exhausted { .. }) => {
            if !fs::exists(mount_point).await {
                return Ok(());
            }
            log::warn!("Forcing detach of {}", mount_point.display());
            runner
                .run(&Invocation::new("hdiutil").arg("detach").path(mount_point).arg("-force"))
                .await
                .map_err(|e| Error::Unmount {
                    mount_point: mount_point.to_path_buf(),
                    last: Box::new(e),
                })
        }
    }
}

/// Mount point from `hdiutil attach` output: the text after `Apple_HFS` on
/// the volume line.
pub fn parse_mount_point(attach_output: &str) -> Result<PathBuf> {
    attach_output
        .lines()
        .filter_map(|line| line.split_once("Apple_HFS").map(|(_, rest)| rest.trim()))
        .find(|rest| !rest.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| Error::Parse {
            what: "hdiutil attach output",
            detail: format!("no Apple_HFS volume in {:?}", attach_output.trim()),
        })
}

/// `bytes × 1.5`, rounded up to whole KiB.
pub fn size_with_headroom_kib(bytes: u64) -> u64 {
    ((bytes as f64 * SIZE_FACTOR) / 1024.0).ceil() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mount_point() {
        let output = "\
/dev/disk4          \tGUID_partition_scheme          \t
/dev/disk4s1        \tApple_HFS                      \t/Volumes/Audio Editor
";
        assert_eq!(
            parse_mount_point(output).unwrap(),
            PathBuf::from("/Volumes/Audio Editor")
        );
    }

    #[test]
    fn test_parse_mount_point_missing_volume() {
        let err = parse_mount_point("/dev/disk4\tGUID_partition_scheme\n").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_size_with_headroom() {
        assert_eq!(size_with_headroom_kib(1024), 2);
        assert_eq!(size_with_headroom_kib(2048), 3);
        assert_eq!(size_with_headroom_kib(0), 0);
    }

    #[test]
    fn test_layout_script_positions() {
        let script = FinderLayout::default().script("Audio", "Audio.app", Some("bg.png"));
        assert!(script.contains(r#"tell disk "Audio""#));
        assert!(script.contains("set bounds of container window to {400, 100, 1000, 550}"));
        assert!(script.contains("set icon size of viewOptions to 72"));
        assert!(script.contains(r#"set position of item "Audio.app" to {170, 350}"#));
        assert!(script.contains(r#"set position of item "Applications" to {430, 350}"#));
        assert!(script.contains(r#"file ".background:bg.png""#));
    }

    #[test]
    fn test_layout_script_escapes_names() {
        let script = FinderLayout::default().script("My \"Vol\"", "A\\B.app", None);
        assert!(script.contains(r#"tell disk "My \"Vol\"""#));
        assert!(script.contains(r#"item "A\\B.app""#));
        assert!(!script.contains("background picture"));
    }
}
