//! macOS code signing and notarization.
//!
//! Drives `codesign`, `install_name_tool`, `otool`, `notarytool` and
//! `stapler` through a [`ProcessRunner`]. An empty signing identity turns
//! every signing operation into a logged no-op; incomplete notarization
//! credentials do the same for [`CodeSigningService::notarize`].

use crate::bundler::{
    error::{Error, Result},
    platform::macos::inspect,
    process::{Invocation, ProcessRunner},
};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Replacement for `@rpath` in rewritten load commands.
const FRAMEWORKS_LOAD_PATH: &str = "@executable_path/../Frameworks";

/// Notarization status meaning the submission passed.
pub const ACCEPTED: &str = "Accepted";

/// Apple ID credentials for `notarytool`.
///
/// Any missing field disables notarization.
#[derive(Clone, Default)]
pub struct NotarizationCredentials {
    /// Apple ID (e-mail)
    pub apple_id: Option<String>,
    /// Developer team id
    pub team_id: Option<String>,
    /// App-specific password
    pub password: Option<String>,
}

impl std::fmt::Debug for NotarizationCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotarizationCredentials")
            .field("apple_id", &self.apple_id)
            .field("team_id", &self.team_id)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl NotarizationCredentials {
    /// Credentials from explicit values; empty strings count as missing.
    pub fn new(apple_id: Option<String>, team_id: Option<String>, password: Option<String>) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Self {
            apple_id: non_empty(apple_id),
            team_id: non_empty(team_id),
            password: non_empty(password),
        }
    }

    /// `(apple_id, team_id, password)` when all three are present.
    pub fn complete(&self) -> Option<(&str, &str, &str)> {
        match (&self.apple_id, &self.team_id, &self.password) {
            (Some(user), Some(team), Some(password)) => Some((user, team, password)),
            _ => None,
        }
    }
}

/// Signing identity plus notarization credentials.
#[derive(Debug, Clone, Default)]
pub struct SigningIdentity {
    /// `codesign --sign` identity; empty or `None` disables signing
    pub identity: Option<String>,
    /// Notarization credentials
    pub credentials: NotarizationCredentials,
}

impl SigningIdentity {
    /// Identity string, or `None` when signing is disabled.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// Parsed `notarytool submit --output-format json` result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NotarizationResult {
    /// Submission id
    pub id: String,
    /// Final status, e.g. `Accepted` or `Invalid`
    pub status: String,
    /// Service message, if any
    #[serde(default)]
    pub message: Option<String>,
}

impl NotarizationResult {
    /// Whether the service accepted the submission.
    pub fn is_accepted(&self) -> bool {
        self.status == ACCEPTED
    }
}

/// Signs binaries, bundles and disk images, and notarizes disk images.
#[derive(Clone)]
pub struct CodeSigningService {
    runner: Arc<dyn ProcessRunner>,
    entitlements: PathBuf,
}

impl std::fmt::Debug for CodeSigningService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeSigningService")
            .field("entitlements", &self.entitlements)
            .finish()
    }
}

impl CodeSigningService {
    /// Service signing with the given entitlements plist.
    pub fn new(runner: Arc<dyn ProcessRunner>, entitlements: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            entitlements: entitlements.into(),
        }
    }

    /// Rewrite `@rpath` load commands to point into `Contents/Frameworks` and
    /// drop stale `@executable_path` / `@loader_path` run paths.
    ///
    /// Returns `false` without touching the binary when it has no `@rpath`
    /// references.
    pub async fn fix_load_paths(&self, binary: &Path) -> Result<bool> {
        let dependencies = self
            .runner
            .capture(&Invocation::new("otool").arg("-L").path(binary))
            .await?;
        let libraries = parse_rpath_dependencies(&dependencies.stdout)?;
        if libraries.is_empty() {
            return Ok(false);
        }

        let load_commands = self
            .runner
            .capture(&Invocation::new("otool").arg("-l").path(binary))
            .await?;
        let stale = parse_stale_rpaths(&load_commands.stdout)?;

        let mut invocation = Invocation::new("install_name_tool");
        for rpath in &stale {
            invocation = invocation.arg("-delete_rpath").arg(rpath);
        }
        for library in &libraries {
            invocation = invocation
                .arg("-change")
                .arg(library)
                .arg(library.replacen("@rpath", FRAMEWORKS_LOAD_PATH, 1));
        }
        self.runner.run(&invocation.path(binary)).await?;

        log::debug!(
            "Fixed load paths of {} ({} libraries, {} run paths removed)",
            binary.display(),
            libraries.len(),
            stale.len()
        );
        Ok(true)
    }

    /// Sign one binary (or a whole bundle with `--deep` in `extra_args`)
    /// with the hardened runtime.
    pub async fn sign_binary(&self, path: &Path, identity: &str, extra_args: &[&str]) -> Result<()> {
        if identity.trim().is_empty() {
            log::info!("No signing identity configured, skipping signing of {}", path.display());
            return Ok(());
        }

        let invocation = Invocation::new("xcrun")
            .args(["codesign", "--verbose=3", "--timestamp", "--sign"])
            .arg(identity)
            .args(["--options", "runtime", "--entitlements"])
            .path(&self.entitlements)
            .arg("--force")
            .args(extra_args.iter().copied())
            .path(path);

        self.runner.run(&invocation).await
    }

    /// Fix, sign and verify an application bundle.
    ///
    /// Load paths of every executable, module and framework library are
    /// rewritten first; modules are signed individually, then the bundle is
    /// signed deep and verified strictly.
    pub async fn sign_bundle(&self, bundle: &Path, identity: &str) -> Result<()> {
        if identity.trim().is_empty() {
            log::info!("No signing identity configured, skipping signing of {}", bundle.display());
            return Ok(());
        }

        log::info!("Signing {} with identity '{}'", bundle.display(), identity);

        let classification = inspect::classify(bundle)?;
        for binary in classification
            .executables
            .iter()
            .chain(&classification.modules)
            .chain(&classification.framework_libraries)
        {
            self.fix_load_paths(binary).await?;
        }

        for module in &classification.modules {
            self.sign_binary(module, identity, &[]).await?;
        }

        self.sign_binary(bundle, identity, &["--deep"]).await?;
        self.verify(bundle).await?;

        log::info!("✓ Successfully signed {}", bundle.display());
        Ok(())
    }

    /// Strict deep verification of a signed bundle.
    pub async fn verify(&self, bundle: &Path) -> Result<()> {
        let invocation = Invocation::new("codesign")
            .args(["--verify", "--deep", "--verbose=4", "--strict"])
            .path(bundle);

        self.runner
            .run(&invocation)
            .await
            .map_err(|e| Error::Verification {
                bundle: bundle.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Sign a disk image under the application's bundle identifier.
    pub async fn sign_disk_image(&self, image: &Path, bundle_identifier: &str, identity: &str) -> Result<()> {
        if identity.trim().is_empty() {
            log::info!("No signing identity configured, skipping DMG signing");
            return Ok(());
        }

        log::info!("Signing DMG {} with identity '{}'", image.display(), identity);

        let invocation = Invocation::new("xcrun")
            .args(["codesign", "--verbose", "--timestamp", "--identifier"])
            .arg(bundle_identifier)
            .arg("--sign")
            .arg(identity)
            .path(image);
        self.runner.run(&invocation).await?;

        log::info!("✓ Successfully signed DMG {}", image.display());
        Ok(())
    }

    /// Submit a disk image for notarization, wait for the verdict and staple it.
    ///
    /// Returns `None` when credentials are incomplete. The service log is
    /// always fetched and logged once a submission id is known.
    ///
    /// # Errors
    /// [`Error::Notarization`] when the final status is not `Accepted`.
    pub async fn notarize(
        &self,
        image: &Path,
        credentials: &NotarizationCredentials,
    ) -> Result<Option<NotarizationResult>> {
        let Some((apple_id, team_id, password)) = credentials.complete() else {
            log::info!("Notarization credentials not configured, skipping notarization");
            return Ok(None);
        };

        log::info!("Notarizing {}", image.display());

        let submit = Invocation::new("xcrun")
            .args(["notarytool", "submit", "--apple-id"])
            .arg(apple_id)
            .arg("--team-id")
            .arg(team_id)
            .arg("--password")
            .secret(password)
            .args(["--output-format", "json", "--wait"])
            .path(image);
        let output = self.runner.capture(&submit).await?;
        let result = parse_notarization_result(&output.stdout)?;

        log::info!("Notarization submission {} finished: {}", result.id, result.status);

        let log_request = Invocation::new("xcrun")
            .args(["notarytool", "log", "--apple-id"])
            .arg(apple_id)
            .arg("--team-id")
            .arg(team_id)
            .arg("--password")
            .secret(password)
            .arg(&result.id);
        let log_output = self.runner.capture(&log_request).await?;
        log::info!("Notarization log:\n{}", log_output.stdout.trim_end());

        if !result.is_accepted() {
            return Err(Error::Notarization {
                id: result.id,
                status: result.status,
            });
        }

        self.staple(image).await?;
        log::info!("✓ Successfully notarized {}", image.display());
        Ok(Some(result))
    }

    /// Attach the notarization ticket to the image.
    pub async fn staple(&self, image: &Path) -> Result<()> {
        self.runner
            .run(&Invocation::new("xcrun").args(["stapler", "staple"]).path(image))
            .await
    }
}

/// Library install names referenced through `@rpath` in `otool -L` output.
///
/// A line mentioning `@rpath` without a `.dylib` install name is reported
/// as [`Error::Parse`].
pub fn parse_rpath_dependencies(otool_list: &str) -> Result<Vec<String>> {
    let pattern = Regex::new(r"@rpath/.+\.dylib")?;
    let mut libraries = Vec::new();

    for line in otool_list.lines().filter(|l| l.contains("@rpath")) {
        let found = pattern.find(line).ok_or_else(|| Error::Parse {
            what: "otool -L output",
            detail: format!("unexpected @rpath reference: {}", line.trim()),
        })?;
        let library = found.as_str().to_string();
        if !libraries.contains(&library) {
            libraries.push(library);
        }
    }

    Ok(libraries)
}

/// `@executable_path` / `@loader_path` run paths from `otool -l` output.
pub fn parse_stale_rpaths(otool_load_commands: &str) -> Result<Vec<String>> {
    let pattern = Regex::new(r"^path\s+(@(?:executable|loader)_path.*)\s+\(")?;

    Ok(otool_load_commands
        .lines()
        .filter_map(|line| pattern.captures(line.trim()))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim_end().to_string()))
        .collect())
}

/// Parse notarytool JSON output.
pub fn parse_notarization_result(stdout: &str) -> Result<NotarizationResult> {
    let start = stdout.find('{').ok_or_else(|| Error::Parse {
        what: "notarytool output",
        detail: format!("no JSON object in {:?}", stdout.trim()),
    })?;
    Ok(serde_json::from_str(stdout[start..].trim())?)
}
