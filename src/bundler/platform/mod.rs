//! Platform-specific packaging and the signing capability.
//!
//! Signing only exists on macOS hosts. Callers hold a
//! `Box<dyn SigningBackend>` chosen once by [`select_signing_backend`] and
//! never branch on the host themselves.

pub mod macos;

use crate::bundler::{
    error::{Context, Result},
    platform::macos::sign::{CodeSigningService, NotarizationResult, SigningIdentity},
    process::ProcessRunner,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Host operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostPlatform {
    /// Microsoft Windows
    Windows,
    /// Apple macOS
    MacOs,
    /// Linux and other Unix-likes
    Linux,
}

impl HostPlatform {
    /// Platform this binary is running on.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            HostPlatform::Windows
        } else if cfg!(target_os = "macos") {
            HostPlatform::MacOs
        } else {
            HostPlatform::Linux
        }
    }

    /// Short name used in cache keys and artifact names.
    pub fn name(&self) -> &'static str {
        match self {
            HostPlatform::Windows => "windows",
            HostPlatform::MacOs => "macos",
            HostPlatform::Linux => "linux",
        }
    }

    /// Tag used in Conan cache keys (`win32`, `darwin`, `linux`).
    pub fn cache_tag(&self) -> &'static str {
        match self {
            HostPlatform::Windows => "win32",
            HostPlatform::MacOs => "darwin",
            HostPlatform::Linux => "linux",
        }
    }
}

impl std::fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Code signing and notarization as seen by the packaging driver.
#[async_trait]
pub trait SigningBackend: Send + Sync {
    /// Sign an application bundle.
    async fn sign_bundle(&self, bundle: &Path) -> Result<()>;

    /// Sign a disk image under the application's bundle identifier.
    async fn sign_disk_image(&self, image: &Path, bundle_identifier: &str) -> Result<()>;

    /// Notarize and staple a disk image. `None` when notarization is not configured.
    async fn notarize(&self, image: &Path) -> Result<Option<NotarizationResult>>;

    /// Whether a signing identity is configured.
    fn can_sign(&self) -> bool;
}

/// Signs with Apple's tools.
#[derive(Debug, Clone)]
pub struct AppleSigningBackend {
    service: CodeSigningService,
    identity: SigningIdentity,
}

impl AppleSigningBackend {
    /// Backend signing with `identity` and the entitlements at `entitlements`.
    pub fn new(runner: Arc<dyn ProcessRunner>, entitlements: impl Into<PathBuf>, identity: SigningIdentity) -> Self {
        Self {
            service: CodeSigningService::new(runner, entitlements),
            identity,
        }
    }

    /// Underlying signing service.
    pub fn service(&self) -> &CodeSigningService {
        &self.service
    }
}

#[async_trait]
impl SigningBackend for AppleSigningBackend {
    async fn sign_bundle(&self, bundle: &Path) -> Result<()> {
        let identity = self.identity.identity().unwrap_or_default();
        self.service
            .sign_bundle(bundle, identity)
            .await
            .with_context(|| format!("signing {}", bundle.display()))
    }

    async fn sign_disk_image(&self, image: &Path, bundle_identifier: &str) -> Result<()> {
        let identity = self.identity.identity().unwrap_or_default();
        self.service
            .sign_disk_image(image, bundle_identifier, identity)
            .await
    }

    async fn notarize(&self, image: &Path) -> Result<Option<NotarizationResult>> {
        self.service.notarize(image, &self.identity.credentials).await
    }

    fn can_sign(&self) -> bool {
        self.identity.identity().is_some()
    }
}

/// Backend for hosts without Apple's signing tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSigningBackend;

#[async_trait]
impl SigningBackend for NoopSigningBackend {
    async fn sign_bundle(&self, bundle: &Path) -> Result<()> {
        log::info!("Code signing is not available on this host, skipping {}", bundle.display());
        Ok(())
    }

    async fn sign_disk_image(&self, image: &Path, _bundle_identifier: &str) -> Result<()> {
        log::info!("Code signing is not available on this host, skipping {}", image.display());
        Ok(())
    }

    async fn notarize(&self, image: &Path) -> Result<Option<NotarizationResult>> {
        log::info!("Notarization is not available on this host, skipping {}", image.display());
        Ok(None)
    }

    fn can_sign(&self) -> bool {
        false
    }
}

/// Apple backend on macOS hosts, no-op elsewhere.
pub fn select_signing_backend(
    platform: HostPlatform,
    runner: Arc<dyn ProcessRunner>,
    entitlements: &Path,
    identity: SigningIdentity,
) -> Box<dyn SigningBackend> {
    match platform {
        HostPlatform::MacOs => Box::new(AppleSigningBackend::new(runner, entitlements, identity)),
        HostPlatform::Windows | HostPlatform::Linux => Box::new(NoopSigningBackend),
    }
}
