//! Conan cache key.
//!
//! The key pins the Conan version, the host, the compiler and the content of
//! the dependency manifest, so a cache is only reused by compatible builds.
//! The restore key drops the manifest hash to allow partial reuse.

use crate::bundler::{HostPlatform, Invocation, ProcessRunner};
use crate::config::ActionConfig;
use crate::error::{ConfigError, Result};
use anyhow::Context as _;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Dependency manifest hashed into the key, relative to the workspace.
pub const DEPS_MANIFEST: &str = "cmake-proxies/CMakeLists.txt";

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\d+\.\d+").expect("version regex is valid"));

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("digits regex is valid"));

/// Cache key and its fallback prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheKey {
    /// Exact key
    pub key: String,
    /// Prefixes tried in order when the exact key misses
    pub restore_keys: Vec<String>,
}

impl CacheKey {
    /// `conan-<conan>-<platform>-<compiler>-<md5>` with the hash-less prefix as restore key.
    pub fn new(conan_version: &str, platform_tag: &str, compiler: &str, deps_md5: &str) -> Self {
        let short = ["conan", conan_version, platform_tag, compiler].join("-");
        Self {
            key: format!("{short}-{deps_md5}"),
            restore_keys: vec![short],
        }
    }

    /// Key used when the exact key misses.
    pub fn restore_key(&self) -> &str {
        self.restore_keys.first().map(String::as_str).unwrap_or(&self.key)
    }
}

/// First `x.y.z` in `conan --version` output.
pub fn parse_conan_version(output: &str) -> Option<&str> {
    VERSION_RE.find(output).map(|m| m.as_str())
}

/// `msvc-<first number in the generator name>`, e.g. `msvc-17` for
/// `Visual Studio 17 2022`.
pub fn msvc_label(generator: &str) -> Option<String> {
    DIGITS_RE
        .find(generator)
        .map(|m| format!("msvc-{}", m.as_str()))
}

/// Lowercase hex MD5 of `bytes`.
pub fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

async fn tool_stdout(runner: &dyn ProcessRunner, invocation: Invocation) -> anyhow::Result<String> {
    let output = runner
        .capture(&invocation)
        .await
        .with_context(|| format!("running {}", invocation.display()))?;
    Ok(output.stdout.trim().to_string())
}

/// Installed Conan version.
pub async fn conan_version(runner: &dyn ProcessRunner) -> anyhow::Result<String> {
    let stdout = tool_stdout(runner, Invocation::new("conan").arg("--version")).await?;
    parse_conan_version(&stdout)
        .map(str::to_string)
        .with_context(|| format!("no version in `conan --version` output: {stdout}"))
}

/// Compiler label for the host: MSVC from the generator, clang or gcc probed.
pub async fn compiler_version(
    runner: &dyn ProcessRunner,
    platform: HostPlatform,
    generator: &str,
) -> anyhow::Result<String> {
    match platform {
        HostPlatform::Windows => msvc_label(generator)
            .with_context(|| format!("generator '{generator}' carries no Visual Studio version")),
        HostPlatform::MacOs => {
            let version = tool_stdout(runner, Invocation::new("clang").arg("-dumpversion")).await?;
            Ok(format!("clang-{version}"))
        }
        HostPlatform::Linux => {
            let version = tool_stdout(runner, Invocation::new("gcc").arg("-dumpfullversion")).await?;
            Ok(format!("gcc-{version}"))
        }
    }
}

/// Compute the cache key for the workspace in `config`.
pub async fn compute(config: &ActionConfig, runner: &dyn ProcessRunner, generator: &str) -> Result<CacheKey> {
    let manifest = config.workspace_dir.join(DEPS_MANIFEST);
    let bytes = tokio::fs::read(&manifest)
        .await
        .map_err(|_| ConfigError::MissingFile {
            what: "dependency manifest",
            path: manifest.clone(),
        })?;

    let conan = conan_version(runner)
        .await
        .map_err(|e| ConfigError::ToolVersion {
            tool: "conan".to_string(),
            reason: format!("{e:#}"),
        })?;
    let compiler = compiler_version(runner, config.platform, generator)
        .await
        .map_err(|e| ConfigError::ToolVersion {
            tool: "compiler".to_string(),
            reason: format!("{e:#}"),
        })?;

    let key = CacheKey::new(&conan, config.platform.cache_tag(), &compiler, &md5_hex(&bytes));
    log::info!("Conan cache key: {}", key.key);
    Ok(key)
}
