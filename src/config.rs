//! Provisioning configuration
//!
//! Configuration is layered: built-in defaults, then an optional JSON file,
//! then environment overrides, then command-line flags (applied by `main`).
//! Every field has a default, so an empty `{}` file is a valid config.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{ProvisionError, Result};
use crate::types::{ArchiveFormat, ResolveStrategy};

/// Pinned engine release asset
pub const DEFAULT_ENGINE_URL: &str = "https://github.com/official-stockfish/Stockfish/releases/download/sf_17/stockfish-ubuntu-x86-64-avx2.tar";

/// Executable name inside the release archive
pub const DEFAULT_EXECUTABLE_NAME: &str = "stockfish-ubuntu-x86-64-avx2";

/// Environment override for `engine.url`
pub const ENV_URL: &str = "ENGINE_PROVISION_URL";
/// Environment override for the working directory
pub const ENV_WORKDIR: &str = "ENGINE_PROVISION_WORKDIR";
/// Set to `1`/`true` to disable the dependency step
pub const ENV_SKIP_DEPS: &str = "ENGINE_PROVISION_SKIP_DEPS";

/// Where the engine archive comes from and how to find the binary in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSource {
    pub url: String,
    pub executable_name: String,
    pub archive_format: ArchiveFormat,
    /// Optional hex sha256 pin for the downloaded archive
    pub sha256: Option<String>,
    pub resolve: ResolveStrategy,
}

impl Default for EngineSource {
    fn default() -> Self {
        Self {
            url: DEFAULT_ENGINE_URL.to_string(),
            executable_name: DEFAULT_EXECUTABLE_NAME.to_string(),
            archive_format: ArchiveFormat::Tar,
            sha256: None,
            resolve: ResolveStrategy::ByName,
        }
    }
}

/// Canonical location the host application loads the engine from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetLayout {
    pub dir: PathBuf,
    pub file_name: String,
}

impl Default for TargetLayout {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("stockfish"),
            file_name: "stockfish".to_string(),
        }
    }
}

impl TargetLayout {
    /// Target path relative to the working directory
    pub fn relative_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

/// Retry, backoff and timeout policy for the download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchPolicy {
    pub attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            timeout_secs: 120,
            connect_timeout_secs: 15,
        }
    }
}

impl FetchPolicy {
    /// Delay before retry number `retry` (1-based): doubles from the initial
    /// backoff and is capped at `max_backoff_ms`.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(32);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Host application dependency installation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyConfig {
    pub enabled: bool,
    pub manifest: PathBuf,
    pub program: String,
    /// Arguments placed before the manifest path
    pub args: Vec<String>,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            manifest: PathBuf::from("requirements.txt"),
            program: "python3".to_string(),
            args: vec![
                "-m".to_string(),
                "pip".to_string(),
                "install".to_string(),
                "-r".to_string(),
            ],
        }
    }
}

/// Post-install protocol smoke test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 5_000,
        }
    }
}

impl HandshakeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Complete provisioning configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    pub engine: EngineSource,
    pub target: TargetLayout,
    pub fetch: FetchPolicy,
    pub dependencies: DependencyConfig,
    pub handshake: HandshakeConfig,
    /// Skip the artifact steps when the stamp matches the installed engine
    pub reuse_existing: bool,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            engine: EngineSource::default(),
            target: TargetLayout::default(),
            fetch: FetchPolicy::default(),
            dependencies: DependencyConfig::default(),
            handshake: HandshakeConfig::default(),
            reuse_existing: true,
        }
    }
}

impl ProvisionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).map_err(|e| {
            ProvisionError::config(format!(
                "Failed to write configuration to {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        Ok(())
    }

    /// Load configuration from a JSON file; missing fields take defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).map_err(|e| {
            ProvisionError::config(format!(
                "Failed to read configuration from {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            ProvisionError::config(format!("Failed to parse configuration JSON: {}", e))
        })?;

        debug!(path = %path.as_ref().display(), "configuration loaded");
        Ok(config)
    }

    /// Apply environment overrides through a lookup function
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_URL).filter(|v| !v.trim().is_empty()) {
            debug!(%url, "engine url overridden from environment");
            self.engine.url = url;
        }
        if lookup(ENV_SKIP_DEPS)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
        {
            debug!("dependency installation disabled from environment");
            self.dependencies.enabled = false;
        }
    }

    /// Apply environment overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let url = self.engine.url.trim();
        if url.is_empty() {
            return Err(ProvisionError::config("engine.url must be specified"));
        }
        if !(url.starts_with("http://") || url.starts_with("https://") || url.starts_with("file://"))
        {
            return Err(ProvisionError::config(format!(
                "engine.url must use http://, https:// or file:// (got {})",
                url
            )));
        }

        validate_file_name("engine.executable_name", &self.engine.executable_name)?;
        validate_file_name("target.file_name", &self.target.file_name)?;

        if self.target.dir.as_os_str().is_empty() {
            return Err(ProvisionError::config("target.dir must be specified"));
        }
        if self.target.dir.is_absolute()
            || self
                .target
                .dir
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(ProvisionError::config(format!(
                "target.dir must be a relative path inside the working directory (got {})",
                self.target.dir.display()
            )));
        }

        if let Some(ref digest) = self.engine.sha256 {
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ProvisionError::config(
                    "engine.sha256 must be 64 hexadecimal characters",
                ));
            }
        }

        if self.fetch.attempts == 0 {
            return Err(ProvisionError::config("fetch.attempts must be at least 1"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ProvisionError::config("fetch.timeout_secs must be at least 1"));
        }
        if self.fetch.max_backoff_ms < self.fetch.initial_backoff_ms {
            return Err(ProvisionError::config(
                "fetch.max_backoff_ms must not be smaller than fetch.initial_backoff_ms",
            ));
        }

        if self.dependencies.enabled {
            if self.dependencies.program.trim().is_empty() {
                return Err(ProvisionError::config(
                    "dependencies.program must be specified when dependencies are enabled",
                ));
            }
            if self.dependencies.manifest.as_os_str().is_empty() {
                return Err(ProvisionError::config(
                    "dependencies.manifest must be specified when dependencies are enabled",
                ));
            }
        }

        if self.handshake.enabled && self.handshake.timeout_ms == 0 {
            return Err(ProvisionError::config("handshake.timeout_ms must be at least 1"));
        }

        Ok(())
    }
}

fn validate_file_name(field: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ProvisionError::config(format!("{} must be specified", field)));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(ProvisionError::config(format!(
            "{} must be a bare file name (got {})",
            field, name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProvisionConfig::new();
        assert!(config.validate().is_ok());
        assert!(config.reuse_existing);
        assert_eq!(
            config.target.relative_path(),
            PathBuf::from("stockfish/stockfish")
        );
    }

    #[test]
    fn test_empty_file_takes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("provision.json");
        fs::write(&path, "{}").unwrap();

        let config = ProvisionConfig::load_from_file(&path).unwrap();
        assert_eq!(config, ProvisionConfig::new());
    }

    #[test]
    fn test_partial_file_overrides_only_given_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("provision.json");
        fs::write(
            &path,
            r#"{"engine": {"resolve": "sole-executable"}, "fetch": {"attempts": 5}, "reuse_existing": false}"#,
        )
        .unwrap();

        let config = ProvisionConfig::load_from_file(&path).unwrap();
        assert_eq!(config.engine.resolve, ResolveStrategy::SoleExecutable);
        assert_eq!(config.engine.url, DEFAULT_ENGINE_URL);
        assert_eq!(config.fetch.attempts, 5);
        assert_eq!(config.fetch.timeout_secs, 120);
        assert!(!config.reuse_existing);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("provision.json");
        let mut config = ProvisionConfig::new();
        config.engine.sha256 = Some("a".repeat(64));
        config.save_to_file(&path).unwrap();

        assert_eq!(ProvisionConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_unknown_resolve_strategy_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("provision.json");
        fs::write(&path, r#"{"engine": {"resolve": "first-match"}}"#).unwrap();

        let err = ProvisionConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, ProvisionError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = ProvisionConfig::load_from_file("/nonexistent/provision.json").unwrap_err();
        assert!(matches!(err, ProvisionError::Config(_)));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ProvisionConfig::new();
        config.engine.url = "ftp://example.com/sf.tar".to_string();
        assert!(config.validate().is_err());

        let mut config = ProvisionConfig::new();
        config.target.dir = PathBuf::from("../outside");
        assert!(config.validate().is_err());

        let mut config = ProvisionConfig::new();
        config.target.file_name = "bin/stockfish".to_string();
        assert!(config.validate().is_err());

        let mut config = ProvisionConfig::new();
        config.fetch.attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ProvisionConfig::new();
        config.engine.sha256 = Some("not-a-digest".to_string());
        assert!(config.validate().is_err());

        let mut config = ProvisionConfig::new();
        config.dependencies.program = "  ".to_string();
        assert!(config.validate().is_err());
        config.dependencies.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_URL, "file:///srv/mirror/stockfish.tar"),
            (ENV_SKIP_DEPS, "true"),
        ]
        .into_iter()
        .collect();

        let mut config = ProvisionConfig::new();
        config.apply_env_with(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.engine.url, "file:///srv/mirror/stockfish.tar");
        assert!(!config.dependencies.enabled);
    }

    #[test]
    fn test_empty_env_url_ignored() {
        let mut config = ProvisionConfig::new();
        config.apply_env_with(|key| (key == ENV_URL).then(|| "  ".to_string()));
        assert_eq!(config.engine.url, DEFAULT_ENGINE_URL);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = FetchPolicy {
            initial_backoff_ms: 500,
            max_backoff_ms: 3_000,
            ..FetchPolicy::default()
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(2_000));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(3_000));
        assert_eq!(policy.backoff_for(60), Duration::from_millis(3_000));
    }
}
