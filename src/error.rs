//! Error handling module for the engine provisioner
//!
//! Every provisioning step fails with its own variant so that a deployment
//! operator can tell "engine unreachable" from "dependency install failed"
//! at a glance. Each variant maps to the step it belongs to and to a
//! distinct process exit code.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::ProvisionStep;

/// Main error type for the engine provisioner
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Another provisioning run holds the lock for this working directory
    #[error("Provisioning lock held: {0}")]
    Lock(String),

    /// The engine archive could not be retrieved
    #[error("Network fetch failed: {0}")]
    NetworkFetch(String),

    /// The archive could not be unpacked or is not in the configured format
    #[error("Archive extraction failed: {0}")]
    ArchiveExtraction(String),

    /// No extracted file matched the expected executable
    #[error("Executable '{name}' not found in {}", searched.display())]
    ExecutableNotFound { name: String, searched: PathBuf },

    /// More than one extracted file matched the expected executable
    #[error("Executable '{name}' is ambiguous: {} candidates ({})", candidates.len(), display_paths(candidates))]
    AmbiguousExecutable {
        name: String,
        candidates: Vec<PathBuf>,
    },

    /// The executable bit could not be set on the installed engine
    #[error("Failed to set permissions on {}: {reason}", path.display())]
    PermissionSet { path: PathBuf, reason: String },

    /// The installed engine failed post-install verification
    #[error("Verification failed for {}: {reason}", path.display())]
    Verification { path: PathBuf, reason: String },

    /// The host application's dependency manifest could not be installed
    #[error("Dependency installation failed: {0}")]
    DependencyInstall(String),

    /// The installed engine did not complete the protocol handshake
    #[error("Engine handshake failed: {0}")]
    Handshake(String),

    /// IO errors not attributable to a specific step
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ProvisionError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a lock error
    pub fn lock(msg: impl Into<String>) -> Self {
        Self::Lock(msg.into())
    }

    /// Create a network fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::NetworkFetch(msg.into())
    }

    /// Create an archive extraction error
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::ArchiveExtraction(msg.into())
    }

    /// Create a dependency installation error
    pub fn dependency(msg: impl Into<String>) -> Self {
        Self::DependencyInstall(msg.into())
    }

    /// Create a handshake error
    pub fn handshake(msg: impl Into<String>) -> Self {
        Self::Handshake(msg.into())
    }

    /// The provisioning step this error belongs to.
    pub fn step(&self) -> ProvisionStep {
        match self {
            Self::Config(_) | Self::Lock(_) => ProvisionStep::Preflight,
            Self::NetworkFetch(_) => ProvisionStep::Fetch,
            Self::ArchiveExtraction(_) => ProvisionStep::Extract,
            Self::ExecutableNotFound { .. } | Self::AmbiguousExecutable { .. } => {
                ProvisionStep::Resolve
            }
            Self::PermissionSet { .. } => ProvisionStep::Permissions,
            Self::Verification { .. } => ProvisionStep::Verify,
            Self::DependencyInstall(_) => ProvisionStep::Dependencies,
            Self::Handshake(_) => ProvisionStep::Handshake,
            Self::Io(_) | Self::Json(_) => ProvisionStep::Install,
        }
    }

    /// Process exit code reported for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::NetworkFetch(_) => 10,
            Self::ArchiveExtraction(_) => 11,
            Self::ExecutableNotFound { .. } => 12,
            Self::AmbiguousExecutable { .. } => 13,
            Self::PermissionSet { .. } => 14,
            Self::Verification { .. } => 15,
            Self::DependencyInstall(_) => 16,
            Self::Lock(_) => 17,
            Self::Handshake(_) => 18,
            Self::Io(_) | Self::Json(_) => 1,
        }
    }
}
