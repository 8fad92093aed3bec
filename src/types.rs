//! Type-safe configuration and progress types for the provisioner
//!
//! String settings in the configuration file are parsed into these enums so
//! that typos are rejected at load time rather than halfway through a build.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};

/// Archive format of the published engine asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ArchiveFormat {
    /// Uncompressed POSIX/GNU tape archive
    #[default]
    Tar,
}

/// How the engine executable is located inside the extracted archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ResolveStrategy {
    /// Regular files whose file name equals the expected executable name
    #[default]
    ByName,
    /// The single regular file carrying an execute bit
    SoleExecutable,
}

/// Provisioning steps in the order they run.
///
/// Used for progress logging and to name the failing step in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ProvisionStep {
    /// Configuration, installer presence, scratch directory, lock
    Preflight = 0,
    /// Download the engine archive
    Fetch = 1,
    /// Unpack the archive into the scratch directory
    Extract = 2,
    /// Find the engine executable in the extracted tree
    Resolve = 3,
    /// Create the target directory and move the executable into place
    Install = 4,
    /// Mark the installed engine executable
    Permissions = 5,
    /// Check the installed engine is a regular executable file
    Verify = 6,
    /// Install the host application's dependency manifest
    Dependencies = 7,
    /// Protocol smoke test against the installed engine
    Handshake = 8,
    /// Provisioning finished (terminal state)
    Completed = 9,
}

impl ProvisionStep {
    /// Returns the numeric order of this step
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    /// Returns the next step in the sequence, or None once completed
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Preflight => Some(Self::Fetch),
            Self::Fetch => Some(Self::Extract),
            Self::Extract => Some(Self::Resolve),
            Self::Resolve => Some(Self::Install),
            Self::Install => Some(Self::Permissions),
            Self::Permissions => Some(Self::Verify),
            Self::Verify => Some(Self::Dependencies),
            Self::Dependencies => Some(Self::Handshake),
            Self::Handshake => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    /// Returns true for the steps that touch the engine artifact itself
    /// (skipped when an existing install is reused)
    pub const fn is_artifact_step(self) -> bool {
        matches!(
            self,
            Self::Fetch
                | Self::Extract
                | Self::Resolve
                | Self::Install
                | Self::Permissions
                | Self::Verify
        )
    }

    /// Returns a short human-readable label for this step
    pub const fn description(self) -> &'static str {
        match self {
            Self::Preflight => "preflight",
            Self::Fetch => "fetch engine archive",
            Self::Extract => "extract archive",
            Self::Resolve => "resolve engine executable",
            Self::Install => "install engine",
            Self::Permissions => "set executable permission",
            Self::Verify => "verify installed engine",
            Self::Dependencies => "install dependencies",
            Self::Handshake => "engine handshake",
            Self::Completed => "completed",
        }
    }

    /// Returns all steps in order
    pub const fn all_steps() -> &'static [Self] {
        &[
            Self::Preflight,
            Self::Fetch,
            Self::Extract,
            Self::Resolve,
            Self::Install,
            Self::Permissions,
            Self::Verify,
            Self::Dependencies,
            Self::Handshake,
            Self::Completed,
        ]
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_resolve_strategy_strings() {
        assert_eq!(ResolveStrategy::ByName.to_string(), "by-name");
        assert_eq!(
            ResolveStrategy::from_str("sole-executable").unwrap(),
            ResolveStrategy::SoleExecutable
        );
        assert!(ResolveStrategy::from_str("first-match").is_err());
    }

    #[test]
    fn test_resolve_strategy_serde_matches_strum() {
        let json = serde_json::to_string(&ResolveStrategy::SoleExecutable).unwrap();
        assert_eq!(json, "\"sole-executable\"");
    }

    #[test]
    fn test_step_sequence_is_linear() {
        let steps = ProvisionStep::all_steps();
        for pair in steps.windows(2) {
            assert_eq!(pair[0].next(), Some(pair[1]));
            assert!(pair[0].order() < pair[1].order());
        }
        assert_eq!(ProvisionStep::Completed.next(), None);
    }

    #[test]
    fn test_artifact_steps() {
        assert!(ProvisionStep::Fetch.is_artifact_step());
        assert!(ProvisionStep::Verify.is_artifact_step());
        assert!(!ProvisionStep::Dependencies.is_artifact_step());
        assert!(!ProvisionStep::Handshake.is_artifact_step());
    }
}
