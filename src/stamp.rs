//! Provision stamp for the skip-if-present optimization
//!
//! After a successful install the provisioner records where the engine came
//! from and the digest of the installed binary. A later run may skip the
//! artifact steps only when the stamp still describes the file on disk.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::error::Result;
use crate::fetch::sha256_file;
use crate::install::is_installed;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionStamp {
    pub source_url: String,
    pub archive_sha256: String,
    pub binary_sha256: String,
    pub target: PathBuf,
    pub installed_at: u64,
}

impl ProvisionStamp {
    pub fn new(source_url: &str, archive_sha256: &str, binary_sha256: &str, target: &Path) -> Self {
        let installed_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            source_url: source_url.to_string(),
            archive_sha256: archive_sha256.to_string(),
            binary_sha256: binary_sha256.to_string(),
            target: target.to_path_buf(),
            installed_at,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Load a stamp; unreadable or malformed stamps count as absent
    pub fn load(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(stamp) => Some(stamp),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "ignoring malformed stamp");
                None
            }
        }
    }

    /// True when `target` is an installed engine built from `source_url`
    /// and its bytes still match the recorded digest
    pub fn matches(&self, source_url: &str, target: &Path) -> bool {
        if self.source_url != source_url || self.target != target {
            return false;
        }
        if !is_installed(target) {
            return false;
        }
        sha256_file(target)
            .map(|digest| digest == self.binary_sha256)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const URL: &str = "https://example.invalid/stockfish.tar";

    fn installed_engine(dir: &Path) -> PathBuf {
        let target = dir.join("stockfish");
        fs::write(&target, b"engine bytes").unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o755)).unwrap();
        target
    }

    #[test]
    fn test_stamp_matches_installed_engine() {
        let dir = TempDir::new().unwrap();
        let target = installed_engine(dir.path());
        let digest = sha256_file(&target).unwrap();

        let stamp = ProvisionStamp::new(URL, "abc", &digest, &target);
        let stamp_path = dir.path().join("stamp.json");
        stamp.save(&stamp_path).unwrap();

        let loaded = ProvisionStamp::load(&stamp_path).unwrap();
        assert_eq!(loaded, stamp);
        assert!(loaded.matches(URL, &target));
    }

    #[test]
    fn test_stamp_rejects_changed_url_or_bytes() {
        let dir = TempDir::new().unwrap();
        let target = installed_engine(dir.path());
        let digest = sha256_file(&target).unwrap();
        let stamp = ProvisionStamp::new(URL, "abc", &digest, &target);

        assert!(!stamp.matches("https://example.invalid/other.tar", &target));

        fs::write(&target, b"tampered").unwrap();
        assert!(!stamp.matches(URL, &target));
    }

    #[test]
    fn test_stamp_rejects_non_executable_target() {
        let dir = TempDir::new().unwrap();
        let target = installed_engine(dir.path());
        let digest = sha256_file(&target).unwrap();
        let stamp = ProvisionStamp::new(URL, "abc", &digest, &target);

        fs::set_permissions(&target, fs::Permissions::from_mode(0o644)).unwrap();
        assert!(!stamp.matches(URL, &target));
    }

    #[test]
    fn test_malformed_stamp_is_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stamp.json");
        fs::write(&path, "{not json").unwrap();
        assert!(ProvisionStamp::load(&path).is_none());
        assert!(ProvisionStamp::load(&dir.path().join("missing.json")).is_none());
    }
}
