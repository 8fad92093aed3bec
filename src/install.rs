//! Placing the engine at its canonical path
//!
//! The resolved executable is copied into a staging file next to the target
//! and renamed over it, so the host application never observes a
//! half-written engine and the previous build's binary is replaced
//! wholesale.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ProvisionError, Result};

/// Mode applied to the installed engine
pub const ENGINE_MODE: u32 = 0o755;

/// Create the target directory if absent; an existing directory is fine
pub fn ensure_target_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    if !dir.is_dir() {
        return Err(ProvisionError::Io(std::io::Error::other(format!(
            "{} exists and is not a directory",
            dir.display()
        ))));
    }
    Ok(())
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    name.push(target.file_name().unwrap_or_default());
    name.push(".staging");
    target.with_file_name(name)
}

/// Copy `source` to `target` via a staging file and an atomic rename
pub fn place_executable(source: &Path, target: &Path) -> Result<u64> {
    let staging = staging_path(target);
    let bytes = fs::copy(source, &staging).inspect_err(|_| {
        let _ = fs::remove_file(&staging);
    })?;
    fs::rename(&staging, target).inspect_err(|_| {
        let _ = fs::remove_file(&staging);
    })?;

    debug!(source = %source.display(), target = %target.display(), bytes, "engine placed");
    Ok(bytes)
}

/// Set the engine's permission bits to [`ENGINE_MODE`]
pub fn set_executable(target: &Path) -> Result<()> {
    fs::set_permissions(target, fs::Permissions::from_mode(ENGINE_MODE)).map_err(|e| {
        ProvisionError::PermissionSet {
            path: target.to_path_buf(),
            reason: e.to_string(),
        }
    })
}

/// Check the target is a regular file (not a symlink) with an execute bit
pub fn verify_target(target: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(target).map_err(|e| ProvisionError::Verification {
        path: target.to_path_buf(),
        reason: e.to_string(),
    })?;

    if !metadata.file_type().is_file() {
        return Err(ProvisionError::Verification {
            path: target.to_path_buf(),
            reason: "not a regular file".to_string(),
        });
    }
    if metadata.permissions().mode() & 0o111 == 0 {
        return Err(ProvisionError::Verification {
            path: target.to_path_buf(),
            reason: "execute permission not set".to_string(),
        });
    }

    info!(path = %target.display(), bytes = metadata.len(), "installed engine verified");
    Ok(())
}

/// True when `target` would pass [`verify_target`]
pub fn is_installed(target: &Path) -> bool {
    fs::symlink_metadata(target)
        .map(|m| m.file_type().is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
