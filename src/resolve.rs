//! Locating the engine executable inside the extracted archive
//!
//! Upstream release archives have shipped the binary both at the top level
//! and nested under a same-named directory, so the extracted tree is always
//! searched; no relative path inside the archive is assumed. Zero matches
//! and multiple matches are both fatal.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ProvisionError, Result};
use crate::types::ResolveStrategy;

/// Recursively collect regular files under `root`; symlinks are not followed
fn regular_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    files.sort();
    Ok(files)
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Find the engine executable under `root`.
///
/// `name` is the expected file name; with [`ResolveStrategy::SoleExecutable`]
/// it is only used in diagnostics.
pub fn resolve_executable(root: &Path, name: &str, strategy: ResolveStrategy) -> Result<PathBuf> {
    let files = regular_files(root)?;

    let mut candidates: Vec<PathBuf> = match strategy {
        ResolveStrategy::ByName => files
            .into_iter()
            .filter(|p| p.file_name().is_some_and(|f| f == name))
            .collect(),
        ResolveStrategy::SoleExecutable => files.into_iter().filter(|p| is_executable(p)).collect(),
    };

    debug!(
        root = %root.display(),
        %name,
        %strategy,
        matches = candidates.len(),
        "resolved executable candidates"
    );

    match candidates.len() {
        0 => Err(ProvisionError::ExecutableNotFound {
            name: name.to_string(),
            searched: root.to_path_buf(),
        }),
        1 => Ok(candidates.remove(0)),
        _ => Err(ProvisionError::AmbiguousExecutable {
            name: name.to_string(),
            candidates,
        }),
    }
}
