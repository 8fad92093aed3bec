//! Finding an engine the way the host application does
//!
//! The configured target comes first, then the well-known fallbacks the
//! application probes when its canonical engine is missing.

use std::path::{Path, PathBuf};
use tracing::debug;

/// Fallback engine locations, in probe order
pub const FALLBACK_CANDIDATES: &[&str] = &[
    "stockfish/stockfish",
    "stockfish/stockfish-ubuntu-x86-64-avx2",
    "stockfish.exe",
    "stockfish/stockfish-windows-x86-64-avx2.exe",
    "/usr/games/stockfish",
    "/usr/local/bin/stockfish",
];

/// Ordered candidate paths; relative entries resolve against `workdir`
pub fn candidates(workdir: &Path, target: &Path) -> Vec<PathBuf> {
    let mut paths = vec![workdir.join(target)];
    for candidate in FALLBACK_CANDIDATES {
        let path = workdir.join(candidate);
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}

/// First candidate that exists as a regular file
pub fn locate_engine(workdir: &Path, target: &Path) -> Option<PathBuf> {
    candidates(workdir, target).into_iter().find(|path| {
        let found = path.is_file();
        debug!(path = %path.display(), found, "probing engine location");
        found
    })
}
