//! Shared fixtures: tar archives built on the fly and a fake UCI engine

#![allow(dead_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use engine_provisioner::ProvisionConfig;

/// Minimal engine speaking enough UCI for the handshake
pub const FAKE_ENGINE: &str = r#"#!/bin/sh
while read line; do
  case "$line" in
    uci)
      echo "id name FakeFish 17"
      echo "id author The Test Authors"
      echo "option name Hash type spin default 16 min 1 max 33554432"
      echo "uciok"
      ;;
    isready) echo "readyok" ;;
    quit) exit 0 ;;
  esac
done
"#;

pub const ENGINE_NAME: &str = "stockfish-ubuntu-x86-64-avx2";

/// Write a tar archive holding `entries` (path, contents, mode) to `path`
pub fn build_tar(path: &Path, entries: &[(&str, &[u8], u32)]) -> PathBuf {
    let mut builder = tar::Builder::new(File::create(path).unwrap());
    for (name, data, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(*mode);
        header.set_mtime(1_700_000_000);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.finish().unwrap();
    path.to_path_buf()
}

/// Release archive with the fake engine nested one directory deep
pub fn nested_release(dir: &Path) -> PathBuf {
    let entry = format!("stockfish/{}", ENGINE_NAME);
    build_tar(
        &dir.join("stockfish-ubuntu-x86-64-avx2.tar"),
        &[
            ("stockfish/README.md", b"Stockfish release notes", 0o644),
            (&entry, FAKE_ENGINE.as_bytes(), 0o755),
        ],
    )
}

pub fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Working directory of a host application with a dependency manifest
pub fn app_dir(root: &Path) -> PathBuf {
    let dir = root.join("app");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("requirements.txt"), "flask\npython-chess\n").unwrap();
    dir
}

/// Offline configuration: file:// source, `sh` standing in for pip
pub fn offline_config(archive: &Path) -> ProvisionConfig {
    let mut config = ProvisionConfig::default();
    config.engine.url = file_url(archive);
    config.dependencies.program = "sh".to_string();
    config.dependencies.args = vec![
        "-c".to_string(),
        "cp \"$1\" installed-requirements.txt".to_string(),
        "installer".to_string(),
    ];
    config.fetch.attempts = 2;
    config.fetch.initial_backoff_ms = 10;
    config.fetch.max_backoff_ms = 20;
    config.fetch.connect_timeout_secs = 2;
    config.fetch.timeout_secs = 5;
    config
}
