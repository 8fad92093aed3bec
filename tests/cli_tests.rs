// Command-line behavior of the provision-engine binary: exit codes,
// diagnostics and the read-only subcommands

mod common;

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

use common::{app_dir, file_url, nested_release, offline_config};

fn provision_engine(workdir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_provision-engine"))
        .args(args)
        .arg("--workdir")
        .arg(workdir)
        .env_remove("ENGINE_PROVISION_URL")
        .env_remove("ENGINE_PROVISION_WORKDIR")
        .env_remove("ENGINE_PROVISION_SKIP_DEPS")
        .env("RUST_LOG", "warn")
        .output()
        .expect("binary should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_provision_then_verify_and_locate() {
    let root = TempDir::new().unwrap();
    let archive = nested_release(root.path());
    let workdir = app_dir(root.path());
    let config_path = root.path().join("provision.json");
    offline_config(&archive).save_to_file(&config_path).unwrap();
    let config = config_path.to_str().unwrap();

    let output = provision_engine(&workdir, &["--config", config, "provision"]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("✓ Engine installed at"));
    assert!(stdout(&output).contains("FakeFish 17"));

    let output = provision_engine(&workdir, &["--config", config, "verify"]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("UCI handshake"));

    let output = provision_engine(&workdir, &["locate"]);
    assert_eq!(output.status.code(), Some(0));
    let located = stdout(&output);
    assert!(located.trim().ends_with("stockfish/stockfish"), "got {}", located);
}

#[test]
fn test_fetch_failure_names_step_and_exit_code() {
    let root = TempDir::new().unwrap();
    let workdir = app_dir(root.path());
    let missing = file_url(&root.path().join("missing.tar"));

    let output = provision_engine(
        &workdir,
        &["provision", "--url", &missing, "--skip-deps", "--skip-handshake"],
    );
    assert_eq!(output.status.code(), Some(10));
    let diagnostic = stderr(&output);
    assert!(diagnostic.contains("fetch engine archive"), "got {}", diagnostic);
    assert!(!workdir.join("stockfish").exists());
    assert!(!workdir.join(".engine-provision").exists());
    assert_eq!(diagnostic.matches("fetch engine archive").count(), 1);
}

#[test]
fn test_dry_run_changes_nothing() {
    let root = TempDir::new().unwrap();
    let workdir = root.path().join("app");
    fs::create_dir(&workdir).unwrap();

    let output = provision_engine(&workdir, &["--dry-run"]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Dry run complete"));
    assert_eq!(fs::read_dir(&workdir).unwrap().count(), 0);
}

#[test]
fn test_validate_exit_codes() {
    let root = TempDir::new().unwrap();
    let good = root.path().join("good.json");
    fs::write(&good, "{}").unwrap();
    let bad = root.path().join("bad.json");
    fs::write(&bad, r#"{"fetch": {"attempts": 0}}"#).unwrap();

    let output = provision_engine(root.path(), &["validate", good.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("✓ Configuration file is valid"));

    let output = provision_engine(root.path(), &["validate", bad.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("attempts"));
}

#[test]
fn test_show_config_applies_environment() {
    let root = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_provision-engine"))
        .args(["show-config", "--workdir"])
        .arg(root.path())
        .env("ENGINE_PROVISION_URL", "https://mirror.example/sf.tar")
        .env("ENGINE_PROVISION_SKIP_DEPS", "1")
        .env("RUST_LOG", "warn")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["engine"]["url"], "https://mirror.example/sf.tar");
    assert_eq!(json["dependencies"]["enabled"], false);
    assert_eq!(json["target"]["dir"], "stockfish");
}

#[test]
fn test_locate_without_engine() {
    let root = TempDir::new().unwrap();
    let output = provision_engine(root.path(), &["locate"]);

    // A system-wide engine may exist on the test host
    if !Path::new("/usr/games/stockfish").exists() && !Path::new("/usr/local/bin/stockfish").exists() {
        assert_eq!(output.status.code(), Some(12));
    }
}

#[test]
fn test_verify_missing_engine() {
    let root = TempDir::new().unwrap();
    let output = provision_engine(root.path(), &["verify", "--no-handshake"]);
    assert_eq!(output.status.code(), Some(15));
}
