//! Host application dependency installation
//!
//! Runs the ecosystem's standard installer against the declared manifest,
//! `python3 -m pip install -r requirements.txt` by default.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::command_runner::{CommandOutput, run_command_safe};
use crate::command_traits::CommandArgs;
use crate::config::DependencyConfig;
use crate::error::{ProvisionError, Result};

/// Type-safe arguments for the dependency installer.
#[derive(Debug, Clone)]
pub struct DependencyInstallArgs {
    pub program: String,
    /// Arguments placed before the manifest path
    pub args: Vec<String>,
    pub manifest: PathBuf,
}

impl DependencyInstallArgs {
    pub fn from_config(config: &DependencyConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            manifest: config.manifest.clone(),
        }
    }
}

impl CommandArgs for DependencyInstallArgs {
    fn program(&self) -> &str {
        &self.program
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(self.manifest.display().to_string());
        args
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        vec![
            ("PIP_DISABLE_PIP_VERSION_CHECK".to_string(), "1".to_string()),
            ("PYTHONUNBUFFERED".to_string(), "1".to_string()),
        ]
    }
}

/// Install the dependency manifest from `workdir`.
///
/// A missing manifest, an installer that cannot be spawned, or a non-zero
/// exit are all dependency failures.
pub fn install_dependencies(args: &DependencyInstallArgs, workdir: &Path) -> Result<CommandOutput> {
    let manifest = workdir.join(&args.manifest);
    if !manifest.is_file() {
        return Err(ProvisionError::dependency(format!(
            "manifest {} not found",
            manifest.display()
        )));
    }

    let output = run_command_safe(args, workdir)
        .map_err(|e| ProvisionError::dependency(format!("{:#}", e)))?;
    output
        .ensure_success(&args.display())
        .map_err(|e| ProvisionError::dependency(e.to_string()))?;

    info!(manifest = %args.manifest.display(), "dependencies installed");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn shell_installer(script: &str) -> DependencyInstallArgs {
        DependencyInstallArgs {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "installer".to_string()],
            manifest: PathBuf::from("requirements.txt"),
        }
    }

    #[test]
    fn test_default_args_layout() {
        let args = DependencyInstallArgs::from_config(&DependencyConfig::default());
        assert_eq!(args.program(), "python3");
        assert_eq!(
            args.to_cli_args(),
            vec!["-m", "pip", "install", "-r", "requirements.txt"]
        );
        assert_eq!(args.display(), "python3 -m pip install -r requirements.txt");
    }

    #[test]
    fn test_manifest_path_is_passed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "flask\n").unwrap();

        // $1 is the manifest path appended after the script's $0
        let output = install_dependencies(&shell_installer("cat \"$1\""), dir.path()).unwrap();
        assert_eq!(output.stdout.trim(), "flask");
    }

    #[test]
    fn test_missing_manifest() {
        let dir = TempDir::new().unwrap();
        let err = install_dependencies(&shell_installer("exit 0"), dir.path()).unwrap_err();
        assert!(matches!(err, ProvisionError::DependencyInstall(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_installer_failure() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "flask\n").unwrap();

        let err = install_dependencies(
            &shell_installer("echo 'No matching distribution' >&2; exit 1"),
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(err, ProvisionError::DependencyInstall(_)));
        assert!(err.to_string().contains("No matching distribution"));
    }
}
