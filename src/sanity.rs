//! Pre-flight checks for the provisioning environment
//!
//! Verified before anything is downloaded:
//! - The working directory exists and is writable
//! - The dependency installer is available when dependencies are enabled
//!
//! Failing here keeps a misconfigured build from spending minutes on a
//! download only to stop at the last step.

use nix::unistd::{AccessFlags, access};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::process_guard::CommandProcessGroup;

/// Result of environment verification
#[derive(Debug)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    pub workdir_writable: bool,
}

impl SanityCheckResult {
    /// Returns true if all checks passed
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty() && self.workdir_writable
    }

    /// Convert a failed check into the error for the step it blocks
    pub fn into_result(self, workdir: &Path) -> Result<()> {
        if !self.workdir_writable {
            return Err(ProvisionError::config(format!(
                "working directory {} is missing or not writable",
                workdir.display()
            )));
        }
        if let Some(binary) = self.missing_binaries.first() {
            return Err(ProvisionError::dependency(format!(
                "installer program '{}' not found (install: {})",
                binary,
                get_package_for_binary(binary)
            )));
        }
        Ok(())
    }
}

/// Check if a program is runnable: a path must be an executable file,
/// a bare name must resolve on PATH
pub fn binary_exists(name: &str) -> bool {
    if name.contains('/') {
        return std::fs::metadata(name)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false);
    }

    Command::new("which")
        .arg(name)
        .in_new_process_group()
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn is_writable_dir(dir: &Path) -> bool {
    dir.is_dir() && access(dir, AccessFlags::W_OK | AccessFlags::X_OK).is_ok()
}

/// Perform all checks for `config` run in `workdir`
pub fn verify_environment(config: &ProvisionConfig, workdir: &Path) -> SanityCheckResult {
    let mut missing = Vec::new();

    if config.dependencies.enabled {
        let program = &config.dependencies.program;
        if !binary_exists(program) {
            missing.push(program.clone());
        }
    } else {
        debug!("dependency installation disabled, installer not checked");
    }

    SanityCheckResult {
        missing_binaries: missing,
        workdir_writable: is_writable_dir(workdir),
    }
}

/// Map installer programs to the system package that provides them
fn get_package_for_binary(binary: &str) -> &'static str {
    match binary.rsplit('/').next().unwrap_or(binary) {
        "python3" | "python" => "python3 python3-pip",
        "pip" | "pip3" => "python3-pip",
        "npm" => "nodejs npm",
        "bundle" => "ruby-bundler",
        _ => "unknown",
    }
}

/// Verify the environment and fail with the blocked step's error
pub fn run_preflight_checks(config: &ProvisionConfig, workdir: &Path) -> Result<()> {
    debug!(workdir = %workdir.display(), "running pre-flight checks");

    verify_environment(config, workdir).into_result(workdir)?;

    info!("pre-flight checks passed");
    Ok(())
}
