//! Type-Safe Command Execution
//!
//! All external commands the provisioner runs to completion go through
//! [`run_command_safe`], which guarantees:
//!
//! - Process group isolation (the child dies with the provisioner)
//! - PID registration for cleanup on SIGINT/SIGTERM
//! - Argument layout taken from a [`CommandArgs`] implementation

use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};

use crate::command_traits::CommandArgs;
use crate::process_guard::{spawn_tracked, untrack};

/// Number of trailing stderr lines kept in failure diagnostics
const STDERR_TAIL_LINES: usize = 20;

/// Run a command to completion in `cwd`, capturing its output.
///
/// A non-zero exit is reported through [`CommandOutput::success`], not as an
/// error; errors mean the command could not be spawned or waited on.
pub fn run_command_safe<T: CommandArgs>(args: &T, cwd: &Path) -> Result<CommandOutput> {
    let program = args.program();
    let cli_args = args.to_cli_args();
    let env_vars = args.get_env_vars();

    info!(command = %args.display(), cwd = %cwd.display(), "running command");
    debug!(env = ?env_vars, "command environment");

    let mut cmd = Command::new(program);
    cmd.args(&cli_args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in &env_vars {
        cmd.env(key, value);
    }

    let child = spawn_tracked(&mut cmd).with_context(|| format!("Failed to spawn {}", program))?;
    let pid = child.id();

    let output = child.wait_with_output();
    untrack(pid);
    let output = output.with_context(|| format!("Failed waiting for {}", program))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    for line in stdout.lines() {
        debug!(target: "provision::child", "{}", line);
    }

    let exit_code = output.status.code();
    let success = output.status.success();
    if success {
        info!(%program, "command finished successfully");
    } else {
        info!(%program, exit_code = exit_code.unwrap_or(-1), "command failed");
    }

    Ok(CommandOutput {
        stdout,
        stderr,
        exit_code,
        success,
    })
}

/// Output from a command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl CommandOutput {
    /// Last lines of stderr, for diagnostics
    pub fn stderr_tail(&self) -> String {
        let lines: Vec<&str> = self.stderr.trim_end().lines().collect();
        let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
        lines[start..].join("\n")
    }

    /// Return an error naming `context` if the command did not succeed.
    pub fn ensure_success(&self, context: &str) -> Result<()> {
        if self.success {
            return Ok(());
        }
        match self.exit_code {
            Some(code) => anyhow::bail!(
                "{} failed (exit code {}): {}",
                context,
                code,
                self.stderr_tail()
            ),
            None => anyhow::bail!("{} was terminated by a signal", context),
        }
    }
}
