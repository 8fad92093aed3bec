//! UCI smoke test against the installed engine
//!
//! Launches the binary, sends `uci` and waits for `uciok`, then `isready`
//! and `readyok`, then `quit`. Every wait is bounded by one deadline; the
//! engine's whole process group is killed if it does not exit on its own.

use nix::sys::signal::Signal;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{ProvisionError, Result};
use crate::process_guard::{send_signal_to_group, spawn_tracked, untrack};

/// How long the engine gets to exit after `quit`
const QUIT_GRACE: Duration = Duration::from_millis(500);

/// Spawn retries when the freshly written binary is still open for writing
const SPAWN_BUSY_RETRIES: u32 = 5;

/// What the engine reported about itself during the handshake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineIdentity {
    pub name: Option<String>,
    pub author: Option<String>,
    /// Number of `option` lines advertised before `uciok`
    pub options: usize,
}

impl EngineIdentity {
    fn absorb(&mut self, line: &str) {
        if let Some(name) = line.strip_prefix("id name ") {
            self.name = Some(name.trim().to_string());
        } else if let Some(author) = line.strip_prefix("id author ") {
            self.author = Some(author.trim().to_string());
        } else if line.starts_with("option ") {
            self.options += 1;
        }
    }
}

/// A running engine; its process group is killed on drop unless it exited
struct EngineSession {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: Receiver<String>,
    deadline: Instant,
}

impl EngineSession {
    fn launch(engine: &Path, timeout: Duration) -> Result<Self> {
        let mut attempt = 0;
        let mut child = loop {
            let mut cmd = Command::new(engine);
            cmd.stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::null());
            match spawn_tracked(&mut cmd) {
                Ok(child) => break child,
                Err(e) if e.kind() == ErrorKind::ExecutableFileBusy && attempt < SPAWN_BUSY_RETRIES => {
                    attempt += 1;
                    thread::sleep(Duration::from_millis(20));
                }
                Err(e) => {
                    return Err(ProvisionError::handshake(format!(
                        "failed to launch {}: {}",
                        engine.display(),
                        e
                    )));
                }
            }
        };

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProvisionError::handshake("engine stdout not captured"))?;

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            child,
            stdin,
            lines: rx,
            deadline: Instant::now() + timeout,
        })
    }

    fn send(&mut self, command: &str) -> Result<()> {
        debug!(target: "provision::uci", ">> {}", command);
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ProvisionError::handshake("engine stdin closed"))?;
        writeln!(stdin, "{}", command)
            .and_then(|_| stdin.flush())
            .map_err(|e| ProvisionError::handshake(format!("failed to send '{}': {}", command, e)))
    }

    /// Read lines until one equals `token`, feeding the others to `on_line`
    fn wait_for(&mut self, token: &str, mut on_line: impl FnMut(&str)) -> Result<()> {
        loop {
            let remaining = self.deadline.saturating_duration_since(Instant::now());
            match self.lines.recv_timeout(remaining) {
                Ok(line) => {
                    debug!(target: "provision::uci", "<< {}", line);
                    let line = line.trim();
                    if line == token {
                        return Ok(());
                    }
                    on_line(line);
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(ProvisionError::handshake(format!(
                        "timed out waiting for '{}'",
                        token
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ProvisionError::handshake(format!(
                        "engine closed its output before '{}'",
                        token
                    )));
                }
            }
        }
    }

    /// Send `quit` and give the engine a moment to exit by itself
    fn quit(&mut self) {
        if self.send("quit").is_err() {
            return;
        }
        self.stdin = None;

        let deadline = Instant::now() + QUIT_GRACE;
        while Instant::now() < deadline {
            if let Ok(Some(status)) = self.child.try_wait() {
                debug!(%status, "engine exited after quit");
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        warn!(pid = self.child.id(), "engine ignored quit");
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        let pid = self.child.id();
        if !matches!(self.child.try_wait(), Ok(Some(_))) {
            if send_signal_to_group(pid, Signal::SIGKILL).is_err() {
                let _ = self.child.kill();
            }
            let _ = self.child.wait();
        }
        untrack(pid);
    }
}

/// Run the UCI handshake against `engine`, bounded by `timeout`.
pub fn handshake(engine: &Path, timeout: Duration) -> Result<EngineIdentity> {
    let mut session = EngineSession::launch(engine, timeout)?;
    let mut identity = EngineIdentity::default();

    session.send("uci")?;
    session.wait_for("uciok", |line| identity.absorb(line))?;
    session.send("isready")?;
    session.wait_for("readyok", |_| {})?;
    session.quit();

    info!(
        engine = identity.name.as_deref().unwrap_or("unknown"),
        author = identity.author.as_deref().unwrap_or("unknown"),
        options = identity.options,
        "engine handshake completed"
    );
    Ok(identity)
}
