//! Provisioning pipeline
//!
//! Runs the steps in [`ProvisionStep`] order against one working directory:
//! preflight, fetch, extract, resolve, install, permissions, verify,
//! dependencies and handshake. Every step is fatal on failure; the step in
//! progress at that moment is available from [`Provisioner::failed_at`].
//!
//! Scratch state lives in `.engine-provision/` under the working directory:
//! the lock file, the stamp of the last successful install, the downloaded
//! archive and its extraction tree. The last two are removed once the engine
//! is in place.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::archive;
use crate::command_traits::CommandArgs;
use crate::config::ProvisionConfig;
use crate::dependencies::{DependencyInstallArgs, install_dependencies};
use crate::error::Result;
use crate::fetch::{ArchiveFetcher, sha256_file};
use crate::install::{ensure_target_dir, place_executable, set_executable, verify_target};
use crate::lock::ProvisionLock;
use crate::resolve::resolve_executable;
use crate::sanity;
use crate::stamp::ProvisionStamp;
use crate::types::ProvisionStep;
use crate::uci::{self, EngineIdentity};

/// Scratch directory, relative to the working directory
pub const SCRATCH_DIR: &str = ".engine-provision";
pub const LOCK_FILE: &str = "provision.lock";
pub const STAMP_FILE: &str = "stamp.json";
pub const DOWNLOAD_FILE: &str = "engine-archive";
pub const EXTRACT_DIR: &str = "extract";

/// Outcome of a provisioning run
#[derive(Debug, Clone, Default)]
pub struct ProvisionReport {
    pub target: PathBuf,
    pub dry_run: bool,
    /// True when the installed engine was reused from a previous run
    pub reused: bool,
    pub archive_sha256: Option<String>,
    pub archive_bytes: Option<u64>,
    pub binary_sha256: Option<String>,
    pub dependencies_installed: bool,
    pub identity: Option<EngineIdentity>,
    pub completed: Vec<ProvisionStep>,
    pub skipped: Vec<ProvisionStep>,
}

/// Drives one provisioning run
pub struct Provisioner {
    config: ProvisionConfig,
    workdir: PathBuf,
    dry_run: bool,
    force: bool,
    current: ProvisionStep,
    failed: bool,
}

impl Provisioner {
    pub fn new(config: ProvisionConfig, workdir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            workdir: workdir.into(),
            dry_run: false,
            force: false,
            current: ProvisionStep::Preflight,
            failed: false,
        }
    }

    /// Log the plan without touching the network, filesystem or processes
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Ignore the stamp and always run the artifact steps
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    pub fn target_path(&self) -> PathBuf {
        self.workdir.join(self.config.target.relative_path())
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.workdir.join(SCRATCH_DIR)
    }

    pub fn current_step(&self) -> ProvisionStep {
        self.current
    }

    /// The step that was running when the last run failed
    pub fn failed_at(&self) -> Option<ProvisionStep> {
        self.failed.then_some(self.current)
    }

    fn enter(&mut self, step: ProvisionStep) {
        self.current = step;
        let total = ProvisionStep::Completed.order();
        if self.dry_run {
            info!(step = %step, "[{}/{}] would {}", step.order(), total - 1, step);
        } else {
            info!(step = %step, "[{}/{}] {}", step.order(), total - 1, step);
        }
    }

    /// Run every step in order.
    pub fn run(&mut self) -> Result<ProvisionReport> {
        self.failed = false;
        let result = if self.dry_run {
            self.plan()
        } else {
            self.execute()
        };
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn plan(&mut self) -> Result<ProvisionReport> {
        self.enter(ProvisionStep::Preflight);
        self.config.validate()?;
        if !self.workdir.is_dir() {
            warn!(workdir = %self.workdir.display(), "working directory does not exist");
        }

        let mut report = ProvisionReport {
            target: self.target_path(),
            dry_run: true,
            ..Default::default()
        };

        let mut next = ProvisionStep::Preflight.next();
        while let Some(step) = next {
            next = step.next();
            let enabled = match step {
                ProvisionStep::Dependencies => self.config.dependencies.enabled,
                ProvisionStep::Handshake => self.config.handshake.enabled,
                ProvisionStep::Completed => break,
                _ => true,
            };
            if !enabled {
                report.skipped.push(step);
                continue;
            }
            self.enter(step);
            match step {
                ProvisionStep::Fetch => info!(url = %self.config.engine.url, "would download"),
                ProvisionStep::Resolve => {
                    info!(name = %self.config.engine.executable_name, strategy = %self.config.engine.resolve, "would search")
                }
                ProvisionStep::Install => info!(target = %report.target.display(), "would install"),
                ProvisionStep::Dependencies => {
                    let args = DependencyInstallArgs::from_config(&self.config.dependencies);
                    info!(command = %args.display(), "would run");
                }
                _ => {}
            }
            report.completed.push(step);
        }

        self.current = ProvisionStep::Completed;
        Ok(report)
    }

    fn execute(&mut self) -> Result<ProvisionReport> {
        self.enter(ProvisionStep::Preflight);
        self.config.validate()?;
        sanity::run_preflight_checks(&self.config, &self.workdir)?;
        let scratch = self.scratch_dir();
        let fresh_scratch = !scratch.exists();
        fs::create_dir_all(&scratch)?;
        let lock = ProvisionLock::acquire(&scratch.join(LOCK_FILE))?;

        let result = self.execute_locked(&scratch);
        if result.is_err() && fresh_scratch {
            discard_empty_scratch(&scratch);
        }
        drop(lock);
        result
    }

    fn execute_locked(&mut self, scratch: &Path) -> Result<ProvisionReport> {
        let target = self.target_path();
        let mut report = ProvisionReport {
            target: target.clone(),
            completed: vec![ProvisionStep::Preflight],
            ..Default::default()
        };

        let stamp_path = scratch.join(STAMP_FILE);
        let reusable = self.config.reuse_existing
            && !self.force
            && ProvisionStamp::load(&stamp_path)
                .is_some_and(|stamp| stamp.matches(&self.config.engine.url, &target));

        if reusable {
            info!(target = %target.display(), "engine already provisioned, reusing");
            report.reused = true;
            report.skipped.extend(
                ProvisionStep::all_steps()
                    .iter()
                    .filter(|step| step.is_artifact_step()),
            );
        } else {
            self.install_engine(scratch, &target, &mut report)?;
        }

        if self.config.dependencies.enabled {
            self.enter(ProvisionStep::Dependencies);
            let args = DependencyInstallArgs::from_config(&self.config.dependencies);
            install_dependencies(&args, &self.workdir)?;
            report.dependencies_installed = true;
            report.completed.push(ProvisionStep::Dependencies);
        } else {
            info!("dependency installation disabled");
            report.skipped.push(ProvisionStep::Dependencies);
        }

        if self.config.handshake.enabled {
            self.enter(ProvisionStep::Handshake);
            report.identity = Some(uci::handshake(&target, self.config.handshake.timeout())?);
            report.completed.push(ProvisionStep::Handshake);
        } else {
            report.skipped.push(ProvisionStep::Handshake);
        }

        self.current = ProvisionStep::Completed;
        info!(target = %target.display(), reused = report.reused, "provisioning complete");
        Ok(report)
    }

    fn install_engine(&mut self, scratch: &Path, target: &Path, report: &mut ProvisionReport) -> Result<()> {
        let engine = self.config.engine.clone();
        let download = scratch.join(DOWNLOAD_FILE);
        let extract_dir = scratch.join(EXTRACT_DIR);

        self.enter(ProvisionStep::Fetch);
        let fetcher = ArchiveFetcher::new(self.config.fetch.clone())?;
        let fetched = fetcher.fetch(&engine.url, &download, engine.sha256.as_deref())?;
        report.archive_sha256 = Some(fetched.sha256.clone());
        report.archive_bytes = Some(fetched.bytes);
        report.completed.push(ProvisionStep::Fetch);

        self.enter(ProvisionStep::Extract);
        archive::extract(&download, engine.archive_format, &extract_dir)?;
        report.completed.push(ProvisionStep::Extract);

        self.enter(ProvisionStep::Resolve);
        let source = resolve_executable(&extract_dir, &engine.executable_name, engine.resolve)?;
        info!(path = %source.display(), "engine executable resolved");
        report.completed.push(ProvisionStep::Resolve);

        self.enter(ProvisionStep::Install);
        if let Some(dir) = target.parent() {
            ensure_target_dir(dir)?;
        }
        place_executable(&source, target)?;
        report.completed.push(ProvisionStep::Install);

        self.enter(ProvisionStep::Permissions);
        set_executable(target)?;
        report.completed.push(ProvisionStep::Permissions);

        self.enter(ProvisionStep::Verify);
        verify_target(target)?;
        let binary_sha256 = sha256_file(target)?;
        ProvisionStamp::new(&engine.url, &fetched.sha256, &binary_sha256, target)
            .save(&scratch.join(STAMP_FILE))?;
        report.binary_sha256 = Some(binary_sha256);
        report.completed.push(ProvisionStep::Verify);

        remove_scratch_artifacts(&download, &extract_dir);
        Ok(())
    }
}

/// Remove a scratch directory created by a failed run if only the lock is in it.
/// Runs while the lock is still held.
fn discard_empty_scratch(scratch: &Path) {
    let only_lock = fs::read_dir(scratch).is_ok_and(|entries| {
        entries
            .filter_map(|entry| entry.ok())
            .all(|entry| entry.file_name() == LOCK_FILE)
    });
    if !only_lock {
        return;
    }
    let _ = fs::remove_file(scratch.join(LOCK_FILE));
    match fs::remove_dir(scratch) {
        Ok(()) => debug!(path = %scratch.display(), "empty scratch directory removed"),
        Err(e) => debug!(path = %scratch.display(), error = %e, "scratch directory kept"),
    }
}

fn remove_scratch_artifacts(download: &Path, extract_dir: &Path) {
    if let Err(e) = fs::remove_file(download) {
        warn!(path = %download.display(), error = %e, "could not remove downloaded archive");
    }
    if let Err(e) = fs::remove_dir_all(extract_dir) {
        warn!(path = %extract_dir.display(), error = %e, "could not remove extraction tree");
    }
    debug!("scratch artifacts removed");
}

/// Check an existing install without changing anything; runs the handshake
/// when `handshake` is set.
pub fn verify_installed(
    config: &ProvisionConfig,
    workdir: &Path,
    handshake: bool,
) -> Result<Option<EngineIdentity>> {
    let target = workdir.join(config.target.relative_path());
    verify_target(&target)?;
    if handshake {
        return uci::handshake(&target, config.handshake.timeout()).map(Some);
    }
    Ok(None)
}
