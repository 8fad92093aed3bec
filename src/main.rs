//! provision-engine - main entry point
//!
//! Layers configuration (defaults, file, environment, flags), dispatches the
//! subcommand and turns a failure into a one-line diagnostic naming the
//! failed step plus that step's exit code.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use engine_provisioner::cli::{Cli, Commands, ProvisionArgs};
use engine_provisioner::config::{ENV_WORKDIR, ProvisionConfig};
use engine_provisioner::error::ProvisionError;
use engine_provisioner::locate::locate_engine;
use engine_provisioner::process_guard::{self, ProcessGuard};
use engine_provisioner::provisioner::{Provisioner, verify_installed};
use engine_provisioner::types::ProvisionStep;

/// Initialize tracing on stderr; RUST_LOG overrides the default level
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    // Children (pip, the engine) are terminated if we receive SIGINT/SIGTERM
    if let Err(e) = process_guard::init_signal_handlers() {
        warn!(error = %e, "failed to initialize signal handlers");
    }
    let guard = ProcessGuard::new();

    let code = match run(&cli) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("✗ {:#}", err);
            exit_code_for(&err)
        }
    };

    drop(guard);
    std::process::exit(code);
}

/// Exit code of the innermost provisioning error, 1 otherwise
fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ProvisionError>())
        .map(ProvisionError::exit_code)
        .unwrap_or(1)
}

fn run(cli: &Cli) -> Result<()> {
    let workdir = resolve_workdir(cli.workdir.as_deref())?;
    debug!(workdir = %workdir.display(), "working directory");

    match &cli.command {
        None => provision(cli, &workdir, &ProvisionArgs::default()),
        Some(Commands::Provision(args)) => provision(cli, &workdir, args),
        Some(Commands::Verify { no_handshake }) => {
            let config = effective_config(cli.config.as_deref())?;
            let handshake = !no_handshake && config.handshake.enabled && !cli.dry_run;
            let target = workdir.join(config.target.relative_path());

            let identity = verify_installed(&config, &workdir, handshake)
                .with_context(|| format!("verification of {} failed", target.display()))?;
            println!("✓ Engine at {} is an executable regular file", target.display());
            if let Some(identity) = identity {
                println!(
                    "✓ Engine answered the UCI handshake: {} ({} options)",
                    identity.name.as_deref().unwrap_or("unnamed engine"),
                    identity.options
                );
            }
            Ok(())
        }
        Some(Commands::Locate) => {
            let config = effective_config(cli.config.as_deref())?;
            let target = config.target.relative_path();
            match locate_engine(&workdir, &target) {
                Some(path) => {
                    println!("{}", path.display());
                    Ok(())
                }
                None => Err(ProvisionError::ExecutableNotFound {
                    name: config.target.file_name.clone(),
                    searched: workdir.clone(),
                })
                .context("no engine found at the target or any fallback location"),
            }
        }
        Some(Commands::Validate { config }) => {
            info!(path = %config.display(), "validating configuration file");
            let loaded = ProvisionConfig::load_from_file(config)
                .and_then(|c| c.validate().map(|_| c))
                .with_context(|| format!("configuration file {} is invalid", config.display()))?;
            println!("✓ Configuration file is valid: {}", config.display());
            debug!(config = ?loaded, "validated configuration");
            Ok(())
        }
        Some(Commands::ShowConfig) => {
            let config = effective_config(cli.config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn provision(cli: &Cli, workdir: &Path, args: &ProvisionArgs) -> Result<()> {
    let mut config = effective_config(cli.config.as_deref())
        .with_context(|| format!("provisioning failed at step '{}'", ProvisionStep::Preflight))?;
    if let Some(url) = &args.url {
        config.engine.url = url.clone();
    }
    if args.skip_deps {
        config.dependencies.enabled = false;
    }
    if args.skip_handshake {
        config.handshake.enabled = false;
    }

    let mut provisioner = Provisioner::new(config, workdir)
        .dry_run(cli.dry_run)
        .force(args.force);

    let report = match provisioner.run() {
        Ok(report) => report,
        Err(err) => {
            let step = provisioner.failed_at().unwrap_or_else(|| err.step());
            return Err(anyhow::Error::new(err)
                .context(format!("provisioning failed at step '{}'", step)));
        }
    };

    if report.dry_run {
        println!(
            "✓ Dry run complete: {} step(s) planned, nothing changed",
            report.completed.len()
        );
        return Ok(());
    }

    if report.reused {
        println!("✓ Engine already installed at {}", report.target.display());
    } else {
        println!("✓ Engine installed at {}", report.target.display());
    }
    if report.dependencies_installed {
        println!(
            "✓ Dependencies installed from {}",
            provisioner.config().dependencies.manifest.display()
        );
    }
    if let Some(identity) = &report.identity {
        println!(
            "✓ Engine answered the UCI handshake: {}",
            identity.name.as_deref().unwrap_or("unnamed engine")
        );
    }
    Ok(())
}

/// Defaults, then the config file, then environment overrides
fn effective_config(path: Option<&Path>) -> Result<ProvisionConfig> {
    let mut config = match path {
        Some(path) => ProvisionConfig::load_from_file(path)?,
        None => ProvisionConfig::new(),
    };
    config.apply_env();
    Ok(config)
}

fn resolve_workdir(flag: Option<&Path>) -> Result<PathBuf> {
    let dir = match flag {
        Some(dir) => dir.to_path_buf(),
        None => match std::env::var_os(ENV_WORKDIR) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => std::env::current_dir().context("cannot determine current directory")?,
        },
    };
    // A missing directory is reported by preflight, not here
    Ok(std::fs::canonicalize(&dir).unwrap_or(dir))
}
