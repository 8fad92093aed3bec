//! Engine Provisioner Library
//!
//! Fetches a version-pinned prebuilt chess engine archive, extracts it,
//! searches the tree for the engine executable, installs it at a fixed path
//! with the execute bit set, verifies it and installs the host application's
//! dependency manifest.

pub mod archive;
pub mod cli;
pub mod command_runner;
pub mod command_traits;
pub mod config;
pub mod dependencies;
pub mod error;
pub mod fetch;
pub mod install;
pub mod locate;
pub mod lock;
pub mod process_guard;
pub mod provisioner;
pub mod resolve;
pub mod sanity;
pub mod stamp;
pub mod types;
pub mod uci;

// Re-export main types for convenience
pub use command_runner::{CommandOutput, run_command_safe};
pub use command_traits::CommandArgs;
pub use config::ProvisionConfig;
pub use dependencies::DependencyInstallArgs;
pub use error::{ProvisionError, Result};
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use provisioner::{ProvisionReport, Provisioner, verify_installed};
pub use types::{ArchiveFormat, ProvisionStep, ResolveStrategy};
pub use uci::EngineIdentity;
