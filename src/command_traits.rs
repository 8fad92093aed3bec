//! Type-safe external command contracts.
//!
//! Commands the provisioner runs are described by structs implementing
//! [`CommandArgs`] instead of ad-hoc string vectors, so the argument layout
//! of each external tool lives in exactly one place.

/// Trait for typed external command arguments.
///
/// # Contract
///
/// - `program()`: the executable, either a bare name resolved via `PATH` or a path.
/// - `to_cli_args()`: arguments exactly as the program expects them.
/// - `get_env_vars()`: extra environment variables for the child.
pub trait CommandArgs {
    fn program(&self) -> &str;

    fn to_cli_args(&self) -> Vec<String>;

    fn get_env_vars(&self) -> Vec<(String, String)>;

    /// Human-readable command line for logs and diagnostics
    fn display(&self) -> String {
        let mut parts = vec![self.program().to_string()];
        parts.extend(self.to_cli_args());
        parts.join(" ")
    }
}
