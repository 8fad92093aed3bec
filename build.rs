//! Generates the man page and shell completions from the CLI definition.
//!
//! Output lands in `$OUT_DIR`; packaging copies it from there.

use clap::CommandFactory;
use clap_complete::{Shell, generate_to};
use std::path::PathBuf;

#[allow(dead_code)]
mod cli {
    include!("src/cli.rs");
}

fn main() -> std::io::Result<()> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let out_dir = match std::env::var_os("OUT_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => return Ok(()),
    };

    let mut cmd = cli::Cli::command();
    let name = cmd.get_name().to_string();

    let man = clap_mangen::Man::new(cmd.clone());
    let mut buffer = Vec::new();
    man.render(&mut buffer)?;
    std::fs::write(out_dir.join(format!("{}.1", name)), buffer)?;

    for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
        generate_to(shell, &mut cmd, &name, &out_dir)?;
    }

    Ok(())
}
