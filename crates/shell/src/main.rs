//! `shieldbox-shell`: policy-enforcing replacement for the container shell.
//!
//! Usage: `shieldbox-shell [-l] [-i] -c <command>` or `shieldbox-shell`
//! for an interactive session.

use std::path::Path;

use shieldbox_shell::{parse_args, Invocation, Shell, POLICY_ARTIFACT_PATH};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SHIELDBOX_SHELL_LOG";

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let shell = Shell::load(Path::new(POLICY_ARTIFACT_PATH));

    let status = match parse_args(&args) {
        Invocation::Command(command) => shell.run_command(&command),
        Invocation::Interactive => interactive(&shell)?,
        Invocation::Usage => {
            eprintln!("usage: shieldbox-shell [-l] [-i] [-c <command>]");
            2
        }
    };
    std::process::exit(status);
}

fn interactive(shell: &Shell) -> anyhow::Result<i32> {
    let stdin = std::io::stdin();
    let status = shell.interactive(stdin.lock(), &mut std::io::stdout(), &mut std::io::stderr())?;
    Ok(status)
}
