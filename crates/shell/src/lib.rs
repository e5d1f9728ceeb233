#![deny(unused)]
//! Enforcement shell installed inside sandbox containers.
//!
//! Every command line is checked against the policy artifact mounted at
//! [`POLICY_ARTIFACT_PATH`] before `/bin/sh` sees it. The shell fails
//! closed: if the artifact is missing or unreadable, every command is
//! denied.

use chrono::Utc;
use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use shieldbox_core::PolicyResult;
use shieldbox_policy::PolicyArtifact;

pub use shieldbox_core::paths::POLICY_ARTIFACT_PATH;

/// Decision log inside the container.
pub const SHELL_LOG_PATH: &str = "/var/log/shieldbox/shell.log";

/// Exit status for a denied command (the conventional "cannot execute").
pub const DENIED_EXIT: i32 = 126;

/// Exit status when the interpreter itself cannot be started.
pub const EXEC_FAILED_EXIT: i32 = 127;

const INTERPRETER: &str = "/bin/sh";
const PROMPT: &str = "shieldbox$ ";

/// What the process was asked to do, from its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Command(String),
    Interactive,
    Usage,
}

/// Parse `sh`-style arguments: leading single-letter flags from `l`, `i`
/// and `c`, alone or combined (`-lc`, `-l -c`). With `c` the next argument
/// is the command line; later arguments are ignored as `$0`, `$1`, ...
pub fn parse_args(args: &[String]) -> Invocation {
    let mut command = false;
    for arg in args {
        let Some(flags) = arg.strip_prefix('-') else {
            return if command {
                Invocation::Command(arg.clone())
            } else {
                Invocation::Usage
            };
        };
        if flags.is_empty() || !flags.chars().all(|c| matches!(c, 'l' | 'i' | 'c')) {
            return Invocation::Usage;
        }
        command |= flags.contains('c');
    }

    if command {
        Invocation::Usage
    } else {
        Invocation::Interactive
    }
}

#[derive(Serialize)]
struct LogLine<'a> {
    timestamp: String,
    command: &'a str,
    allowed: bool,
    reason: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule: Option<&'a str>,
}

pub struct Shell {
    policy: std::result::Result<PolicyArtifact, String>,
    log_path: Option<PathBuf>,
    interpreter: PathBuf,
}

impl Shell {
    /// Load the artifact at `path`. A load failure is kept and turns every
    /// later check into a denial.
    pub fn load(path: &Path) -> Self {
        let policy = PolicyArtifact::load(path).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Policy artifact unavailable");
            format!("policy unavailable ({}): {}", path.display(), e)
        });
        Self {
            policy,
            log_path: Some(PathBuf::from(SHELL_LOG_PATH)),
            interpreter: PathBuf::from(INTERPRETER),
        }
    }

    pub fn from_artifact(artifact: PolicyArtifact) -> Self {
        Self {
            policy: Ok(artifact),
            log_path: Some(PathBuf::from(SHELL_LOG_PATH)),
            interpreter: PathBuf::from(INTERPRETER),
        }
    }

    /// Write decisions to `path` instead of [`SHELL_LOG_PATH`]; `None`
    /// disables the log.
    pub fn with_log(mut self, path: Option<PathBuf>) -> Self {
        self.log_path = path;
        self
    }

    pub fn check(&self, command: &str) -> PolicyResult {
        match &self.policy {
            Ok(artifact) => artifact.evaluate(command),
            Err(reason) => PolicyResult::block(None, reason.clone()),
        }
    }

    /// Check `command` and log the decision. A denial is reported on `err`
    /// and yields `None`; otherwise the interpreter invocation to run.
    pub fn gate(&self, command: &str, err: &mut impl Write) -> Option<Command> {
        let result = self.check(command);
        self.log(command, &result);

        if !result.allowed {
            let _ = writeln!(err, "shieldbox: command blocked: {}", result.reason);
            return None;
        }

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg("-c").arg(command);
        Some(cmd)
    }

    /// `-c <command>`: replace this process with the interpreter, or return
    /// the exit status to use when that did not happen.
    pub fn run_command(&self, command: &str) -> i32 {
        let Some(mut cmd) = self.gate(command, &mut std::io::stderr()) else {
            return DENIED_EXIT;
        };
        let e = exec(&mut cmd);
        eprintln!("shieldbox: failed to run {}: {}", self.interpreter.display(), e);
        EXEC_FAILED_EXIT
    }

    /// Read command lines from `input` until EOF or `exit`, checking each.
    /// Returns the status of the last command.
    pub fn interactive(
        &self,
        input: impl BufRead,
        out: &mut impl Write,
        err: &mut impl Write,
    ) -> std::io::Result<i32> {
        let mut status = 0;
        write!(out, "{}", PROMPT)?;
        out.flush()?;

        for line in input.lines() {
            let line = line?;
            let command = line.trim();

            match command {
                "" => {}
                "exit" => break,
                _ => {
                    status = match self.gate(command, err) {
                        None => DENIED_EXIT,
                        Some(mut cmd) => match cmd.status() {
                            Ok(exit) => exit.code().unwrap_or(EXEC_FAILED_EXIT),
                            Err(e) => {
                                writeln!(err, "shieldbox: failed to run command: {}", e)?;
                                EXEC_FAILED_EXIT
                            }
                        },
                    };
                }
            }

            write!(out, "{}", PROMPT)?;
            out.flush()?;
        }
        Ok(status)
    }

    /// Append one JSON line per decision. Failures are ignored.
    fn log(&self, command: &str, result: &PolicyResult) {
        let Some(path) = &self.log_path else {
            return;
        };
        let line = LogLine {
            timestamp: Utc::now().to_rfc3339(),
            command,
            allowed: result.allowed,
            reason: &result.reason,
            rule: result.matched_rule.as_ref().map(|r| r.pattern.as_str()),
        };
        if let Err(e) = append_json_line(path, &line) {
            tracing::debug!(path = %path.display(), error = %e, "Shell log not written");
        }
    }
}

fn append_json_line(path: &Path, line: &impl Serialize) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let mut json = serde_json::to_string(line)?;
    json.push('\n');
    file.write_all(json.as_bytes())
}

#[cfg(unix)]
fn exec(cmd: &mut Command) -> std::io::Error {
    use std::os::unix::process::CommandExt;
    cmd.exec()
}

#[cfg(not(unix))]
fn exec(cmd: &mut Command) -> std::io::Error {
    match cmd.status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(EXEC_FAILED_EXIT)),
        Err(e) => e,
    }
}
