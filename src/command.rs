//! External command execution
//!
//! Output of a command is captured and only surfaces (inside
//! [`InstallerError::CommandFailed`]) when the command fails.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::async_task::AsyncTask;
use crate::error::InstallerError;

/// Runs an external executable to completion
pub trait CommandRunner: Send + Sync {
    /// Resolve `Ok(())` on exit status 0, [`InstallerError::CommandFailed`] on
    /// any other status, [`InstallerError::Spawn`] if the process never started.
    fn run(&self, program: &Path, args: &[String]) -> AsyncTask<Result<(), InstallerError>>;
}

/// [`CommandRunner`] backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

impl CommandRunner for TokioCommandRunner {
    fn run(&self, program: &Path, args: &[String]) -> AsyncTask<Result<(), InstallerError>> {
        let program = program.to_path_buf();
        let args = args.to_vec();
        AsyncTask::from_future(run_captured(program, args))
    }
}

async fn run_captured(program: PathBuf, args: Vec<String>) -> Result<(), InstallerError> {
    let command = program.display().to_string();
    log::debug!("Running {} {}", command, args.join(" "));

    let output = tokio::process::Command::new(&program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| InstallerError::Spawn {
            command: command.clone(),
            source,
        })?;

    if output.status.success() {
        return Ok(());
    }

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    Err(InstallerError::CommandFailed {
        command,
        args: args.join(" "),
        status: output.status.code(),
        output: combined.trim().to_string(),
    })
}
