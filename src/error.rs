//! Installer error type
//!
//! Every pipeline stage reports failures through [`InstallerError`]. The
//! `Display` output of each variant is the description shown to the user.

use std::io;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::download::Architecture;

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("Architecture is not supported.")]
    UnsupportedArchitecture,

    #[error("Network error: HTTP {0}.")]
    HttpError(u16),

    #[error("Could not find the .dmg file for architecture {0} in the release assets.")]
    DownloadAssetNotFound(Architecture),

    #[error("Application file (.app) not found.")]
    AppNotFound,

    /// External command exited with a non-zero status
    #[error(
        "Command execution failed: {command} {args}. Status {}.\nOutput: {output}",
        describe_status(.status)
    )]
    CommandFailed {
        command: String,
        args: String,
        status: Option<i32>,
        output: String,
    },

    #[error("Installation canceled by the user.")]
    InstallationCancelled,

    #[error("Failed to launch {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected release metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Download stalled: no data received for {0:?}.")]
    Stalled(Duration),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl InstallerError {
    /// Whether the user should be offered a retry for this failure
    pub fn is_retryable(&self) -> bool {
        !matches!(self, InstallerError::InstallationCancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, InstallerError::InstallationCancelled)
    }

    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        InstallerError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn io_at(action: &str, path: &Path, source: io::Error) -> Self {
        Self::io(format!("Failed to {action} {}", path.display()), source)
    }
}

/// Attach a path-aware message to `io::Result`s
pub(crate) trait IoResultExt<T> {
    fn at_path(self, action: &str, path: &Path) -> Result<T, InstallerError>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at_path(self, action: &str, path: &Path) -> Result<T, InstallerError> {
        self.map_err(|e| InstallerError::io_at(action, path, e))
    }
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "terminated by signal".to_string(),
    }
}
