//! Installation progress, phases and events published to the front-end

use std::path::PathBuf;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Snapshot of download progress
///
/// Each snapshot replaces the previous one. `bytes_expected == 0` means the
/// server did not announce a length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadProgress {
    pub bytes_written: u64,
    pub bytes_expected: u64,
}

impl DownloadProgress {
    pub fn new(bytes_written: u64, bytes_expected: u64) -> Self {
        Self {
            bytes_written,
            bytes_expected,
        }
    }

    /// Fraction in `0.0..=1.0`, or `None` while the total is unknown
    pub fn fraction(&self) -> Option<f64> {
        if self.bytes_expected > 0 {
            Some((self.bytes_written as f64 / self.bytes_expected as f64).clamp(0.0, 1.0))
        } else {
            None
        }
    }

    /// "12.50/80.00 MB"
    pub fn megabytes_label(&self) -> String {
        format!(
            "{:.2}/{:.2} MB",
            self.bytes_written as f64 / BYTES_PER_MB,
            self.bytes_expected as f64 / BYTES_PER_MB
        )
    }
}

/// Sub-phase of an in-flight attempt, for status display only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStage {
    Resolving,
    Downloading,
    Installing,
    Launching,
}

impl InstallStage {
    pub fn status_text(&self) -> &'static str {
        match self {
            InstallStage::Resolving => "Resolving download URL...",
            InstallStage::Downloading => "Downloading the app...",
            InstallStage::Installing => "Installing the application...",
            InstallStage::Launching => "Launching the application...",
        }
    }
}

/// Orchestrator state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallPhase {
    CheckingExisting,
    AlreadyInstalled,
    Installing(InstallStage),
    Installed,
    /// Terminal for the attempt; carries the user-facing description
    Failed(String),
}

impl InstallPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstallPhase::AlreadyInstalled | InstallPhase::Installed | InstallPhase::Failed(_)
        )
    }
}

/// Update pushed to the front-end as the session advances
#[derive(Debug, Clone, PartialEq)]
pub enum InstallEvent {
    /// Human-readable status line changed
    Status(String),
    /// A new temporary directory was created for an attempt
    AttemptStarted { temp_dir: PathBuf },
    Progress(DownloadProgress),
    DownloadComplete,
    AlreadyInstalled { app_path: PathBuf },
    Installed { app_path: PathBuf },
    Failed { description: String, retryable: bool },
    Cancelled,
}
