//! Single-application disk image installer
//!
//! Checks whether the configured application is already present and, if
//! not, resolves the right disk image for the host architecture, downloads it
//! with progress, mounts it, copies the application bundle into place,
//! unmounts, cleans up and hands the installed app back for launching.
//!
//! Presentation is left to an [`InstallerFrontend`] plus the
//! [`InstallEvent`] stream; the bundled binary provides a terminal one.

mod async_task;
mod command;
mod config;
mod detection;
mod dmg;
mod download;
mod error;
mod orchestration;
mod progress;

pub use async_task::AsyncTask;
pub use command::{CommandRunner, TokioCommandRunner};
pub use config::{DownloadSource, InstallConfig};
pub use detection::{InstallationState, check_installation_state};
pub use dmg::{BUNDLE_EXTENSION, DiskImageInstaller, copy_tree, find_bundle};
pub use download::{
    Architecture, DEFAULT_FILENAME, DISK_IMAGE_EXTENSION, ProgressDownloader, ReleaseAsset,
    ReleaseMetadata, ReleaseResolver, select_asset,
};
pub use error::InstallerError;
pub use orchestration::{
    ALREADY_INSTALLED_STATUS, AttemptOutcome, INITIAL_STATUS, InstallationOrchestrator,
    InstallerFrontend, InstallerHandle, InstallerSnapshot, RetryDecision, RunOutcome,
};
pub use progress::{DownloadProgress, InstallEvent, InstallPhase, InstallStage};
