//! Installation orchestration
//!
//! One [`InstallationOrchestrator`] drives the whole session:
//!
//! ```text
//! CheckingExisting ─┬─> AlreadyInstalled
//!                   └─> Installing(Resolving → Downloading → Installing → Launching)
//!                           ├─> Installed
//!                           ├─> Failed(description) ──retry──> Installing
//!                           └─> Failed("Installation canceled by the user.")
//! ```
//!
//! Construction only runs the install check. When nothing is installed the
//! phase stays `CheckingExisting` until [`InstallationOrchestrator::run`] (or
//! [`InstallationOrchestrator::start_installation`]) starts the first attempt.
//!
//! A cancel ends the attempt as cancelled even when the stage in flight then
//! fails or succeeds. A bundle already copied at that point is left in place
//! and not launched.
//!
//! At most one attempt is in flight. Each attempt owns a fresh temporary
//! directory that is removed before the outcome is reported.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::async_task::AsyncTask;
use crate::command::CommandRunner;
use crate::config::InstallConfig;
use crate::detection::{InstallationState, check_installation_state};
use crate::dmg::DiskImageInstaller;
use crate::download::{Architecture, ProgressDownloader, ReleaseResolver};
use crate::error::InstallerError;
use crate::progress::{DownloadProgress, InstallEvent, InstallPhase, InstallStage};

pub const INITIAL_STATUS: &str = "Initialization...";
pub const ALREADY_INSTALLED_STATUS: &str =
    "The application is already installed. You can delete the installation file.";

const TEMP_DIR_PREFIX: &str = "InstallerTemp_";
const PROGRESS_BUFFER: usize = 64;

/// Answer to the retry prompt shown after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Abort,
}

/// Decision points the core hands to whatever presents it
pub trait InstallerFrontend: Send + Sync {
    /// Show a failure and ask whether to run the whole pipeline again
    fn confirm_retry(&self, description: &str) -> AsyncTask<RetryDecision>;

    /// Open the freshly installed application
    fn launch(&self, app_path: &Path) -> AsyncTask<Result<(), InstallerError>>;
}

/// Result of a single `start_installation` call
#[derive(Debug)]
pub enum AttemptOutcome {
    Installed(PathBuf),
    Failed(InstallerError),
    Cancelled,
    /// An attempt was already running, or the app was already installed
    Skipped,
}

/// Result of a full [`InstallationOrchestrator::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    AlreadyInstalled,
    Installed(PathBuf),
    Cancelled,
    Skipped,
}

/// Read-only view of the session for front-ends
#[derive(Debug, Clone, PartialEq)]
pub struct InstallerSnapshot {
    pub phase: InstallPhase,
    pub status: String,
    pub is_installing: bool,
    pub is_download_complete: bool,
    pub is_already_installed: bool,
    pub progress: DownloadProgress,
    pub temp_dir: Option<PathBuf>,
}

struct Session {
    view: InstallerSnapshot,
    cancel: Option<CancellationToken>,
}

/// Cloneable handle given to front-ends at construction time
#[derive(Clone)]
pub struct InstallerHandle {
    session: Arc<Mutex<Session>>,
}

impl InstallerHandle {
    /// Cancel the in-flight attempt, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        let session = lock(&self.session);
        match &session.cancel {
            Some(token) => {
                log::info!("Cancel requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> InstallerSnapshot {
        lock(&self.session).view.clone()
    }

    pub fn is_installing(&self) -> bool {
        lock(&self.session).view.is_installing
    }
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives install check, pipeline attempts, retries and launch
pub struct InstallationOrchestrator {
    config: Arc<InstallConfig>,
    architecture: Architecture,
    resolver: ReleaseResolver,
    downloader: ProgressDownloader,
    installer: DiskImageInstaller,
    temp_root: PathBuf,
    session: Arc<Mutex<Session>>,
    events: mpsc::UnboundedSender<InstallEvent>,
}

impl InstallationOrchestrator {
    /// Build the orchestrator and run the install check
    pub fn new(
        config: Arc<InstallConfig>,
        runner: Arc<dyn CommandRunner>,
        events: mpsc::UnboundedSender<InstallEvent>,
    ) -> Result<Self, InstallerError> {
        let installer = DiskImageInstaller::new(config.disk_image_tool.clone(), runner);
        let orchestrator = Self {
            config,
            architecture: Architecture::current(),
            resolver: ReleaseResolver::new()?,
            downloader: ProgressDownloader::new()?,
            installer,
            temp_root: std::env::temp_dir(),
            session: Arc::new(Mutex::new(Session {
                view: InstallerSnapshot {
                    phase: InstallPhase::CheckingExisting,
                    status: INITIAL_STATUS.to_string(),
                    is_installing: false,
                    is_download_complete: false,
                    is_already_installed: false,
                    progress: DownloadProgress::default(),
                    temp_dir: None,
                },
                cancel: None,
            })),
            events,
        };
        orchestrator.check_existing();
        Ok(orchestrator)
    }

    /// Override the detected architecture
    pub fn with_architecture(mut self, architecture: Architecture) -> Self {
        self.architecture = architecture;
        self
    }

    /// Create per-attempt temporary directories under `root`
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = root.into();
        self
    }

    pub fn with_downloader(mut self, downloader: ProgressDownloader) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn handle(&self) -> InstallerHandle {
        InstallerHandle {
            session: Arc::clone(&self.session),
        }
    }

    pub fn snapshot(&self) -> InstallerSnapshot {
        self.handle().snapshot()
    }

    /// Check the install destination; moves to `AlreadyInstalled` when it is occupied
    pub fn check_existing(&self) -> InstallationState {
        let install_path = self.config.install_path();
        let state = check_installation_state(&install_path);

        if state == InstallationState::Installed {
            log::info!("{} is already installed at {}", self.config.app_name, install_path.display());
            {
                let mut session = lock(&self.session);
                if !session.view.is_installing {
                    session.view.phase = InstallPhase::AlreadyInstalled;
                    session.view.is_already_installed = true;
                    session.view.status = ALREADY_INSTALLED_STATUS.to_string();
                }
            }
            self.emit(InstallEvent::Status(ALREADY_INSTALLED_STATUS.to_string()));
            self.emit(InstallEvent::AlreadyInstalled {
                app_path: install_path,
            });
        }
        state
    }

    /// Install check, then attempts until success, cancellation or abort
    ///
    /// Retryable failures go to `frontend.confirm_retry`; `Retry` restarts
    /// the pipeline from the top, `Abort` returns the error.
    pub async fn run(&self, frontend: &dyn InstallerFrontend) -> Result<RunOutcome, InstallerError> {
        if self.snapshot().is_already_installed {
            return Ok(RunOutcome::AlreadyInstalled);
        }

        loop {
            match self.start_installation().await {
                AttemptOutcome::Installed(app_path) => {
                    if let Err(e) = frontend.launch(&app_path).await {
                        log::error!("Error launching application: {e}");
                    }
                    return Ok(RunOutcome::Installed(app_path));
                }
                AttemptOutcome::Cancelled => return Ok(RunOutcome::Cancelled),
                AttemptOutcome::Skipped => return Ok(RunOutcome::Skipped),
                AttemptOutcome::Failed(error) => {
                    match frontend.confirm_retry(&error.to_string()).await {
                        RetryDecision::Retry => {
                            log::info!("Retrying installation");
                            continue;
                        }
                        RetryDecision::Abort => return Err(error),
                    }
                }
            }
        }
    }

    /// Run one full attempt of the pipeline
    ///
    /// No-op ([`AttemptOutcome::Skipped`]) while another attempt is in flight
    /// or once the application was found already installed.
    pub async fn start_installation(&self) -> AttemptOutcome {
        let token = {
            let mut session = lock(&self.session);
            if session.view.is_installing || session.view.is_already_installed {
                return AttemptOutcome::Skipped;
            }
            let token = CancellationToken::new();
            session.cancel = Some(token.clone());
            session.view.is_installing = true;
            session.view.is_download_complete = false;
            session.view.progress = DownloadProgress::default();
            token
        };

        log::info!("Architecture: {}", self.architecture);
        let result = self.attempt(&token).await;
        self.finish(result)
    }

    async fn attempt(&self, token: &CancellationToken) -> Result<PathBuf, InstallerError> {
        let temp_dir = tempfile::Builder::new()
            .prefix(TEMP_DIR_PREFIX)
            .tempdir_in(&self.temp_root)
            .map_err(|e| InstallerError::io_at("create temporary directory in", &self.temp_root, e))?;
        log::info!("Temporary directory: {}", temp_dir.path().display());

        lock(&self.session).view.temp_dir = Some(temp_dir.path().to_path_buf());
        self.emit(InstallEvent::AttemptStarted {
            temp_dir: temp_dir.path().to_path_buf(),
        });

        // A cancel wins over whatever the stage in flight produced.
        let result = match self.pipeline(temp_dir.path(), token).await {
            Err(e) if token.is_cancelled() && !e.is_cancelled() => {
                log::info!("Discarding failure after cancel: {e}");
                Err(InstallerError::InstallationCancelled)
            }
            Ok(app_path) if token.is_cancelled() => {
                log::info!("Cancelled after {} was installed; it will not be launched", app_path.display());
                Err(InstallerError::InstallationCancelled)
            }
            result => result,
        };
        remove_temp_dir(temp_dir);
        lock(&self.session).view.temp_dir = None;

        if result.is_ok() {
            self.set_stage(InstallStage::Launching);
        }
        result
    }

    async fn pipeline(&self, temp_dir: &Path, token: &CancellationToken) -> Result<PathBuf, InstallerError> {
        self.set_stage(InstallStage::Resolving);
        let url = self
            .resolver
            .resolve_download_url(&self.config.download, self.architecture)
            .await?;
        log::info!("Download URL: {url}");
        bail_if_cancelled(token)?;

        self.set_stage(InstallStage::Downloading);
        let image = self.download_with_progress(&url, temp_dir, token).await?;
        lock(&self.session).view.is_download_complete = true;
        self.emit(InstallEvent::DownloadComplete);
        bail_if_cancelled(token)?;

        self.set_stage(InstallStage::Installing);
        self.installer
            .mount_and_install(&image, &self.config.mount_point(), &self.config.install_path())
            .await
    }

    /// Download while applying progress snapshots to the session from this task
    async fn download_with_progress(
        &self,
        url: &Url,
        temp_dir: &Path,
        token: &CancellationToken,
    ) -> Result<PathBuf, InstallerError> {
        let (tx, mut rx) = mpsc::channel(PROGRESS_BUFFER);
        let download = self.downloader.download(url, temp_dir, token, tx);
        tokio::pin!(download);

        let result = loop {
            tokio::select! {
                result = &mut download => break result,
                Some(progress) = rx.recv() => self.record_progress(progress),
            }
        };
        while let Ok(progress) = rx.try_recv() {
            self.record_progress(progress);
        }
        result
    }

    fn record_progress(&self, progress: DownloadProgress) {
        lock(&self.session).view.progress = progress;
        self.emit(InstallEvent::Progress(progress));
    }

    fn set_stage(&self, stage: InstallStage) {
        {
            let mut session = lock(&self.session);
            session.view.phase = InstallPhase::Installing(stage);
            session.view.status = stage.status_text().to_string();
        }
        self.emit(InstallEvent::Status(stage.status_text().to_string()));
    }

    fn finish(&self, result: Result<PathBuf, InstallerError>) -> AttemptOutcome {
        let mut session = lock(&self.session);
        session.view.is_installing = false;
        session.cancel = None;

        match result {
            Ok(app_path) => {
                log::info!("Installed {}", app_path.display());
                session.view.phase = InstallPhase::Installed;
                drop(session);
                self.emit(InstallEvent::Installed {
                    app_path: app_path.clone(),
                });
                AttemptOutcome::Installed(app_path)
            }
            Err(error) => {
                let description = error.to_string();
                session.view.phase = InstallPhase::Failed(description.clone());
                drop(session);

                if error.is_cancelled() {
                    log::info!("Installation cancelled");
                    self.emit(InstallEvent::Cancelled);
                    AttemptOutcome::Cancelled
                } else {
                    log::error!("Installation Error: {description}");
                    self.emit(InstallEvent::Failed {
                        description,
                        retryable: error.is_retryable(),
                    });
                    AttemptOutcome::Failed(error)
                }
            }
        }
    }

    fn emit(&self, event: InstallEvent) {
        // A front-end that stopped listening does not stop the installation.
        let _ = self.events.send(event);
    }
}

fn bail_if_cancelled(token: &CancellationToken) -> Result<(), InstallerError> {
    if token.is_cancelled() {
        Err(InstallerError::InstallationCancelled)
    } else {
        Ok(())
    }
}

/// Best-effort removal; a leftover temp directory never fails the attempt
fn remove_temp_dir(temp_dir: TempDir) {
    let path = temp_dir.path().to_path_buf();
    log::info!("Remove temporary directory...");
    if let Err(e) = temp_dir.close() {
        log::warn!("Failed to remove temporary directory {}: {}", path.display(), e);
    }
}
