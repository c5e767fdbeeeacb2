//! Terminal front-end
//!
//! Renders the orchestrator's event stream as a progress bar, asks the retry
//! question with `inquire`, and launches the installed app with `open`.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dmg_installer::{
    AsyncTask, CommandRunner, InstallConfig, InstallEvent, InstallationOrchestrator,
    InstallerError, InstallerFrontend, RetryDecision, RunOutcome, TokioCommandRunner,
};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use tokio::sync::mpsc;

use crate::cli::Args;

/// Exit status after a user cancellation (as for SIGINT)
const EXIT_CANCELLED: i32 = 130;

#[derive(Clone)]
struct BarStyles {
    bytes: ProgressStyle,
    spinner: ProgressStyle,
}

impl BarStyles {
    fn new() -> Result<Self> {
        Ok(Self {
            bytes: ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {bytes}/{total_bytes}  {msg}")
                .context("Invalid progress bar template")?
                .progress_chars("█▓░"),
            spinner: ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} {bytes}")
                .context("Invalid spinner template")?,
        })
    }
}

/// Front-end that talks to a terminal user
struct TerminalFrontend {
    bar: ProgressBar,
    runner: Arc<dyn CommandRunner>,
    open_tool: std::path::PathBuf,
    interactive: bool,
    launch: bool,
}

impl InstallerFrontend for TerminalFrontend {
    fn confirm_retry(&self, description: &str) -> AsyncTask<RetryDecision> {
        self.bar.finish_and_clear();
        print_colored(Color::Red, true, "\n❌ Installation Error");
        eprintln!("   {description}");

        if !self.interactive {
            return AsyncTask::ready(RetryDecision::Abort);
        }

        AsyncTask::from_future(async {
            let answer = tokio::task::spawn_blocking(|| {
                Confirm::new("Repeat the installation?")
                    .with_default(true)
                    .with_help_message("No closes the installer")
                    .prompt()
            })
            .await;

            match answer {
                Ok(Ok(true)) => RetryDecision::Retry,
                Ok(Ok(false)) => RetryDecision::Abort,
                Ok(Err(e)) => {
                    log::debug!("Retry prompt ended: {e}");
                    RetryDecision::Abort
                }
                Err(e) => {
                    log::error!("Retry prompt task failed: {e}");
                    RetryDecision::Abort
                }
            }
        })
    }

    fn launch(&self, app_path: &Path) -> AsyncTask<Result<(), InstallerError>> {
        if !self.launch {
            log::info!("Not launching {} (--no-launch)", app_path.display());
            return AsyncTask::ready(Ok(()));
        }
        log::info!("Launching {}", app_path.display());
        self.runner
            .run(&self.open_tool, &[app_path.display().to_string()])
    }
}

/// Consume orchestrator events and drive the progress bar
fn spawn_progress_task(
    bar: ProgressBar,
    styles: BarStyles,
    mut rx: mpsc::UnboundedReceiver<InstallEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                InstallEvent::Status(text) => bar.set_message(text),
                InstallEvent::AttemptStarted { temp_dir } => {
                    log::debug!("Attempt working in {}", temp_dir.display());
                    bar.reset();
                    bar.set_style(styles.spinner.clone());
                    bar.enable_steady_tick(Duration::from_millis(120));
                }
                InstallEvent::Progress(progress) => {
                    if progress.bytes_expected > 0 && bar.length() != Some(progress.bytes_expected) {
                        bar.disable_steady_tick();
                        bar.set_style(styles.bytes.clone());
                        bar.set_length(progress.bytes_expected);
                    }
                    bar.set_position(progress.bytes_written);
                }
                InstallEvent::DownloadComplete => {
                    bar.set_style(styles.spinner.clone());
                    bar.enable_steady_tick(Duration::from_millis(120));
                }
                InstallEvent::AlreadyInstalled { app_path } => {
                    print_colored(Color::Green, false, &format!("✓ Found {}", app_path.display()));
                }
                InstallEvent::Installed { app_path } => {
                    bar.finish_and_clear();
                    print_colored(
                        Color::Green,
                        true,
                        &format!("✅ Installed to {}", app_path.display()),
                    );
                }
                InstallEvent::Failed { .. } => bar.finish_and_clear(),
                InstallEvent::Cancelled => {
                    bar.finish_and_clear();
                    print_colored(Color::Yellow, false, "Installation canceled by the user.");
                }
            }
        }
    })
}

/// Run the installer session; returns the process exit status
pub async fn run_install(config: Arc<InstallConfig>, args: &Args) -> Result<i32> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true));
    let _ = writeln!(stdout, "📦 {} Installer", config.app_name);
    let _ = stdout.reset();
    log::debug!(
        "window_floating = {} (no effect in terminal mode)",
        config.window_floating
    );

    let runner: Arc<dyn CommandRunner> = Arc::new(TokioCommandRunner);
    let (tx, rx) = mpsc::unbounded_channel();
    let orchestrator = InstallationOrchestrator::new(Arc::clone(&config), Arc::clone(&runner), tx)
        .context("Failed to initialize installer")?;

    let styles = BarStyles::new()?;
    let bar = ProgressBar::new_spinner();
    bar.set_style(styles.spinner.clone());
    let progress_task = spawn_progress_task(bar.clone(), styles, rx);

    // Ctrl-C cancels a running attempt; with nothing running it exits.
    let handle = orchestrator.handle();
    let signal_task = tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !handle.cancel() {
                std::process::exit(EXIT_CANCELLED);
            }
        }
    });

    let frontend = TerminalFrontend {
        bar,
        runner,
        open_tool: config.open_tool.clone(),
        interactive: !args.no_interaction,
        launch: !args.no_launch,
    };
    let outcome = orchestrator.run(&frontend).await;

    signal_task.abort();
    // Closing the event channel lets the progress task drain and stop.
    drop(orchestrator);
    progress_task.await.ok();

    match outcome {
        Ok(RunOutcome::AlreadyInstalled) => {
            println!("{}", dmg_installer::ALREADY_INSTALLED_STATUS);
            Ok(0)
        }
        Ok(RunOutcome::Installed(_)) | Ok(RunOutcome::Skipped) => Ok(0),
        Ok(RunOutcome::Cancelled) => Ok(EXIT_CANCELLED),
        Err(e) => Err(anyhow::Error::new(e).context("Installation aborted")),
    }
}

fn print_colored(color: Color, bold: bool, line: &str) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(bold));
    let _ = writeln!(stdout, "{line}");
    let _ = stdout.reset();
}
