#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::response::{IntoResponse, Response};
use dmg_installer::{
    AsyncTask, CommandRunner, DownloadSource, InstallConfig, InstallEvent, InstallerError,
    InstallerFrontend, InstallerHandle, RetryDecision,
};
use tokio::sync::mpsc;

pub const ATTACH_FAILURE: &str = "hdiutil: attach failed - no mountable file systems";

/// Serve `router` on an ephemeral localhost port
pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// One chunk right away, then a trickle every 30 seconds
pub async fn slow_body() -> Response {
    let stream = async_stream::stream! {
        yield Ok::<_, std::io::Error>(Bytes::from(vec![7u8; 4096]));
        loop {
            tokio::time::sleep(Duration::from_secs(30)).await;
            yield Ok(Bytes::from_static(b"x"));
        }
    };
    Body::from_stream(stream).into_response()
}

/// Stand-in for `hdiutil` that fakes a mounted volume with `Test.app`
#[derive(Default)]
pub struct FakeDiskTool {
    pub calls: Mutex<Vec<Vec<String>>>,
    pub fail_attach: bool,
    /// Cancelled from inside `attach`, as a user pressing Ctrl-C mid-mount
    pub cancel_on_attach: Mutex<Option<InstallerHandle>>,
}

impl FakeDiskTool {
    pub fn failing_attach() -> Self {
        Self {
            fail_attach: true,
            ..Self::default()
        }
    }

    pub fn verbs(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|args| args[0].clone())
            .collect()
    }
}

impl CommandRunner for FakeDiskTool {
    fn run(&self, program: &Path, args: &[String]) -> AsyncTask<Result<(), InstallerError>> {
        self.calls.lock().unwrap().push(args.to_vec());
        if args[0] == "attach" {
            if let Some(handle) = self.cancel_on_attach.lock().unwrap().take() {
                assert!(handle.cancel());
            }
        }

        let result = match args[0].as_str() {
            "attach" if self.fail_attach => Err(InstallerError::CommandFailed {
                command: program.display().to_string(),
                args: args.join(" "),
                status: Some(1),
                output: ATTACH_FAILURE.to_string(),
            }),
            "attach" => {
                let bundle = Path::new(&args[3]).join("Test.app/Contents");
                std::fs::create_dir_all(&bundle).unwrap();
                std::fs::write(bundle.join("Info.plist"), b"<plist/>").unwrap();
                Ok(())
            }
            "detach" => {
                let _ = std::fs::remove_dir_all(&args[1]);
                Ok(())
            }
            _ => Ok(()),
        };
        AsyncTask::ready(result)
    }
}

/// Front-end that answers retry prompts from a script, then aborts
#[derive(Default)]
pub struct ScriptedFrontend {
    decisions: Mutex<VecDeque<RetryDecision>>,
    pub prompts: Mutex<Vec<String>>,
    pub launched: Mutex<Vec<PathBuf>>,
}

impl ScriptedFrontend {
    pub fn answering(decisions: impl IntoIterator<Item = RetryDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl InstallerFrontend for ScriptedFrontend {
    fn confirm_retry(&self, description: &str) -> AsyncTask<RetryDecision> {
        self.prompts.lock().unwrap().push(description.to_string());
        let decision = self
            .decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RetryDecision::Abort);
        AsyncTask::ready(decision)
    }

    fn launch(&self, app_path: &Path) -> AsyncTask<Result<(), InstallerError>> {
        self.launched.lock().unwrap().push(app_path.to_path_buf());
        AsyncTask::ready(Ok(()))
    }
}

/// Sandbox with an `Applications` directory, a mount root and a temp root
pub struct Sandbox {
    pub root: tempfile::TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("Applications")).unwrap();
        std::fs::create_dir_all(root.path().join("tmp")).unwrap();
        Self { root }
    }

    pub fn install_path(&self) -> PathBuf {
        self.root.path().join("Applications/Test.app")
    }

    pub fn mount_point(&self) -> PathBuf {
        self.root.path().join("Volumes/TestInstaller")
    }

    pub fn temp_root(&self) -> PathBuf {
        self.root.path().join("tmp")
    }

    pub fn temp_root_is_empty(&self) -> bool {
        std::fs::read_dir(self.temp_root()).unwrap().next().is_none()
    }

    pub fn config(&self, download: DownloadSource) -> Arc<InstallConfig> {
        Arc::new(InstallConfig {
            app_name: "Test".to_string(),
            install_path: Some(self.install_path()),
            mount_point: Some(self.mount_point()),
            window_floating: false,
            disk_image_tool: PathBuf::from("/usr/bin/hdiutil"),
            open_tool: PathBuf::from("/usr/bin/open"),
            download,
        })
    }
}

pub fn direct(addr: SocketAddr) -> DownloadSource {
    DownloadSource::Direct {
        arm64_url: format!("http://{addr}/arm64.dmg").parse().unwrap(),
        x86_64_url: format!("http://{addr}/x64.dmg").parse().unwrap(),
    }
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<InstallEvent>) -> Vec<InstallEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
