//! Disk image mounting and application bundle installation
//!
//! The mount is a scoped resource: once `attach` has been issued, a forced
//! `detach` is attempted on every exit path. Detach failures are logged and
//! otherwise ignored, so a stale mount point at the fixed path can make the
//! next attach fail.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::command::CommandRunner;
use crate::error::{InstallerError, IoResultExt};

/// Extension identifying an application bundle
pub const BUNDLE_EXTENSION: &str = "app";

/// Mounts a disk image and copies the contained application bundle
#[derive(Clone)]
pub struct DiskImageInstaller {
    tool: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl DiskImageInstaller {
    /// `tool` is the disk image utility, normally `/usr/bin/hdiutil`
    pub fn new(tool: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            tool: tool.into(),
            runner,
        }
    }

    /// Attach `image` at `mount_point`, copy the first `.app` bundle found at
    /// its root to `destination`, then detach.
    ///
    /// Returns the path of the installed bundle.
    pub async fn mount_and_install(
        &self,
        image: &Path,
        mount_point: &Path,
        destination: &Path,
    ) -> Result<PathBuf, InstallerError> {
        log::info!(
            "Mounting {} at {}",
            image.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
            mount_point.display()
        );

        let mount = match DmgMount::attach(self, image, mount_point).await {
            Ok(mount) => mount,
            Err(e) => {
                // A failed attach can still leave a partial mount behind.
                detach(self.runner.as_ref(), &self.tool, mount_point).await;
                return Err(e);
            }
        };

        let result = install_bundle(mount.path(), destination).await;
        mount.release().await;
        result.map(|()| destination.to_path_buf())
    }
}

/// RAII wrapper for an attached disk image
///
/// [`DmgMount::release`] detaches in place. If the guard is dropped without
/// being released (the owning future was dropped mid-flight), the detach is
/// spawned onto the current runtime instead.
struct DmgMount {
    tool: PathBuf,
    runner: Arc<dyn CommandRunner>,
    mount_point: PathBuf,
    released: bool,
}

impl DmgMount {
    async fn attach(
        installer: &DiskImageInstaller,
        image: &Path,
        mount_point: &Path,
    ) -> Result<Self, InstallerError> {
        let args = vec![
            "attach".to_string(),
            "-nobrowse".to_string(),
            "-mountpoint".to_string(),
            mount_point.display().to_string(),
            image.display().to_string(),
        ];
        installer.runner.run(&installer.tool, &args).await?;

        Ok(Self {
            tool: installer.tool.clone(),
            runner: Arc::clone(&installer.runner),
            mount_point: mount_point.to_path_buf(),
            released: false,
        })
    }

    #[inline]
    fn path(&self) -> &Path {
        &self.mount_point
    }

    async fn release(mut self) {
        self.released = true;
        detach(self.runner.as_ref(), &self.tool, &self.mount_point).await;
    }
}

impl Drop for DmgMount {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let runner = Arc::clone(&self.runner);
        let tool = self.tool.clone();
        let mount_point = std::mem::take(&mut self.mount_point);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    detach(runner.as_ref(), &tool, &mount_point).await;
                });
            }
            Err(_) => log::warn!(
                "No runtime available to detach {}; it may need `hdiutil detach -force`",
                mount_point.display()
            ),
        }
    }
}

/// Best-effort forced detach; errors are logged and discarded
async fn detach(runner: &dyn CommandRunner, tool: &Path, mount_point: &Path) {
    log::info!("Unmounting {}...", mount_point.display());
    let args = vec![
        "detach".to_string(),
        mount_point.display().to_string(),
        "-force".to_string(),
    ];
    if let Err(e) = runner.run(tool, &args).await {
        log::warn!("Ignoring detach failure for {}: {}", mount_point.display(), e);
    }
}

/// First entry (by name) at the root of `mount_point` with the bundle extension
pub async fn find_bundle(mount_point: &Path) -> Result<PathBuf, InstallerError> {
    let mut entries = tokio::fs::read_dir(mount_point)
        .await
        .at_path("read", mount_point)?;

    let mut bundles = Vec::new();
    while let Some(entry) = entries.next_entry().await.at_path("read", mount_point)? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some(BUNDLE_EXTENSION) {
            bundles.push(path);
        }
    }
    bundles.sort();
    bundles.into_iter().next().ok_or(InstallerError::AppNotFound)
}

async fn install_bundle(mount_point: &Path, destination: &Path) -> Result<(), InstallerError> {
    let bundle = find_bundle(mount_point).await?;
    log::info!("Copying {} to {}", bundle.display(), destination.display());

    let destination = destination.to_path_buf();
    tokio::task::spawn_blocking(move || copy_tree(&bundle, &destination))
        .await
        .map_err(|e| InstallerError::io("Copy task failed", std::io::Error::other(e)))?
}

/// Recursively copy `source` to `destination`, which must not exist yet
///
/// Symlinks inside the bundle are recreated, not followed. File contents and
/// permission bits are copied; extended attributes and timestamps are not.
/// A failed copy removes whatever it already wrote.
pub fn copy_tree(source: &Path, destination: &Path) -> Result<(), InstallerError> {
    if destination.symlink_metadata().is_ok() {
        return Err(InstallerError::io_at(
            "install to",
            destination,
            std::io::Error::from(std::io::ErrorKind::AlreadyExists),
        ));
    }

    let result = copy_entries(source, destination);
    if result.is_err() {
        if let Err(e) = std::fs::remove_dir_all(destination) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove partial copy at {}: {}", destination.display(), e);
            }
        }
    }
    result
}

fn copy_entries(source: &Path, destination: &Path) -> Result<(), InstallerError> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source).to_path_buf();
            InstallerError::io_at("read", &path, std::io::Error::other(e))
        })?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| InstallerError::io("Unexpected bundle layout", std::io::Error::other(e)))?;
        let target = destination.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir(&target).at_path("create", &target)?;
        } else if file_type.is_symlink() {
            let link = std::fs::read_link(entry.path()).at_path("read link", entry.path())?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&link, &target).at_path("create link", &target)?;
            #[cfg(not(unix))]
            log::warn!("Skipping symlink {} -> {}", target.display(), link.display());
        } else {
            std::fs::copy(entry.path(), &target).at_path("copy to", &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bundle(root: &Path, name: &str) -> PathBuf {
        let bundle = root.join(name);
        std::fs::create_dir_all(bundle.join("Contents/MacOS")).unwrap();
        std::fs::write(bundle.join("Contents/Info.plist"), b"<plist/>").unwrap();
        std::fs::write(bundle.join("Contents/MacOS/App"), b"#!/bin/sh\n").unwrap();
        bundle
    }

    #[tokio::test]
    async fn finds_first_bundle_by_name() {
        let mount = tempfile::tempdir().unwrap();
        std::fs::write(mount.path().join("README.txt"), b"hi").unwrap();
        make_bundle(mount.path(), "Zeta.app");
        make_bundle(mount.path(), "Alpha.app");

        let found = find_bundle(mount.path()).await.unwrap();
        assert_eq!(found.file_name().unwrap(), "Alpha.app");
    }

    #[tokio::test]
    async fn missing_bundle_is_app_not_found() {
        let mount = tempfile::tempdir().unwrap();
        std::fs::create_dir(mount.path().join("Resources")).unwrap();
        assert!(matches!(
            find_bundle(mount.path()).await,
            Err(InstallerError::AppNotFound)
        ));
    }

    #[test]
    fn copies_bundle_tree() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let bundle = make_bundle(src.path(), "Demo.app");
        #[cfg(unix)]
        std::os::unix::fs::symlink("MacOS/App", bundle.join("Contents/Current")).unwrap();

        let target = dst.path().join("Demo.app");
        copy_tree(&bundle, &target).unwrap();

        assert_eq!(std::fs::read(target.join("Contents/Info.plist")).unwrap(), b"<plist/>");
        assert!(target.join("Contents/MacOS/App").is_file());
        #[cfg(unix)]
        assert_eq!(
            std::fs::read_link(target.join("Contents/Current")).unwrap(),
            PathBuf::from("MacOS/App")
        );
        // Source is left in place: copy, not move.
        assert!(bundle.exists());
    }

    #[cfg(unix)]
    #[test]
    fn keeps_executable_bits() {
        use std::os::unix::fs::PermissionsExt;

        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let bundle = make_bundle(src.path(), "Demo.app");
        let exe = bundle.join("Contents/MacOS/App");
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

        let target = dst.path().join("Demo.app");
        copy_tree(&bundle, &target).unwrap();

        let mode = std::fs::metadata(target.join("Contents/MacOS/App"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn refuses_to_overwrite_destination() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let bundle = make_bundle(src.path(), "Demo.app");
        let target = dst.path().join("Demo.app");
        std::fs::create_dir(&target).unwrap();

        assert!(copy_tree(&bundle, &target).is_err());
        assert!(target.exists());
    }
}
