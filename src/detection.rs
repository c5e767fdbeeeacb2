//! Installation state detection
//!
//! The application counts as installed when anything exists at the
//! configured install path. The check only reads the filesystem.

use std::path::Path;

/// Installation state enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallationState {
    NotInstalled,
    Installed,
}

/// Check whether `install_path` already holds the application
pub fn check_installation_state(install_path: &Path) -> InstallationState {
    // symlink_metadata so a dangling alias still counts as "something is there"
    match install_path.symlink_metadata() {
        Ok(_) => InstallationState::Installed,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Could not inspect {}: {}", install_path.display(), e);
            }
            InstallationState::NotInstalled
        }
    }
}
