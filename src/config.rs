//! Installer configuration
//!
//! Loaded once at startup from TOML and shared read-only (`Arc<InstallConfig>`)
//! for the lifetime of the process.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::download::Architecture;

const CONFIG_DIR_NAME: &str = "dmg-installer";
const CONFIG_FILE_NAME: &str = "installer.toml";

/// Where the disk image comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DownloadSource {
    /// One fixed URL per architecture
    Direct { arm64_url: Url, x86_64_url: Url },
    /// A release metadata endpoint listing downloadable assets
    Metadata { endpoint: Url },
}

impl DownloadSource {
    /// Configured URL for `arch` in direct mode
    pub fn direct_url(&self, arch: Architecture) -> Option<&Url> {
        match (self, arch) {
            (DownloadSource::Direct { arm64_url, .. }, Architecture::Arm64) => Some(arm64_url),
            (DownloadSource::Direct { x86_64_url, .. }, Architecture::X86_64) => Some(x86_64_url),
            _ => None,
        }
    }

    fn urls(&self) -> Vec<&Url> {
        match self {
            DownloadSource::Direct {
                arm64_url,
                x86_64_url,
            } => vec![arm64_url, x86_64_url],
            DownloadSource::Metadata { endpoint } => vec![endpoint],
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_disk_image_tool() -> PathBuf {
    PathBuf::from("/usr/bin/hdiutil")
}

fn default_open_tool() -> PathBuf {
    PathBuf::from("/usr/bin/open")
}

/// Process-wide installer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Display name of the application, e.g. "Proxer"
    pub app_name: String,

    /// Where the bundle is installed (default `/Applications/<app_name>.app`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_path: Option<PathBuf>,

    /// Where the disk image is attached (default `/Volumes/<app_name>Installer`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<PathBuf>,

    /// Keep the installer window above other windows. Only meaningful to a GUI front-end.
    #[serde(default = "default_true")]
    pub window_floating: bool,

    #[serde(default = "default_disk_image_tool")]
    pub disk_image_tool: PathBuf,

    #[serde(default = "default_open_tool")]
    pub open_tool: PathBuf,

    pub download: DownloadSource,
}

impl Default for InstallConfig {
    fn default() -> Self {
        let endpoint = Url::parse(
            "https://api.github.com/repos/doroved/proxer-releases/releases/latest",
        )
        .expect("default endpoint is a valid URL");

        Self {
            app_name: "Proxer".to_string(),
            install_path: None,
            mount_point: None,
            window_floating: true,
            disk_image_tool: default_disk_image_tool(),
            open_tool: default_open_tool(),
            download: DownloadSource::Metadata { endpoint },
        }
    }
}

impl InstallConfig {
    /// Load configuration
    ///
    /// Lookup order: the explicit `path`, then
    /// `<config_dir>/dmg-installer/installer.toml` if present, then the
    /// built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let candidate = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|p| p.exists()),
        };

        let config = match candidate {
            Some(path) => {
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                let config = Self::from_toml(&raw)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?;
                log::info!("Using config from: {}", path.display());
                config
            }
            None => {
                log::info!("No config file found, using built-in defaults");
                Self::default()
            }
        };

        Ok(config.with_defaults())
    }

    /// Parse and validate a TOML document
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// `<config_dir>/dmg-installer/installer.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    fn validate(&self) -> Result<()> {
        if self.app_name.trim().is_empty() {
            bail!("app_name must not be empty");
        }
        for url in self.download.urls() {
            if !matches!(url.scheme(), "http" | "https") {
                bail!("unsupported URL scheme in {url}: only http and https are allowed");
            }
        }
        Ok(())
    }

    /// Fill in derived paths so the effective configuration is explicit
    pub fn with_defaults(mut self) -> Self {
        self.install_path = Some(self.install_path());
        self.mount_point = Some(self.mount_point());
        self
    }

    pub fn install_path(&self) -> PathBuf {
        self.install_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("/Applications/{}.app", self.app_name)))
    }

    pub fn mount_point(&self) -> PathBuf {
        self.mount_point
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("/Volumes/{}Installer", self.app_name)))
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
