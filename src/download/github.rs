//! Release metadata lookup and download URL resolution

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use super::platform::{Architecture, DISK_IMAGE_EXTENSION};
use crate::config::DownloadSource;
use crate::error::InstallerError;

pub(crate) const USER_AGENT: &str = concat!("dmg-installer/", env!("CARGO_PKG_VERSION"));
const METADATA_TIMEOUT: Duration = Duration::from_secs(30);

/// Release metadata as returned by the metadata endpoint
#[derive(Deserialize, Debug)]
pub struct ReleaseMetadata {
    pub assets: Vec<ReleaseAsset>,
}

/// Release asset metadata
#[derive(Deserialize, Debug, Clone)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

/// Pick the disk image for `arch` from a release asset list
///
/// The first asset whose lower-cased name ends in `.dmg` and contains one of the
/// architecture's name patterns wins. An unparsable URL on that asset is
/// treated as "not found".
pub fn select_asset(assets: &[ReleaseAsset], arch: Architecture) -> Result<Url, InstallerError> {
    let patterns = arch.name_patterns();
    if patterns.is_empty() {
        return Err(InstallerError::UnsupportedArchitecture);
    }

    let asset = assets
        .iter()
        .find(|asset| {
            let name = asset.name.to_lowercase();
            name.ends_with(DISK_IMAGE_EXTENSION) && patterns.iter().any(|p| name.contains(p))
        })
        .ok_or(InstallerError::DownloadAssetNotFound(arch))?;

    log::debug!("Selected release asset {}", asset.name);

    Url::parse(&asset.browser_download_url).map_err(|e| {
        log::warn!(
            "Asset {} has an invalid download URL {:?}: {}",
            asset.name,
            asset.browser_download_url,
            e
        );
        InstallerError::DownloadAssetNotFound(arch)
    })
}

/// Turns the configured download source into a concrete artifact URL
#[derive(Clone)]
pub struct ReleaseResolver {
    client: reqwest::Client,
}

impl ReleaseResolver {
    pub fn new() -> Result<Self, InstallerError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(METADATA_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Resolve the URL of the disk image to download for `arch`
    pub async fn resolve_download_url(
        &self,
        source: &DownloadSource,
        arch: Architecture,
    ) -> Result<Url, InstallerError> {
        if !arch.is_supported() {
            return Err(InstallerError::UnsupportedArchitecture);
        }

        match source {
            DownloadSource::Direct { .. } => source
                .direct_url(arch)
                .cloned()
                .ok_or(InstallerError::UnsupportedArchitecture),
            DownloadSource::Metadata { endpoint } => {
                let metadata = self.fetch_metadata(endpoint).await?;
                select_asset(&metadata.assets, arch)
            }
        }
    }

    /// Fetch release metadata, requiring an HTTP 200 response
    pub async fn fetch_metadata(&self, endpoint: &Url) -> Result<ReleaseMetadata, InstallerError> {
        log::debug!("Fetching release metadata from {endpoint}");

        let response = self.client.get(endpoint.clone()).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(InstallerError::HttpError(status.as_u16()));
        }

        let body = response.bytes().await?;
        let metadata: ReleaseMetadata = serde_json::from_slice(&body)?;
        log::debug!("Release lists {} assets", metadata.assets.len());
        Ok(metadata)
    }
}
