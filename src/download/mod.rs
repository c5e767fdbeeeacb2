//! Release resolution and disk image download
//!
//! ## Module Organization
//!
//! - `platform` - Host architecture detection
//! - `github` - Release metadata lookup and asset selection
//! - `core` - Streaming download with progress and cancellation

mod core;
mod github;
mod platform;

pub use self::core::{DEFAULT_FILENAME, ProgressDownloader};
pub use github::{ReleaseAsset, ReleaseMetadata, ReleaseResolver, select_asset};
pub use platform::{Architecture, DISK_IMAGE_EXTENSION};
