//! Test asset storage: signed upload URLs for build binaries and signed
//! download URLs for run results.

pub mod gcs;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use gcs::GcsAssetBroker;
pub use memory::MemoryAssetBroker;

/// Binaries a build uploads before starting a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    AppApk,
    TestApk,
    XcTestZip,
}

impl AssetKind {
    pub fn file_name(self) -> &'static str {
        match self {
            AssetKind::AppApk => "app.apk",
            AssetKind::TestApk => "app-test.apk",
            AssetKind::XcTestZip => "ios-tests.zip",
        }
    }
}

/// Object path of an uploaded binary, relative to the bucket.
pub fn object_path(build_slug: &str, kind: AssetKind) -> String {
    format!("{build_slug}/{}", kind.file_name())
}

/// Prefix under which the remote writes run results.
pub fn results_prefix(build_slug: &str) -> String {
    format!("{build_slug}/results")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadUrls {
    pub app_apk: String,
    pub test_apk: String,
    pub xctest_zip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadUrl {
    pub name: String,
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("asset storage not configured: {0}")]
    NotConfigured(&'static str),

    #[error("storage request failed: {0}")]
    Request(String),

    #[error("storage returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[async_trait]
pub trait AssetBroker: Send + Sync + 'static {
    async fn upload_urls(&self, build_slug: &str) -> Result<UploadUrls, AssetError>;

    async fn download_urls(&self, build_slug: &str) -> Result<Vec<DownloadUrl>, AssetError>;
}
