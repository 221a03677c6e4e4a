//! In-memory asset broker for tests and local development.

use std::collections::BTreeSet;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{object_path, results_prefix, AssetBroker, AssetError, AssetKind, DownloadUrl, UploadUrls};

/// Hands out `memory://` URLs; result objects are registered with
/// [`MemoryAssetBroker::add_result`].
#[derive(Debug, Default)]
pub struct MemoryAssetBroker {
    results: RwLock<BTreeSet<String>>,
}

fn memory_url(method: &str, path: &str) -> String {
    format!("memory://localhost/{path}?method={method}&signature=mock")
}

impl MemoryAssetBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_result(&self, build_slug: &str, name: &str) {
        if let Ok(mut results) = self.results.write() {
            results.insert(format!("{}/{name}", results_prefix(build_slug)));
        }
    }
}

#[async_trait]
impl AssetBroker for MemoryAssetBroker {
    async fn upload_urls(&self, build_slug: &str) -> Result<UploadUrls, AssetError> {
        let url = |kind: AssetKind| memory_url("PUT", &object_path(build_slug, kind));
        Ok(UploadUrls {
            app_apk: url(AssetKind::AppApk),
            test_apk: url(AssetKind::TestApk),
            xctest_zip: url(AssetKind::XcTestZip),
        })
    }

    async fn download_urls(&self, build_slug: &str) -> Result<Vec<DownloadUrl>, AssetError> {
        let prefix = format!("{}/", results_prefix(build_slug));
        let results = self
            .results
            .read()
            .map_err(|_| AssetError::Request("lock poisoned".to_string()))?;
        Ok(results
            .iter()
            .filter(|path| path.starts_with(&prefix))
            .map(|path| DownloadUrl {
                name: path.clone(),
                url: memory_url("GET", path),
            })
            .collect())
    }
}
