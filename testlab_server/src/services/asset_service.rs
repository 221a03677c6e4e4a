//! Build registration and result downloads.
//!
//! Registering a build's assets is what creates its record; downloads are
//! only offered for builds that were registered here.

use std::sync::Arc;

use chrono::Utc;

use crate::assets::{AssetBroker, AssetError, DownloadUrl, UploadUrls};
use crate::error::TestlabError;
use crate::events::{EventSink, TestingEvent, TrackedEvent};
use crate::models::build::NewTestBuild;
use crate::store::{BuildStore, StoreError};

#[derive(Clone)]
pub struct AssetService {
    store: Arc<dyn BuildStore>,
    broker: Arc<dyn AssetBroker>,
    sink: Arc<dyn EventSink>,
}

fn storage_unavailable(operation: &'static str) -> impl FnOnce(AssetError) -> TestlabError {
    move |e| {
        tracing::error!(operation, error = %e, "Asset storage request failed");
        TestlabError::UpstreamUnavailable {
            operation,
            detail: e.to_string(),
        }
    }
}

impl AssetService {
    pub fn new(
        store: Arc<dyn BuildStore>,
        broker: Arc<dyn AssetBroker>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self { store, broker, sink }
    }

    /// Hand out upload URLs for a new build and create its record.
    pub async fn register_assets(&self, app_slug: &str, build_slug: &str) -> Result<UploadUrls, TestlabError> {
        if self.store.exists(app_slug, build_slug).await? {
            return Err(already_registered(app_slug, build_slug));
        }

        let urls = self
            .broker
            .upload_urls(build_slug)
            .await
            .map_err(storage_unavailable("upload_urls"))?;

        let build = self
            .store
            .insert(NewTestBuild::registered(app_slug, build_slug, Utc::now()))
            .await
            .map_err(|e| match e {
                StoreError::Duplicate { .. } => already_registered(app_slug, build_slug),
                other => other.into(),
            })?;

        tracing::info!(build_id = build.id, app_slug, build_slug, "Build registered");
        let event = TestingEvent::UploadRequested;
        crate::metrics::event_dispatched(event.name());
        self.sink.send(TrackedEvent::new(app_slug, build_slug, event));

        Ok(urls)
    }

    /// Signed download URLs for every result object of a build.
    pub async fn download_assets(&self, app_slug: &str, build_slug: &str) -> Result<Vec<DownloadUrl>, TestlabError> {
        if !self.store.exists(app_slug, build_slug).await? {
            return Err(TestlabError::NotFound(format!(
                "build {app_slug}/{build_slug} not found"
            )));
        }

        self.broker
            .download_urls(build_slug)
            .await
            .map_err(storage_unavailable("download_urls"))
    }
}

fn already_registered(app_slug: &str, build_slug: &str) -> TestlabError {
    TestlabError::Conflict(format!("build {app_slug}/{build_slug} already registered"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssetBroker;
    use crate::events::MemorySink;
    use crate::store::InMemoryBuildStore;

    fn service() -> (Arc<InMemoryBuildStore>, Arc<MemoryAssetBroker>, Arc<MemorySink>, AssetService) {
        let store = Arc::new(InMemoryBuildStore::new());
        let broker = Arc::new(MemoryAssetBroker::new());
        let sink = Arc::new(MemorySink::new());
        let service = AssetService::new(store.clone(), broker.clone(), sink.clone());
        (store, broker, sink, service)
    }

    #[tokio::test]
    async fn register_creates_armed_record() {
        let (store, _, sink, service) = service();

        let urls = service.register_assets("app", "b1").await.unwrap();
        assert!(urls.app_apk.contains("b1/app.apk"));
        assert!(urls.test_apk.contains("b1/app-test.apk"));
        assert!(urls.xctest_zip.contains("b1/ios-tests.zip"));

        let record = store.get("app", "b1").await.unwrap().unwrap();
        assert!(record.reporting_armed);
        assert!(!record.has_matrix());
        assert!(record.last_polled_at.is_some());
        assert_eq!(sink.names(), vec!["upload_file_upload_requested"]);
    }

    #[tokio::test]
    async fn register_twice_conflicts() {
        let (store, _, sink, service) = service();
        service.register_assets("app", "b1").await.unwrap();

        let err = service.register_assets("app", "b1").await.unwrap_err();
        assert!(matches!(err, TestlabError::Conflict(_)));
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn downloads_list_only_this_builds_results() {
        let (_, broker, _, service) = service();
        service.register_assets("app", "b1").await.unwrap();
        broker.add_result("b1", "Pixel4/logcat");
        broker.add_result("b1", "Pixel4/video.mp4");
        broker.add_result("b2", "Pixel4/logcat");

        let urls = service.download_assets("app", "b1").await.unwrap();
        let names: Vec<&str> = urls.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["b1/results/Pixel4/logcat", "b1/results/Pixel4/video.mp4"]);
    }

    #[tokio::test]
    async fn downloads_for_unknown_build_are_not_found() {
        let (_, _, _, service) = service();
        let err = service.download_assets("app", "b1").await.unwrap_err();
        assert!(matches!(err, TestlabError::NotFound(_)));
    }
}
