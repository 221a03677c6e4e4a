//! Starting a remote test run for a registered build.

use std::sync::Arc;

use chrono::Utc;

use crate::error::TestlabError;
use crate::events::{EventSink, TestingEvent, TrackedEvent};
use crate::models::run_request::{RunPlan, TestMatrixRequest};
use crate::remote::RemoteJobClient;
use crate::store::{BuildStore, MatrixClaim};

#[derive(Clone)]
pub struct RunService {
    store: Arc<dyn BuildStore>,
    remote: Arc<dyn RemoteJobClient>,
    sink: Arc<dyn EventSink>,
}

impl RunService {
    pub fn new(
        store: Arc<dyn BuildStore>,
        remote: Arc<dyn RemoteJobClient>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            remote,
            sink,
        }
    }

    /// Start the build's one test run and return its matrix id.
    ///
    /// The remote start is attempted once. A build that already has a run
    /// fails with [`TestlabError::Conflict`] and is left untouched.
    pub async fn start_run(
        &self,
        app_slug: &str,
        build_slug: &str,
        request: &TestMatrixRequest,
    ) -> Result<String, TestlabError> {
        let build = self
            .store
            .get(app_slug, build_slug)
            .await?
            .ok_or_else(|| TestlabError::NotFound(format!("build {app_slug}/{build_slug} not found")))?;
        if build.has_matrix() {
            return Err(already_started(app_slug, build_slug));
        }

        let plan = request.plan().map_err(TestlabError::InvalidRequest)?;

        let started = self
            .remote
            .start_matrix(app_slug, build_slug, request)
            .await
            .map_err(|e| {
                tracing::error!(app_slug, build_slug, error = %e, "Failed to start test matrix");
                TestlabError::UpstreamUnavailable {
                    operation: "start_matrix",
                    detail: e.to_string(),
                }
            })?;

        let claim = MatrixClaim {
            app_slug: app_slug.to_string(),
            build_slug: build_slug.to_string(),
            matrix_id: started.test_matrix_id.clone(),
            started_at: started.timestamp,
            polled_at: Utc::now(),
        };
        if !self.store.claim_matrix(&claim).await? {
            tracing::warn!(
                app_slug,
                build_slug,
                matrix_id = %started.test_matrix_id,
                "Lost matrix claim to a concurrent start"
            );
            return Err(already_started(app_slug, build_slug));
        }

        crate::metrics::run_started(plan.platform.as_str());
        tracing::info!(
            app_slug,
            build_slug,
            matrix_id = %started.test_matrix_id,
            platform = plan.platform.as_str(),
            test_type = ?plan.test_kind,
            devices = plan.devices.len(),
            "Test run started"
        );

        for event in start_events(plan) {
            crate::metrics::event_dispatched(event.name());
            self.sink.send(TrackedEvent::new(app_slug, build_slug, event));
        }

        Ok(started.test_matrix_id)
    }
}

fn already_started(app_slug: &str, build_slug: &str) -> TestlabError {
    TestlabError::Conflict(format!(
        "a test run was already started for build {app_slug}/{build_slug}"
    ))
}

/// The aggregate "started" event, then one per requested device.
fn start_events(plan: RunPlan) -> Vec<TestingEvent> {
    let RunPlan {
        platform,
        test_kind,
        devices,
    } = plan;

    std::iter::once(TestingEvent::TestStarted {
        platform,
        test_type: test_kind,
    })
    .chain(devices.into_iter().map(|device| TestingEvent::TestStartedOnDevice {
        platform,
        test_type: test_kind,
        device,
    }))
    .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::events::MemorySink;
    use crate::models::build::NewTestBuild;
    use crate::models::matrix::StartedMatrix;
    use crate::remote::{RemoteError, ScriptedRemote};
    use crate::store::InMemoryBuildStore;

    struct Harness {
        store: Arc<InMemoryBuildStore>,
        remote: Arc<ScriptedRemote>,
        sink: Arc<MemorySink>,
        runs: RunService,
    }

    async fn harness() -> Harness {
        let store = Arc::new(InMemoryBuildStore::new());
        store
            .insert(NewTestBuild::registered("app", "b1", Utc::now()))
            .await
            .unwrap();
        let remote = Arc::new(ScriptedRemote::new());
        let sink = Arc::new(MemorySink::new());
        let runs = RunService::new(store.clone(), remote.clone(), sink.clone());
        Harness {
            store,
            remote,
            sink,
            runs,
        }
    }

    fn robo_request() -> TestMatrixRequest {
        serde_json::from_value(serde_json::json!({
            "environmentMatrix": {
                "androidDeviceList": {
                    "androidDevices": [
                        { "androidModelId": "Pixel4", "androidVersionId": "30" },
                        { "androidModelId": "Pixel5", "androidVersionId": "31" }
                    ]
                }
            },
            "testSpecification": { "androidRoboTest": {} }
        }))
        .unwrap()
    }

    fn started(id: &str) -> StartedMatrix {
        StartedMatrix {
            test_matrix_id: id.into(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn start_claims_matrix_and_emits_start_events() {
        let h = harness().await;
        h.remote.push_start(Ok(started("matrix-1")));

        let matrix_id = h.runs.start_run("app", "b1", &robo_request()).await.unwrap();
        assert_eq!(matrix_id, "matrix-1");

        let record = h.store.get("app", "b1").await.unwrap().unwrap();
        assert_eq!(record.matrix_id, "matrix-1");
        assert!(record.reporting_armed);
        assert_eq!(record.test_started_at, Some(started("x").timestamp));

        assert_eq!(
            h.sink.names(),
            vec![
                "testing_test_started",
                "testing_test_started_on_device",
                "testing_test_started_on_device",
            ]
        );
    }

    #[tokio::test]
    async fn second_start_conflicts_without_side_effects() {
        let h = harness().await;
        h.remote.push_start(Ok(started("matrix-1")));
        h.runs.start_run("app", "b1", &robo_request()).await.unwrap();
        let before = h.store.get("app", "b1").await.unwrap();
        let events_before = h.sink.events().len();

        let err = h.runs.start_run("app", "b1", &robo_request()).await.unwrap_err();

        assert!(matches!(err, TestlabError::Conflict(_)));
        assert_eq!(h.remote.start_calls(), 1);
        assert_eq!(h.store.get("app", "b1").await.unwrap(), before);
        assert_eq!(h.sink.events().len(), events_before);
    }

    #[tokio::test]
    async fn invalid_request_never_reaches_remote() {
        let h = harness().await;
        let mut request = robo_request();
        request.test_specification.android_instrumentation_test = Some(serde_json::json!({}));

        let err = h.runs.start_run("app", "b1", &request).await.unwrap_err();

        assert!(matches!(err, TestlabError::InvalidRequest(_)));
        assert_eq!(h.remote.start_calls(), 0);
        assert!(h.sink.events().is_empty());
    }

    #[tokio::test]
    async fn non_object_test_spec_is_invalid() {
        let h = harness().await;
        let mut request = robo_request();
        request.test_specification.android_robo_test = Some(serde_json::json!(true));

        let err = h.runs.start_run("app", "b1", &request).await.unwrap_err();

        assert!(matches!(err, TestlabError::InvalidRequest(_)));
        assert_eq!(h.remote.start_calls(), 0);
        assert!(!h.store.get("app", "b1").await.unwrap().unwrap().has_matrix());
    }

    #[tokio::test]
    async fn remote_start_failure_is_not_retried() {
        let h = harness().await;
        h.remote.push_start(Err(RemoteError::Transport("refused".into())));

        let err = h.runs.start_run("app", "b1", &robo_request()).await.unwrap_err();

        assert!(matches!(
            err,
            TestlabError::UpstreamUnavailable {
                operation: "start_matrix",
                ..
            }
        ));
        assert_eq!(h.remote.start_calls(), 1);
        assert!(!h.store.get("app", "b1").await.unwrap().unwrap().has_matrix());
    }

    #[tokio::test]
    async fn unknown_build_is_not_found() {
        let h = harness().await;
        let err = h.runs.start_run("app", "nope", &robo_request()).await.unwrap_err();
        assert!(matches!(err, TestlabError::NotFound(_)));
        assert_eq!(h.remote.start_calls(), 0);
    }
}
