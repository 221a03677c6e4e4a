//! Status reconciliation — one pass of "poll the remote run, react once to
//! completion".
//!
//! A pass resolves the step link (cached on the record once known), fetches
//! step reports, classifies them and, if this pass is the one that consumes
//! the record's reporting gate, dispatches the completion events. Concurrent
//! passes for the same build are safe: the gate is an atomic conditional
//! update in the store and only its winner dispatches.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::error::TestlabError;
use crate::events::{EventSink, TestingEvent, TrackedEvent};
use crate::models::build::{StepLink, TestBuild};
use crate::models::matrix::MatrixState;
use crate::models::step::StepReport;
use crate::remote::{RemoteJobClient, STEP_PROJECTION};
use crate::services::classifier::{classify, CompletionVerdict, StepNaming};
use crate::services::retry::with_single_retry;
use crate::store::{BuildStore, PollUpdate};

/// What a status poller gets back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatusView {
    /// Raw step reports, one per device configuration.
    Steps { steps: Vec<StepReport> },
    /// The remote has not produced steps yet.
    Matrix { state: MatrixState },
}

#[derive(Clone)]
pub struct StatusReconciler {
    store: Arc<dyn BuildStore>,
    remote: Arc<dyn RemoteJobClient>,
    sink: Arc<dyn EventSink>,
    naming: Arc<dyn StepNaming>,
}

impl StatusReconciler {
    pub fn new(
        store: Arc<dyn BuildStore>,
        remote: Arc<dyn RemoteJobClient>,
        sink: Arc<dyn EventSink>,
        naming: Arc<dyn StepNaming>,
    ) -> Self {
        Self {
            store,
            remote,
            sink,
            naming,
        }
    }

    /// Run one reconciliation pass for a build.
    pub async fn reconcile(&self, app_slug: &str, build_slug: &str) -> Result<StatusView, TestlabError> {
        let result = self.reconcile_pass(app_slug, build_slug).await;
        match &result {
            Ok(StatusView::Matrix { .. }) => crate::metrics::reconcile_pass("no_steps"),
            Ok(StatusView::Steps { .. }) => crate::metrics::reconcile_pass("steps"),
            Err(e) => {
                tracing::warn!(app_slug, build_slug, error = %e, kind = e.kind(), "Reconcile failed");
                crate::metrics::reconcile_pass(e.kind());
            }
        }
        result
    }

    async fn reconcile_pass(&self, app_slug: &str, build_slug: &str) -> Result<StatusView, TestlabError> {
        let build = self
            .store
            .get(app_slug, build_slug)
            .await?
            .ok_or_else(|| TestlabError::NotFound(format!("build {app_slug}/{build_slug} not found")))?;
        if !build.has_matrix() {
            return Err(TestlabError::NotFound(format!(
                "no test run started for build {app_slug}/{build_slug}"
            )));
        }

        let (link, resolved) = match build.step_link() {
            Some(link) => (link, false),
            None => match self.resolve_link(&build).await? {
                Ok(link) => (link, true),
                Err(state) => {
                    self.store
                        .record_poll(&PollUpdate {
                            app_slug: app_slug.to_string(),
                            build_slug: build_slug.to_string(),
                            step_link: None,
                            polled_at: Utc::now(),
                        })
                        .await?;
                    tracing::debug!(app_slug, build_slug, state = %state, "Matrix has no steps yet");
                    return Ok(StatusView::Matrix { state });
                }
            },
        };

        let remote = self.remote.as_ref();
        let steps = with_single_retry("fetch_step_reports", || {
            remote.fetch_step_reports(&link, STEP_PROJECTION)
        })
        .await?;

        let verdict = classify(&steps, self.naming.as_ref());
        let update = PollUpdate {
            app_slug: app_slug.to_string(),
            build_slug: build_slug.to_string(),
            step_link: resolved.then_some(link),
            polled_at: Utc::now(),
        };

        if build.reporting_armed && verdict.all_terminal {
            if self.store.consume_reporting(&update).await? {
                crate::metrics::reporting_consumed();
                tracing::info!(
                    app_slug,
                    build_slug,
                    matrix_id = %build.matrix_id,
                    outcome = ?verdict.overall,
                    devices = verdict.per_device.len(),
                    "Test run completed"
                );
                self.dispatch(app_slug, build_slug, completion_events(&verdict));
            }
        } else {
            self.store.record_poll(&update).await?;
        }

        Ok(StatusView::Steps { steps })
    }

    /// Resolve the step link from the remote matrix.
    ///
    /// `Ok(Err(state))` means the matrix is healthy but has no step linkage
    /// yet.
    async fn resolve_link(&self, build: &TestBuild) -> Result<Result<StepLink, MatrixState>, TestlabError> {
        let remote = self.remote.as_ref();
        let matrix_id = build.matrix_id.as_str();
        let snapshot = with_single_retry("resolve_matrix", || remote.resolve_matrix(matrix_id)).await?;

        if snapshot.state.is_error() {
            return Err(TestlabError::RemoteJobFailed {
                state: snapshot.state,
                detail: snapshot.invalid_matrix_details.unwrap_or_default(),
            });
        }

        Ok(snapshot.lead_step_link().ok_or(snapshot.state))
    }

    fn dispatch(&self, app_slug: &str, build_slug: &str, events: Vec<TestingEvent>) {
        for event in events {
            crate::metrics::event_dispatched(event.name());
            self.sink.send(TrackedEvent::new(app_slug, build_slug, event));
        }
    }
}

/// Per-device "finished" events followed by the aggregate one.
fn completion_events(verdict: &CompletionVerdict) -> Vec<TestingEvent> {
    let mut events: Vec<TestingEvent> = verdict
        .per_device
        .iter()
        .map(|d| TestingEvent::TestFinishedOnDevice {
            platform: verdict.platform,
            test_type: verdict.test_kind,
            device: d.device.clone(),
            test_result: d.outcome,
        })
        .collect();
    events.push(TestingEvent::TestFinished {
        platform: verdict.platform,
        test_type: verdict.test_kind,
        test_result: verdict.overall,
    });
    events
}
