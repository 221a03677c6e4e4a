//! Remote test-execution API: matrix lookup, step reports, matrix start.

pub mod firebase;
pub mod scripted;

use async_trait::async_trait;

use crate::models::build::StepLink;
use crate::models::matrix::{MatrixSnapshot, StartedMatrix};
use crate::models::run_request::TestMatrixRequest;
use crate::models::step::StepReport;

pub use firebase::FirebaseClient;
pub use scripted::ScriptedRemote;

/// Fields requested when fetching step reports.
pub const STEP_PROJECTION: &str = "steps(state,name,outcome,dimensionValue,testExecutionStep)";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode remote response: {0}")]
    Decode(String),

    #[error("remote client not configured: {0}")]
    NotConfigured(&'static str),
}

#[async_trait]
pub trait RemoteJobClient: Send + Sync + 'static {
    async fn resolve_matrix(&self, matrix_id: &str) -> Result<MatrixSnapshot, RemoteError>;

    async fn fetch_step_reports(
        &self,
        link: &StepLink,
        projection: &str,
    ) -> Result<Vec<StepReport>, RemoteError>;

    async fn start_matrix(
        &self,
        app_slug: &str,
        build_slug: &str,
        request: &TestMatrixRequest,
    ) -> Result<StartedMatrix, RemoteError>;
}
