//! Remote test matrix state, as exposed by the Test Lab API.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::build::StepLink;

/// Lifecycle state of a remote test matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatrixState {
    Validating,
    Pending,
    Running,
    Finished,
    Error,
    UnsupportedEnvironment,
    IncompatibleEnvironment,
    IncompatibleArchitecture,
    Cancelled,
    Invalid,
    #[default]
    #[serde(other)]
    TestStateUnspecified,
}

impl MatrixState {
    /// Error-class states: terminal failures, never retried into success.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            MatrixState::Error
                | MatrixState::UnsupportedEnvironment
                | MatrixState::IncompatibleEnvironment
                | MatrixState::IncompatibleArchitecture
                | MatrixState::Cancelled
                | MatrixState::Invalid
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatrixState::TestStateUnspecified => "TEST_STATE_UNSPECIFIED",
            MatrixState::Validating => "VALIDATING",
            MatrixState::Pending => "PENDING",
            MatrixState::Running => "RUNNING",
            MatrixState::Finished => "FINISHED",
            MatrixState::Error => "ERROR",
            MatrixState::UnsupportedEnvironment => "UNSUPPORTED_ENVIRONMENT",
            MatrixState::IncompatibleEnvironment => "INCOMPATIBLE_ENVIRONMENT",
            MatrixState::IncompatibleArchitecture => "INCOMPATIBLE_ARCHITECTURE",
            MatrixState::Cancelled => "CANCELLED",
            MatrixState::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for MatrixState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultsStep {
    #[serde(default)]
    pub history_id: String,
    #[serde(default)]
    pub execution_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestExecution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results_step: Option<ToolResultsStep>,
}

/// The subset of a test matrix the reconciler reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixSnapshot {
    #[serde(default)]
    pub state: MatrixState,
    #[serde(default)]
    pub test_executions: Vec<TestExecution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_matrix_details: Option<String>,
}

impl MatrixSnapshot {
    /// Step location of the lead execution, if the remote has produced one.
    ///
    /// `None` both when there are no executions yet and when the lead
    /// execution has no step linkage.
    pub fn lead_step_link(&self) -> Option<StepLink> {
        let step = self.test_executions.first()?.tool_results_step.as_ref()?;
        if step.history_id.is_empty() || step.execution_id.is_empty() {
            return None;
        }
        Some(StepLink {
            history_id: step.history_id.clone(),
            execution_id: step.execution_id.clone(),
        })
    }
}

/// Identity of a freshly started matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedMatrix {
    pub test_matrix_id: String,
    pub timestamp: DateTime<Utc>,
}
