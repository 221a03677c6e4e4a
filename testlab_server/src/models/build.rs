//! testlab.build — Build record tracked across a remote test run.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::testlab_builds;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = testlab_builds)]
pub struct TestBuild {
    pub id: i64,
    pub app_slug: String,
    pub build_slug: String,
    pub matrix_id: String,
    pub history_id: String,
    pub execution_id: String,
    pub reporting_armed: bool,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub test_started_at: Option<DateTime<Utc>>,
    pub create_date: Option<DateTime<Utc>>,
    pub write_date: Option<DateTime<Utc>>,
}

impl TestBuild {
    /// Whether a remote test matrix has been started for this build.
    pub fn has_matrix(&self) -> bool {
        !self.matrix_id.is_empty()
    }

    /// The resolved step location, present only once both ids are known.
    pub fn step_link(&self) -> Option<StepLink> {
        if self.history_id.is_empty() || self.execution_id.is_empty() {
            return None;
        }
        Some(StepLink {
            history_id: self.history_id.clone(),
            execution_id: self.execution_id.clone(),
        })
    }
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = testlab_builds)]
pub struct NewTestBuild {
    pub app_slug: String,
    pub build_slug: String,
    pub reporting_armed: bool,
    pub last_polled_at: Option<DateTime<Utc>>,
}

impl NewTestBuild {
    pub fn registered(app_slug: &str, build_slug: &str, now: DateTime<Utc>) -> Self {
        Self {
            app_slug: app_slug.to_string(),
            build_slug: build_slug.to_string(),
            reporting_armed: true,
            last_polled_at: Some(now),
        }
    }
}

/// History/execution pair locating the step reports of a matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLink {
    pub history_id: String,
    pub execution_id: String,
}
