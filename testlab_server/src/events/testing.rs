//! Testing analytics event definitions.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::step::{DeviceIdentity, Platform, TestKind};
use crate::services::classifier::Outcome;

/// Things that happen to a build's test run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestingEvent {
    /// Build assets were registered and upload URLs handed out.
    UploadRequested,
    /// A test matrix was started.
    TestStarted {
        platform: Platform,
        test_type: TestKind,
    },
    /// A test matrix was started on one requested device.
    TestStartedOnDevice {
        platform: Platform,
        test_type: TestKind,
        device: DeviceIdentity,
    },
    /// Every step of the matrix reached a terminal state.
    TestFinished {
        platform: Platform,
        test_type: TestKind,
        test_result: Outcome,
    },
    /// One device's step finished, as part of a completed matrix.
    TestFinishedOnDevice {
        platform: Platform,
        test_type: TestKind,
        device: DeviceIdentity,
        test_result: Outcome,
    },
}

impl TestingEvent {
    /// Analytics event name; platform-specific for test lifecycle events.
    pub fn name(&self) -> &'static str {
        use Platform::{Android, Ios};

        match self {
            TestingEvent::UploadRequested => "upload_file_upload_requested",
            TestingEvent::TestStarted { platform: Android, .. } => "testing_test_started",
            TestingEvent::TestStarted { platform: Ios, .. } => "ios_testing_test_started",
            TestingEvent::TestStartedOnDevice { platform: Android, .. } => {
                "testing_test_started_on_device"
            }
            TestingEvent::TestStartedOnDevice { platform: Ios, .. } => {
                "ios_testing_test_started_on_device"
            }
            TestingEvent::TestFinished { platform: Android, .. } => "testing_test_finished",
            TestingEvent::TestFinished { platform: Ios, .. } => "ios_testing_test_finished",
            TestingEvent::TestFinishedOnDevice { platform: Android, .. } => {
                "testing_test_finished_on_device"
            }
            TestingEvent::TestFinishedOnDevice { platform: Ios, .. } => {
                "ios_testing_test_finished_on_device"
            }
        }
    }
}

/// An event bound to the build it happened to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedEvent {
    pub app_slug: String,
    pub build_slug: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: TestingEvent,
}

impl TrackedEvent {
    pub fn new(app_slug: &str, build_slug: &str, event: TestingEvent) -> Self {
        Self {
            app_slug: app_slug.to_string(),
            build_slug: build_slug.to_string(),
            occurred_at: Utc::now(),
            event,
        }
    }
}
