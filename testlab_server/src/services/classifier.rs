//! Completion classification over a matrix's step reports.
//!
//! Pure: no I/O, no clock. Platform and test kind come from step names
//! through a [`StepNaming`] rule set so the name heuristic can be swapped
//! for an explicit field without touching the reconciler.

use serde::Serialize;

use crate::models::step::{DeviceIdentity, OutcomeSummary, Platform, StepReport, StepState, TestKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

/// Derives platform and test kind from step names.
pub trait StepNaming: Send + Sync + 'static {
    /// Platform a single step name indicates.
    fn platform(&self, step_name: &str) -> Platform;

    /// Test kind of a run, given the name of its first step.
    fn test_kind(&self, step_name: &str, platform: Platform) -> TestKind;
}

/// Case-insensitive substring tokens. First match wins.
const PLATFORM_TOKENS: &[(&str, Platform)] = &[("ios", Platform::Ios)];
const KIND_TOKENS: &[(&str, TestKind)] = &[("instrumentation", TestKind::Instrumentation)];

/// Step-name token matching: "ios" marks iOS, "instrumentation" marks an
/// instrumentation run; otherwise Android robo or iOS XCTest.
#[derive(Debug, Default, Clone, Copy)]
pub struct NameTokenRules;

impl StepNaming for NameTokenRules {
    fn platform(&self, step_name: &str) -> Platform {
        let name = step_name.to_lowercase();
        PLATFORM_TOKENS
            .iter()
            .find(|(token, _)| name.contains(token))
            .map_or(Platform::Android, |(_, platform)| *platform)
    }

    fn test_kind(&self, step_name: &str, platform: Platform) -> TestKind {
        let name = step_name.to_lowercase();
        KIND_TOKENS
            .iter()
            .find(|(token, _)| name.contains(token))
            .map_or_else(|| default_kind(platform), |(_, kind)| *kind)
    }
}

fn default_kind(platform: Platform) -> TestKind {
    match platform {
        Platform::Android => TestKind::Robo,
        Platform::Ios => TestKind::IosXcTest,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceOutcome {
    pub step_name: String,
    pub device: DeviceIdentity,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionVerdict {
    /// Every step is complete. False for an empty report list.
    pub all_terminal: bool,
    /// iOS if any step name indicates iOS.
    pub platform: Platform,
    pub test_kind: TestKind,
    pub per_device: Vec<DeviceOutcome>,
    /// Success iff every step's outcome summary is success.
    pub overall: Outcome,
}

pub fn classify(reports: &[StepReport], naming: &dyn StepNaming) -> CompletionVerdict {
    let all_terminal =
        !reports.is_empty() && reports.iter().all(|r| r.state == StepState::Complete);

    let platform = if reports
        .iter()
        .any(|r| naming.platform(&r.name) == Platform::Ios)
    {
        Platform::Ios
    } else {
        Platform::Android
    };

    let test_kind = reports
        .first()
        .map_or_else(|| default_kind(platform), |r| naming.test_kind(&r.name, platform));

    let per_device: Vec<DeviceOutcome> = reports
        .iter()
        .map(|r| DeviceOutcome {
            step_name: r.name.clone(),
            device: DeviceIdentity::from_dimensions(&r.dimension_value),
            outcome: if r.outcome_summary() == OutcomeSummary::Success {
                Outcome::Success
            } else {
                Outcome::Failure
            },
        })
        .collect();

    let overall = if per_device.iter().all(|d| d.outcome == Outcome::Success) {
        Outcome::Success
    } else {
        Outcome::Failure
    };

    CompletionVerdict {
        all_terminal,
        platform,
        test_kind,
        per_device,
        overall,
    }
}
