//! Step reports — one per device configuration within a test matrix.

use serde::{Deserialize, Serialize};

/// Progress of a single step, as reported by the Tool Results API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepState {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "inProgress")]
    Running,
    #[serde(rename = "complete")]
    Complete,
    #[default]
    #[serde(rename = "unknownState", other)]
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutcomeSummary {
    Success,
    Failure,
    Inconclusive,
    Skipped,
    #[default]
    #[serde(other)]
    Unset,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    #[serde(default)]
    pub summary: OutcomeSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionValue {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// A step report restricted to the fields the reconciler projects.
///
/// `test_execution_step` is passed through untouched for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: StepState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<StepOutcome>,
    #[serde(default)]
    pub dimension_value: Vec<DimensionValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_execution_step: Option<serde_json::Value>,
}

impl StepReport {
    pub fn outcome_summary(&self) -> OutcomeSummary {
        self.outcome
            .as_ref()
            .map(|o| o.summary)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    Robo,
    Instrumentation,
    #[serde(rename = "ios_xctest")]
    IosXcTest,
}

/// Device configuration a step ran on.
///
/// Reconstructed from dimension values; absent dimensions stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<String>,
}

impl DeviceIdentity {
    pub fn from_dimensions(dimensions: &[DimensionValue]) -> Self {
        let mut device = DeviceIdentity::default();
        for dim in dimensions {
            let slot = match dim.key.as_str() {
                "Model" => &mut device.model,
                "Version" => &mut device.version,
                "Locale" => &mut device.locale,
                "Orientation" => &mut device.orientation,
                _ => continue,
            };
            *slot = Some(dim.value.clone());
        }
        device
    }
}
