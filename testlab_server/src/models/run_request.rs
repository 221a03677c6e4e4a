//! Start-run request body, mirroring the Test Lab `TestMatrix` resource.
//!
//! Unknown fields are carried through to the remote untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::step::{DeviceIdentity, Platform, TestKind};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AndroidDevice {
    #[serde(default)]
    pub android_model_id: String,
    #[serde(default)]
    pub android_version_id: String,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub orientation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IosDevice {
    #[serde(default)]
    pub ios_model_id: String,
    #[serde(default)]
    pub ios_version_id: String,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub orientation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AndroidDeviceList {
    #[serde(default)]
    pub android_devices: Vec<AndroidDevice>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IosDeviceList {
    #[serde(default)]
    pub ios_devices: Vec<IosDevice>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentMatrix {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub android_device_list: Option<AndroidDeviceList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ios_device_list: Option<IosDeviceList>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSpecification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub android_instrumentation_test: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub android_robo_test: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ios_xc_test: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestMatrixRequest {
    #[serde(default)]
    pub environment_matrix: EnvironmentMatrix,
    #[serde(default)]
    pub test_specification: TestSpecification,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// What a validated request will run: derived before any step exists.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub platform: Platform,
    pub test_kind: TestKind,
    pub devices: Vec<DeviceIdentity>,
}

impl TestMatrixRequest {
    /// Check the request shape and derive the run plan.
    pub fn plan(&self) -> Result<RunPlan, String> {
        let spec = &self.test_specification;
        let kinds = [
            (TestKind::Instrumentation, "androidInstrumentationTest", &spec.android_instrumentation_test),
            (TestKind::Robo, "androidRoboTest", &spec.android_robo_test),
            (TestKind::IosXcTest, "iosXcTest", &spec.ios_xc_test),
        ];
        let mut requested = kinds
            .into_iter()
            .filter_map(|(kind, field, value)| value.as_ref().map(|v| (kind, field, v)));
        let test_kind = match (requested.next(), requested.next()) {
            (Some((kind, _, value)), None) if value.is_object() => kind,
            (Some((_, field, _)), None) => return Err(format!("{field} must be an object")),
            (None, _) => return Err("test specification names no test type".to_string()),
            (Some(_), Some(_)) => {
                return Err("test specification names more than one test type".to_string())
            }
        };

        let (platform, devices) = match test_kind {
            TestKind::IosXcTest => (Platform::Ios, self.ios_devices()?),
            TestKind::Robo | TestKind::Instrumentation => {
                (Platform::Android, self.android_devices()?)
            }
        };

        Ok(RunPlan {
            platform,
            test_kind,
            devices,
        })
    }

    fn android_devices(&self) -> Result<Vec<DeviceIdentity>, String> {
        let devices = self
            .environment_matrix
            .android_device_list
            .as_ref()
            .map(|list| list.android_devices.as_slice())
            .unwrap_or_default();
        if devices.is_empty() {
            return Err("android test requires at least one android device".to_string());
        }

        devices
            .iter()
            .enumerate()
            .map(|(i, d)| {
                device_identity(i, &d.android_model_id, &d.android_version_id, &d.locale, &d.orientation)
            })
            .collect()
    }

    fn ios_devices(&self) -> Result<Vec<DeviceIdentity>, String> {
        let devices = self
            .environment_matrix
            .ios_device_list
            .as_ref()
            .map(|list| list.ios_devices.as_slice())
            .unwrap_or_default();
        if devices.is_empty() {
            return Err("ios test requires at least one ios device".to_string());
        }

        devices
            .iter()
            .enumerate()
            .map(|(i, d)| device_identity(i, &d.ios_model_id, &d.ios_version_id, &d.locale, &d.orientation))
            .collect()
    }
}

fn device_identity(
    index: usize,
    model: &str,
    version: &str,
    locale: &str,
    orientation: &str,
) -> Result<DeviceIdentity, String> {
    if model.is_empty() || version.is_empty() {
        return Err(format!("device {index} must name a model and a version"));
    }
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
    Ok(DeviceIdentity {
        model: Some(model.to_string()),
        version: Some(version.to_string()),
        locale: non_empty(locale),
        orientation: non_empty(orientation),
    })
}
