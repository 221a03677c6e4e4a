//! Firebase Test Lab / Tool Results REST client.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{RemoteError, RemoteJobClient};
use crate::assets::{self, AssetKind};
use crate::config::TestlabConfig;
use crate::models::build::StepLink;
use crate::models::matrix::{MatrixSnapshot, StartedMatrix};
use crate::models::run_request::TestMatrixRequest;
use crate::models::step::StepReport;

const CLIENT_NAME: &str = "testlab-server";

#[derive(Debug, Deserialize)]
struct StepList {
    #[serde(default)]
    steps: Vec<StepReport>,
}

#[derive(Clone)]
pub struct FirebaseClient {
    http: reqwest::Client,
    project_id: String,
    access_token: String,
    testing_url: String,
    toolresults_url: String,
    bucket: String,
}

impl FirebaseClient {
    pub fn from_config(config: &TestlabConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            project_id: config.project_id.clone(),
            access_token: config.access_token.clone(),
            testing_url: config.testing_api_url.trim_end_matches('/').to_string(),
            toolresults_url: config.toolresults_api_url.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
        }
    }

    fn ensure_configured(&self) -> Result<(), RemoteError> {
        if self.project_id.is_empty() {
            return Err(RemoteError::NotConfigured("TESTLAB_PROJECT_ID"));
        }
        if self.access_token.is_empty() {
            return Err(RemoteError::NotConfigured("TESTLAB_ACCESS_TOKEN"));
        }
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, RemoteError> {
        self.ensure_configured()?;
        let resp = self
            .http
            .get(url)
            .query(query)
            .bearer_auth(&self.access_token)
            .header("User-Agent", CLIENT_NAME)
            .send()
            .await
            .map_err(transport)?;
        read_json(resp).await
    }
}

fn transport(err: reqwest::Error) -> RemoteError {
    RemoteError::Transport(err.to_string())
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, RemoteError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(RemoteError::Status {
            status: status.as_u16(),
            body,
        });
    }
    resp.json::<T>()
        .await
        .map_err(|e| RemoteError::Decode(e.to_string()))
}

/// Set `spec[field].gcsPath` unless the caller already referenced a binary.
///
/// A non-object `spec` is left as is for the remote to reject.
fn fill_gcs_path(spec: &mut Value, field: &str, gcs_path: String) {
    let Some(spec) = spec.as_object_mut() else {
        return;
    };
    if spec.get(field).map_or(true, Value::is_null) {
        spec.insert(field.to_string(), json!({ "gcsPath": gcs_path }));
    }
}

/// Build the `testMatrices.create` body: the caller's request plus result
/// storage, client info and uploaded binaries, none of which overrides a
/// value the caller supplied.
pub fn prepare_matrix_body(
    app_slug: &str,
    build_slug: &str,
    bucket: &str,
    request: &TestMatrixRequest,
) -> Result<Value, RemoteError> {
    let mut body =
        serde_json::to_value(request).map_err(|e| RemoteError::Decode(e.to_string()))?;
    let gcs = |kind: AssetKind| format!("gs://{bucket}/{}", assets::object_path(build_slug, kind));

    if body.get("resultStorage").is_none() {
        body["resultStorage"] = json!({
            "googleCloudStorage": {
                "gcsPath": format!("gs://{bucket}/{}", assets::results_prefix(build_slug)),
            }
        });
    }
    if body.get("clientInfo").is_none() {
        body["clientInfo"] = json!({
            "name": CLIENT_NAME,
            "clientInfoDetails": [
                { "key": "app_slug", "value": app_slug },
                { "key": "build_slug", "value": build_slug },
            ],
        });
    }

    let spec = &mut body["testSpecification"];
    if let Some(test) = spec.get_mut("androidInstrumentationTest") {
        fill_gcs_path(test, "appApk", gcs(AssetKind::AppApk));
        fill_gcs_path(test, "testApk", gcs(AssetKind::TestApk));
    }
    if let Some(test) = spec.get_mut("androidRoboTest") {
        fill_gcs_path(test, "appApk", gcs(AssetKind::AppApk));
    }
    if let Some(test) = spec.get_mut("iosXcTest") {
        fill_gcs_path(test, "testsZip", gcs(AssetKind::XcTestZip));
    }

    Ok(body)
}

#[async_trait]
impl RemoteJobClient for FirebaseClient {
    async fn resolve_matrix(&self, matrix_id: &str) -> Result<MatrixSnapshot, RemoteError> {
        let url = format!(
            "{}/v1/projects/{}/testMatrices/{}",
            self.testing_url, self.project_id, matrix_id
        );
        self.get_json(&url, &[]).await
    }

    async fn fetch_step_reports(
        &self,
        link: &StepLink,
        projection: &str,
    ) -> Result<Vec<StepReport>, RemoteError> {
        let url = format!(
            "{}/toolresults/v1beta3/projects/{}/histories/{}/executions/{}/steps",
            self.toolresults_url, self.project_id, link.history_id, link.execution_id
        );
        let list: StepList = self.get_json(&url, &[("fields", projection)]).await?;
        Ok(list.steps)
    }

    async fn start_matrix(
        &self,
        app_slug: &str,
        build_slug: &str,
        request: &TestMatrixRequest,
    ) -> Result<StartedMatrix, RemoteError> {
        self.ensure_configured()?;
        let body = prepare_matrix_body(app_slug, build_slug, &self.bucket, request)?;
        let url = format!("{}/v1/projects/{}/testMatrices", self.testing_url, self.project_id);
        let request_id = uuid::Uuid::new_v4().to_string();

        let resp = self
            .http
            .post(&url)
            .query(&[("requestId", request_id.as_str())])
            .bearer_auth(&self.access_token)
            .header("User-Agent", CLIENT_NAME)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        read_json(resp).await
    }
}
