//! End-to-end test API flows over in-memory backends.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use testlab_server::assets::MemoryAssetBroker;
use testlab_server::events::MemorySink;
use testlab_server::models::matrix::{MatrixSnapshot, MatrixState, StartedMatrix, TestExecution, ToolResultsStep};
use testlab_server::models::step::{DimensionValue, OutcomeSummary, StepOutcome, StepReport, StepState};
use testlab_server::remote::{RemoteError, ScriptedRemote};
use testlab_server::routes::{testlab_router, TestlabRouterState};
use testlab_server::store::InMemoryBuildStore;

struct TestApp {
    router: Router,
    remote: Arc<ScriptedRemote>,
    broker: Arc<MemoryAssetBroker>,
    sink: Arc<MemorySink>,
}

fn app() -> TestApp {
    let remote = Arc::new(ScriptedRemote::new());
    let broker = Arc::new(MemoryAssetBroker::new());
    let sink = Arc::new(MemorySink::new());
    let state = TestlabRouterState::new(
        Arc::new(InMemoryBuildStore::new()),
        remote.clone(),
        broker.clone(),
        sink.clone(),
    );
    TestApp {
        router: testlab_router(state),
        remote,
        broker,
        sink,
    }
}

async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .expect("request");

    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn robo_request() -> Value {
    json!({
        "environmentMatrix": {
            "androidDeviceList": {
                "androidDevices": [{ "androidModelId": "Pixel4", "androidVersionId": "30" }]
            }
        },
        "testSpecification": { "androidRoboTest": {} }
    })
}

fn finished_matrix() -> MatrixSnapshot {
    MatrixSnapshot {
        state: MatrixState::Finished,
        test_executions: vec![TestExecution {
            tool_results_step: Some(ToolResultsStep {
                history_id: "h1".into(),
                execution_id: "e1".into(),
            }),
        }],
        invalid_matrix_details: None,
    }
}

fn robo_step(state: StepState) -> StepReport {
    StepReport {
        name: "Robo test".into(),
        state,
        outcome: Some(StepOutcome {
            summary: OutcomeSummary::Success,
        }),
        dimension_value: vec![DimensionValue {
            key: "Model".into(),
            value: "Pixel4".into(),
        }],
        test_execution_step: None,
    }
}

const TEST_URI: &str = "/api/apps/app/builds/b1/test";
const ASSETS_URI: &str = "/api/apps/app/builds/b1/assets";

#[tokio::test]
async fn health_is_ok() {
    let app = app();
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn full_run_lifecycle() {
    let app = app();

    let (status, urls) = call(&app.router, "POST", ASSETS_URI, None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(urls["app_apk"].as_str().unwrap().contains("b1/app.apk"));

    app.remote.push_start(Ok(StartedMatrix {
        test_matrix_id: "matrix-1".into(),
        timestamp: Utc::now(),
    }));
    let (status, started) = call(&app.router, "POST", TEST_URI, Some(robo_request())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(started, json!({ "matrix_id": "matrix-1" }));

    app.remote
        .push_matrix(Ok(MatrixSnapshot {
            state: MatrixState::Pending,
            ..MatrixSnapshot::default()
        }))
        .push_matrix(Ok(finished_matrix()))
        .push_steps(Ok(vec![robo_step(StepState::Running)]))
        .push_steps(Ok(vec![robo_step(StepState::Complete)]));

    let (status, body) = call(&app.router, "GET", TEST_URI, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "state": "PENDING" }));

    let (status, body) = call(&app.router, "GET", TEST_URI, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["steps"][0]["state"], "inProgress");

    for _ in 0..3 {
        let (status, body) = call(&app.router, "GET", TEST_URI, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["steps"][0]["state"], "complete");
        assert_eq!(body["steps"][0]["outcome"]["summary"], "success");
    }

    assert_eq!(
        app.sink.names(),
        vec![
            "upload_file_upload_requested",
            "testing_test_started",
            "testing_test_started_on_device",
            "testing_test_finished_on_device",
            "testing_test_finished",
        ]
    );
}

#[tokio::test]
async fn duplicate_registration_and_second_run_conflict() {
    let app = app();
    call(&app.router, "POST", ASSETS_URI, None).await;

    let (status, body) = call(&app.router, "POST", ASSETS_URI, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");
    assert_eq!(body["retryable"], false);

    app.remote.push_start(Ok(StartedMatrix {
        test_matrix_id: "matrix-1".into(),
        timestamp: Utc::now(),
    }));
    call(&app.router, "POST", TEST_URI, Some(robo_request())).await;
    let (status, _) = call(&app.router, "POST", TEST_URI, Some(robo_request())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.remote.start_calls(), 1);
}

#[tokio::test]
async fn error_kinds_map_to_status_codes() {
    let app = app();

    let (status, body) = call(&app.router, "GET", TEST_URI, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");

    call(&app.router, "POST", ASSETS_URI, None).await;
    let (status, body) = call(
        &app.router,
        "POST",
        TEST_URI,
        Some(json!({ "testSpecification": { "androidRoboTest": {} } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_request");

    app.remote.push_start(Ok(StartedMatrix {
        test_matrix_id: "matrix-1".into(),
        timestamp: Utc::now(),
    }));
    call(&app.router, "POST", TEST_URI, Some(robo_request())).await;

    app.remote.push_matrix(Err(RemoteError::Transport("reset".into())));
    let (status, body) = call(&app.router, "GET", TEST_URI, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "upstream_unavailable");
    assert_eq!(body["retryable"], true);
}

#[tokio::test]
async fn remote_error_state_is_bad_gateway() {
    let app = app();
    call(&app.router, "POST", ASSETS_URI, None).await;
    app.remote.push_start(Ok(StartedMatrix {
        test_matrix_id: "matrix-1".into(),
        timestamp: Utc::now(),
    }));
    call(&app.router, "POST", TEST_URI, Some(robo_request())).await;

    app.remote.push_matrix(Ok(MatrixSnapshot {
        state: MatrixState::IncompatibleEnvironment,
        invalid_matrix_details: Some("unsupported device".into()),
        ..MatrixSnapshot::default()
    }));
    let (status, body) = call(&app.router, "GET", TEST_URI, None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(
        body["error"],
        "test matrix failed: INCOMPATIBLE_ENVIRONMENT(unsupported device)"
    );
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn downloads_list_result_objects() {
    let app = app();

    let (status, _) = call(&app.router, "GET", ASSETS_URI, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    call(&app.router, "POST", ASSETS_URI, None).await;
    app.broker.add_result("b1", "Pixel4-30/logcat");

    let (status, body) = call(&app.router, "GET", ASSETS_URI, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["files"][0]["name"], "b1/results/Pixel4-30/logcat");
    assert!(body["files"][0]["url"].as_str().unwrap().contains("method=GET"));
}

#[tokio::test]
async fn malformed_start_body_is_invalid_request() {
    let app = app();
    call(&app.router, "POST", ASSETS_URI, None).await;

    let (status, body) = call(
        &app.router,
        "POST",
        TEST_URI,
        Some(json!({
            "environmentMatrix": { "androidDeviceList": { "androidDevices": "oops" } },
            "testSpecification": { "androidRoboTest": {} }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_request");
    assert_eq!(body["retryable"], false);

    let request = Request::builder()
        .method("POST")
        .uri(TEST_URI)
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .expect("request");
    let response = app.router.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(app.remote.start_calls(), 0);
}
