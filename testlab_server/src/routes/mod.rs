//! Test API HTTP routes.

pub mod api;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::assets::{AssetBroker, UploadUrls};
use crate::error::TestlabError;
use crate::events::EventSink;
use crate::models::run_request::TestMatrixRequest;
use crate::remote::RemoteJobClient;
use crate::services::asset_service::AssetService;
use crate::services::classifier::NameTokenRules;
use crate::services::run_service::RunService;
use crate::services::status_service::{StatusReconciler, StatusView};
use crate::store::BuildStore;

/// Shared state for test route handlers.
#[derive(Clone)]
pub struct TestlabRouterState {
    pub reconciler: Arc<StatusReconciler>,
    pub runs: Arc<RunService>,
    pub assets: Arc<AssetService>,
}

impl TestlabRouterState {
    /// Wire the services over shared backends, with name-token step naming.
    pub fn new(
        store: Arc<dyn BuildStore>,
        remote: Arc<dyn RemoteJobClient>,
        broker: Arc<dyn AssetBroker>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            reconciler: Arc::new(StatusReconciler::new(
                store.clone(),
                remote.clone(),
                sink.clone(),
                Arc::new(NameTokenRules),
            )),
            runs: Arc::new(RunService::new(store.clone(), remote, sink.clone())),
            assets: Arc::new(AssetService::new(store, broker, sink)),
        }
    }
}

type BuildPath = Path<(String, String)>;

/// Build the test service's Axum router.
pub fn testlab_router(state: TestlabRouterState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/apps/{app_slug}/builds/{build_slug}/test",
            get(get_status).post(start_run),
        )
        .route(
            "/api/apps/{app_slug}/builds/{build_slug}/assets",
            get(download_assets).post(register_assets),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

// ── Test runs ──

async fn get_status(
    State(state): State<TestlabRouterState>,
    Path((app_slug, build_slug)): BuildPath,
) -> Result<Json<StatusView>, TestlabError> {
    state.reconciler.reconcile(&app_slug, &build_slug).await.map(Json)
}

async fn start_run(
    State(state): State<TestlabRouterState>,
    Path((app_slug, build_slug)): BuildPath,
    payload: Result<Json<TestMatrixRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<api::StartRunResponse>), TestlabError> {
    let Json(request) = payload?;
    let matrix_id = state.runs.start_run(&app_slug, &build_slug, &request).await?;
    Ok((StatusCode::CREATED, Json(api::StartRunResponse { matrix_id })))
}

// ── Assets ──

async fn register_assets(
    State(state): State<TestlabRouterState>,
    Path((app_slug, build_slug)): BuildPath,
) -> Result<(StatusCode, Json<UploadUrls>), TestlabError> {
    let urls = state.assets.register_assets(&app_slug, &build_slug).await?;
    Ok((StatusCode::CREATED, Json(urls)))
}

async fn download_assets(
    State(state): State<TestlabRouterState>,
    Path((app_slug, build_slug)): BuildPath,
) -> Result<Json<api::DownloadsResponse>, TestlabError> {
    let files = state.assets.download_assets(&app_slug, &build_slug).await?;
    Ok(Json(api::DownloadsResponse { files }))
}
