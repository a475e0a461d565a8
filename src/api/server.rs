use std::path::PathBuf;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::analytics::{
    process_video, PipelineError, PoolError, ProcessingPool, SharedEstimator, VideoReport,
};
use crate::config::TrackingConfig;
use crate::storage::{BlobStore, TempVideo, TransferError, UriError, VideoUri};

const GREETING: &str = "Hallo! Willkommen bei gaitpose!";

#[derive(Clone)]
pub struct AppState {
    pub estimator: SharedEstimator,
    pub pool: ProcessingPool,
    pub blobs: BlobStore,
    pub tracking: TrackingConfig,
    pub temp_dir: PathBuf,
}

impl AppState {
    pub fn new(
        estimator: SharedEstimator,
        pool: ProcessingPool,
        blobs: BlobStore,
        tracking: TrackingConfig,
        temp_dir: PathBuf,
    ) -> Self {
        Self {
            estimator,
            pool,
            blobs,
            tracking,
            temp_dir,
        }
    }
}

#[derive(Deserialize)]
struct GaitQuery {
    video: String,
    height_cm: f64,
}

#[derive(Serialize)]
struct GaitResponse {
    #[serde(flatten)]
    report: VideoReport,
    height_cm: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    video: Option<String>,
}

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Transfer(TransferError),
    Unprocessable(PipelineError),
    Internal(String),
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl From<UriError> for ApiError {
    fn from(e: UriError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<TransferError> for ApiError {
    fn from(e: TransferError) -> Self {
        ApiError::Transfer(e)
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Open(_) | PipelineError::EmptyVideo => ApiError::Unprocessable(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<PoolError> for ApiError {
    fn from(e: PoolError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Transfer(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            ApiError::Unprocessable(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/gait", get(gait_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(state: AppState, port: u16) -> Result<(), std::io::Error> {
    let app = router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("starting HTTP server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn index_handler() -> impl IntoResponse {
    Json([GREETING])
}

async fn gait_handler(
    State(state): State<AppState>,
    query: Result<Query<GaitQuery>, QueryRejection>,
) -> Result<Json<GaitResponse>, ApiError> {
    let Query(query) = query?;
    let source = VideoUri::parse(&query.video)?;
    if !query.height_cm.is_finite() || query.height_cm <= 0.0 {
        return Err(ApiError::BadRequest(
            "height_cm must be a positive number".to_string(),
        ));
    }

    let input = TempVideo::new(&state.temp_dir, ".mp4");
    let output = TempVideo::new(&state.temp_dir, ".mp4");

    let result = analyze(&state, &source, &input, &output).await;

    input.remove().await;
    output.remove().await;

    let (report, video) = result?;
    Ok(Json(GaitResponse {
        report,
        height_cm: query.height_cm,
        video,
    }))
}

async fn analyze(
    state: &AppState,
    source: &VideoUri,
    input: &TempVideo,
    output: &TempVideo,
) -> Result<(VideoReport, Option<String>), ApiError> {
    tracing::info!(video = %source, "gait analysis requested");

    let bytes = state.blobs.download(source, input.path()).await?;
    tracing::debug!(video = %source, bytes, available = state.pool.available(), "queued for processing");

    let report = {
        let path_in = input.path().to_path_buf();
        let path_out = output.path().to_path_buf();
        let estimator = state.estimator.clone();
        let tracking = state.tracking.clone();
        state
            .pool
            .run(move || process_video(&path_in, &path_out, estimator, tracking))
            .await??
    };

    let video = match source.processed() {
        Some(dest) => {
            state.blobs.upload(output.path(), &dest).await?;
            Some(dest.to_string())
        }
        None => None,
    };

    tracing::info!(
        video = %source,
        frames = report.frames,
        frames_with_pose = report.frames_with_pose,
        inference_time = format!("{:.2}", report.inference_time),
        "gait analysis finished"
    );

    Ok((report, video))
}
