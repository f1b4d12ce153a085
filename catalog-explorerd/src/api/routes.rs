use std::sync::Arc;
use axum::{
    extract::{Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use shared::types::{Progress, QueryOptions, Resource, Service};
use crate::error::ExplorerError;
use crate::explorer::Explorer;
use crate::export::{self, ExportFormat};
use crate::walker::ProgressCallback;

const WARNING_HEADER: HeaderName = HeaderName::from_static("x-query-warning");

#[derive(Clone)]
pub struct AppState {
    pub explorer: Arc<Explorer>,
    pub progress_tx: Arc<watch::Sender<Progress>>,
}

impl AppState {
    pub fn new(explorer: Arc<Explorer>) -> Self {
        let (progress_tx, _) = watch::channel(Progress::default());
        Self {
            explorer,
            progress_tx: Arc::new(progress_tx),
        }
    }

    /// Progress callback publishing every report to the watch channel
    fn progress_callback(&self) -> ProgressCallback {
        let tx = self.progress_tx.clone();
        Arc::new(move |progress: &Progress| {
            tx.send_replace(progress.clone());
        })
    }
}

#[derive(Deserialize)]
pub struct DiscoveryParams {
    pub url: String,
    #[serde(default = "default_use_cache")]
    pub cache: bool,
}

#[derive(Deserialize)]
pub struct QueryParams {
    pub service: String,
    pub id: i64,
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
    pub out_fields: Option<String>,
    pub return_geometry: Option<bool>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub cache: bool,
    #[serde(default)]
    pub format: ExportFormat,
}

#[derive(Deserialize)]
pub struct ClearCacheParams {
    pub url: Option<String>,
}

#[derive(Serialize)]
pub struct ClearCacheResponse {
    pub removed: usize,
}

fn default_use_cache() -> bool {
    true
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/catalog", get(get_catalog))
        .route("/v1/resources", get(get_resources))
        .route("/v1/query", get(query_layer))
        .route("/v1/discovery/progress", get(get_progress))
        .route("/v1/discovery/cancel", post(cancel_discovery))
        .route("/v1/cache", axum::routing::delete(clear_cache))
        .with_state(state)
}

fn error_response(e: ExplorerError) -> (StatusCode, String) {
    let status = match &e {
        ExplorerError::Cancelled => StatusCode::CONFLICT,
        ExplorerError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
        ExplorerError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_GATEWAY,
    };
    if status != StatusCode::CONFLICT {
        tracing::error!("Request failed: {}", e);
    }
    (status, e.to_string())
}

async fn get_catalog(
    State(state): State<AppState>,
    Query(params): Query<DiscoveryParams>,
) -> Result<Json<Vec<Service>>, (StatusCode, String)> {
    state
        .explorer
        .get_catalog(&params.url, params.cache, Some(state.progress_callback()))
        .await
        .map(Json)
        .map_err(error_response)
}

async fn get_resources(
    State(state): State<AppState>,
    Query(params): Query<DiscoveryParams>,
) -> Result<Json<Vec<Resource>>, (StatusCode, String)> {
    state
        .explorer
        .get_resource_catalog(&params.url, params.cache, Some(state.progress_callback()))
        .await
        .map(Json)
        .map_err(error_response)
}

async fn query_layer(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Response, (StatusCode, String)> {
    let defaults = QueryOptions::default();
    let options = QueryOptions {
        where_clause: params.where_clause.unwrap_or(defaults.where_clause),
        out_fields: params.out_fields.unwrap_or(defaults.out_fields),
        return_geometry: params.return_geometry.unwrap_or(defaults.return_geometry),
        result_record_count: params.limit.unwrap_or(defaults.result_record_count),
    };

    let result = state
        .explorer
        .query_layer(&params.service, params.id, &options, params.cache)
        .await
        .map_err(error_response)?;

    let body = match params.format {
        ExportFormat::Json => export::to_json(&result).map_err(|e| {
            tracing::error!("Failed to serialize query result: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?,
        ExportFormat::GeoJson => export::to_geojson(&result).to_string(),
        ExportFormat::Csv => export::to_csv(&result),
    };

    let mut response = (
        [(header::CONTENT_TYPE, params.format.content_type())],
        body,
    )
        .into_response();

    if let Some(warning) = result.warning() {
        if let Ok(value) = HeaderValue::from_str(&warning) {
            response.headers_mut().insert(WARNING_HEADER, value);
        }
    }

    Ok(response)
}

async fn get_progress(State(state): State<AppState>) -> Json<Progress> {
    Json(state.progress_tx.borrow().clone())
}

async fn cancel_discovery(State(state): State<AppState>) -> StatusCode {
    state.explorer.cancel_discovery();
    StatusCode::NO_CONTENT
}

async fn clear_cache(
    State(state): State<AppState>,
    Query(params): Query<ClearCacheParams>,
) -> Result<Json<ClearCacheResponse>, (StatusCode, String)> {
    state
        .explorer
        .clear_cache(params.url.as_deref())
        .await
        .map(|removed| Json(ClearCacheResponse { removed }))
        .map_err(error_response)
}
