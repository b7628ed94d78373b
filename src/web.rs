//! HTTP 服务：上传 PNML，返回可达图 JSON。
//!
//! 每个请求独立解析、探索并导出；探索在阻塞线程池中执行，
//! 超时后通过取消令牌让探索器在下一次 BFS 迭代时退出。
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::QueryRejection;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Query, Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::analysis::{ExploreError, Explorer};
use crate::config::{PnConfig, limit_to_config};
use crate::export::{ExportError, Exporter, GraphExport, StateIdScheme};
use crate::net::{NetFormat, ParseError, ParsedNet, parse_net};

pub const ENGINE: &str = "pn-reach";
const PNML_FIELD: &str = "pnml_file";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Explore(#[from] ExploreError),
    #[error("{0}")]
    Export(#[from] ExportError),
    #[error("exploration did not finish within {0:?}")]
    Timeout(Duration),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Parse(ParseError::Net(_) | ParseError::Marking(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Parse(_) => StatusCode::BAD_REQUEST,
            ApiError::Explore(ExploreError::MarkingSize { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Explore(ExploreError::Cancelled { .. }) | ApiError::Timeout(_) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            ApiError::Explore(ExploreError::Fire(_))
            | ApiError::Export(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("request failed ({}): {}", status, self);
        } else {
            log::warn!("request rejected ({}): {}", status, self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<PnConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GraphQuery {
    pub state_ids: Option<StateIdScheme>,
    pub state_limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct PnmlBody {
    pnml: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub engine: String,
    pub version: String,
    pub server_time: String,
}

pub fn router(config: PnConfig) -> Router {
    let body_limit = config.server.max_upload_bytes;
    let cors = cors_layer(&config.server.cors_origins);
    let state = AppState {
        config: Arc::new(config),
    };

    Router::new()
        .route("/api/reachability-graph", post(reachability_graph_handler))
        .route("/api/pm4py/reachability-graph", post(reachability_graph_handler))
        .route("/api/health", get(health_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let origins = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("ignoring invalid CORS origin `{}`", origin);
                None
            }
        })
        .collect::<Vec<_>>();
    layer.allow_origin(AllowOrigin::list(origins))
}

pub async fn serve(config: PnConfig) -> anyhow::Result<()> {
    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("{} v{} listening on http://{}", ENGINE, env!("CARGO_PKG_VERSION"), addr);

    axum::serve(listener, router(config))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for shutdown signal: {}", err);
    }
}

async fn health_handler() -> Json<Health> {
    Json(Health {
        status: "ok".to_owned(),
        engine: ENGINE.to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        server_time: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    })
}

async fn reachability_graph_handler(
    State(state): State<AppState>,
    query: Result<Query<GraphQuery>, QueryRejection>,
    request: Request,
) -> Result<Json<GraphExport>, ApiError> {
    let Query(query) = query.map_err(|err| ApiError::BadRequest(err.body_text()))?;
    let config = &state.config;
    if query.state_limit == Some(0) {
        return Err(ApiError::BadRequest("state_limit must be positive".to_owned()));
    }

    let (content, format) = read_model(config, request).await?;
    let parsed = parse_net(&content, format)?;
    log::info!(
        "building reachability graph: {} places, {} transitions",
        parsed.net.places_len(),
        parsed.net.transitions_len()
    );
    parsed.net.log_diagnostics(Some(&parsed.initial_marking));

    let limit = config.exploration.capped_limit(query.state_limit);
    let scheme = query.state_ids.unwrap_or(config.export.state_ids);
    let generated_with = config.export.generated_with.clone();
    let timeout = config.server.request_timeout();

    let export = explore_with_timeout(parsed, limit, scheme, generated_with, timeout).await?;
    log::info!(
        "reachability graph ready: {} states, {} edges{}",
        export.stats.total_states,
        export.stats.total_transitions,
        if export.stats.truncated { " (truncated)" } else { "" }
    );
    Ok(Json(export))
}

async fn explore_with_timeout(
    parsed: ParsedNet,
    state_limit: usize,
    scheme: StateIdScheme,
    generated_with: String,
    timeout: Duration,
) -> Result<GraphExport, ApiError> {
    let token = CancellationToken::new();
    let worker_token = token.clone();

    let task = tokio::task::spawn_blocking(move || -> Result<GraphExport, ApiError> {
        let graph = Explorer::new(&parsed.net)
            .with_config(limit_to_config(state_limit))
            .with_cancellation(worker_token)
            .explore(&parsed.initial_marking)?;
        let export = Exporter::new(&parsed.net)
            .with_scheme(scheme)
            .with_generated_with(generated_with)
            .export(&graph)?;
        Ok(export)
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(ApiError::Internal(join.to_string())),
        Err(_) => {
            token.cancel();
            Err(ApiError::Timeout(timeout))
        }
    }
}

/// 依次尝试 multipart 上传、JSON 请求体、XML 请求体，最后退回到配置的默认模型。
async fn read_model(config: &PnConfig, request: Request) -> Result<(String, NetFormat), ApiError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|err| ApiError::BadRequest(err.body_text()))?;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| ApiError::BadRequest(err.body_text()))?
        {
            if field.name() == Some(PNML_FIELD) {
                let text = field
                    .text()
                    .await
                    .map_err(|err| ApiError::BadRequest(err.body_text()))?;
                return Ok((text, NetFormat::Pnml));
            }
        }
        return fallback_model(config).await;
    }

    if content_type.starts_with("application/json") {
        let Json(body) = Json::<PnmlBody>::from_request(request, &())
            .await
            .map_err(|err| ApiError::BadRequest(err.body_text()))?;
        return Ok((body.pnml, NetFormat::Pnml));
    }

    if content_type.contains("xml") {
        let text = String::from_request(request, &())
            .await
            .map_err(|err| ApiError::BadRequest(err.body_text()))?;
        if !text.trim().is_empty() {
            return Ok((text, NetFormat::Pnml));
        }
    }

    fallback_model(config).await
}

async fn fallback_model(config: &PnConfig) -> Result<(String, NetFormat), ApiError> {
    let missing = || ApiError::BadRequest("No PNML file provided".to_owned());
    let Some(path) = config.server.fallback_model.as_deref() else {
        return Err(missing());
    };
    if !Path::new(path).is_file() {
        return Err(missing());
    }
    log::info!("no model in request, using fallback {:?}", path);
    let format = NetFormat::from_path(path)?;
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| ApiError::Parse(ParseError::Io(err)))?;
    Ok((content, format))
}
