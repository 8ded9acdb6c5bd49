//! HTTP server implementation using Axum.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::error::{AppError, Result};
use crate::paths;
use crate::service::{DirectoryRequest, DirectoryResponse, DirectoryService};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) | AppError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            AppError::Refused(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({ "kind": self.kind(), "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Run blocking service work (filesystem, SQLite) off the async executor.
async fn blocking<T, F>(service: Arc<DirectoryService>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&DirectoryService) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| AppError::Io(std::io::Error::other(e)))?
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// `POST /directories`: one directory action per request.
async fn handle_action(
    State(service): State<Arc<DirectoryService>>,
    Json(request): Json<DirectoryRequest>,
) -> Json<DirectoryResponse> {
    debug!(action = request.action(), "directory request");
    let response = blocking(service, move |s| Ok(s.handle(request)))
        .await
        .unwrap_or_else(|e| DirectoryResponse::failure(&e));
    Json(response)
}

/// `GET /directories`: the full directory tree.
async fn handle_snapshot(
    State(service): State<Arc<DirectoryService>>,
) -> std::result::Result<Response, AppError> {
    let snapshot = blocking(service, |s| s.snapshot()).await?;
    Ok(Json(snapshot).into_response())
}

#[derive(Debug, Deserialize)]
struct RecordsQuery {
    dir: Option<String>,
}

/// `GET /records?dir=D`: records filed directly in `D`.
async fn handle_records(
    State(service): State<Arc<DirectoryService>>,
    Query(query): Query<RecordsQuery>,
) -> std::result::Result<Response, AppError> {
    let dir = query.dir.unwrap_or_else(|| paths::ROOT_ID.to_string());
    let records = blocking(service, move |s| s.records_in(&dir)).await?;
    Ok(Json(records).into_response())
}

/// Build the router over a shared service.
pub fn router(service: Arc<DirectoryService>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/directories", post(handle_action).get(handle_snapshot))
        .route("/records", get(handle_records))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Bind and serve in the background.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(
    service: Arc<DirectoryService>,
    host: &str,
    port: u16,
) -> Result<SocketAddr> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| AppError::Config(format!("invalid listen address {}:{}: {}", host, port, e)))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;
    info!("Server listening on {}", actual_addr);

    let app = router(service);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "server stopped");
        }
    });

    Ok(actual_addr)
}
