use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::construct::Node;
use crate::datatype::Instant;
use crate::engine::Engine;
use crate::error::{CanopyError, Result};
use crate::render;
use crate::validate;

pub type SharedEngine = Arc<Mutex<Engine>>;

#[derive(Deserialize)]
pub struct AsOf {
    #[serde(default)]
    pub as_of: Option<Instant>,
}

#[derive(Deserialize)]
pub struct At {
    #[serde(default)]
    pub at: Option<Instant>,
}

#[derive(Serialize)]
pub struct InsertResponse {
    pub status: String,
    pub inserted: usize,
    pub elapsed_ms: f64,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub status: String,
    pub error: String,
}

pub fn router(engine: SharedEngine) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);
    Router::new()
        .route("/v1/trees/:tree_type", get(get_tree).post(insert_tree))
        .route("/v1/trees/:tree_type/table", get(get_table))
        .layer(cors)
        .with_state(engine)
}

pub async fn serve(engine: SharedEngine, listen: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| CanopyError::Config(format!("cannot listen on {}: {}", listen, e)))?;
    info!(%listen, "serving trees");
    axum::serve(listener, router(engine))
        .await
        .map_err(|e| CanopyError::Store(e.to_string()))
}

async fn get_tree(
    State(engine): State<SharedEngine>,
    Path(tree_type): Path<String>,
    Query(query): Query<AsOf>,
) -> Response {
    let result = blocking(move || {
        let tree_type = validate::parse_id(&tree_type, "tree_type_id")?;
        let engine = lock(&engine)?;
        engine.get_tree_as_of(tree_type, query.as_of.unwrap_or(engine.query_instant()))
    })
    .await;
    match result {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_table(
    State(engine): State<SharedEngine>,
    Path(tree_type): Path<String>,
    Query(query): Query<AsOf>,
) -> Response {
    let result = blocking(move || {
        let tree_type = validate::parse_id(&tree_type, "tree_type_id")?;
        let engine = lock(&engine)?;
        engine.get_tree_as_of(tree_type, query.as_of.unwrap_or(engine.query_instant()))
    })
    .await;
    match result {
        Ok(snapshot) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            render::rows_to_table(&snapshot.rows),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn insert_tree(
    State(engine): State<SharedEngine>,
    Path(tree_type): Path<String>,
    Query(query): Query<At>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let started = std::time::Instant::now();
    let result = blocking(move || {
        let tree_type = validate::parse_id(&tree_type, "tree_type_id")?;
        let tree = Node::from_json(&body);
        let mut engine = lock(&engine)?;
        let valid_from = query.at.unwrap_or(engine.query_instant());
        engine.insert_tree_at(tree_type, &tree, valid_from)
    })
    .await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    match result {
        Ok(inserted) => {
            info!(ms = elapsed_ms, inserted, "tree inserted");
            let body = InsertResponse { status: "ok".into(), inserted, elapsed_ms };
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(e) => error_response(e),
    }
}

// The engine is synchronous, so calls run on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        warn!(error = %e, "join error");
        CanopyError::Store(format!("join error: {}", e))
    })?
}

fn lock(engine: &SharedEngine) -> Result<std::sync::MutexGuard<'_, Engine>> {
    engine.lock().map_err(|e| CanopyError::Lock(e.to_string()))
}

fn status_of(error: &CanopyError) -> StatusCode {
    match error {
        CanopyError::Validation(_) => StatusCode::BAD_REQUEST,
        CanopyError::NotFound(_) => StatusCode::NOT_FOUND,
        CanopyError::DuplicateLabel { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: CanopyError) -> Response {
    let status = status_of(&error);
    let msg = error.to_string();
    warn!(%msg, code = %status.as_u16(), "request failed");
    let body = ErrorResponse { status: "error".into(), error: msg };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_statuses() {
        assert_eq!(status_of(&CanopyError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(&CanopyError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(&CanopyError::DuplicateLabel { parent: "the top level".into(), label: "a".into() }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(&CanopyError::Store("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
