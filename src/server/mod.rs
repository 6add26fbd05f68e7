//! HTTP API - weight writes, week views and progress for students

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::db::Database;
use crate::error::ServiceError;
use crate::progress::SortOrder;
use crate::service::{self, WeightRequest};

pub type SharedDb = Arc<Mutex<Database>>;

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = if self.is_not_found() {
            StatusCode::NOT_FOUND
        } else if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected ({}): {}", self.code(), self);
        }

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct ProgressQuery {
    #[serde(default)]
    semana: Option<i64>,
    #[serde(default)]
    orden: SortOrder,
}

/// Build the API router
pub fn router(db: SharedDb) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/students/:student_id/weight/:day/:block/:exercise",
            put(put_weight),
        )
        .route("/students/:student_id/weight/:week", get(get_week_weights))
        .route("/students/:student_id/progress", get(get_progress))
        .route("/students/:student_id/orphans", get(get_orphans))
        .with_state(db)
}

/// Bind and serve until Ctrl-C
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let db = Arc::new(Mutex::new(Database::open(&config.db_path)?));
    let listener = tokio::net::TcpListener::bind(config.addr).await?;

    info!("Listening on {} (database: {})", config.addr, config.db_path);

    axum::serve(listener, router(db))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}

fn path_params<T>(path: Result<Path<T>, PathRejection>) -> Result<T, ServiceError> {
    path.map(|Path(params)| params)
        .map_err(|e| ServiceError::BadRequest(e.body_text()))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn put_weight(
    State(db): State<SharedDb>,
    path: Result<Path<(String, i64, i64, i64)>, PathRejection>,
    payload: Result<Json<WeightRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let (student_id, day, block, exercise) = path_params(path)?;
    let Json(request) = payload.map_err(|e| ServiceError::BadRequest(e.body_text()))?;

    let mut db = db.lock().await;
    let response = service::record_weight(&mut db, &student_id, (day, block, exercise), &request)?;
    Ok((StatusCode::OK, Json(response)).into_response())
}

async fn get_week_weights(
    State(db): State<SharedDb>,
    path: Result<Path<(String, i64)>, PathRejection>,
) -> Result<Response, ServiceError> {
    let (student_id, week) = path_params(path)?;
    let db = db.lock().await;
    let view = service::week_weights(&db, &student_id, week)?;
    Ok(Json(view).into_response())
}

async fn get_progress(
    State(db): State<SharedDb>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ProgressQuery>, QueryRejection>,
) -> Result<Response, ServiceError> {
    let student_id = path_params(path)?;
    let Query(query) = query.map_err(|e| ServiceError::BadRequest(e.body_text()))?;
    let db = db.lock().await;
    let view = service::progress(&db, &student_id, query.semana, query.orden)?;
    Ok(Json(view).into_response())
}

async fn get_orphans(
    State(db): State<SharedDb>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Response, ServiceError> {
    let student_id = path_params(path)?;
    let db = db.lock().await;
    let keys = service::orphans(&db, &student_id)?;
    Ok(Json(json!({ "huerfanos": keys })).into_response())
}
