//! Registry HTTP Server
//!
//! JSON endpoints over the record store:
//! - `POST   /records`         create a record (derived code computed here)
//! - `GET    /records`         list every record
//! - `GET    /records/search`  name search, `?q=<substring>`
//! - `DELETE /records/{id}`    delete one record
//! - `GET    /health`          store connectivity check

use anyhow::Result;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Json, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::config::RegistryConfig;
use crate::records::{FieldError, NewPerson, PersonRecord, RecordSummary};
use crate::store::{RecordStore, StoreError};

// --- Error Handling ---
#[derive(Debug)]
pub enum ServerError {
    BadRequest(String),
    Store(StoreError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            ServerError::BadRequest(message) => {
                warn!("Bad request: {}", message);
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ServerError::Store(StoreError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response()
            }
            ServerError::Store(err) => {
                match &err {
                    StoreError::UniqueViolation { .. } => warn!("Rejected write: {}", err),
                    _ => error!("Store failure: {}", err),
                }
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": err.to_string(), "kind": err.kind() })),
                )
                    .into_response()
            }
        }
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<FieldError> for ServerError {
    fn from(err: FieldError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

/// Build the application router with tracing and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/records", get(list_records).post(create_record))
        .route("/records/search", get(search_records))
        .route("/records/{id}", delete(delete_record))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Serve until Ctrl-C. The caller owns the store and closes it afterwards.
pub async fn run_server(config: &RegistryConfig, state: AppState) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Registry listening at http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Registry server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn health(State(state): State<AppState>) -> Response {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn create_record(
    State(state): State<AppState>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<impl IntoResponse, ServerError> {
    let Json(body) = payload.map_err(|rejection| {
        debug!("Create payload rejected: {}", rejection.body_text());
        ServerError::BadRequest("invalid request, JSON body missing".to_string())
    })?;
    if body.is_empty() {
        return Err(ServerError::BadRequest(
            "invalid request, JSON body missing".to_string(),
        ));
    }

    debug!("Received record payload with {} fields", body.len());

    let record = NewPerson::from_json(&body)?.with_derived_code();
    let id = state.store.create(record).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "record created", "id": id })),
    ))
}

async fn list_records(
    State(state): State<AppState>,
) -> Result<Json<Vec<PersonRecord>>, ServerError> {
    Ok(Json(state.store.list_all().await?))
}

async fn search_records(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<RecordSummary>>, ServerError> {
    Ok(Json(state.store.search(&params.q).await?))
}

async fn delete_record(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ServerError> {
    let id = match id {
        Ok(Path(id)) if id > 0 => id,
        Ok(Path(id)) => {
            return Err(ServerError::BadRequest(format!("invalid record id '{}'", id)))
        }
        Err(rejection) => {
            debug!("Delete path rejected: {}", rejection.body_text());
            return Err(ServerError::BadRequest("invalid record id".to_string()));
        }
    };
    state.store.delete(id).await?;
    Ok((StatusCode::OK, Json(json!({ "message": "record deleted" }))))
}
