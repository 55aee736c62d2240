//! Shared server state, error type and the health check

use crate::analysis::DocumentAnalyzer;
use crate::db::{Database, DatabaseError};
use crate::events::{Broadcaster, ChangeEvent, EventEmitter};
use crate::Config;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

/// Shared server state
pub struct ServerState {
    pub db: Database,
    /// Fan-out of change events to open streams
    pub broadcaster: Broadcaster,
    /// Remote document analyzer. None means always use the simulated report.
    pub analyzer: Option<Arc<dyn DocumentAnalyzer>>,
    pub config: Arc<Config>,
}

/// Shared state handle passed to every handler
pub type SharedState = Arc<ServerState>;

impl ServerState {
    /// Emit a change event to every open stream. Called only after the write
    /// committed; delivery problems never reach the caller.
    pub fn emit(&self, event: ChangeEvent) {
        self.broadcaster.emit(event);
    }
}

/// Trimmed text, `None` when absent or blank
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A required text field, 400 when absent or blank
pub(crate) fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    non_empty(value).ok_or_else(|| AppError::BadRequest(format!("{} is required", field)))
}

// ============================================================================
// Health check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub subscribers: usize,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Health check handler. 503 when the database does not answer.
pub async fn health(State(state): State<SharedState>) -> (StatusCode, Json<HealthResponse>) {
    let subscribers = state.broadcaster.subscriber_count();
    let timestamp = chrono::Utc::now().to_rfc3339();

    match state.db.ping() {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".into(),
                database: "connected".into(),
                subscribers,
                timestamp,
                message: None,
            }),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "error".into(),
                    database: "disconnected".into(),
                    subscribers,
                    timestamp,
                    message: Some(e.to_string()),
                }),
            )
        }
    }
}

// ============================================================================
// Error handling
// ============================================================================

/// API error type
#[derive(Debug)]
pub enum AppError {
    Internal(anyhow::Error),
    NotFound(String),
    BadRequest(String),
    PayloadTooLarge(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        if err.is_constraint_violation() {
            AppError::BadRequest(format!("Invalid reference or duplicate value: {}", err))
        } else {
            AppError::Internal(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{body_json, get, test_app};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_reports_database_and_subscribers() {
        let (app, state) = test_app();
        let _subscription = state.broadcaster.subscribe_channel();

        let resp = app.oneshot(get("/api/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["database"], "connected");
        assert_eq!(json["subscribers"], 1);
        assert!(json["timestamp"].is_string());
        assert!(json.get("message").is_none());
    }

    #[tokio::test]
    async fn test_app_error_renders_json() {
        let resp = AppError::PayloadTooLarge("too big".into()).into_response();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let json = body_json(resp).await;
        assert_eq!(json, serde_json::json!({"error": "too big"}));
    }

    #[test]
    fn test_required_rejects_blank() {
        assert_eq!(required(Some(" Ana ".into()), "name").unwrap(), "Ana");
        assert!(matches!(
            required(Some("   ".into()), "name"),
            Err(AppError::BadRequest(msg)) if msg == "name is required"
        ));
        assert!(required(None, "name").is_err());
        assert_eq!(non_empty(Some(String::new())), None);
    }

    #[test]
    fn test_constraint_violation_maps_to_bad_request() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .with_conn(|conn| {
                conn.execute("INSERT INTO consultations (patient_id) VALUES (999)", [])?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(AppError::from(err), AppError::BadRequest(_)));
        assert!(matches!(
            AppError::from(DatabaseError::LockPoisoned),
            AppError::Internal(_)
        ));
    }
}
