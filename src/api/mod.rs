//! HTTP API: record endpoints, dashboard aggregates and the change stream

pub mod consultation_handlers;
pub mod dashboard_handlers;
pub mod exam_handlers;
pub mod family_handlers;
pub mod handlers;
pub mod patient_handlers;
pub mod query;
pub mod routes;
pub mod stream_handlers;

pub use handlers::{AppError, ServerState, SharedState};
pub use query::*;
pub use routes::create_router;
