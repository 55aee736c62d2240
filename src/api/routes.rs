//! API route definitions

use super::handlers::{self, SharedState};
use super::{
    consultation_handlers, dashboard_handlers, exam_handlers, family_handlers, patient_handlers,
    stream_handlers,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    // Exam files arrive base64-encoded inside JSON bodies
    let body_limit = exam_handlers::request_body_limit(state.config.max_exam_file_bytes);

    Router::new()
        // Health check
        .route("/api/health", get(handlers::health))
        // ====================================================================
        // Change stream
        // ====================================================================
        .route("/api/patients/stream", get(stream_handlers::event_stream))
        .route("/api/events/stream", get(stream_handlers::event_stream))
        // ====================================================================
        // Patients
        // ====================================================================
        .route(
            "/api/patients",
            get(patient_handlers::list_patients).post(patient_handlers::create_patient),
        )
        .route(
            "/api/patients/{id}",
            get(patient_handlers::get_patient)
                .put(patient_handlers::update_patient)
                .delete(patient_handlers::delete_patient),
        )
        .route(
            "/api/patients/{id}/consultations",
            get(patient_handlers::patient_consultations),
        )
        .route(
            "/api/patients/{id}/vital-signs",
            get(patient_handlers::patient_vital_signs),
        )
        .route(
            "/api/patients/{id}/chronic-medications",
            get(patient_handlers::patient_chronic_medications),
        )
        .route(
            "/api/patients/{id}/habits",
            get(patient_handlers::patient_habits),
        )
        .route(
            "/api/patients/{id}/allergies",
            get(patient_handlers::patient_allergies),
        )
        .route(
            "/api/patients/{id}/vaccines",
            get(patient_handlers::patient_vaccines),
        )
        .route(
            "/api/patients/{id}/diagnostics",
            get(patient_handlers::patient_diagnostics),
        )
        .route(
            "/api/patients/{id}/procedures",
            get(patient_handlers::patient_procedures),
        )
        .route(
            "/api/patients/{id}/exams",
            get(patient_handlers::patient_exams).post(patient_handlers::create_patient_exam),
        )
        .route(
            "/api/patients/{id}/families",
            get(family_handlers::patient_families),
        )
        // ====================================================================
        // Consultations
        // ====================================================================
        .route(
            "/api/consultations",
            get(consultation_handlers::list_consultations)
                .post(consultation_handlers::create_consultation),
        )
        .route(
            "/api/consultations/form-options",
            get(consultation_handlers::consultation_form_options),
        )
        .route(
            "/api/consultations/{id}",
            get(consultation_handlers::get_consultation)
                .put(consultation_handlers::update_consultation)
                .delete(consultation_handlers::delete_consultation),
        )
        .route(
            "/api/consultations/{id}/exams",
            post(exam_handlers::create_consultation_exam),
        )
        // ====================================================================
        // Exam files and analysis
        // ====================================================================
        .route(
            "/api/consultations/{id}/exams/{exam_id}/file",
            get(exam_handlers::get_exam_file).put(exam_handlers::upload_exam_file),
        )
        .route(
            "/api/consultations/{id}/exams/{exam_id}/download",
            get(exam_handlers::download_exam_file),
        )
        .route(
            "/api/consultations/{id}/exams/{exam_id}/analyze",
            post(exam_handlers::analyze_exam),
        )
        .route(
            "/api/consultations/{id}/exams/{exam_id}/suggestions",
            post(exam_handlers::exam_suggestions),
        )
        .route(
            "/api/consultations/{id}/exams/{exam_id}/apply-suggestions",
            put(exam_handlers::apply_exam_suggestions),
        )
        // ====================================================================
        // Families
        // ====================================================================
        .route("/api/families", post(family_handlers::create_family))
        .route(
            "/api/families/{id}",
            get(family_handlers::get_family)
                .put(family_handlers::update_family)
                .delete(family_handlers::delete_family),
        )
        .route(
            "/api/families/{id}/members",
            post(family_handlers::add_family_member),
        )
        .route(
            "/api/families/{id}/members/{patient_id}",
            put(family_handlers::update_family_member)
                .delete(family_handlers::remove_family_member),
        )
        // ====================================================================
        // Dashboard
        // ====================================================================
        .route("/api/dashboard/stats", get(dashboard_handlers::stats))
        .route(
            "/api/dashboard/consultations-per-day",
            get(dashboard_handlers::consultations_per_day),
        )
        .route(
            "/api/dashboard/patients-by-age",
            get(dashboard_handlers::patients_by_age),
        )
        .route("/api/dashboard/top-exams", get(dashboard_handlers::top_exams))
        .route(
            "/api/dashboard/top-medications",
            get(dashboard_handlers::top_medications),
        )
        .route(
            "/api/dashboard/recent-patients",
            get(dashboard_handlers::recent_patients),
        )
        .route(
            "/api/dashboard/vital-sign-alerts",
            get(dashboard_handlers::vital_sign_alerts),
        )
        .route(
            "/api/dashboard/patients/{id}",
            get(dashboard_handlers::patient_dashboard),
        )
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
