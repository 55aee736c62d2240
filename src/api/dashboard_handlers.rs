//! API handlers for dashboard aggregates

use super::handlers::{AppError, SharedState};
use super::patient_handlers::ensure_patient;
use super::query::{DaysParams, LimitParams};
use crate::records::{
    dashboard, DailyCount, DashboardStats, LabelCount, PatientDashboard, RecentPatient,
    VitalSignAlert,
};
use axum::{
    extract::{Path, Query, State},
    Json,
};

pub async fn stats(State(state): State<SharedState>) -> Result<Json<DashboardStats>, AppError> {
    Ok(Json(state.db.blocking(dashboard::stats).await?))
}

pub async fn consultations_per_day(
    State(state): State<SharedState>,
    Query(params): Query<DaysParams>,
) -> Result<Json<Vec<DailyCount>>, AppError> {
    let days = params.days();
    Ok(Json(
        state
            .db
            .blocking(move |db| dashboard::consultations_per_day(db, days))
            .await?,
    ))
}

pub async fn patients_by_age(
    State(state): State<SharedState>,
) -> Result<Json<Vec<LabelCount>>, AppError> {
    Ok(Json(state.db.blocking(dashboard::patients_by_age).await?))
}

pub async fn top_exams(
    State(state): State<SharedState>,
) -> Result<Json<Vec<LabelCount>>, AppError> {
    Ok(Json(state.db.blocking(dashboard::top_exams).await?))
}

pub async fn top_medications(
    State(state): State<SharedState>,
) -> Result<Json<Vec<LabelCount>>, AppError> {
    Ok(Json(state.db.blocking(dashboard::top_medications).await?))
}

pub async fn recent_patients(
    State(state): State<SharedState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<RecentPatient>>, AppError> {
    let limit = params.limit();
    Ok(Json(
        state
            .db
            .blocking(move |db| dashboard::recent_patients(db, limit))
            .await?,
    ))
}

pub async fn vital_sign_alerts(
    State(state): State<SharedState>,
) -> Result<Json<Vec<VitalSignAlert>>, AppError> {
    Ok(Json(state.db.blocking(dashboard::vital_sign_alerts).await?))
}

/// Metrics and short lists for one patient; 404 when the patient is missing
pub async fn patient_dashboard(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<PatientDashboard>, AppError> {
    ensure_patient(&state, id)?;
    Ok(Json(
        state
            .db
            .blocking(move |db| dashboard::for_patient(db, id))
            .await?,
    ))
}

#[cfg(test)]
mod tests {
    use crate::test_helpers::{
        body_json, get, seed_consultation, seed_measurement, seed_patient, test_app,
    };
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_dashboard_endpoints_respond() {
        let (app, state) = test_app();
        let patient = seed_patient(&state.db, "Ana");
        let consultation = seed_consultation(&state.db, patient.id);
        seed_measurement(&state.db, consultation.id, 2, "39.5");

        let patient_uri = format!("/api/dashboard/patients/{}", patient.id);
        for uri in [
            "/api/dashboard/stats",
            "/api/dashboard/consultations-per-day?days=7",
            "/api/dashboard/patients-by-age",
            "/api/dashboard/top-exams",
            "/api/dashboard/top-medications",
            "/api/dashboard/recent-patients?limit=5",
            "/api/dashboard/vital-sign-alerts",
            patient_uri.as_str(),
        ] {
            let resp = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "uri: {}", uri);
        }
    }

    #[tokio::test]
    async fn test_stats_counts() {
        let (app, state) = test_app();
        let patient = seed_patient(&state.db, "Ana");
        let consultation = seed_consultation(&state.db, patient.id);
        seed_measurement(&state.db, consultation.id, 2, "39.5");

        let resp = app.oneshot(get("/api/dashboard/stats")).await.unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["metrics"]["total_patients"], 1);
        assert_eq!(json["metrics"]["consultations_today"], 1);
        assert_eq!(json["metrics"]["critical_patients"], 1);
        assert_eq!(json["latest_consultations"][0]["patient_name"], "Ana");
    }

    #[tokio::test]
    async fn test_age_buckets_always_present() {
        let (app, _state) = test_app();
        let resp = app
            .oneshot(get("/api/dashboard/patients-by-age"))
            .await
            .unwrap();
        let json = body_json(resp).await;
        let labels: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["label"].as_str().unwrap())
            .collect();
        assert_eq!(labels, vec!["0-17", "18-40", "41-65", "65+"]);
    }

    #[tokio::test]
    async fn test_fever_alert() {
        let (app, state) = test_app();
        let patient = seed_patient(&state.db, "Ana");
        let consultation = seed_consultation(&state.db, patient.id);
        seed_measurement(&state.db, consultation.id, 2, "39.5");

        let resp = app
            .oneshot(get("/api/dashboard/vital-sign-alerts"))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json[0]["patient_name"], "Ana");
        assert_eq!(json[0]["alert"], "fever");
    }

    #[tokio::test]
    async fn test_invalid_days_is_rejected() {
        let (app, _state) = test_app();
        let resp = app
            .oneshot(get("/api/dashboard/consultations-per-day?days=abc"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_patient_dashboard() {
        let (app, state) = test_app();
        let patient = seed_patient(&state.db, "Ana");
        let consultation = seed_consultation(&state.db, patient.id);
        seed_consultation(&state.db, seed_patient(&state.db, "Luis").id);

        let resp = app
            .clone()
            .oneshot(get(&format!("/api/dashboard/patients/{}", patient.id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["patient_id"], patient.id);
        assert_eq!(json["metrics"]["total_consultations"], 1);
        assert_eq!(json["metrics"]["consultations_last_30_days"], 1);
        assert_eq!(
            json["latest_consultations"][0]["consultation_id"],
            consultation.id
        );
        assert_eq!(json["recent_diagnoses"], serde_json::json!([]));

        let resp = app
            .oneshot(get("/api/dashboard/patients/999"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
