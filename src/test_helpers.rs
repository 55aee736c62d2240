//! Test helper factories and mock state builders
//!
//! Seeds records with sensible defaults and builds an in-memory server state
//! plus request/response helpers for handler tests.
#![allow(dead_code)]

use crate::api::{create_router, ServerState, SharedState};
use crate::db::Database;
use crate::events::Broadcaster;
use crate::records::{self, Consultation, ConsultationInput, Patient, PatientInput, Sex};
use crate::Config;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use chrono::{NaiveDate, Utc};
use http_body_util::BodyExt;
use rusqlite::params;
use std::sync::Arc;

// ============================================================================
// Record factories
// ============================================================================

/// Female patient born 1990-01-01
pub fn seed_patient(db: &Database, name: &str) -> Patient {
    seed_patient_born(db, name, NaiveDate::from_ymd_opt(1990, 1, 1).unwrap())
}

pub fn seed_patient_born(db: &Database, name: &str, birth_date: NaiveDate) -> Patient {
    records::patients::create(db, &PatientInput::new(name, birth_date, Sex::Female)).unwrap()
}

/// General medicine consultation admitted today
pub fn seed_consultation(db: &Database, patient_id: i64) -> Consultation {
    records::consultations::create(
        db,
        &ConsultationInput {
            patient_id,
            consultation_type_id: Some(1),
            admitted_on: Some(Utc::now().date_naive()),
            reason: Some("Routine checkup".into()),
            ..Default::default()
        },
    )
    .unwrap()
}

pub fn seed_measurement(db: &Database, consultation_id: i64, measure_id: i64, value: &str) {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO consultation_measurements (consultation_id, measure_id, value)
             VALUES (?1, ?2, ?3)",
            params![consultation_id, measure_id, value],
        )?;
        Ok(())
    })
    .unwrap();
}

/// Measurement with an explicit `recorded_at` (`YYYY-MM-DD HH:MM:SS`)
pub fn seed_measurement_at(
    db: &Database,
    consultation_id: i64,
    measure_id: i64,
    value: &str,
    recorded_at: &str,
) {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO consultation_measurements (consultation_id, measure_id, value, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![consultation_id, measure_id, value, recorded_at],
        )?;
        Ok(())
    })
    .unwrap();
}

// ============================================================================
// Mock state builders
// ============================================================================

/// Server state over an in-memory database, no remote analyzer
pub fn test_state() -> SharedState {
    test_state_with(Config::default())
}

pub fn test_state_with(config: Config) -> SharedState {
    Arc::new(ServerState {
        db: Database::open_in_memory().unwrap(),
        broadcaster: Broadcaster::new(),
        analyzer: None,
        config: Arc::new(config),
    })
}

/// Router plus a handle on its state, for seeding and subscribing
pub fn test_app() -> (Router, SharedState) {
    let state = test_state();
    (create_router(state.clone()), state)
}

pub fn test_app_with(config: Config) -> (Router, SharedState) {
    let state = test_state_with(config);
    (create_router(state.clone()), state)
}

// ============================================================================
// Request / response helpers
// ============================================================================

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_bytes(resp: Response) -> Vec<u8> {
    resp.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(resp: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}
