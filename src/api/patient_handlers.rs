//! API handlers for patients and their read-only clinical record

use super::exam_handlers::ExamBody;
use super::handlers::{non_empty, required, AppError, SharedState};
use crate::events::{ChangeEvent, EntityRef};
use crate::records::exams::{CreatedExam, ExamLink};
use crate::records::{
    self, ChronicMedication, Patient, PatientAllergy, PatientConsultation, PatientDiagnosis,
    PatientExam, PatientHabit, PatientInput, PatientProcedure, PatientVaccine, Sex, VitalSign,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

const RECORD_CONSULTATIONS_LIMIT: u32 = 10;
const RECORD_VITAL_SIGNS_LIMIT: u32 = 30;
const RECORD_EXAMS_LIMIT: u32 = 20;
const RECORD_DIAGNOSES_LIMIT: u32 = 50;
const RECORD_PROCEDURES_LIMIT: u32 = 50;

// ============================================================================
// Request types
// ============================================================================

/// Create/replace body. Required fields are optional here so that a missing
/// one is reported as a 400 with a message.
#[derive(Debug, Deserialize, Default)]
pub struct PatientBody {
    pub name: Option<String>,
    pub photo_url: Option<String>,
    pub birth_date: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub sex: Option<String>,
    pub nationality: Option<String>,
    pub occupation: Option<String>,
    pub insurance: Option<String>,
    pub blood_type: Option<String>,
}

impl PatientBody {
    pub fn validate(self) -> Result<PatientInput, AppError> {
        let name = required(self.name, "name")?;
        let birth_date = required(self.birth_date, "birth_date")?;
        let birth_date = NaiveDate::parse_from_str(&birth_date, "%Y-%m-%d").map_err(|_| {
            AppError::BadRequest("birth_date must be a date (YYYY-MM-DD)".to_string())
        })?;
        let sex: Sex = required(self.sex, "sex")?
            .parse()
            .map_err(AppError::BadRequest)?;

        Ok(PatientInput {
            name,
            photo_url: non_empty(self.photo_url),
            birth_date,
            email: non_empty(self.email),
            phone: non_empty(self.phone),
            address: non_empty(self.address),
            sex,
            nationality: non_empty(self.nationality),
            occupation: non_empty(self.occupation),
            insurance: non_empty(self.insurance),
            blood_type: non_empty(self.blood_type),
        })
    }
}

fn ensure_email_free(
    state: &SharedState,
    input: &PatientInput,
    exclude_id: Option<i64>,
) -> Result<(), AppError> {
    if let Some(email) = &input.email {
        if records::patients::email_in_use(&state.db, email, exclude_id)? {
            return Err(AppError::BadRequest(format!(
                "Email {} is already registered to another patient",
                email
            )));
        }
    }
    Ok(())
}

pub(crate) fn ensure_patient(state: &SharedState, id: i64) -> Result<(), AppError> {
    if records::patients::exists(&state.db, id)? {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("Patient {} not found", id)))
    }
}

// ============================================================================
// Patient CRUD
// ============================================================================

/// List all patients, newest first
pub async fn list_patients(
    State(state): State<SharedState>,
) -> Result<Json<Vec<Patient>>, AppError> {
    Ok(Json(records::patients::list(&state.db)?))
}

pub async fn get_patient(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Patient>, AppError> {
    records::patients::get(&state.db, id)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Patient {} not found", id)))
}

/// Create a patient and notify streams
pub async fn create_patient(
    State(state): State<SharedState>,
    Json(body): Json<PatientBody>,
) -> Result<(StatusCode, Json<Patient>), AppError> {
    let input = body.validate()?;
    ensure_email_free(&state, &input, None)?;

    let patient = records::patients::create(&state.db, &input)?;
    tracing::info!(patient_id = patient.id, "Patient created");
    state.emit(ChangeEvent::PatientCreated(patient.clone()));

    Ok((StatusCode::CREATED, Json(patient)))
}

/// Replace a patient. An empty email clears it.
pub async fn update_patient(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(body): Json<PatientBody>,
) -> Result<Json<Patient>, AppError> {
    let input = body.validate()?;
    ensure_patient(&state, id)?;
    ensure_email_free(&state, &input, Some(id))?;

    let patient = records::patients::update(&state.db, id, &input)?
        .ok_or_else(|| AppError::NotFound(format!("Patient {} not found", id)))?;
    state.emit(ChangeEvent::PatientUpdated(patient.clone()));

    Ok(Json(patient))
}

pub async fn delete_patient(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !records::patients::delete(&state.db, id)? {
        return Err(AppError::NotFound(format!("Patient {} not found", id)));
    }
    tracing::info!(patient_id = id, "Patient deleted");
    state.emit(ChangeEvent::PatientDeleted(EntityRef { id }));
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Clinical record
// ============================================================================

pub async fn patient_consultations(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PatientConsultation>>, AppError> {
    ensure_patient(&state, id)?;
    Ok(Json(records::clinical::consultations(
        &state.db,
        id,
        RECORD_CONSULTATIONS_LIMIT,
    )?))
}

pub async fn patient_vital_signs(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<VitalSign>>, AppError> {
    ensure_patient(&state, id)?;
    Ok(Json(records::clinical::vital_signs(
        &state.db,
        id,
        RECORD_VITAL_SIGNS_LIMIT,
    )?))
}

pub async fn patient_chronic_medications(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ChronicMedication>>, AppError> {
    ensure_patient(&state, id)?;
    Ok(Json(records::clinical::chronic_medications(&state.db, id)?))
}

pub async fn patient_habits(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PatientHabit>>, AppError> {
    ensure_patient(&state, id)?;
    Ok(Json(records::clinical::habits(&state.db, id)?))
}

pub async fn patient_allergies(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PatientAllergy>>, AppError> {
    ensure_patient(&state, id)?;
    Ok(Json(records::clinical::allergies(&state.db, id)?))
}

pub async fn patient_vaccines(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PatientVaccine>>, AppError> {
    ensure_patient(&state, id)?;
    Ok(Json(records::clinical::vaccines(&state.db, id)?))
}

pub async fn patient_diagnostics(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PatientDiagnosis>>, AppError> {
    ensure_patient(&state, id)?;
    Ok(Json(records::clinical::diagnoses(
        &state.db,
        id,
        RECORD_DIAGNOSES_LIMIT,
    )?))
}

pub async fn patient_procedures(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PatientProcedure>>, AppError> {
    ensure_patient(&state, id)?;
    Ok(Json(records::clinical::procedures(
        &state.db,
        id,
        RECORD_PROCEDURES_LIMIT,
    )?))
}

/// Latest exams with file metadata, never the file content
pub async fn patient_exams(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PatientExam>>, AppError> {
    ensure_patient(&state, id)?;
    Ok(Json(records::exams::latest_for_patient(
        &state.db,
        id,
        RECORD_EXAMS_LIMIT,
    )?))
}

/// Create an exam for a patient, optionally linked to one of their consultations
pub async fn create_patient_exam(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(body): Json<ExamBody>,
) -> Result<(StatusCode, Json<CreatedExam>), AppError> {
    ensure_patient(&state, id)?;
    let consultation_id = body.consultation_id;
    let (input, notes) = body.validate()?;

    let link = match consultation_id {
        Some(consultation_id) => {
            let owned = records::consultations::get(&state.db, consultation_id)?
                .is_some_and(|c| c.patient_id == id);
            if !owned {
                return Err(AppError::BadRequest(format!(
                    "Consultation {} does not belong to patient {}",
                    consultation_id, id
                )));
            }
            Some(ExamLink {
                consultation_id,
                notes,
            })
        }
        None => None,
    };

    let created = records::exams::create(&state.db, &input, link.as_ref())?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        body_json, delete, get, json_request, seed_consultation, seed_measurement, seed_patient,
        test_app,
    };
    use serde_json::json;
    use tower::ServiceExt;

    fn ana() -> serde_json::Value {
        json!({
            "name": "Ana Rojas",
            "birth_date": "1990-05-17",
            "sex": "Female",
            "email": "ana@example.com",
            "blood_type": "O+"
        })
    }

    #[tokio::test]
    async fn test_create_patient_emits_event() {
        let (app, state) = test_app();
        let mut sub = state.broadcaster.subscribe_channel();

        let resp = app
            .oneshot(json_request("POST", "/api/patients", ana()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let json = body_json(resp).await;
        assert_eq!(json["name"], "Ana Rojas");
        assert_eq!(json["sex"], "female");

        let frame = sub.try_recv().expect("patient_created frame");
        assert_eq!(frame.event, "patient_created");
        let payload: serde_json::Value = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(payload["id"], json["id"]);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_create_patient_validation() {
        let (app, state) = test_app();
        let mut sub = state.broadcaster.subscribe_channel();

        let cases = [
            json!({"birth_date": "1990-01-01", "sex": "male"}),
            json!({"name": "X", "sex": "male"}),
            json!({"name": "X", "birth_date": "1990-01-01"}),
            json!({"name": "X", "birth_date": "1990-01-01", "sex": "unknown"}),
            json!({"name": "X", "birth_date": "not a date", "sex": "male"}),
        ];
        for body in cases {
            let resp = app
                .clone()
                .oneshot(json_request("POST", "/api/patients", body.clone()))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body: {}", body);
            assert!(body_json(resp).await["error"].is_string());
        }
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let (app, _state) = test_app();
        let resp = app
            .clone()
            .oneshot(json_request("POST", "/api/patients", ana()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let mut other = ana();
        other["name"] = json!("Another Ana");
        let resp = app
            .oneshot(json_request("POST", "/api/patients", other))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_keeps_own_email_and_clears_empty() {
        let (app, state) = test_app();
        let resp = app
            .clone()
            .oneshot(json_request("POST", "/api/patients", ana()))
            .await
            .unwrap();
        let id = body_json(resp).await["id"].as_i64().unwrap();
        let mut sub = state.broadcaster.subscribe_channel();

        let mut body = ana();
        body["phone"] = json!("555-0100");
        let resp = app
            .clone()
            .oneshot(json_request("PUT", &format!("/api/patients/{}", id), body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["phone"], "555-0100");
        assert_eq!(sub.try_recv().unwrap().event, "patient_updated");

        let mut body = ana();
        body["email"] = json!("");
        let resp = app
            .oneshot(json_request("PUT", &format!("/api/patients/{}", id), body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_json(resp).await["email"].is_null());
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_patient() {
        let (app, state) = test_app();
        let mut sub = state.broadcaster.subscribe_channel();

        let resp = app
            .clone()
            .oneshot(json_request("PUT", "/api/patients/999", ana()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app.oneshot(delete("/api/patients/999")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_delete_patient_emits_id() {
        let (app, state) = test_app();
        let patient = seed_patient(&state.db, "Luis");
        let mut sub = state.broadcaster.subscribe_channel();

        let resp = app
            .clone()
            .oneshot(delete(&format!("/api/patients/{}", patient.id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let frame = sub.try_recv().unwrap();
        assert_eq!(frame.event, "patient_deleted");
        assert_eq!(frame.data, format!(r#"{{"id":{}}}"#, patient.id));

        let resp = app
            .oneshot(get(&format!("/api/patients/{}", patient.id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_patients_newest_first() {
        let (app, state) = test_app();
        seed_patient(&state.db, "First");
        seed_patient(&state.db, "Second");

        let resp = app.oneshot(get("/api/patients")).await.unwrap();
        let json = body_json(resp).await;
        let names: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Second", "First"]);
    }

    #[tokio::test]
    async fn test_record_views() {
        let (app, state) = test_app();
        let patient = seed_patient(&state.db, "Ana");
        let consultation = seed_consultation(&state.db, patient.id);
        seed_measurement(&state.db, consultation.id, 2, "37.2");

        let resp = app
            .clone()
            .oneshot(get(&format!("/api/patients/{}/consultations", patient.id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json[0]["consultation_id"], consultation.id);
        assert_eq!(json[0]["consultation_type_name"], "General medicine");

        let resp = app
            .clone()
            .oneshot(get(&format!("/api/patients/{}/vital-signs", patient.id)))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json[0]["measure"], "Temperature");
        assert_eq!(json[0]["value"], "37.2");

        for view in [
            "chronic-medications",
            "habits",
            "allergies",
            "vaccines",
            "exams",
            "diagnostics",
            "procedures",
        ] {
            let resp = app
                .clone()
                .oneshot(get(&format!("/api/patients/{}/{}", patient.id, view)))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "view: {}", view);
            assert_eq!(body_json(resp).await, json!([]));
        }

        let resp = app
            .oneshot(get("/api/patients/999/habits"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_diagnostics_and_procedures_views() {
        let (app, state) = test_app();
        let patient = seed_patient(&state.db, "Ana");
        let consultation = seed_consultation(&state.db, patient.id);
        state
            .db
            .with_conn(|conn| {
                conn.execute_batch(&format!(
                    "INSERT INTO diagnoses (id, icd10, comments) VALUES (1, 'J45', 'asthma');
                     INSERT INTO consultation_diagnoses (consultation_id, diagnosis_id, urgent)
                         VALUES ({c}, 1, 1);
                     INSERT INTO procedures (id, name, date) VALUES (1, 'Spirometry', '2024-04-02');
                     INSERT INTO consultation_procedures (consultation_id, procedure_id)
                         VALUES ({c}, 1);",
                    c = consultation.id
                ))?;
                Ok(())
            })
            .unwrap();

        let resp = app
            .clone()
            .oneshot(get(&format!("/api/patients/{}/diagnostics", patient.id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json[0]["icd10"], "J45");
        assert_eq!(json[0]["urgent"], true);
        assert_eq!(json[0]["consultation_reason"], "Routine checkup");

        let resp = app
            .clone()
            .oneshot(get(&format!("/api/patients/{}/procedures", patient.id)))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json[0]["name"], "Spirometry");
        assert_eq!(json[0]["date"], "2024-04-02");
        assert_eq!(json[0]["consultation_id"], consultation.id);

        for view in ["diagnostics", "procedures"] {
            let resp = app
                .clone()
                .oneshot(get(&format!("/api/patients/999/{}", view)))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "view: {}", view);
        }
    }

    #[tokio::test]
    async fn test_create_patient_exam_checks_ownership() {
        let (app, state) = test_app();
        let ana = seed_patient(&state.db, "Ana");
        let luis = seed_patient(&state.db, "Luis");
        let consultation = seed_consultation(&state.db, luis.id);

        let body = json!({
            "name": "Glucose",
            "exam_type": "Blood",
            "consultation_id": consultation.id
        });
        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/patients/{}/exams", ana.id),
                body.clone(),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/patients/{}/exams", luis.id),
                body,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let json = body_json(resp).await;
        assert_eq!(json["exam"]["name"], "Glucose");
        assert_eq!(json["link"]["consultation_id"], consultation.id);

        let resp = app
            .oneshot(get(&format!("/api/patients/{}/exams", luis.id)))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert!(json[0].get("file_blob").is_none());
    }

    #[tokio::test]
    async fn test_create_patient_exam_without_link() {
        let (app, state) = test_app();
        let ana = seed_patient(&state.db, "Ana");

        let resp = app
            .oneshot(json_request(
                "POST",
                &format!("/api/patients/{}/exams", ana.id),
                json!({"name": "X-ray", "exam_type": "Imaging"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert!(body_json(resp).await["link"].is_null());
    }
}
