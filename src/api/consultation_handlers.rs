//! API handlers for consultations

use super::handlers::{non_empty, AppError, SharedState};
use super::query::{ConsultationSearchParams, Paginated};
use crate::events::{ChangeEvent, EntityRef};
use crate::records::consultations::{self, PER_PAGE};
use crate::records::{
    self, Consultation, ConsultationDetail, ConsultationFormOptions, ConsultationInput,
    ConsultationSummary,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

/// Create/replace body. `patient_id` is optional here so that a missing one
/// is reported as a 400.
#[derive(Debug, Deserialize, Default)]
pub struct ConsultationBody {
    pub patient_id: Option<i64>,
    pub health_service_id: Option<i64>,
    pub professional_id: Option<i64>,
    pub consultation_type_id: Option<i64>,
    pub admitted_on: Option<NaiveDate>,
    pub discharged_on: Option<NaiveDate>,
    pub discharge_condition: Option<String>,
    pub time: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl ConsultationBody {
    /// Requires an existing patient
    fn validate(self, state: &SharedState) -> Result<ConsultationInput, AppError> {
        let patient_id = self
            .patient_id
            .ok_or_else(|| AppError::BadRequest("patient_id is required".to_string()))?;
        if !records::patients::exists(&state.db, patient_id)? {
            return Err(AppError::BadRequest(format!(
                "Patient {} does not exist",
                patient_id
            )));
        }

        Ok(ConsultationInput {
            patient_id,
            health_service_id: self.health_service_id,
            professional_id: self.professional_id,
            consultation_type_id: self.consultation_type_id,
            admitted_on: self.admitted_on,
            discharged_on: self.discharged_on,
            discharge_condition: non_empty(self.discharge_condition),
            time: non_empty(self.time),
            reason: non_empty(self.reason),
            notes: non_empty(self.notes),
        })
    }
}

/// Search consultations by patient name
pub async fn list_consultations(
    State(state): State<SharedState>,
    Query(params): Query<ConsultationSearchParams>,
) -> Result<Json<Paginated<ConsultationSummary>>, AppError> {
    let page = params.page();
    let result = consultations::search(&state.db, params.query(), page)?;
    Ok(Json(Paginated::new(result.rows, result.total, PER_PAGE, page)))
}

pub async fn consultation_form_options(
    State(state): State<SharedState>,
) -> Result<Json<ConsultationFormOptions>, AppError> {
    Ok(Json(consultations::form_options(&state.db)?))
}

pub async fn get_consultation(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<ConsultationDetail>, AppError> {
    consultations::get_detail(&state.db, id)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Consultation {} not found", id)))
}

pub async fn create_consultation(
    State(state): State<SharedState>,
    Json(body): Json<ConsultationBody>,
) -> Result<(StatusCode, Json<Consultation>), AppError> {
    let input = body.validate(&state)?;
    let consultation = consultations::create(&state.db, &input)?;
    tracing::info!(
        consultation_id = consultation.id,
        patient_id = consultation.patient_id,
        "Consultation created"
    );
    state.emit(ChangeEvent::ConsultationCreated(consultation.clone()));
    Ok((StatusCode::CREATED, Json(consultation)))
}

pub async fn update_consultation(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(body): Json<ConsultationBody>,
) -> Result<Json<Consultation>, AppError> {
    if consultations::get(&state.db, id)?.is_none() {
        return Err(AppError::NotFound(format!("Consultation {} not found", id)));
    }
    let input = body.validate(&state)?;
    let consultation = consultations::update(&state.db, id, &input)?
        .ok_or_else(|| AppError::NotFound(format!("Consultation {} not found", id)))?;
    state.emit(ChangeEvent::ConsultationUpdated(consultation.clone()));
    Ok(Json(consultation))
}

pub async fn delete_consultation(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !consultations::delete(&state.db, id)? {
        return Err(AppError::NotFound(format!("Consultation {} not found", id)));
    }
    tracing::info!(consultation_id = id, "Consultation deleted");
    state.emit(ChangeEvent::ConsultationDeleted(EntityRef { id }));
    Ok(StatusCode::NO_CONTENT)
}
