//! API handlers for families and family membership

use super::handlers::{non_empty, required, AppError, SharedState};
use crate::events::{ChangeEvent, MembershipRef};
use crate::records::{self, families, Family, FamilyMember, MemberInsert};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateFamilyBody {
    pub name: Option<String>,
    pub description: Option<String>,
    pub owner_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFamilyBody {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberBody {
    pub patient_id: Option<i64>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberBody {
    pub role: Option<String>,
}

/// Add-member response; `note` is set when the patient was already a member
#[derive(Debug, Serialize)]
pub struct AddMemberResponse {
    #[serde(flatten)]
    pub member: FamilyMember,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

fn family_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Family {} not found", id))
}

fn member_not_found(family_id: i64, patient_id: i64) -> AppError {
    AppError::NotFound(format!(
        "Patient {} is not a member of family {}",
        patient_id, family_id
    ))
}

/// Families a patient owns or belongs to
pub async fn patient_families(
    State(state): State<SharedState>,
    Path(patient_id): Path<i64>,
) -> Result<Json<Vec<Family>>, AppError> {
    if !records::patients::exists(&state.db, patient_id)? {
        return Err(AppError::NotFound(format!(
            "Patient {} not found",
            patient_id
        )));
    }
    Ok(Json(families::for_patient(&state.db, patient_id)?))
}

pub async fn get_family(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Family>, AppError> {
    families::get(&state.db, id)?
        .map(Json)
        .ok_or_else(|| family_not_found(id))
}

pub async fn create_family(
    State(state): State<SharedState>,
    Json(body): Json<CreateFamilyBody>,
) -> Result<(StatusCode, Json<Family>), AppError> {
    let name = required(body.name, "name")?;
    let owner_id = body
        .owner_id
        .ok_or_else(|| AppError::BadRequest("owner_id is required".to_string()))?;
    let description = non_empty(body.description);

    let family = families::create(&state.db, &name, description.as_deref(), owner_id)?;
    tracing::info!(family_id = family.id, owner_id, "Family created");
    Ok((StatusCode::CREATED, Json(family)))
}

pub async fn update_family(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateFamilyBody>,
) -> Result<Json<Family>, AppError> {
    let name = required(body.name, "name")?;
    let description = non_empty(body.description);
    families::update(&state.db, id, &name, description.as_deref())?
        .map(Json)
        .ok_or_else(|| family_not_found(id))
}

/// Remove all members, then the family
pub async fn delete_family(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !families::delete(&state.db, id)? {
        return Err(family_not_found(id));
    }
    tracing::info!(family_id = id, "Family deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// 201 on insert, 200 with a note when the patient is already a member
pub async fn add_family_member(
    State(state): State<SharedState>,
    Path(family_id): Path<i64>,
    Json(body): Json<AddMemberBody>,
) -> Result<(StatusCode, Json<AddMemberResponse>), AppError> {
    let patient_id = body
        .patient_id
        .ok_or_else(|| AppError::BadRequest("patient_id is required".to_string()))?;
    let role = required(body.role, "role")?;

    match families::add_member(&state.db, family_id, patient_id, &role)? {
        None => Err(family_not_found(family_id)),
        Some(MemberInsert::Added(member)) => {
            state.emit(ChangeEvent::FamilyMemberAdded(member.clone()));
            Ok((
                StatusCode::CREATED,
                Json(AddMemberResponse { member, note: None }),
            ))
        }
        Some(MemberInsert::AlreadyMember(member)) => Ok((
            StatusCode::OK,
            Json(AddMemberResponse {
                member,
                note: Some("Patient is already a member of this family".to_string()),
            }),
        )),
    }
}

pub async fn update_family_member(
    State(state): State<SharedState>,
    Path((family_id, patient_id)): Path<(i64, i64)>,
    Json(body): Json<UpdateMemberBody>,
) -> Result<Json<FamilyMember>, AppError> {
    let role = required(body.role, "role")?;
    let member = families::update_member_role(&state.db, family_id, patient_id, &role)?
        .ok_or_else(|| member_not_found(family_id, patient_id))?;
    state.emit(ChangeEvent::FamilyMemberUpdated(member.clone()));
    Ok(Json(member))
}

pub async fn remove_family_member(
    State(state): State<SharedState>,
    Path((family_id, patient_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    if !families::remove_member(&state.db, family_id, patient_id)? {
        return Err(member_not_found(family_id, patient_id));
    }
    state.emit(ChangeEvent::FamilyMemberRemoved(MembershipRef {
        family_id,
        patient_id,
    }));
    Ok(StatusCode::NO_CONTENT)
}
