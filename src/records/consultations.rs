//! Consultation repository.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::exams;
use super::models::{
    Consultation, ConsultationDetail, ConsultationFormOptions, ConsultationInput,
    ConsultationSummary, ConsultationType, PatientOption,
};
use crate::db::{Database, DatabaseError};

/// Rows per page in consultation search
pub const PER_PAGE: u32 = 25;

/// Patients offered in the consultation form
const FORM_PATIENT_LIMIT: u32 = 200;

const CONSULTATION_COLUMNS: &str = "c.id, c.patient_id, c.health_service_id, c.professional_id,
     c.consultation_type_id, c.admitted_on, c.discharged_on, c.discharge_condition, c.time,
     c.reason, c.notes";

impl Consultation {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            patient_id: row.get("patient_id")?,
            health_service_id: row.get("health_service_id")?,
            professional_id: row.get("professional_id")?,
            consultation_type_id: row.get("consultation_type_id")?,
            admitted_on: row.get("admitted_on")?,
            discharged_on: row.get("discharged_on")?,
            discharge_condition: row.get("discharge_condition")?,
            time: row.get("time")?,
            reason: row.get("reason")?,
            notes: row.get("notes")?,
        })
    }
}

fn summary_from_row(row: &Row<'_>) -> Result<ConsultationSummary, rusqlite::Error> {
    Ok(ConsultationSummary {
        consultation: Consultation::from_row(row)?,
        patient_name: row.get("patient_name")?,
        consultation_type_name: row.get("consultation_type_name")?,
    })
}

fn select_by_id(conn: &Connection, id: i64) -> Result<Option<Consultation>, DatabaseError> {
    let consultation = conn
        .query_row(
            &format!("SELECT {CONSULTATION_COLUMNS} FROM consultations c WHERE c.id = ?1"),
            params![id],
            Consultation::from_row,
        )
        .optional()?;
    Ok(consultation)
}

/// One page of a consultation search.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub rows: Vec<ConsultationSummary>,
    pub total: u64,
}

/// Substring pattern for `LIKE ... ESCAPE '\'` with the wildcards in `query` escaped
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Searches consultations by patient name substring, newest admission first.
///
/// `page` is 1-based; values below 1 are treated as 1.
pub fn search(db: &Database, query: Option<&str>, page: u32) -> Result<SearchPage, DatabaseError> {
    let pattern = query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(like_pattern);
    let offset = (page.max(1) - 1).saturating_mul(PER_PAGE);

    db.with_conn(|conn| {
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM consultations c
             JOIN patients p ON p.id = c.patient_id
             WHERE ?1 IS NULL OR p.name LIKE ?1 ESCAPE '\\'",
            params![pattern],
            |r| r.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {CONSULTATION_COLUMNS}, p.name AS patient_name,
                    ct.name AS consultation_type_name
             FROM consultations c
             JOIN patients p ON p.id = c.patient_id
             LEFT JOIN consultation_types ct ON ct.id = c.consultation_type_id
             WHERE ?1 IS NULL OR p.name LIKE ?1 ESCAPE '\\'
             ORDER BY c.admitted_on DESC, c.id DESC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt
            .query_map(params![pattern, PER_PAGE, offset], summary_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SearchPage {
            rows,
            total: total as u64,
        })
    })
}

pub fn form_options(db: &Database) -> Result<ConsultationFormOptions, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT id, name FROM patients ORDER BY name LIMIT ?1")?;
        let patients = stmt
            .query_map(params![FORM_PATIENT_LIMIT], |r| {
                Ok(PatientOption {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare("SELECT id, name FROM consultation_types ORDER BY name")?;
        let consultation_types = stmt
            .query_map([], |r| {
                Ok(ConsultationType {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ConsultationFormOptions {
            patients,
            consultation_types,
        })
    })
}

pub fn get(db: &Database, id: i64) -> Result<Option<Consultation>, DatabaseError> {
    db.with_conn(|conn| select_by_id(conn, id))
}

/// Consultation with patient/type names and its linked exams.
pub fn get_detail(db: &Database, id: i64) -> Result<Option<ConsultationDetail>, DatabaseError> {
    db.with_conn(|conn| {
        let summary = conn
            .query_row(
                &format!(
                    "SELECT {CONSULTATION_COLUMNS}, p.name AS patient_name,
                            ct.name AS consultation_type_name
                     FROM consultations c
                     LEFT JOIN patients p ON p.id = c.patient_id
                     LEFT JOIN consultation_types ct ON ct.id = c.consultation_type_id
                     WHERE c.id = ?1"
                ),
                params![id],
                summary_from_row,
            )
            .optional()?;

        match summary {
            Some(summary) => {
                let exams = exams::linked_to_consultation(conn, id)?;
                Ok(Some(ConsultationDetail { summary, exams }))
            }
            None => Ok(None),
        }
    })
}

/// Inserts a consultation. A missing patient surfaces as a constraint violation.
pub fn create(db: &Database, input: &ConsultationInput) -> Result<Consultation, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO consultations (patient_id, health_service_id, professional_id,
             consultation_type_id, admitted_on, discharged_on, discharge_condition, time,
             reason, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                input.patient_id,
                input.health_service_id,
                input.professional_id,
                input.consultation_type_id,
                input.admitted_on,
                input.discharged_on,
                input.discharge_condition,
                input.time,
                input.reason,
                input.notes,
            ],
        )?;
        let id = conn.last_insert_rowid();
        select_by_id(conn, id)?.ok_or(DatabaseError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    })
}

pub fn update(
    db: &Database,
    id: i64,
    input: &ConsultationInput,
) -> Result<Option<Consultation>, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE consultations SET patient_id=?2, health_service_id=?3, professional_id=?4,
             consultation_type_id=?5, admitted_on=?6, discharged_on=?7, discharge_condition=?8,
             time=?9, reason=?10, notes=?11
             WHERE id=?1",
            params![
                id,
                input.patient_id,
                input.health_service_id,
                input.professional_id,
                input.consultation_type_id,
                input.admitted_on,
                input.discharged_on,
                input.discharge_condition,
                input.time,
                input.reason,
                input.notes,
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        select_by_id(conn, id)
    })
}

pub fn delete(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM consultations WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}
