//! Patient repository: CRUD over the `patients` table.

use rusqlite::{params, OptionalExtension, Row};

use super::models::{Patient, PatientInput};
use crate::db::{Database, DatabaseError};

const PATIENT_COLUMNS: &str = "id, name, photo_url, birth_date, email, phone, address, sex,
     nationality, occupation, insurance, blood_type, created_at";

impl Patient {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            photo_url: row.get("photo_url")?,
            birth_date: row.get("birth_date")?,
            email: row.get("email")?,
            phone: row.get("phone")?,
            address: row.get("address")?,
            sex: row.get("sex")?,
            nationality: row.get("nationality")?,
            occupation: row.get("occupation")?,
            insurance: row.get("insurance")?,
            blood_type: row.get("blood_type")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// All patients, newest first.
pub fn list(db: &Database) -> Result<Vec<Patient>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients ORDER BY id DESC"
        ))?;
        let rows = stmt
            .query_map([], Patient::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn get(db: &Database, id: i64) -> Result<Option<Patient>, DatabaseError> {
    db.with_conn(|conn| {
        let patient = conn
            .query_row(
                &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
                params![id],
                Patient::from_row,
            )
            .optional()?;
        Ok(patient)
    })
}

pub fn exists(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM patients WHERE id = ?1", params![id], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    })
}

/// True when another patient already uses `email`.
///
/// `exclude_id` skips the patient being updated.
pub fn email_in_use(
    db: &Database,
    email: &str,
    exclude_id: Option<i64>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM patients WHERE email = ?1 AND (?2 IS NULL OR id != ?2)",
            params![email, exclude_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    })
}

/// Inserts a patient and returns the stored row.
pub fn create(db: &Database, input: &PatientInput) -> Result<Patient, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO patients (name, photo_url, birth_date, email, phone, address, sex,
             nationality, occupation, insurance, blood_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                input.name,
                input.photo_url,
                input.birth_date,
                input.email,
                input.phone,
                input.address,
                input.sex,
                input.nationality,
                input.occupation,
                input.insurance,
                input.blood_type,
            ],
        )?;
        let id = conn.last_insert_rowid();
        let patient = conn.query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
            params![id],
            Patient::from_row,
        )?;
        Ok(patient)
    })
}

/// Replaces every editable field. Returns `None` when the patient does not exist.
pub fn update(
    db: &Database,
    id: i64,
    input: &PatientInput,
) -> Result<Option<Patient>, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE patients SET name=?2, photo_url=?3, birth_date=?4, email=?5, phone=?6,
             address=?7, sex=?8, nationality=?9, occupation=?10, insurance=?11, blood_type=?12
             WHERE id=?1",
            params![
                id,
                input.name,
                input.photo_url,
                input.birth_date,
                input.email,
                input.phone,
                input.address,
                input.sex,
                input.nationality,
                input.occupation,
                input.insurance,
                input.blood_type,
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let patient = conn.query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
            params![id],
            Patient::from_row,
        )?;
        Ok(Some(patient))
    })
}

/// Deletes a patient; dependent rows cascade. Returns false when nothing was deleted.
pub fn delete(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM patients WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}
