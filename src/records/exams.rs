//! Exam definitions, their consultation links and stored exam files.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::models::{ConsultationExam, Exam, ExamFieldUpdate, ExamFile, ExamInput, PatientExam};
use crate::db::{Database, DatabaseError};

/// Content type stored when the uploader did not send one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const LINK_COLUMNS: &str = "ce.exam_id, ce.consultation_id, e.name AS exam_name, e.exam_type,
     e.unit, e.reference_value, ce.date, ce.notes, ce.file_name, ce.file_type, ce.file_size,
     ce.file_uploaded_at";

impl Exam {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            exam_type: row.get("exam_type")?,
            unit: row.get("unit")?,
            reference_value: row.get("reference_value")?,
        })
    }
}

impl ConsultationExam {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            exam_id: row.get("exam_id")?,
            consultation_id: row.get("consultation_id")?,
            exam_name: row.get("exam_name")?,
            exam_type: row.get("exam_type")?,
            unit: row.get("unit")?,
            reference_value: row.get("reference_value")?,
            date: row.get("date")?,
            notes: row.get("notes")?,
            file_name: row.get("file_name")?,
            file_type: row.get("file_type")?,
            file_size: row.get("file_size")?,
            file_uploaded_at: row.get("file_uploaded_at")?,
        })
    }
}

/// Consultation to link a newly created exam to
#[derive(Debug, Clone)]
pub struct ExamLink {
    pub consultation_id: i64,
    pub notes: Option<String>,
}

/// A created exam definition and, when requested, its consultation link
#[derive(Debug, Clone, Serialize)]
pub struct CreatedExam {
    pub exam: Exam,
    pub link: Option<ConsultationExam>,
}

fn select_link(
    conn: &Connection,
    consultation_id: i64,
    exam_id: i64,
) -> Result<Option<ConsultationExam>, DatabaseError> {
    let link = conn
        .query_row(
            &format!(
                "SELECT {LINK_COLUMNS}
                 FROM consultation_exams ce
                 JOIN exams e ON e.id = ce.exam_id
                 WHERE ce.consultation_id = ?1 AND ce.exam_id = ?2"
            ),
            params![consultation_id, exam_id],
            ConsultationExam::from_row,
        )
        .optional()?;
    Ok(link)
}

/// Exams linked to one consultation, without file contents.
pub(crate) fn linked_to_consultation(
    conn: &Connection,
    consultation_id: i64,
) -> Result<Vec<ConsultationExam>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LINK_COLUMNS}
         FROM consultation_exams ce
         JOIN exams e ON e.id = ce.exam_id
         WHERE ce.consultation_id = ?1
         ORDER BY ce.date DESC, e.id"
    ))?;
    let rows = stmt
        .query_map(params![consultation_id], ConsultationExam::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Latest exams across all of a patient's consultations.
pub fn latest_for_patient(
    db: &Database,
    patient_id: i64,
    limit: u32,
) -> Result<Vec<PatientExam>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {LINK_COLUMNS}, c.admitted_on AS consultation_date,
                    ct.name AS consultation_type_name
             FROM consultation_exams ce
             JOIN exams e ON e.id = ce.exam_id
             JOIN consultations c ON c.id = ce.consultation_id
             LEFT JOIN consultation_types ct ON ct.id = c.consultation_type_id
             WHERE c.patient_id = ?1
             ORDER BY ce.date DESC, c.admitted_on DESC, e.id DESC
             LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![patient_id, limit], |row| {
                Ok(PatientExam {
                    exam: ConsultationExam::from_row(row)?,
                    consultation_date: row.get("consultation_date")?,
                    consultation_type_name: row.get("consultation_type_name")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Creates an exam definition and optionally links it to a consultation
/// dated today. Both writes share one transaction.
pub fn create(
    db: &Database,
    input: &ExamInput,
    link: Option<&ExamLink>,
) -> Result<CreatedExam, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO exams (name, exam_type, unit, reference_value) VALUES (?1, ?2, ?3, ?4)",
            params![
                input.name,
                input.exam_type,
                input.unit,
                input.reference_value
            ],
        )?;
        let exam_id = tx.last_insert_rowid();

        if let Some(link) = link {
            tx.execute(
                "INSERT INTO consultation_exams (exam_id, consultation_id, date, notes)
                 VALUES (?1, ?2, date('now'), ?3)",
                params![exam_id, link.consultation_id, link.notes],
            )?;
        }

        let exam = tx.query_row(
            "SELECT id, name, exam_type, unit, reference_value FROM exams WHERE id = ?1",
            params![exam_id],
            Exam::from_row,
        )?;
        let link = match link {
            Some(link) => select_link(&tx, link.consultation_id, exam_id)?,
            None => None,
        };
        tx.commit()?;

        Ok(CreatedExam { exam, link })
    })
}

pub fn get_link(
    db: &Database,
    consultation_id: i64,
    exam_id: i64,
) -> Result<Option<ConsultationExam>, DatabaseError> {
    db.with_conn(|conn| select_link(conn, consultation_id, exam_id))
}

/// Stores a file on an existing consultation/exam link, replacing any
/// previous one. Returns `None` when the link does not exist.
pub fn store_file(
    db: &Database,
    consultation_id: i64,
    exam_id: i64,
    file_name: &str,
    content_type: &str,
    content: &[u8],
) -> Result<Option<ConsultationExam>, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE consultation_exams
             SET file_name = ?3, file_type = ?4, file_blob = ?5, file_size = ?6,
                 file_uploaded_at = datetime('now'), updated_at = datetime('now')
             WHERE consultation_id = ?1 AND exam_id = ?2",
            params![
                consultation_id,
                exam_id,
                file_name,
                content_type,
                content,
                content.len() as i64
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        select_link(conn, consultation_id, exam_id)
    })
}

/// The stored file of a link; `None` when the link or its file is missing.
pub fn get_file(
    db: &Database,
    consultation_id: i64,
    exam_id: i64,
) -> Result<Option<ExamFile>, DatabaseError> {
    db.with_conn(|conn| {
        let file = conn
            .query_row(
                "SELECT file_name, file_type, file_blob, file_uploaded_at
                 FROM consultation_exams
                 WHERE consultation_id = ?1 AND exam_id = ?2 AND file_blob IS NOT NULL",
                params![consultation_id, exam_id],
                |row| {
                    Ok(ExamFile {
                        file_name: row
                            .get::<_, Option<String>>("file_name")?
                            .unwrap_or_else(|| format!("exam-{exam_id}")),
                        content_type: row
                            .get::<_, Option<String>>("file_type")?
                            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
                        content: row.get("file_blob")?,
                        uploaded_at: row.get("file_uploaded_at")?,
                    })
                },
            )
            .optional()?;
        Ok(file)
    })
}

/// Writes applied analysis notes to the link and overwrites the given exam
/// columns. Returns false when the link does not exist.
pub fn apply_suggestions(
    db: &Database,
    consultation_id: i64,
    exam_id: i64,
    notes: &str,
    fields: &ExamFieldUpdate,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE consultation_exams SET notes = ?3, updated_at = datetime('now')
             WHERE consultation_id = ?1 AND exam_id = ?2",
            params![consultation_id, exam_id, notes],
        )?;
        if changed == 0 {
            return Ok(false);
        }

        if !fields.is_empty() {
            tx.execute(
                "UPDATE exams
                 SET name = COALESCE(?2, name),
                     exam_type = COALESCE(?3, exam_type),
                     unit = COALESCE(?4, unit),
                     reference_value = COALESCE(?5, reference_value),
                     updated_at = datetime('now')
                 WHERE id = ?1",
                params![
                    exam_id,
                    fields.name,
                    fields.exam_type,
                    fields.unit,
                    fields.reference_value
                ],
            )?;
        }
        tx.commit()?;
        Ok(true)
    })
}
