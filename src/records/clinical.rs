//! Read-only views over a patient's clinical record.

use rusqlite::params;

use super::models::{
    ChronicMedication, PatientAllergy, PatientConsultation, PatientDiagnosis, PatientHabit,
    PatientProcedure, PatientVaccine, VitalSign,
};
use crate::db::{Database, DatabaseError};

/// Latest consultations with type, professional and service names.
pub fn consultations(
    db: &Database,
    patient_id: i64,
    limit: u32,
) -> Result<Vec<PatientConsultation>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT c.id, c.admitted_on, c.reason, c.notes, c.discharge_condition,
                    ct.name, hp.name, hp.specialty, hs.name
             FROM consultations c
             LEFT JOIN consultation_types ct ON ct.id = c.consultation_type_id
             LEFT JOIN health_professionals hp ON hp.id = c.professional_id
             LEFT JOIN health_services hs ON hs.id = c.health_service_id
             WHERE c.patient_id = ?1
             ORDER BY c.admitted_on DESC, c.id DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![patient_id, limit], |r| {
                Ok(PatientConsultation {
                    consultation_id: r.get(0)?,
                    admitted_on: r.get(1)?,
                    reason: r.get(2)?,
                    notes: r.get(3)?,
                    discharge_condition: r.get(4)?,
                    consultation_type_name: r.get(5)?,
                    professional_name: r.get(6)?,
                    specialty: r.get(7)?,
                    health_service_name: r.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Latest clinical measurements recorded during the patient's consultations.
pub fn vital_signs(
    db: &Database,
    patient_id: i64,
    limit: u32,
) -> Result<Vec<VitalSign>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT cm.consultation_id, c.admitted_on, m.name, m.unit, cm.value, cm.recorded_at
             FROM consultation_measurements cm
             JOIN consultations c ON c.id = cm.consultation_id
             JOIN clinical_measures m ON m.id = cm.measure_id
             WHERE c.patient_id = ?1
             ORDER BY cm.recorded_at DESC, cm.consultation_id DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![patient_id, limit], |r| {
                Ok(VitalSign {
                    consultation_id: r.get(0)?,
                    admitted_on: r.get(1)?,
                    measure: r.get(2)?,
                    unit: r.get(3)?,
                    value: r.get(4)?,
                    recorded_at: r.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn chronic_medications(
    db: &Database,
    patient_id: i64,
) -> Result<Vec<ChronicMedication>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT m.id, m.name, m.company, pm.started_on, pm.ended_on, pm.chronic
             FROM patient_chronic_medications pm
             JOIN medications m ON m.id = pm.medication_id
             WHERE pm.patient_id = ?1
             ORDER BY pm.started_on DESC",
        )?;
        let rows = stmt
            .query_map(params![patient_id], |r| {
                Ok(ChronicMedication {
                    medication_id: r.get(0)?,
                    name: r.get(1)?,
                    company: r.get(2)?,
                    started_on: r.get(3)?,
                    ended_on: r.get(4)?,
                    chronic: r.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn habits(db: &Database, patient_id: i64) -> Result<Vec<PatientHabit>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT h.id, h.name, ph.notes
             FROM patient_habits ph
             JOIN habits h ON h.id = ph.habit_id
             WHERE ph.patient_id = ?1
             ORDER BY h.name",
        )?;
        let rows = stmt
            .query_map(params![patient_id], |r| {
                Ok(PatientHabit {
                    habit_id: r.get(0)?,
                    name: r.get(1)?,
                    notes: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn allergies(db: &Database, patient_id: i64) -> Result<Vec<PatientAllergy>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT a.id, a.name, pa.notes, pa.recorded_at
             FROM patient_allergies pa
             JOIN allergies a ON a.id = pa.allergy_id
             WHERE pa.patient_id = ?1
             ORDER BY pa.recorded_at DESC",
        )?;
        let rows = stmt
            .query_map(params![patient_id], |r| {
                Ok(PatientAllergy {
                    allergy_id: r.get(0)?,
                    name: r.get(1)?,
                    notes: r.get(2)?,
                    recorded_at: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn vaccines(db: &Database, patient_id: i64) -> Result<Vec<PatientVaccine>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT v.id, v.name, v.description, pv.date, pv.dose, pv.notes
             FROM patient_vaccines pv
             JOIN vaccines v ON v.id = pv.vaccine_id
             WHERE pv.patient_id = ?1
             ORDER BY pv.date DESC",
        )?;
        let rows = stmt
            .query_map(params![patient_id], |r| {
                Ok(PatientVaccine {
                    vaccine_id: r.get(0)?,
                    name: r.get(1)?,
                    description: r.get(2)?,
                    date: r.get(3)?,
                    dose: r.get(4)?,
                    notes: r.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Diagnoses across the patient's consultations, newest admission first and
/// urgent ones first within a day.
pub fn diagnoses(
    db: &Database,
    patient_id: i64,
    limit: u32,
) -> Result<Vec<PatientDiagnosis>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT d.id, c.id, d.icd10, d.comments, cd.urgent, cd.observation,
                    c.admitted_on, c.reason, hp.name, hp.specialty
             FROM consultation_diagnoses cd
             JOIN diagnoses d ON d.id = cd.diagnosis_id
             JOIN consultations c ON c.id = cd.consultation_id
             LEFT JOIN health_professionals hp ON hp.id = c.professional_id
             WHERE c.patient_id = ?1
             ORDER BY c.admitted_on DESC, cd.urgent DESC, d.id DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![patient_id, limit], |r| {
                Ok(PatientDiagnosis {
                    diagnosis_id: r.get(0)?,
                    consultation_id: r.get(1)?,
                    icd10: r.get(2)?,
                    comments: r.get(3)?,
                    urgent: r.get(4)?,
                    observation: r.get(5)?,
                    admitted_on: r.get(6)?,
                    consultation_reason: r.get(7)?,
                    professional_name: r.get(8)?,
                    specialty: r.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Procedures performed during the patient's consultations, latest first
pub fn procedures(
    db: &Database,
    patient_id: i64,
    limit: u32,
) -> Result<Vec<PatientProcedure>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT p.id, c.id, p.name, pt.name, p.date, p.instructions,
                    c.admitted_on, c.reason, hp.name, hp.specialty
             FROM consultation_procedures cp
             JOIN procedures p ON p.id = cp.procedure_id
             JOIN consultations c ON c.id = cp.consultation_id
             LEFT JOIN procedure_types pt ON pt.id = p.procedure_type_id
             LEFT JOIN health_professionals hp ON hp.id = c.professional_id
             WHERE c.patient_id = ?1
             ORDER BY p.date DESC, c.admitted_on DESC, p.id DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![patient_id, limit], |r| {
                Ok(PatientProcedure {
                    procedure_id: r.get(0)?,
                    consultation_id: r.get(1)?,
                    name: r.get(2)?,
                    procedure_type: r.get(3)?,
                    date: r.get(4)?,
                    instructions: r.get(5)?,
                    consultation_date: r.get(6)?,
                    consultation_reason: r.get(7)?,
                    professional_name: r.get(8)?,
                    specialty: r.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
