//! Aggregate queries for the dashboard.

use chrono::{Datelike, NaiveDate, Utc};
use rusqlite::{params, Connection};

use super::models::{
    ActiveMedication, DailyCount, DashboardMetrics, DashboardStats, LabelCount, MedicationStatus,
    PatientDashboard, PatientMetrics, PatientVisit, RecentConsultation, RecentDiagnosis,
    RecentExam, RecentPatient, Severity, VitalSignAlert,
};
use crate::db::{Database, DatabaseError};

/// Age bucket labels, in display order
pub const AGE_BUCKETS: [&str; 4] = ["0-17", "18-40", "41-65", "65+"];

fn count(conn: &Connection, sql: &str) -> Result<i64, DatabaseError> {
    Ok(conn.query_row(sql, [], |r| r.get(0))?)
}

fn label_counts(conn: &Connection, sql: &str) -> Result<Vec<LabelCount>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], |r| {
            Ok(LabelCount {
                label: r.get(0)?,
                count: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn metrics(conn: &Connection) -> Result<DashboardMetrics, DatabaseError> {
    Ok(DashboardMetrics {
        total_patients: count(conn, "SELECT COUNT(*) FROM patients")?,
        consultations_today: count(
            conn,
            "SELECT COUNT(*) FROM consultations WHERE admitted_on = date('now')",
        )?,
        consultations_last_7_days: count(
            conn,
            "SELECT COUNT(*) FROM consultations WHERE admitted_on >= date('now', '-7 days')",
        )?,
        exams_last_30_days: count(
            conn,
            "SELECT COUNT(DISTINCT exam_id) FROM consultation_exams
             WHERE date >= date('now', '-30 days')",
        )?,
        // Temperature outside 36-38 or glucose above 140
        critical_patients: count(
            conn,
            "SELECT COUNT(DISTINCT c.patient_id)
             FROM consultation_measurements cm
             JOIN consultations c ON c.id = cm.consultation_id
             WHERE c.admitted_on >= date('now', '-30 days')
               AND ((cm.measure_id = 2 AND (CAST(cm.value AS REAL) < 36 OR CAST(cm.value AS REAL) > 38))
                 OR (cm.measure_id = 5 AND CAST(cm.value AS REAL) > 140))",
        )?,
    })
}

pub fn stats(db: &Database) -> Result<DashboardStats, DatabaseError> {
    db.with_conn(|conn| {
        let metrics = metrics(conn)?;

        let blood_types = label_counts(
            conn,
            "SELECT blood_type, COUNT(*) AS total FROM patients
             WHERE blood_type IS NOT NULL
             GROUP BY blood_type ORDER BY total DESC, blood_type",
        )?;

        let consultations_by_type = label_counts(
            conn,
            "SELECT COALESCE(ct.name, 'Unspecified') AS label, COUNT(*) AS total
             FROM consultations c
             LEFT JOIN consultation_types ct ON ct.id = c.consultation_type_id
             WHERE c.admitted_on >= date('now', '-30 days')
             GROUP BY label ORDER BY total DESC, label
             LIMIT 5",
        )?;

        let mut stmt = conn.prepare(
            "SELECT c.id, p.id, p.name, c.admitted_on, c.time, c.reason, ct.name
             FROM consultations c
             JOIN patients p ON p.id = c.patient_id
             LEFT JOIN consultation_types ct ON ct.id = c.consultation_type_id
             ORDER BY c.admitted_on DESC, c.time DESC, c.id DESC
             LIMIT 5",
        )?;
        let latest_consultations = stmt
            .query_map([], |r| {
                Ok(RecentConsultation {
                    consultation_id: r.get(0)?,
                    patient_id: r.get(1)?,
                    patient_name: r.get(2)?,
                    admitted_on: r.get(3)?,
                    time: r.get(4)?,
                    reason: r.get(5)?,
                    consultation_type_name: r.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DashboardStats {
            metrics,
            blood_types,
            consultations_by_type,
            latest_consultations,
        })
    })
}

/// Consultation counts per admission day over the last `days` days, oldest first.
pub fn consultations_per_day(db: &Database, days: u32) -> Result<Vec<DailyCount>, DatabaseError> {
    let modifier = format!("-{days} days");
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT admitted_on, COUNT(*) FROM consultations
             WHERE admitted_on >= date('now', ?1)
             GROUP BY admitted_on ORDER BY admitted_on",
        )?;
        let rows = stmt
            .query_map(params![modifier], |r| {
                Ok(DailyCount {
                    date: r.get(0)?,
                    count: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Whole years between `birth` and `today`
fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

fn age_bucket(age: i32) -> usize {
    match age {
        i32::MIN..=17 => 0,
        18..=40 => 1,
        41..=65 => 2,
        _ => 3,
    }
}

/// Patient counts per age bucket. Every bucket is present, empty ones with 0.
pub fn patients_by_age(db: &Database) -> Result<Vec<LabelCount>, DatabaseError> {
    let birth_dates: Vec<NaiveDate> = db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT birth_date FROM patients")?;
        let rows = stmt
            .query_map([], |r| r.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;

    let today = Utc::now().date_naive();
    let mut counts = [0i64; AGE_BUCKETS.len()];
    for birth in birth_dates {
        counts[age_bucket(age_on(birth, today))] += 1;
    }

    Ok(AGE_BUCKETS
        .iter()
        .zip(counts)
        .map(|(label, count)| LabelCount {
            label: (*label).to_string(),
            count,
        })
        .collect())
}

/// Most requested exams
pub fn top_exams(db: &Database) -> Result<Vec<LabelCount>, DatabaseError> {
    db.with_conn(|conn| {
        label_counts(
            conn,
            "SELECT e.name, COUNT(*) AS total
             FROM consultation_exams ce
             JOIN exams e ON e.id = ce.exam_id
             GROUP BY e.id, e.name ORDER BY total DESC, e.name
             LIMIT 5",
        )
    })
}

/// Most common chronic medications
pub fn top_medications(db: &Database) -> Result<Vec<LabelCount>, DatabaseError> {
    db.with_conn(|conn| {
        label_counts(
            conn,
            "SELECT m.name, COUNT(*) AS total
             FROM patient_chronic_medications pm
             JOIN medications m ON m.id = pm.medication_id
             GROUP BY m.id, m.name ORDER BY total DESC, m.name
             LIMIT 5",
        )
    })
}

pub fn recent_patients(db: &Database, limit: u32) -> Result<Vec<RecentPatient>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, name, birth_date, blood_type, insurance, photo_url, created_at
             FROM patients ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |r| {
                Ok(RecentPatient {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    birth_date: r.get(2)?,
                    blood_type: r.get(3)?,
                    insurance: r.get(4)?,
                    photo_url: r.get(5)?,
                    created_at: r.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Alert label for an abnormal reading, checked in priority order.
pub fn classify_alert(temperature: Option<f64>, glucose: Option<f64>) -> &'static str {
    match (temperature, glucose) {
        (Some(t), _) if t > 38.0 => "fever",
        (Some(t), _) if t < 35.0 => "hypothermia",
        (_, Some(g)) if g > 200.0 => "high glucose",
        (_, Some(g)) if g < 70.0 => "low glucose",
        _ => "other",
    }
}

/// Abnormal readings recorded in the last 7 days, grouped per patient and
/// measurement time.
pub fn vital_sign_alerts(db: &Database) -> Result<Vec<VitalSignAlert>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT p.id, p.name,
                    MAX(CASE WHEN cm.measure_id = 1 THEN cm.value END) AS blood_pressure,
                    MAX(CASE WHEN cm.measure_id = 2 THEN CAST(cm.value AS REAL) END) AS temperature,
                    MAX(CASE WHEN cm.measure_id = 3 THEN CAST(cm.value AS REAL) END) AS weight,
                    MAX(CASE WHEN cm.measure_id = 5 THEN CAST(cm.value AS REAL) END) AS glucose,
                    cm.recorded_at
             FROM consultation_measurements cm
             JOIN consultations c ON c.id = cm.consultation_id
             JOIN patients p ON p.id = c.patient_id
             WHERE cm.recorded_at >= datetime('now', '-7 days')
               AND cm.measure_id IN (1, 2, 3, 5)
             GROUP BY p.id, p.name, cm.recorded_at
             HAVING temperature > 38 OR temperature < 35 OR glucose > 200 OR glucose < 70
             ORDER BY cm.recorded_at DESC
             LIMIT 10",
        )?;
        let rows = stmt
            .query_map([], |r| {
                let temperature: Option<f64> = r.get(3)?;
                let glucose: Option<f64> = r.get(5)?;
                Ok(VitalSignAlert {
                    patient_id: r.get(0)?,
                    patient_name: r.get(1)?,
                    blood_pressure: r.get(2)?,
                    temperature,
                    weight: r.get(4)?,
                    glucose,
                    measured_at: r.get(6)?,
                    alert: classify_alert(temperature, glucose).to_string(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Rows per list in the per-patient dashboard
const PATIENT_LIST_LIMIT: u32 = 5;

fn patient_count(conn: &Connection, sql: &str, patient_id: i64) -> Result<i64, DatabaseError> {
    Ok(conn.query_row(sql, params![patient_id], |r| r.get(0))?)
}

fn patient_metrics(conn: &Connection, patient_id: i64) -> Result<PatientMetrics, DatabaseError> {
    Ok(PatientMetrics {
        total_consultations: patient_count(
            conn,
            "SELECT COUNT(*) FROM consultations WHERE patient_id = ?1",
            patient_id,
        )?,
        consultations_last_30_days: patient_count(
            conn,
            "SELECT COUNT(*) FROM consultations
             WHERE patient_id = ?1 AND admitted_on >= date('now', '-30 days')",
            patient_id,
        )?,
        total_exams: patient_count(
            conn,
            "SELECT COUNT(*) FROM consultation_exams ce
             JOIN consultations c ON c.id = ce.consultation_id
             WHERE c.patient_id = ?1",
            patient_id,
        )?,
        chronic_medications: patient_count(
            conn,
            "SELECT COUNT(*) FROM patient_chronic_medications WHERE patient_id = ?1",
            patient_id,
        )?,
    })
}

/// Metrics and short lists for one patient: latest consultations, diagnoses
/// from the last 30 days, latest exams and chronic medications.
///
/// Does not check that the patient exists; an unknown id yields zeros and
/// empty lists.
pub fn for_patient(db: &Database, patient_id: i64) -> Result<PatientDashboard, DatabaseError> {
    db.with_conn(|conn| {
        let metrics = patient_metrics(conn, patient_id)?;

        let mut stmt = conn.prepare(
            "SELECT c.id, c.admitted_on, c.time, hs.name, hp.name, hp.specialty
             FROM consultations c
             LEFT JOIN health_services hs ON hs.id = c.health_service_id
             LEFT JOIN health_professionals hp ON hp.id = c.professional_id
             WHERE c.patient_id = ?1
             ORDER BY c.admitted_on DESC, c.time DESC, c.id DESC
             LIMIT ?2",
        )?;
        let latest_consultations = stmt
            .query_map(params![patient_id, PATIENT_LIST_LIMIT], |r| {
                Ok(PatientVisit {
                    consultation_id: r.get(0)?,
                    admitted_on: r.get(1)?,
                    time: r.get(2)?,
                    health_service_name: r.get(3)?,
                    professional_name: r.get(4)?,
                    specialty: r.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT d.id, d.icd10, c.admitted_on, hp.name, cd.urgent
             FROM consultation_diagnoses cd
             JOIN diagnoses d ON d.id = cd.diagnosis_id
             JOIN consultations c ON c.id = cd.consultation_id
             LEFT JOIN health_professionals hp ON hp.id = c.professional_id
             WHERE c.patient_id = ?1 AND c.admitted_on >= date('now', '-30 days')
             ORDER BY c.admitted_on DESC, d.id DESC
             LIMIT ?2",
        )?;
        let recent_diagnoses = stmt
            .query_map(params![patient_id, PATIENT_LIST_LIMIT], |r| {
                Ok(RecentDiagnosis {
                    diagnosis_id: r.get(0)?,
                    icd10: r.get(1)?,
                    admitted_on: r.get(2)?,
                    professional_name: r.get(3)?,
                    severity: Severity::from_urgent(r.get(4)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT e.id, c.id, e.name, ce.date, hs.name
             FROM consultation_exams ce
             JOIN exams e ON e.id = ce.exam_id
             JOIN consultations c ON c.id = ce.consultation_id
             LEFT JOIN health_services hs ON hs.id = c.health_service_id
             WHERE c.patient_id = ?1
             ORDER BY ce.date DESC, e.id DESC
             LIMIT ?2",
        )?;
        let latest_exams = stmt
            .query_map(params![patient_id, PATIENT_LIST_LIMIT], |r| {
                Ok(RecentExam {
                    exam_id: r.get(0)?,
                    consultation_id: r.get(1)?,
                    name: r.get(2)?,
                    date: r.get(3)?,
                    health_service_name: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT m.id, m.name, m.company, pm.started_on, pm.ended_on IS NULL
             FROM patient_chronic_medications pm
             JOIN medications m ON m.id = pm.medication_id
             WHERE pm.patient_id = ?1 AND pm.chronic = 1
             ORDER BY pm.started_on DESC
             LIMIT ?2",
        )?;
        let chronic_medications = stmt
            .query_map(params![patient_id, PATIENT_LIST_LIMIT], |r| {
                let active: bool = r.get(4)?;
                Ok(ActiveMedication {
                    medication_id: r.get(0)?,
                    name: r.get(1)?,
                    company: r.get(2)?,
                    started_on: r.get(3)?,
                    status: if active {
                        MedicationStatus::Active
                    } else {
                        MedicationStatus::Ended
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PatientDashboard {
            patient_id,
            metrics,
            latest_consultations,
            recent_diagnoses,
            latest_exams,
            chronic_medications,
        })
    })
}
