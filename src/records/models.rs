//! Record models shared by the store, the API and change events

use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Patients
// ============================================================================

/// Administrative sex recorded on a patient chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    Other,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
            Sex::Other => "other",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sex {
    type Err = String;

    /// Case-insensitive, surrounding whitespace ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "male" => Ok(Sex::Male),
            "female" => Ok(Sex::Female),
            "other" => Ok(Sex::Other),
            _ => Err("sex must be one of: male, female, other".to_string()),
        }
    }
}

impl ToSql for Sex {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Sex {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// A patient chart as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub name: String,
    pub photo_url: Option<String>,
    pub birth_date: NaiveDate,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub sex: Sex,
    pub nationality: Option<String>,
    pub occupation: Option<String>,
    /// Health insurance provider
    pub insurance: Option<String>,
    pub blood_type: Option<String>,
    pub created_at: String,
}

/// Validated fields for creating or replacing a patient
#[derive(Debug, Clone, PartialEq)]
pub struct PatientInput {
    pub name: String,
    pub photo_url: Option<String>,
    pub birth_date: NaiveDate,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub sex: Sex,
    pub nationality: Option<String>,
    pub occupation: Option<String>,
    pub insurance: Option<String>,
    pub blood_type: Option<String>,
}

impl PatientInput {
    /// Minimal input with only the required fields set
    pub fn new(name: impl Into<String>, birth_date: NaiveDate, sex: Sex) -> Self {
        Self {
            name: name.into(),
            photo_url: None,
            birth_date,
            email: None,
            phone: None,
            address: None,
            sex,
            nationality: None,
            occupation: None,
            insurance: None,
            blood_type: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

// ============================================================================
// Consultations
// ============================================================================

/// A consultation row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consultation {
    pub id: i64,
    pub patient_id: i64,
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

/// Fields for creating or replacing a consultation
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConsultationInput {
    pub patient_id: i64,
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

/// Consultation joined with patient and type names
#[derive(Debug, Clone, Serialize)]
pub struct ConsultationSummary {
    #[serde(flatten)]
    pub consultation: Consultation,
    pub patient_name: Option<String>,
    pub consultation_type_name: Option<String>,
}

/// Consultation with its linked exams
#[derive(Debug, Clone, Serialize)]
pub struct ConsultationDetail {
    #[serde(flatten)]
    pub summary: ConsultationSummary,
    pub exams: Vec<ConsultationExam>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsultationType {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientOption {
    pub id: i64,
    pub name: String,
}

/// Choices needed to fill a consultation form
#[derive(Debug, Clone, Serialize)]
pub struct ConsultationFormOptions {
    pub patients: Vec<PatientOption>,
    pub consultation_types: Vec<ConsultationType>,
}

// ============================================================================
// Exams
// ============================================================================

/// An exam definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exam {
    pub id: i64,
    pub name: String,
    pub exam_type: String,
    pub unit: Option<String>,
    pub reference_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExamInput {
    pub name: String,
    pub exam_type: String,
    pub unit: Option<String>,
    pub reference_value: Option<String>,
}

/// An exam linked to a consultation. The file blob is never part of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsultationExam {
    pub exam_id: i64,
    pub consultation_id: i64,
    pub exam_name: String,
    pub exam_type: String,
    pub unit: Option<String>,
    pub reference_value: Option<String>,
    pub date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub file_uploaded_at: Option<String>,
}

/// A stored exam file
#[derive(Debug, Clone, PartialEq)]
pub struct ExamFile {
    pub file_name: String,
    pub content_type: String,
    pub content: Vec<u8>,
    pub uploaded_at: Option<String>,
}

/// Exam columns that can be overwritten from applied analysis suggestions
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExamFieldUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_value: Option<String>,
}

impl ExamFieldUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.exam_type.is_none()
            && self.unit.is_none()
            && self.reference_value.is_none()
    }
}

// ============================================================================
// Patient record (read-only views)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PatientConsultation {
    pub consultation_id: i64,
    pub admitted_on: Option<NaiveDate>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub discharge_condition: Option<String>,
    pub consultation_type_name: Option<String>,
    pub professional_name: Option<String>,
    pub specialty: Option<String>,
    pub health_service_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VitalSign {
    pub consultation_id: i64,
    pub admitted_on: Option<NaiveDate>,
    pub measure: String,
    pub unit: Option<String>,
    pub value: String,
    pub recorded_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChronicMedication {
    pub medication_id: i64,
    pub name: String,
    pub company: Option<String>,
    pub started_on: Option<NaiveDate>,
    pub ended_on: Option<NaiveDate>,
    pub chronic: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientHabit {
    pub habit_id: i64,
    pub name: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientAllergy {
    pub allergy_id: i64,
    pub name: String,
    pub notes: Option<String>,
    pub recorded_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientVaccine {
    pub vaccine_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub dose: Option<String>,
    pub notes: Option<String>,
}

/// A diagnosis made during one of the patient's consultations
#[derive(Debug, Clone, Serialize)]
pub struct PatientDiagnosis {
    pub diagnosis_id: i64,
    pub consultation_id: i64,
    pub icd10: String,
    pub comments: Option<String>,
    pub urgent: bool,
    pub observation: Option<String>,
    pub admitted_on: Option<NaiveDate>,
    pub consultation_reason: Option<String>,
    pub professional_name: Option<String>,
    pub specialty: Option<String>,
}

/// A procedure performed during one of the patient's consultations
#[derive(Debug, Clone, Serialize)]
pub struct PatientProcedure {
    pub procedure_id: i64,
    pub consultation_id: i64,
    pub name: String,
    pub procedure_type: Option<String>,
    pub date: Option<NaiveDate>,
    pub instructions: Option<String>,
    pub consultation_date: Option<NaiveDate>,
    pub consultation_reason: Option<String>,
    pub professional_name: Option<String>,
    pub specialty: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientExam {
    #[serde(flatten)]
    pub exam: ConsultationExam,
    pub consultation_date: Option<NaiveDate>,
    pub consultation_type_name: Option<String>,
}

// ============================================================================
// Families
// ============================================================================

/// Membership of a patient in a family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyMember {
    pub family_id: i64,
    pub patient_id: i64,
    pub role: String,
    pub added_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FamilyMemberDetail {
    #[serde(flatten)]
    pub member: FamilyMember,
    pub patient: Patient,
}

/// A family grouping owned by one patient
#[derive(Debug, Clone, Serialize)]
pub struct Family {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: i64,
    pub created_at: String,
    pub updated_at: String,
    pub members: Vec<FamilyMemberDetail>,
}

/// Result of adding a member: a duplicate is not an error
#[derive(Debug, Clone, PartialEq)]
pub enum MemberInsert {
    Added(FamilyMember),
    AlreadyMember(FamilyMember),
}

// ============================================================================
// Dashboard
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardMetrics {
    pub total_patients: i64,
    pub consultations_today: i64,
    pub consultations_last_7_days: i64,
    pub exams_last_30_days: i64,
    pub critical_patients: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentConsultation {
    pub consultation_id: i64,
    pub patient_id: i64,
    pub patient_name: String,
    pub admitted_on: Option<NaiveDate>,
    pub time: Option<String>,
    pub reason: Option<String>,
    pub consultation_type_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub metrics: DashboardMetrics,
    pub blood_types: Vec<LabelCount>,
    pub consultations_by_type: Vec<LabelCount>,
    pub latest_consultations: Vec<RecentConsultation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentPatient {
    pub id: i64,
    pub name: String,
    pub birth_date: NaiveDate,
    pub blood_type: Option<String>,
    pub insurance: Option<String>,
    pub photo_url: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VitalSignAlert {
    pub patient_id: i64,
    pub patient_name: String,
    pub blood_pressure: Option<String>,
    pub temperature: Option<f64>,
    pub weight: Option<f64>,
    pub glucose: Option<f64>,
    pub measured_at: String,
    pub alert: String,
}

// ============================================================================
// Per-patient dashboard
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct PatientMetrics {
    pub total_consultations: i64,
    pub consultations_last_30_days: i64,
    pub total_exams: i64,
    pub chronic_medications: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientVisit {
    pub consultation_id: i64,
    pub admitted_on: Option<NaiveDate>,
    pub time: Option<String>,
    pub health_service_name: Option<String>,
    pub professional_name: Option<String>,
    pub specialty: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
}

impl Severity {
    /// Urgent diagnoses are high severity
    pub fn from_urgent(urgent: bool) -> Self {
        if urgent {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentDiagnosis {
    pub diagnosis_id: i64,
    pub icd10: String,
    pub admitted_on: Option<NaiveDate>,
    pub professional_name: Option<String>,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentExam {
    pub exam_id: i64,
    pub consultation_id: i64,
    pub name: String,
    pub date: Option<NaiveDate>,
    pub health_service_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MedicationStatus {
    Active,
    Ended,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveMedication {
    pub medication_id: i64,
    pub name: String,
    pub company: Option<String>,
    pub started_on: Option<NaiveDate>,
    /// `ended` once an end date is recorded
    pub status: MedicationStatus,
}

/// Summary of one patient's record
#[derive(Debug, Clone, Serialize)]
pub struct PatientDashboard {
    pub patient_id: i64,
    pub metrics: PatientMetrics,
    pub latest_consultations: Vec<PatientVisit>,
    pub recent_diagnoses: Vec<RecentDiagnosis>,
    pub latest_exams: Vec<RecentExam>,
    pub chronic_medications: Vec<ActiveMedication>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sex_parse_is_case_insensitive() {
        assert_eq!("Female".parse::<Sex>().unwrap(), Sex::Female);
        assert_eq!(" MALE ".parse::<Sex>().unwrap(), Sex::Male);
        assert_eq!("other".parse::<Sex>().unwrap(), Sex::Other);
        assert!("unknown".parse::<Sex>().is_err());
    }

    #[test]
    fn test_severity_from_urgency() {
        assert_eq!(Severity::from_urgent(true), Severity::High);
        assert_eq!(
            serde_json::to_string(&Severity::from_urgent(false)).unwrap(),
            "\"medium\""
        );
    }

    #[test]
    fn test_sex_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Sex::Female).unwrap(), "\"female\"");
    }

    #[test]
    fn test_exam_field_update_skips_unset_fields() {
        let update = ExamFieldUpdate {
            unit: Some("mg/dL".into()),
            ..Default::default()
        };
        assert!(!update.is_empty());
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({"unit": "mg/dL"}));
        assert!(ExamFieldUpdate::default().is_empty());
    }

    #[test]
    fn test_consultation_summary_flattens_consultation() {
        let summary = ConsultationSummary {
            consultation: Consultation {
                id: 4,
                patient_id: 2,
                health_service_id: None,
                professional_id: None,
                consultation_type_id: Some(1),
                admitted_on: NaiveDate::from_ymd_opt(2025, 3, 1),
                discharged_on: None,
                discharge_condition: None,
                time: None,
                reason: Some("Checkup".into()),
                notes: None,
            },
            patient_name: Some("Ana".into()),
            consultation_type_name: Some("General medicine".into()),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["id"], 4);
        assert_eq!(json["admitted_on"], "2025-03-01");
        assert_eq!(json["patient_name"], "Ana");
    }
}
