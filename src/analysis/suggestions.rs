//! Turning analysis results into exam suggestions, and applying accepted ones.

use serde::Serialize;
use serde_json::{Map, Value};

use super::traits::{DocumentAnalysis, FieldKind};
use crate::records::ExamFieldUpdate;

/// Characters of extracted text included with suggestions
pub const PREVIEW_CHARS: usize = 500;

/// Prefix written to exam notes when suggestions are applied
pub const APPLIED_NOTES_PREFIX: &str = "[analysis-applied]";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub id: usize,
    pub field: String,
    pub suggested_value: String,
    pub confidence: f64,
    pub kind: FieldKind,
}

/// One suggestion per detected field, numbered in detection order.
pub fn suggestions(analysis: &DocumentAnalysis) -> Vec<Suggestion> {
    analysis
        .fields
        .iter()
        .enumerate()
        .map(|(id, f)| Suggestion {
            id,
            field: f.name.clone(),
            suggested_value: f.value.clone(),
            confidence: f.confidence,
            kind: f.kind,
        })
        .collect()
}

/// First [`PREVIEW_CHARS`] characters of `text`, with `...` when truncated.
pub fn text_preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `"[analysis-applied] k1: v1 | k2: v2"`, keys in map order.
pub fn applied_notes(applied: &Map<String, Value>) -> String {
    let pairs: Vec<String> = applied
        .iter()
        .map(|(k, v)| format!("{}: {}", k, value_text(v)))
        .collect();
    format!("{} {}", APPLIED_NOTES_PREFIX, pairs.join(" | "))
}

/// Exam columns to overwrite, matched by keywords in the field names.
///
/// Checked per field in order: name + exam, type + exam, unit, reference.
/// Later fields win when several match the same column.
pub fn exam_fields(applied: &Map<String, Value>) -> ExamFieldUpdate {
    let mut update = ExamFieldUpdate::default();
    for (field, value) in applied {
        let key = field.to_lowercase();
        let value = Some(value_text(value));
        if key.contains("name") && key.contains("exam") {
            update.name = value;
        } else if key.contains("type") && key.contains("exam") {
            update.exam_type = value;
        } else if key.contains("unit") {
            update.unit = value;
        } else if key.contains("reference") {
            update.reference_value = value;
        }
    }
    update
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SimulatedAnalyzer;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_suggestions_from_simulated_report() {
        let report = SimulatedAnalyzer.report();
        let s = suggestions(&report);
        assert_eq!(s.len(), report.fields.len());
        assert_eq!(s[0].id, 0);
        assert_eq!(s[0].field, "Patient Name");
        assert_eq!(s[8].suggested_value, "95");
    }

    #[test]
    fn test_text_preview_truncates_on_char_boundary() {
        let short = "short text";
        assert_eq!(text_preview(short), short);

        let long = "é".repeat(PREVIEW_CHARS + 10);
        let preview = text_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_applied_notes_format() {
        let applied = map(json!({"Age": 35, "Glucose": "95"}));
        assert_eq!(applied_notes(&applied), "[analysis-applied] Age: 35 | Glucose: 95");
    }

    #[test]
    fn test_exam_fields_keyword_matching() {
        let applied = map(json!({
            "Exam Name": "Lipid panel",
            "Exam Type": "Blood",
            "Glucose Unit": "mg/dL",
            "Hemoglobin Reference": "12.0 - 15.5",
            "Glucose": "95"
        }));
        let update = exam_fields(&applied);
        assert_eq!(update.name.as_deref(), Some("Lipid panel"));
        assert_eq!(update.exam_type.as_deref(), Some("Blood"));
        assert_eq!(update.unit.as_deref(), Some("mg/dL"));
        assert_eq!(update.reference_value.as_deref(), Some("12.0 - 15.5"));
    }

    #[test]
    fn test_exam_fields_no_match() {
        let applied = map(json!({"Patient Name": "JANE DOE", "Glucose": "95"}));
        assert!(exam_fields(&applied).is_empty());
    }
}
