//! Simulated analyzer returning a canned clinical laboratory report.

use super::traits::{
    AnalysisError, AnalysisTable, DetectedField, Document, DocumentAnalysis, DocumentAnalyzer,
    FieldKind,
};
use async_trait::async_trait;

const REPORT_TEXT: &str = "CLINICAL LABORATORY REPORT
CENTRAL CLINICAL LABORATORY
Date: 15/03/2024

PATIENT DETAILS:
Name: JANE DOE
Age: 35 years
Sex: Female
Attending physician: Dr. John Smith

RESULTS:

COMPLETE BLOOD COUNT:
Hemoglobin: 13.2 g/dL (Reference: 12.0 - 15.5 g/dL)
Hematocrit: 39.8% (36.0 - 46.0%)
Leukocytes: 6,800 /uL (4,500 - 11,000 /uL)
Platelets: 250,000 /uL (150,000 - 450,000 /uL)

BLOOD CHEMISTRY:
Glucose: 95 mg/dL (70 - 110 mg/dL)
Urea: 28 mg/dL (15 - 45 mg/dL)
Creatinine: 0.8 mg/dL (0.5 - 1.1 mg/dL)
Total Cholesterol: 185 mg/dL (<200 mg/dL)
Triglycerides: 120 mg/dL (<150 mg/dL)

OBSERVATIONS:
Results within normal parameters. Routine follow-up in 6 months.";

const OVERALL_CONFIDENCE: f64 = 85.0;

/// Analyzer that ignores the document content and returns a fixed report.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedAnalyzer;

fn field(name: &str, value: &str, confidence: f64, kind: FieldKind) -> DetectedField {
    DetectedField {
        name: name.to_string(),
        value: value.to_string(),
        confidence,
        kind,
    }
}

fn table(title: &str, rows: &[[&str; 4]], confidence: f64) -> AnalysisTable {
    AnalysisTable {
        title: title.to_string(),
        rows: rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect(),
        confidence,
    }
}

impl SimulatedAnalyzer {
    pub fn report(&self) -> DocumentAnalysis {
        use FieldKind::*;

        let fields = vec![
            field("Patient Name", "JANE DOE", 95.0, Text),
            field("Age", "35", 90.0, Number),
            field("Sex", "Female", 92.0, Text),
            field("Exam Date", "15/03/2024", 88.0, Date),
            field("Physician", "Dr. John Smith", 85.0, Text),
            field("Hemoglobin", "13.2", 90.0, Number),
            field("Hemoglobin Unit", "g/dL", 89.0, Text),
            field("Hemoglobin Reference", "12.0 - 15.5", 85.0, Text),
            field("Glucose", "95", 91.0, Number),
            field("Glucose Unit", "mg/dL", 90.0, Text),
            field("Total Cholesterol", "185", 88.0, Number),
            field(
                "Observations",
                "Results within normal parameters. Routine follow-up in 6 months.",
                82.0,
                Text,
            ),
        ];

        const HEADER: [&str; 4] = ["Parameter", "Result", "Unit", "Reference"];
        let tables = vec![
            table(
                "COMPLETE BLOOD COUNT",
                &[
                    HEADER,
                    ["Hemoglobin", "13.2", "g/dL", "12.0 - 15.5"],
                    ["Hematocrit", "39.8", "%", "36.0 - 46.0"],
                    ["Leukocytes", "6,800", "/uL", "4,500 - 11,000"],
                    ["Platelets", "250,000", "/uL", "150,000 - 450,000"],
                ],
                90.0,
            ),
            table(
                "BLOOD CHEMISTRY",
                &[
                    HEADER,
                    ["Glucose", "95", "mg/dL", "70 - 110"],
                    ["Urea", "28", "mg/dL", "15 - 45"],
                    ["Creatinine", "0.8", "mg/dL", "0.5 - 1.1"],
                    ["Total Cholesterol", "185", "mg/dL", "<200"],
                    ["Triglycerides", "120", "mg/dL", "<150"],
                ],
                88.0,
            ),
        ];

        DocumentAnalysis {
            text: REPORT_TEXT.to_string(),
            confidence: OVERALL_CONFIDENCE,
            fields,
            tables,
            simulated: true,
        }
    }
}

#[async_trait]
impl DocumentAnalyzer for SimulatedAnalyzer {
    async fn analyze(&self, _document: &Document<'_>) -> Result<DocumentAnalysis, AnalysisError> {
        Ok(self.report())
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
