//! Exam document analysis
//!
//! Architecture follows the project pattern (trait + impl + fallback):
//! - `DocumentAnalyzer` trait: async interface for document analysis
//! - `HttpAnalyzer`: posts documents to a configured analysis service
//! - `SimulatedAnalyzer`: canned lab report used whenever the service is
//!   absent or fails

pub mod http;
pub mod simulated;
pub mod suggestions;
pub mod traits;

pub use http::HttpAnalyzer;
pub use simulated::SimulatedAnalyzer;
pub use traits::{
    AnalysisError, AnalysisTable, DetectedField, Document, DocumentAnalysis, DocumentAnalyzer,
    FieldKind,
};

use tracing::{debug, warn};

/// Runs the configured analyzer, falling back to the simulated report on any
/// error or when none is configured. Never fails.
pub async fn analyze_with_fallback(
    analyzer: Option<&dyn DocumentAnalyzer>,
    document: &Document<'_>,
) -> DocumentAnalysis {
    if let Some(analyzer) = analyzer {
        match analyzer.analyze(document).await {
            Ok(analysis) => {
                debug!(
                    analyzer = analyzer.name(),
                    confidence = analysis.confidence,
                    fields = analysis.fields.len(),
                    "Document analyzed"
                );
                return analysis;
            }
            Err(e) => {
                warn!(
                    analyzer = analyzer.name(),
                    "Document analysis failed, using simulated report: {}", e
                );
            }
        }
    }
    SimulatedAnalyzer.report()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FailingAnalyzer;

    #[async_trait]
    impl DocumentAnalyzer for FailingAnalyzer {
        async fn analyze(&self, _: &Document<'_>) -> Result<DocumentAnalysis, AnalysisError> {
            Err(AnalysisError::InvalidResponse("boom".into()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct FixedAnalyzer;

    #[async_trait]
    impl DocumentAnalyzer for FixedAnalyzer {
        async fn analyze(&self, _: &Document<'_>) -> Result<DocumentAnalysis, AnalysisError> {
            Ok(DocumentAnalysis {
                text: "real".into(),
                confidence: 99.0,
                fields: vec![],
                tables: vec![],
                simulated: false,
            })
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn doc() -> Document<'static> {
        Document {
            content: b"%PDF",
            file_name: Some("x.pdf"),
            content_type: None,
        }
    }

    #[tokio::test]
    async fn test_no_analyzer_uses_simulated() {
        let analysis = analyze_with_fallback(None, &doc()).await;
        assert!(analysis.simulated);
    }

    #[tokio::test]
    async fn test_failure_falls_back() {
        let analysis = analyze_with_fallback(Some(&FailingAnalyzer), &doc()).await;
        assert!(analysis.simulated);
    }

    #[tokio::test]
    async fn test_success_is_returned() {
        let analysis = analyze_with_fallback(Some(&FixedAnalyzer), &doc()).await;
        assert_eq!(analysis.text, "real");
        assert!(!analysis.simulated);
    }
}
