//! DocumentAnalyzer trait and the analysis result types
//!
//! An analyzer extracts text, key/value fields and tables from an uploaded
//! exam document (PDF or image).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by a document analyzer
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("analysis request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("analysis service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid analysis response: {0}")]
    InvalidResponse(String),
}

/// A document submitted for analysis
#[derive(Debug, Clone, Copy)]
pub struct Document<'a> {
    pub content: &'a [u8],
    pub file_name: Option<&'a str>,
    pub content_type: Option<&'a str>,
}

/// Value kind of a detected field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
    Date,
}

/// A key/value pair found in the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedField {
    pub name: String,
    pub value: String,
    /// Percentage, 0-100
    pub confidence: f64,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisTable {
    pub title: String,
    /// First row is the header
    pub rows: Vec<Vec<String>>,
    pub confidence: f64,
}

/// Result of analyzing one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub text: String,
    /// Overall confidence percentage, 0-100
    pub confidence: f64,
    #[serde(default)]
    pub fields: Vec<DetectedField>,
    #[serde(default)]
    pub tables: Vec<AnalysisTable>,
    /// True when produced by the simulated analyzer
    #[serde(default)]
    pub simulated: bool,
}

/// Abstract interface for document analysis.
///
/// Implementations must be `Send + Sync` to be shared across handlers as
/// `Arc<dyn DocumentAnalyzer>`.
///
/// # Implementations
///
/// - [`HttpAnalyzer`](super::HttpAnalyzer): posts the document to an HTTP
///   analysis service
/// - [`SimulatedAnalyzer`](super::SimulatedAnalyzer): canned lab report, used
///   as the fallback when no service is configured or the service fails
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    async fn analyze(&self, document: &Document<'_>) -> Result<DocumentAnalysis, AnalysisError>;

    /// Short name used in logs
    fn name(&self) -> &str;
}
