//! HTTP document analyzer
//!
//! Posts the document as base64 JSON to a configured endpoint and expects a
//! [`DocumentAnalysis`] back.

use super::traits::{AnalysisError, Document, DocumentAnalysis, DocumentAnalyzer};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Analyzer backed by a remote HTTP service.
///
/// Cheaply cloneable (shares the reqwest client internally).
#[derive(Clone)]
pub struct HttpAnalyzer {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<&'a str>,
}

/// Error body some services return
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl HttpAnalyzer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl DocumentAnalyzer for HttpAnalyzer {
    async fn analyze(&self, document: &Document<'_>) -> Result<DocumentAnalysis, AnalysisError> {
        let body = AnalyzeRequest {
            content: base64::engine::general_purpose::STANDARD.encode(document.content),
            file_name: document.file_name,
            content_type: document.content_type,
        };

        let response = self.client.post(&self.url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let mut analysis: DocumentAnalysis = serde_json::from_slice(&bytes)
            .map_err(|e| AnalysisError::InvalidResponse(e.to_string()))?;
        analysis.simulated = false;
        Ok(analysis)
    }

    fn name(&self) -> &str {
        "http"
    }
}
