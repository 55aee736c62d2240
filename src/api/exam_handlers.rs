//! API handlers for exam files, document analysis and applied suggestions

use super::handlers::{non_empty, required, AppError, SharedState};
use crate::analysis::{self, suggestions, Document, DocumentAnalysis};
use crate::records::exams::{self, CreatedExam, ExamLink};
use crate::records::{self, ConsultationExam, ExamFieldUpdate, ExamFile, ExamInput};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body for creating an exam definition, optionally linked to a consultation
#[derive(Debug, Deserialize, Default)]
pub struct ExamBody {
    pub name: Option<String>,
    pub exam_type: Option<String>,
    pub unit: Option<String>,
    pub reference_value: Option<String>,
    pub consultation_id: Option<i64>,
    /// Notes stored on the consultation link
    pub notes: Option<String>,
}

impl ExamBody {
    /// Exam fields plus the link notes
    pub fn validate(self) -> Result<(ExamInput, Option<String>), AppError> {
        let input = ExamInput {
            name: required(self.name, "name")?,
            exam_type: required(self.exam_type, "exam_type")?,
            unit: non_empty(self.unit),
            reference_value: non_empty(self.reference_value),
        };
        Ok((input, non_empty(self.notes)))
    }
}

#[derive(Debug, Deserialize)]
pub struct FileUploadBody {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    /// Base64, optionally with a `data:<type>;base64,` prefix
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExamFileResponse {
    pub file_name: String,
    pub content_type: String,
    pub file_size: usize,
    pub uploaded_at: Option<String>,
    /// Base64
    pub content: String,
}

/// Body for analyze and suggestions. Without `content` the stored file is used.
#[derive(Debug, Deserialize, Default)]
pub struct AnalyzeBody {
    pub content: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalysisMetadata {
    pub analyzed_at: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub exam_id: i64,
    pub consultation_id: i64,
    #[serde(flatten)]
    pub analysis: DocumentAnalysis,
    pub metadata: AnalysisMetadata,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub exam_id: i64,
    pub suggestions: Vec<suggestions::Suggestion>,
    pub confidence: f64,
    pub text_preview: String,
    pub simulated: bool,
}

#[derive(Debug, Deserialize)]
pub struct ApplySuggestionsBody {
    pub applied: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
pub struct ApplySuggestionsResponse {
    pub message: String,
    pub exam_id: i64,
    pub notes: String,
    pub updated_fields: ExamFieldUpdate,
}

// ============================================================================
// Helpers
// ============================================================================

/// Room for the JSON envelope and the other fields next to the file content
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

/// axum's own default, kept as the floor for small file limits
const MIN_BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

/// Request body limit that lets a base64 file of `max_file_bytes` reach the
/// upload handler, which then applies the exact decoded-size check.
pub(crate) fn request_body_limit(max_file_bytes: usize) -> usize {
    max_file_bytes
        .div_ceil(3)
        .saturating_mul(4)
        .saturating_add(BODY_OVERHEAD_BYTES)
        .max(MIN_BODY_LIMIT_BYTES)
}

/// Decode base64 content, stripping a data URL prefix when present
pub(crate) fn decode_content(content: &str) -> Result<Vec<u8>, AppError> {
    let content = content.trim();
    let encoded = match content.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| AppError::BadRequest("Malformed data URL".to_string()))?,
        None => content,
    };
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| AppError::BadRequest(format!("content is not valid base64: {}", e)))
}

fn link_not_found(consultation_id: i64, exam_id: i64) -> AppError {
    AppError::NotFound(format!(
        "Exam {} is not linked to consultation {}",
        exam_id, consultation_id
    ))
}

fn ensure_link(
    state: &SharedState,
    consultation_id: i64,
    exam_id: i64,
) -> Result<ConsultationExam, AppError> {
    exams::get_link(&state.db, consultation_id, exam_id)?
        .ok_or_else(|| link_not_found(consultation_id, exam_id))
}

async fn stored_file(
    state: &SharedState,
    consultation_id: i64,
    exam_id: i64,
) -> Result<ExamFile, AppError> {
    state
        .db
        .blocking(move |db| exams::get_file(db, consultation_id, exam_id))
        .await?
        .ok_or_else(|| AppError::NotFound("No file stored for this exam".to_string()))
}

/// Keeps a header value to a quoted-string safe subset
fn attachment_disposition(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_control() || !c.is_ascii() => '_',
            c => c,
        })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

/// Runs the analyzer on the request body content or, when absent, the stored file
async fn run_analysis(
    state: &SharedState,
    consultation_id: i64,
    exam_id: i64,
    body: AnalyzeBody,
) -> Result<(DocumentAnalysis, AnalysisMetadata), AppError> {
    ensure_link(state, consultation_id, exam_id)?;

    let (content, file_name, content_type) = match non_empty(body.content) {
        Some(content) => (
            decode_content(&content)?,
            non_empty(body.file_name),
            non_empty(body.content_type),
        ),
        None => {
            let file = state
                .db
                .blocking(move |db| exams::get_file(db, consultation_id, exam_id))
                .await?
                .ok_or_else(|| {
                    AppError::BadRequest("content is required when no file is stored".to_string())
                })?;
            (file.content, Some(file.file_name), Some(file.content_type))
        }
    };

    tracing::info!(
        consultation_id,
        exam_id,
        bytes = content.len(),
        "Analyzing exam document"
    );

    let document = Document {
        content: &content,
        file_name: file_name.as_deref(),
        content_type: content_type.as_deref(),
    };
    let analysis = analysis::analyze_with_fallback(state.analyzer.as_deref(), &document).await;

    Ok((
        analysis,
        AnalysisMetadata {
            analyzed_at: chrono::Utc::now().to_rfc3339(),
            file_name,
            content_type,
        },
    ))
}

// ============================================================================
// Handlers
// ============================================================================

/// Create an exam linked to a consultation
pub async fn create_consultation_exam(
    State(state): State<SharedState>,
    Path(consultation_id): Path<i64>,
    Json(body): Json<ExamBody>,
) -> Result<(StatusCode, Json<CreatedExam>), AppError> {
    if records::consultations::get(&state.db, consultation_id)?.is_none() {
        return Err(AppError::NotFound(format!(
            "Consultation {} not found",
            consultation_id
        )));
    }
    let (input, notes) = body.validate()?;
    let link = ExamLink {
        consultation_id,
        notes,
    };
    let created = exams::create(&state.db, &input, Some(&link))?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Store (or replace) the file of a consultation exam
pub async fn upload_exam_file(
    State(state): State<SharedState>,
    Path((consultation_id, exam_id)): Path<(i64, i64)>,
    Json(body): Json<FileUploadBody>,
) -> Result<Json<ConsultationExam>, AppError> {
    let file_name = required(body.file_name, "file_name")?;
    let content = required(body.content, "content")?;
    let content_type = non_empty(body.content_type)
        .unwrap_or_else(|| exams::DEFAULT_CONTENT_TYPE.to_string());

    let max = state.config.max_exam_file_bytes;
    // base64 expands by 4/3; reject obviously oversized payloads before decoding
    if content.len() / 4 * 3 > max.saturating_add(3) {
        return Err(AppError::PayloadTooLarge(format!(
            "File exceeds the {} byte limit",
            max
        )));
    }
    let bytes = decode_content(&content)?;
    if bytes.len() > max {
        return Err(AppError::PayloadTooLarge(format!(
            "File exceeds the {} byte limit",
            max
        )));
    }

    let size = bytes.len();
    let link = state
        .db
        .blocking(move |db| {
            exams::store_file(
                db,
                consultation_id,
                exam_id,
                &file_name,
                &content_type,
                &bytes,
            )
        })
        .await?
        .ok_or_else(|| link_not_found(consultation_id, exam_id))?;

    tracing::info!(consultation_id, exam_id, bytes = size, "Exam file stored");
    Ok(Json(link))
}

/// File metadata plus base64 content
pub async fn get_exam_file(
    State(state): State<SharedState>,
    Path((consultation_id, exam_id)): Path<(i64, i64)>,
) -> Result<Json<ExamFileResponse>, AppError> {
    let file = stored_file(&state, consultation_id, exam_id).await?;

    Ok(Json(ExamFileResponse {
        file_name: file.file_name,
        content_type: file.content_type,
        file_size: file.content.len(),
        uploaded_at: file.uploaded_at,
        content: STANDARD.encode(&file.content),
    }))
}

/// Raw file bytes as an attachment
pub async fn download_exam_file(
    State(state): State<SharedState>,
    Path((consultation_id, exam_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let file = stored_file(&state, consultation_id, exam_id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                attachment_disposition(&file.file_name),
            ),
        ],
        file.content,
    ))
}

pub async fn analyze_exam(
    State(state): State<SharedState>,
    Path((consultation_id, exam_id)): Path<(i64, i64)>,
    Json(body): Json<AnalyzeBody>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let (analysis, metadata) = run_analysis(&state, consultation_id, exam_id, body).await?;
    Ok(Json(AnalyzeResponse {
        exam_id,
        consultation_id,
        analysis,
        metadata,
    }))
}

/// Detected fields as numbered suggestions
pub async fn exam_suggestions(
    State(state): State<SharedState>,
    Path((consultation_id, exam_id)): Path<(i64, i64)>,
    Json(body): Json<AnalyzeBody>,
) -> Result<Json<SuggestionsResponse>, AppError> {
    let (analysis, _) = run_analysis(&state, consultation_id, exam_id, body).await?;
    Ok(Json(SuggestionsResponse {
        exam_id,
        suggestions: suggestions::suggestions(&analysis),
        confidence: analysis.confidence,
        text_preview: suggestions::text_preview(&analysis.text),
        simulated: analysis.simulated,
    }))
}

/// Write accepted suggestions to the link notes and matching exam columns
pub async fn apply_exam_suggestions(
    State(state): State<SharedState>,
    Path((consultation_id, exam_id)): Path<(i64, i64)>,
    Json(body): Json<ApplySuggestionsBody>,
) -> Result<Json<ApplySuggestionsResponse>, AppError> {
    let applied = body
        .applied
        .filter(|a| !a.is_empty())
        .ok_or_else(|| AppError::BadRequest("applied must be a non-empty object".to_string()))?;

    let notes = suggestions::applied_notes(&applied);
    let fields = suggestions::exam_fields(&applied);

    if !exams::apply_suggestions(&state.db, consultation_id, exam_id, &notes, &fields)? {
        return Err(link_not_found(consultation_id, exam_id));
    }
    tracing::info!(
        consultation_id,
        exam_id,
        applied = applied.len(),
        "Analysis suggestions applied"
    );

    Ok(Json(ApplySuggestionsResponse {
        message: "Suggestions applied".to_string(),
        exam_id,
        notes,
        updated_fields: fields,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::test_helpers::{
        body_bytes, body_json, get, json_request, seed_consultation, seed_patient, test_app,
        test_app_with,
    };
    use crate::Config;
    use serde_json::json;
    use tower::ServiceExt;

    /// Patient, consultation and a linked exam; returns (consultation_id, exam_id)
    fn seed_link(db: &Database) -> (i64, i64) {
        let patient = seed_patient(db, "Ana");
        let consultation = seed_consultation(db, patient.id);
        let input = ExamInput {
            name: "Glucose".into(),
            exam_type: "Blood".into(),
            unit: None,
            reference_value: None,
        };
        let link = ExamLink {
            consultation_id: consultation.id,
            notes: None,
        };
        let created = exams::create(db, &input, Some(&link)).unwrap();
        (consultation.id, created.exam.id)
    }

    fn file_uri(cid: i64, eid: i64, action: &str) -> String {
        format!("/api/consultations/{}/exams/{}/{}", cid, eid, action)
    }

    #[test]
    fn test_decode_content_strips_data_url() {
        let encoded = STANDARD.encode(b"hello");
        assert_eq!(decode_content(&encoded).unwrap(), b"hello");
        assert_eq!(
            decode_content(&format!("data:text/plain;base64,{}", encoded)).unwrap(),
            b"hello"
        );
        assert!(matches!(
            decode_content("not base64!!"),
            Err(AppError::BadRequest(_))
        ));
        assert!(decode_content("data:nocomma").is_err());
    }

    #[test]
    fn test_attachment_disposition_sanitizes() {
        assert_eq!(
            attachment_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\""
        );
        assert_eq!(
            attachment_disposition("a\"b\nc.pdf"),
            "attachment; filename=\"a_b_c.pdf\""
        );
    }

    #[test]
    fn test_request_body_limit_covers_encoded_file() {
        let max = 20 * 1024 * 1024;
        let encoded = STANDARD.encode(vec![0u8; max]).len();
        assert!(request_body_limit(max) > encoded);
        assert_eq!(request_body_limit(8), MIN_BODY_LIMIT_BYTES);
    }

    #[tokio::test]
    async fn test_create_consultation_exam() {
        let (app, state) = test_app();
        let patient = seed_patient(&state.db, "Ana");
        let consultation = seed_consultation(&state.db, patient.id);

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/consultations/{}/exams", consultation.id),
                json!({"name": "Hemoglobin", "exam_type": "Blood", "notes": "fasting"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let json = body_json(resp).await;
        assert_eq!(json["link"]["notes"], "fasting");

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/consultations/999/exams",
                json!({"name": "Hemoglobin", "exam_type": "Blood"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app
            .oneshot(json_request(
                "POST",
                &format!("/api/consultations/{}/exams", consultation.id),
                json!({"name": "Hemoglobin"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_then_fetch_and_download() {
        let (app, state) = test_app();
        let (cid, eid) = seed_link(&state.db);
        let bytes = b"%PDF-1.4 fake".to_vec();

        let resp = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &file_uri(cid, eid, "file"),
                json!({
                    "file_name": "glucose.pdf",
                    "content_type": "application/pdf",
                    "content": format!("data:application/pdf;base64,{}", STANDARD.encode(&bytes)),
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["file_name"], "glucose.pdf");
        assert_eq!(json["file_size"], bytes.len());

        let resp = app
            .clone()
            .oneshot(get(&file_uri(cid, eid, "file")))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["content_type"], "application/pdf");
        assert_eq!(json["content"], STANDARD.encode(&bytes));

        let resp = app
            .oneshot(get(&file_uri(cid, eid, "download")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "application/pdf"
        );
        assert_eq!(
            resp.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"glucose.pdf\""
        );
        assert_eq!(body_bytes(resp).await, bytes);
    }

    #[tokio::test]
    async fn test_upload_errors() {
        let config = Config {
            max_exam_file_bytes: 8,
            ..Config::default()
        };
        let (app, state) = test_app_with(config);
        let (cid, eid) = seed_link(&state.db);

        let too_big = STANDARD.encode([0u8; 9]);
        let resp = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &file_uri(cid, eid, "file"),
                json!({"file_name": "a.bin", "content": too_big}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body_json(resp).await["error"].is_string());

        let resp = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &file_uri(cid, eid, "file"),
                json!({"file_name": "a.bin", "content": "@@@"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &file_uri(cid, eid, "file"),
                json!({"content": STANDARD.encode(b"ok")}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &file_uri(cid, eid + 100, "file"),
                json!({"file_name": "a.bin", "content": STANDARD.encode(b"ok")}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app
            .oneshot(get(&file_uri(cid, eid, "file")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_larger_than_default_body_limit() {
        let (app, state) = test_app();
        let (cid, eid) = seed_link(&state.db);
        let bytes = vec![7u8; 3 * 1024 * 1024];

        let resp = app
            .oneshot(json_request(
                "PUT",
                &file_uri(cid, eid, "file"),
                json!({"file_name": "scan.bin", "content": STANDARD.encode(&bytes)}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["file_size"], bytes.len());

        let stored = exams::get_file(&state.db, cid, eid).unwrap().unwrap();
        assert_eq!(stored.content.len(), bytes.len());
    }

    #[tokio::test]
    async fn test_oversized_file_gets_json_error_above_body_floor() {
        let config = Config {
            max_exam_file_bytes: 1024 * 1024,
            ..Config::default()
        };
        let (app, state) = test_app_with(config);
        let (cid, eid) = seed_link(&state.db);

        let resp = app
            .oneshot(json_request(
                "PUT",
                &file_uri(cid, eid, "file"),
                json!({"file_name": "big.bin", "content": STANDARD.encode(vec![1u8; 1024 * 1024 + 1])}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body_json(resp).await["error"]
            .as_str()
            .unwrap()
            .contains("1048576"));
    }

    #[tokio::test]
    async fn test_analyze_falls_back_to_simulated_report() {
        let (app, state) = test_app();
        let (cid, eid) = seed_link(&state.db);

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                &file_uri(cid, eid, "analyze"),
                json!({"content": STANDARD.encode(b"scan"), "file_name": "scan.png"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["exam_id"], eid);
        assert_eq!(json["simulated"], true);
        assert_eq!(json["confidence"], 85.0);
        assert_eq!(json["metadata"]["file_name"], "scan.png");
        assert!(!json["fields"].as_array().unwrap().is_empty());

        let resp = app
            .oneshot(json_request(
                "POST",
                &file_uri(cid, eid + 100, "analyze"),
                json!({"content": STANDARD.encode(b"scan")}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_analyze_without_content_needs_stored_file() {
        let (app, state) = test_app();
        let (cid, eid) = seed_link(&state.db);

        let resp = app
            .clone()
            .oneshot(json_request("POST", &file_uri(cid, eid, "analyze"), json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        exams::store_file(&state.db, cid, eid, "lab.pdf", "application/pdf", b"pdf").unwrap();
        let resp = app
            .oneshot(json_request("POST", &file_uri(cid, eid, "analyze"), json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["metadata"]["file_name"], "lab.pdf");
    }

    #[tokio::test]
    async fn test_suggestions() {
        let (app, state) = test_app();
        let (cid, eid) = seed_link(&state.db);

        let resp = app
            .oneshot(json_request(
                "POST",
                &file_uri(cid, eid, "suggestions"),
                json!({"content": STANDARD.encode(b"scan")}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        let suggestions = json["suggestions"].as_array().unwrap();
        assert_eq!(suggestions[0]["id"], 0);
        assert_eq!(suggestions[0]["field"], "Patient Name");
        assert!(json["text_preview"].as_str().unwrap().chars().count() <= 503);
    }

    #[tokio::test]
    async fn test_apply_suggestions_updates_exam() {
        let (app, state) = test_app();
        let (cid, eid) = seed_link(&state.db);

        let resp = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &file_uri(cid, eid, "apply-suggestions"),
                json!({"applied": {"Glucose": "95", "Glucose Unit": "mg/dL"}}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(
            json["notes"],
            "[analysis-applied] Glucose: 95 | Glucose Unit: mg/dL"
        );
        assert_eq!(json["updated_fields"], json!({"unit": "mg/dL"}));

        let link = exams::get_link(&state.db, cid, eid).unwrap().unwrap();
        assert_eq!(link.unit.as_deref(), Some("mg/dL"));
        assert_eq!(link.exam_name, "Glucose");
        assert!(link.notes.unwrap().starts_with("[analysis-applied]"));

        let resp = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &file_uri(cid, eid, "apply-suggestions"),
                json!({"applied": {}}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .oneshot(json_request(
                "PUT",
                &file_uri(cid, eid + 100, "apply-suggestions"),
                json!({"applied": {"Glucose": "95"}}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
