//! Document handlers: initial upload, lookup, reviewer assignment, decisions

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::form::UploadForm;
use super::{attachment, validation_error};
use crate::AppState;
use thesistrack_common::{
    db::models::{Document, DocumentKind},
    errors::{AppError, Result},
    workflow::{DocumentRepository, NewUpload},
};

/// Text fields of the initial upload form
#[derive(Debug, Validate)]
pub struct OpenDocumentFields {
    #[validate(length(min = 1, max = 500))]
    pub topic: String,

    #[validate(length(max = 4000))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub owner_id: Option<Uuid>,
    pub reviewer_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AssignReviewerRequest {
    pub reviewer_id: Uuid,
}

/// Any string is accepted here; unknown values become invalid transitions
#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: String,
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub kind: String,
    pub owner_id: Uuid,
    pub reviewer_id: Option<Uuid>,
    pub topic: String,
    pub note: Option<String>,
    pub status: String,
    pub file_url: String,
    pub cycles_url: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            file_url: format!("/v1/documents/{}/file", doc.id),
            cycles_url: format!("/v1/documents/{}/cycles", doc.id),
            id: doc.id,
            kind: doc.kind.to_string(),
            owner_id: doc.owner_id,
            reviewer_id: doc.reviewer_id,
            topic: doc.topic,
            note: doc.note,
            status: doc.status.to_string(),
            created_at: doc.created_at.to_rfc3339(),
            updated_at: doc.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentResponse>,
    pub total: usize,
}

/// Create a document from the student's first upload
pub async fn open_document(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentResponse>)> {
    let mut form = UploadForm::read(multipart, state.config.body_limit_bytes()).await?;

    let kind: DocumentKind = form
        .required("kind")?
        .parse()
        .map_err(|e: String| AppError::invalid_field("kind", e))?;

    let fields = OpenDocumentFields {
        topic: form.required("topic")?,
        note: form.optional("note"),
    };
    fields.validate().map_err(validation_error)?;

    let owner_id = form.uuid("owner_id")?;
    let reviewer_id = form.optional_uuid("reviewer_id")?;
    let file = form.take_file()?;

    let document = state
        .coordinator
        .open_document(NewUpload {
            owner_id,
            kind,
            topic: fields.topic,
            note: fields.note,
            reviewer_id,
            file_name: file.file_name,
            data: file.data,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(document.into())))
}

/// List a student's documents or a reviewer's queue, newest first
pub async fn list_documents(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<DocumentListResponse>> {
    let store = state.coordinator.store();

    let documents = match (query.owner_id, query.reviewer_id) {
        (Some(owner_id), None) => store.list_by_owner(owner_id).await?,
        (None, Some(reviewer_id)) => store.list_by_reviewer(reviewer_id).await?,
        _ => {
            return Err(AppError::Validation {
                message: "exactly one of owner_id or reviewer_id is required".to_string(),
                field: None,
            })
        }
    };

    let documents: Vec<DocumentResponse> = documents.into_iter().map(Into::into).collect();
    Ok(Json(DocumentListResponse {
        total: documents.len(),
        documents,
    }))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentResponse>> {
    let document = state.coordinator.get_document(id).await?;
    Ok(Json(document.into()))
}

/// Assign or replace the document's reviewer
pub async fn assign_reviewer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AssignReviewerRequest>,
) -> Result<Json<DocumentResponse>> {
    let document = state
        .coordinator
        .assign_reviewer(id, request.reviewer_id)
        .await?;
    Ok(Json(document.into()))
}

/// Approve, reject, or reopen
pub async fn decide(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<DocumentResponse>> {
    let document = state.coordinator.decide_named(id, &request.decision).await?;
    Ok(Json(document.into()))
}

/// Download the primary file
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let (document, data) = state.coordinator.primary_file(id).await?;
    Ok(attachment(&document.file_key, data))
}
