//! Review-revision cycle handlers

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use super::form::UploadForm;
use super::{attachment, validation_error};
use crate::AppState;
use thesistrack_common::{
    db::models::{ActorRole, CycleRecord},
    directory::ActorDirectory,
    errors::{AppError, Result},
    workflow::Submission,
};

#[derive(Debug, Validate)]
pub struct CycleFields {
    #[validate(length(max = 4000))]
    pub note: Option<String>,
}

#[derive(Serialize)]
pub struct CycleResponse {
    pub id: Uuid,
    pub document_id: Uuid,
    pub cycle_number: i32,
    pub actor_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
    pub actor_role: String,
    pub note: Option<String>,
    pub file_size: i64,
    pub file_sha256: String,
    pub file_url: String,
    pub created_at: String,
}

impl CycleResponse {
    fn new(record: CycleRecord, actor_name: Option<String>) -> Self {
        Self {
            file_url: format!("/v1/cycles/{}/file", record.id),
            id: record.id,
            document_id: record.document_id,
            cycle_number: record.cycle_number,
            actor_id: record.actor_id,
            actor_name,
            actor_role: record.actor_role.to_string(),
            note: record.note,
            file_size: record.file_size,
            file_sha256: record.file_sha256,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct CycleListResponse {
    pub document_id: Uuid,
    pub cycles: Vec<CycleResponse>,
    pub total: usize,
}

/// Upload a review or a revision
pub async fn submit_cycle(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<CycleResponse>)> {
    let mut form = UploadForm::read(multipart, state.config.body_limit_bytes()).await?;

    let role: ActorRole = form
        .required("role")?
        .parse()
        .map_err(|e: String| AppError::invalid_field("role", e))?;
    let actor_id = form.uuid("actor_id")?;

    let fields = CycleFields {
        note: form.optional("note"),
    };
    fields.validate().map_err(validation_error)?;

    let file = form.take_file()?;

    let record = state
        .coordinator
        .submit(Submission {
            document_id,
            actor_id,
            role,
            file_name: file.file_name,
            data: file.data,
            note: fields.note,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(CycleResponse::new(record, None))))
}

/// Exchange history, most recent first, with actor names where known
pub async fn list_cycles(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<CycleListResponse>> {
    let records = state.coordinator.list_cycles(document_id).await?;

    let mut actor_ids: Vec<Uuid> = records.iter().map(|r| r.actor_id).collect();
    actor_ids.sort_unstable();
    actor_ids.dedup();

    // Names are decoration; a directory outage must not hide the history
    let names = match state.directory.resolve_many(&actor_ids).await {
        Ok(names) => names,
        Err(e) => {
            tracing::warn!(error = %e, "Actor directory lookup failed");
            Default::default()
        }
    };

    let cycles: Vec<CycleResponse> = records
        .into_iter()
        .map(|record| {
            let name = names.get(&record.actor_id).map(|a| a.name.clone());
            CycleResponse::new(record, name)
        })
        .collect();

    Ok(Json(CycleListResponse {
        document_id,
        total: cycles.len(),
        cycles,
    }))
}

/// Download the file attached to one cycle
pub async fn download_file(
    State(state): State<AppState>,
    Path(cycle_id): Path<Uuid>,
) -> Result<Response> {
    let (record, data) = state.coordinator.cycle_file(cycle_id).await?;
    Ok(attachment(&record.file_key, data))
}
