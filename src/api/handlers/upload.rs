use crate::AppState;
use crate::api::error::AppError;
use crate::models::{PartReceipt, SessionStatus, UploadSession};
use crate::services::upload_service::UploadError;
use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct InitUploadParams {
    /// Name the assembled object is requested under.
    pub file_name: String,
    /// Expected total size in bytes, 0 if unknown.
    #[serde(default)]
    pub file_size: u64,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadResponse {
    pub upload_id: Uuid,
    pub object_key: String,
    pub min_part_size: u64,
    pub max_parts: u32,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct UploadPartParams {
    pub upload_id: String,
    pub part_number: u32,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct CompleteUploadParams {
    pub upload_id: String,
    /// Must match the name given at init when present.
    pub file_name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPartRequest {
    pub part_number: u32,
    pub etag: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadResponse {
    pub file_name: String,
    pub file_size: u64,
    pub url: String,
    pub etag: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadedPartView {
    pub part_number: u32,
    pub etag: String,
    pub size: u64,
    pub received_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadSessionResponse {
    pub upload_id: Uuid,
    pub file_name: String,
    pub object_key: String,
    pub status: SessionStatus,
    pub declared_size: u64,
    pub received_bytes: u64,
    pub parts: Vec<UploadedPartView>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl From<UploadSession> for UploadSessionResponse {
    fn from(session: UploadSession) -> Self {
        let received_bytes = session.received_bytes();
        Self {
            upload_id: session.id,
            file_name: session.target_name,
            object_key: session.object_key,
            status: session.status,
            declared_size: session.declared_size,
            received_bytes,
            parts: session
                .parts
                .into_iter()
                .map(|(part_number, part)| UploadedPartView {
                    part_number,
                    etag: part.fingerprint,
                    size: part.size,
                    received_at: part.received_at,
                })
                .collect(),
            created_at: session.created_at,
            last_activity_at: session.last_activity_at,
        }
    }
}

fn parse_upload_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("Invalid uploadId: {}", raw)))
}

/// Part payload, either the raw body or the `file` field of a
/// `multipart/form-data` body.
async fn read_part_body(state: &AppState, request: Request) -> Result<Bytes, AppError> {
    let is_form = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    if !is_form {
        return Bytes::from_request(request, state)
            .await
            .map_err(|e| AppError::Body(e.status(), e.body_text()));
    }

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| AppError::Body(e.status(), e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Body(e.status(), e.body_text()))?
    {
        if field.name() == Some("file") {
            return field
                .bytes()
                .await
                .map_err(|e| AppError::Body(e.status(), e.body_text()));
        }
    }

    Err(AppError::BadRequest(
        "multipart body has no 'file' field".to_string(),
    ))
}

#[utoipa::path(
    post,
    path = "/api/files/upload/init",
    params(InitUploadParams),
    responses(
        (status = 200, description = "Upload session opened", body = InitUploadResponse),
        (status = 400, description = "Invalid file name or size"),
        (status = 503, description = "Storage backend unavailable")
    ),
    tag = "uploads"
)]
pub async fn init_upload(
    State(state): State<AppState>,
    Query(params): Query<InitUploadParams>,
) -> Result<Json<InitUploadResponse>, AppError> {
    let session = state
        .upload_service
        .initiate(&params.file_name, params.file_size)
        .await?;

    Ok(Json(InitUploadResponse {
        upload_id: session.id,
        object_key: session.object_key,
        min_part_size: state.config.min_part_size,
        max_parts: state.config.max_parts,
    }))
}

#[utoipa::path(
    post,
    path = "/api/files/upload/part",
    params(UploadPartParams),
    request_body(
        content = Vec<u8>,
        description = "Raw part bytes, or multipart/form-data with a `file` field",
        content_type = "application/octet-stream"
    ),
    responses(
        (status = 200, description = "Part stored", body = PartReceipt),
        (status = 400, description = "Invalid part"),
        (status = 404, description = "Unknown upload"),
        (status = 409, description = "Upload no longer accepts parts")
    ),
    tag = "uploads"
)]
pub async fn upload_part(
    State(state): State<AppState>,
    Query(params): Query<UploadPartParams>,
    request: Request,
) -> Result<Json<PartReceipt>, AppError> {
    let upload_id = parse_upload_id(&params.upload_id)?;
    let body = read_part_body(&state, request).await?;
    let receipt = state
        .upload_service
        .accept_part(upload_id, params.part_number, body)
        .await?;
    Ok(Json(receipt))
}

#[utoipa::path(
    post,
    path = "/api/files/upload/complete",
    params(CompleteUploadParams),
    request_body = Vec<CompletedPartRequest>,
    responses(
        (status = 200, description = "Object assembled", body = CompleteUploadResponse),
        (status = 400, description = "Invalid part list"),
        (status = 404, description = "Unknown upload"),
        (status = 409, description = "Upload already closed"),
        (status = 503, description = "Assembly failed, retry later")
    ),
    tag = "uploads"
)]
pub async fn complete_upload(
    State(state): State<AppState>,
    Query(params): Query<CompleteUploadParams>,
    Json(parts): Json<Vec<CompletedPartRequest>>,
) -> Result<Json<CompleteUploadResponse>, AppError> {
    let upload_id = parse_upload_id(&params.upload_id)?;

    if let Some(file_name) = &params.file_name {
        let session = state.upload_service.get_session(upload_id).await?;
        if *file_name != session.target_name {
            return Err(UploadError::InvalidArgument(format!(
                "fileName {} does not match upload target {}",
                file_name, session.target_name
            ))
            .into());
        }
    }

    let order: Vec<u32> = parts.iter().map(|p| p.part_number).collect();
    let expected_etags: HashMap<u32, String> = parts
        .into_iter()
        .filter_map(|p| p.etag.map(|etag| (p.part_number, etag)))
        .collect();

    let location = state
        .upload_service
        .complete_with_etags(upload_id, &order, &expected_etags)
        .await?;

    Ok(Json(CompleteUploadResponse {
        file_name: location.key,
        file_size: location.size,
        url: location.url,
        etag: location.etag,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/files/upload/{upload_id}",
    params(("upload_id" = String, Path, description = "Upload session ID")),
    responses(
        (status = 204, description = "Upload aborted"),
        (status = 404, description = "Unknown upload"),
        (status = 409, description = "Upload already completed")
    ),
    tag = "uploads"
)]
pub async fn abort_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let upload_id = parse_upload_id(&upload_id)?;
    state.upload_service.abort(upload_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/files/upload/{upload_id}",
    params(("upload_id" = String, Path, description = "Upload session ID")),
    responses(
        (status = 200, description = "Upload session state", body = UploadSessionResponse),
        (status = 404, description = "Unknown upload")
    ),
    tag = "uploads"
)]
pub async fn get_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Result<Json<UploadSessionResponse>, AppError> {
    let upload_id = parse_upload_id(&upload_id)?;
    let session = state.upload_service.get_session(upload_id).await?;
    Ok(Json(session.into()))
}

#[utoipa::path(
    get,
    path = "/api/files/upload/sessions",
    responses(
        (status = 200, description = "Open and completing uploads", body = Vec<UploadSessionResponse>)
    ),
    tag = "uploads"
)]
pub async fn list_uploads(
    State(state): State<AppState>,
) -> Result<Json<Vec<UploadSessionResponse>>, AppError> {
    let sessions = state.upload_service.list_active_sessions().await?;
    Ok(Json(sessions.into_iter().map(Into::into).collect()))
}
