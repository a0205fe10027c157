// handlers/protected/protocols.rs - /api/protocols

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{Datelike, Local};
use serde::Deserialize;

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::registry::{
    export, query, DeletionReport, FilingReceipt, FilingRequest, ListFilter, ProtocolDetail, Register, ReplaceReceipt,
    ReplaceRequest,
};
use crate::state::AppState;
use crate::types::ProtocolType;

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub year: Option<i32>,
    #[serde(alias = "type")]
    pub protocol_type: Option<ProtocolType>,
}

/// POST /api/protocols - allocate a number, stamp, upload and record a document
pub async fn protocol_create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(mut request): Json<FilingRequest>,
) -> ApiResult<FilingReceipt> {
    request.filed_by = Some(user.username);
    let receipt = state.registry.file(request).await?;
    Ok(ApiResponse::created(receipt))
}

/// GET /api/protocols?year&type&search
pub async fn protocol_list(
    State(state): State<AppState>,
    Query(filter): Query<ListFilter>,
) -> ApiResult<Register> {
    let year = filter.year.unwrap_or_else(|| Local::now().year());
    let register = query::list(&state.pool, year, &filter).await?;
    Ok(ApiResponse::success(register))
}

/// GET /api/protocols/:id
pub async fn protocol_get(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<ProtocolDetail> {
    Ok(ApiResponse::success(query::get(&state.pool, id).await?))
}

/// DELETE /api/protocols/:id - administrators only
pub async fn protocol_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<DeletionReport> {
    user.require_admin()?;
    let report = state.registry.delete_protocol(id, &user.username).await?;
    Ok(ApiResponse::success(report))
}

/// PUT /api/protocols/:id/document - new artifact, same protocol number
pub async fn protocol_replace_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(mut request): Json<ReplaceRequest>,
) -> ApiResult<ReplaceReceipt> {
    request.replaced_by = Some(user.username);
    let receipt = state.registry.replace_document(id, request).await?;
    Ok(ApiResponse::success(receipt))
}

/// GET /api/protocols/export?year&type - register as CSV
pub async fn protocol_export(
    State(state): State<AppState>,
    Query(params): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let today = Local::now().date_naive();
    let year = params.year.unwrap_or_else(|| today.year());

    let rows = export::rows(&state.pool, year, params.protocol_type).await?;
    if rows.is_empty() {
        return Err(ApiError::not_found("No protocols match the export criteria"));
    }
    let body = export::to_csv(&rows).map_err(|e| {
        tracing::error!("CSV export failed: {}", e);
        ApiError::internal_server_error("Could not build the export")
    })?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        export::file_name(year, params.protocol_type, today)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    )
        .into_response())
}
