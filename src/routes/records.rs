use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{IntakeRecord, IntakeStatus},
    state::AppState,
};

#[derive(Deserialize)]
pub struct RecordQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub shop: Option<String>,
    #[serde(default)]
    pub status: Option<IntakeStatus>,
}

/// Searches the record collection. All supplied filters must match; with no
/// filters the whole collection comes back in registration order.
pub async fn list_records(
    State(state): State<AppState>,
    Query(query): Query<RecordQuery>,
) -> Json<Vec<IntakeRecord>> {
    let needle = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_lowercase);

    let records = state
        .store
        .records()
        .await
        .into_iter()
        .filter(|record| matches(record, needle.as_deref(), &query))
        .collect();
    Json(records)
}

fn matches(record: &IntakeRecord, needle: Option<&str>, query: &RecordQuery) -> bool {
    if let Some(needle) = needle {
        let plate_hit = record
            .plate
            .as_deref()
            .is_some_and(|plate| plate.to_lowercase().contains(needle));
        let name_hit = record.customer.name.to_lowercase().contains(needle);
        let id_hit = record.id.to_lowercase().contains(needle);
        if !(plate_hit || name_hit || id_hit) {
            return false;
        }
    }
    if let Some(shop) = query.shop.as_deref() {
        if record.shop.id != shop {
            return false;
        }
    }
    if let Some(status) = query.status {
        if record.status != status {
            return false;
        }
    }
    true
}

pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<IntakeRecord>> {
    let record = state.store.record(&id).await.ok_or_else(AppError::not_found)?;
    Ok(Json(record))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: IntakeStatus,
}

/// Writes a new workflow status. Any status can follow any other; clerks
/// correct mistakes by moving records freely.
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> AppResult<Json<IntakeRecord>> {
    let record = state
        .store
        .update_status(&id, request.status)
        .await
        .ok_or_else(AppError::not_found)?;
    info!(record_id = %record.id, status = %record.status, "record status updated");
    Ok(Json(record))
}

pub async fn download_photo(
    State(state): State<AppState>,
    Path((id, photo_id)): Path<(String, Uuid)>,
) -> AppResult<impl IntoResponse> {
    let record = state.store.record(&id).await.ok_or_else(AppError::not_found)?;
    let photo = record
        .photos
        .iter()
        .find(|photo| photo.id == photo_id)
        .ok_or_else(AppError::not_found)?;

    let bytes = state
        .media
        .get_object(&photo.media_key)
        .await
        .map_err(AppError::internal)?;
    let content_type = photo
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}
