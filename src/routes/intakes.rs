//! Registration wizard endpoints.
//!
//! Everything here operates on an in-memory draft; nothing touches the
//! record collection until `finish`. Photo and document bytes go straight
//! into media storage and only their keys travel on the draft.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::ShopSession,
    capture::CameraStream,
    error::{AppError, AppResult},
    jobs::{enqueue_job, JOB_EXTRACT_DOCUMENT, JOB_RECOGNIZE_PLATE},
    media::checksum,
    models::{DocumentRef, IntakeRecord, PhotoRecord},
    state::AppState,
    store::FinishError,
    wizard::{DocumentKind, Draft, DraftView, WizardError},
};

pub async fn open_draft(
    session: ShopSession,
    State(state): State<AppState>,
) -> AppResult<(StatusCode, Json<DraftView>)> {
    let shop = state
        .catalog
        .shop(&session.shop_id)
        .cloned()
        .ok_or_else(|| AppError::bad_request(format!("unknown center '{}'", session.shop_id)))?;

    let draft = Draft::new(shop);
    let view = draft.view();
    info!(draft_id = %draft.id, shop_id = %session.shop_id, "registration draft opened");
    state.store.insert_draft(draft).await;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_draft(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DraftView>> {
    let view = state
        .store
        .with_draft(id, |draft| draft.view())
        .await
        .ok_or_else(AppError::not_found)?;
    Ok(Json(view))
}

/// Discards a draft: stops any open camera stream and deletes the media
/// objects it accumulated. Records are never touched.
pub async fn abort_draft(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut draft = state
        .store
        .take_draft(id)
        .await
        .ok_or_else(AppError::not_found)?;

    if let Some(mut stream) = draft.take_camera() {
        stream.stop();
    }

    let mut keys: Vec<String> = draft
        .photos
        .iter()
        .map(|photo| photo.media_key.clone())
        .collect();
    if let Some(document) = &draft.technical_sheet {
        keys.push(document.media_key.clone());
    }
    if let crate::wizard::PolicyState::Attached(document) = &draft.policy {
        keys.push(document.media_key.clone());
    }

    for key in keys {
        if let Err(err) = state.media.delete_object(&key).await {
            warn!(error = %err, key = %key, "failed to delete draft media");
        }
    }

    info!(draft_id = %id, "registration draft aborted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_photo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<DraftView>)> {
    let upload = read_file_field(multipart).await?;
    if upload.bytes.is_empty() {
        return Err(AppError::bad_request("uploaded photo is empty"));
    }

    let photo = build_photo(&state, id, &upload).await?;
    attach_photo(&state, id, photo).await
}

pub async fn delete_photo(
    State(state): State<AppState>,
    Path((id, photo_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<DraftView>> {
    let (removed, view) = state
        .store
        .with_draft(id, |draft| {
            draft
                .remove_photo(photo_id)
                .map(|photo| (photo, draft.view()))
        })
        .await
        .ok_or_else(AppError::not_found)??;

    if let Err(err) = state.media.delete_object(&removed.media_key).await {
        warn!(error = %err, key = %removed.media_key, "failed to delete photo media");
    }

    Ok(Json(view))
}

#[derive(Deserialize)]
pub struct SetFrontalRequest {
    pub index: usize,
}

/// Re-selects the frontal photo and queues a fresh recognition pass for it.
pub async fn set_frontal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetFrontalRequest>,
) -> AppResult<Json<DraftView>> {
    let (photo_id, media_key, view) = state
        .store
        .with_draft(id, |draft| {
            draft.set_frontal(request.index).map(|photo_id| {
                let media_key = draft.photos[request.index].media_key.clone();
                (photo_id, media_key, draft.view())
            })
        })
        .await
        .ok_or_else(AppError::not_found)??;

    enqueue_recognition(&state, id, photo_id, &media_key).await;
    Ok(Json(view))
}

pub async fn camera_start(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DraftView>> {
    let device = state
        .camera
        .clone()
        .ok_or_else(|| AppError::unavailable("no camera attached to this terminal"))?;

    let stream = device
        .acquire()
        .await
        .map_err(|err| AppError::unavailable(format!("failed to start camera: {err}")))?;

    // The closure only runs when the draft still exists; the slot lets us
    // recover the stream and stop it when it does not.
    let mut slot = Some(stream);
    let result = state
        .store
        .with_draft(id, |draft| {
            let previous = slot.take().and_then(|stream| draft.attach_camera(stream));
            (previous, draft.view())
        })
        .await;

    if let Some(mut stream) = slot {
        stream.stop();
    }

    let (previous, view) = result.ok_or_else(AppError::not_found)?;
    if let Some(mut stream) = previous {
        stream.stop();
    }

    Ok(Json(view))
}

/// Grabs one frame from the draft's open camera stream and files it as a
/// photo, exactly like an upload.
pub async fn camera_capture(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<DraftView>)> {
    let stream = state
        .store
        .with_draft(id, |draft| draft.take_camera())
        .await
        .ok_or_else(AppError::not_found)?;
    let mut stream = stream.ok_or_else(|| AppError::bad_request("camera is not started"))?;

    let frame = match stream.grab_frame().await {
        Ok(frame) => frame,
        Err(err) => {
            reattach_camera(&state, id, stream).await;
            return Err(AppError::unavailable(format!(
                "failed to capture frame: {err}"
            )));
        }
    };
    reattach_camera(&state, id, stream).await;

    let content_type = image::guess_format(&frame)
        .ok()
        .map(|format| format.to_mime_type().to_string());
    let upload = FileUpload {
        bytes: frame,
        original_name: None,
        content_type,
    };

    let photo = build_photo(&state, id, &upload).await?;
    attach_photo(&state, id, photo).await
}

pub async fn camera_stop(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let stream = state
        .store
        .with_draft(id, |draft| draft.take_camera())
        .await
        .ok_or_else(AppError::not_found)?;

    if let Some(mut stream) = stream {
        stream.stop();
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_document(
    State(state): State<AppState>,
    Path((id, kind)): Path<(Uuid, String)>,
    multipart: Multipart,
) -> AppResult<Json<DraftView>> {
    let kind: DocumentKind = kind.parse().map_err(AppError::bad_request)?;
    let upload = read_file_field(multipart).await?;
    if upload.bytes.is_empty() {
        return Err(AppError::bad_request("uploaded document is empty"));
    }

    let media_key = format!("drafts/{id}/documents/{kind}");
    let document = DocumentRef {
        media_key: media_key.clone(),
        original_name: upload
            .original_name
            .clone()
            .unwrap_or_else(|| kind.as_str().to_string()),
        content_type: upload.content_type.clone(),
        size_bytes: upload.bytes.len() as u64,
        checksum: checksum(&upload.bytes),
        uploaded_at: Utc::now(),
    };

    state
        .media
        .put_object(&media_key, upload.bytes, upload.content_type)
        .await
        .map_err(AppError::internal)?;

    let view = state
        .store
        .with_draft(id, |draft| {
            draft.attach_document(kind, document);
            draft.view()
        })
        .await;

    let Some(view) = view else {
        if let Err(err) = state.media.delete_object(&media_key).await {
            warn!(error = %err, key = %media_key, "failed to delete orphaned document");
        }
        return Err(AppError::not_found());
    };

    enqueue_job(
        &state.store,
        JOB_EXTRACT_DOCUMENT,
        json!({ "draft_id": id, "kind": kind.as_str() }),
        None,
    )
    .await;
    info!(draft_id = %id, kind = %kind, "document uploaded; extraction queued");

    Ok(Json(view))
}

pub async fn skip_policy(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DraftView>> {
    let require_policy = state.config.require_policy;
    let view = state
        .store
        .with_draft(id, |draft| {
            draft.skip_policy(require_policy).map(|_| draft.view())
        })
        .await
        .ok_or_else(AppError::not_found)??;
    Ok(Json(view))
}

#[derive(Deserialize)]
pub struct UpdateDraftRequest {
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub vehicle_make: Option<String>,
    #[serde(default)]
    pub vehicle_model: Option<String>,
    #[serde(default)]
    pub vehicle_year: Option<i32>,
    #[serde(default)]
    pub vehicle_color: Option<String>,
    #[serde(default)]
    pub vehicle_chassis: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub plate: Option<String>,
}

/// Writes customer/vehicle details onto the draft. Only fields present in
/// the body are touched; a blank string clears the field. A plate entered
/// here is validated and overrides any recognition result.
pub async fn update_draft(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateDraftRequest>,
) -> AppResult<Json<DraftView>> {
    if let Some(service) = request.service.as_deref().map(str::trim) {
        if !service.is_empty() && !state.catalog.services.iter().any(|s| s == service) {
            return Err(AppError::bad_request(format!("unknown service '{service}'")));
        }
    }

    let view = state
        .store
        .with_draft(id, move |draft| {
            if let Some(plate) = request.plate.as_deref() {
                draft.set_manual_plate(plate)?;
            }
            if let Some(value) = request.customer_name {
                draft.customer_name = clean(value);
            }
            if let Some(value) = request.customer_phone {
                draft.customer_phone = clean(value);
            }
            if let Some(value) = request.customer_email {
                draft.customer_email = clean(value);
            }
            if let Some(value) = request.vehicle_make {
                draft.vehicle_make = clean(value);
            }
            if let Some(value) = request.vehicle_model {
                draft.vehicle_model = clean(value);
            }
            if let Some(value) = request.vehicle_year {
                draft.vehicle_year = Some(value);
            }
            if let Some(value) = request.vehicle_color {
                draft.vehicle_color = clean(value);
            }
            if let Some(value) = request.vehicle_chassis {
                draft.vehicle_chassis = clean(value);
            }
            if let Some(value) = request.service {
                draft.service = clean(value);
            }
            Ok::<_, WizardError>(draft.view())
        })
        .await
        .ok_or_else(AppError::not_found)??;

    Ok(Json(view))
}

pub async fn advance_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DraftView>> {
    let view = state
        .store
        .with_draft(id, |draft| draft.advance().map(|_| draft.view()))
        .await
        .ok_or_else(AppError::not_found)??;
    Ok(Json(view))
}

pub async fn back_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DraftView>> {
    let view = state
        .store
        .with_draft(id, |draft| draft.back().map(|_| draft.view()))
        .await
        .ok_or_else(AppError::not_found)??;
    Ok(Json(view))
}

pub async fn finish(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<IntakeRecord>)> {
    match state
        .store
        .finish_draft(id, state.config.require_policy)
        .await
    {
        Ok(record) => {
            info!(record_id = %record.id, shop_id = %record.shop.id, "intake record registered");
            Ok((StatusCode::CREATED, Json(record)))
        }
        Err(FinishError::DraftNotFound) => Err(AppError::not_found()),
        Err(FinishError::Wizard(err)) => Err(err.into()),
    }
}

struct FileUpload {
    bytes: Vec<u8>,
    original_name: Option<String>,
    content_type: Option<String>,
}

async fn read_file_field(mut multipart: Multipart) -> Result<FileUpload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart body: {err}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(str::to_owned).or_else(|| {
            original_name
                .as_deref()
                .and_then(|name| mime_guess::from_path(name).first())
                .map(|mime| mime.to_string())
        });
        let bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::bad_request(format!("failed to read upload: {err}")))?
            .to_vec();
        return Ok(FileUpload {
            bytes,
            original_name,
            content_type,
        });
    }
    Err(AppError::bad_request("multipart field 'file' is required"))
}

/// Stores the bytes and builds the photo metadata. Image dimensions are best
/// effort; a photo the decoder cannot parse is still accepted.
async fn build_photo(state: &AppState, draft_id: Uuid, upload: &FileUpload) -> AppResult<PhotoRecord> {
    let photo_id = Uuid::new_v4();
    let media_key = format!("drafts/{draft_id}/photos/{photo_id}");

    let dimensions = image::load_from_memory(&upload.bytes)
        .ok()
        .map(|decoded| (decoded.width(), decoded.height()));

    state
        .media
        .put_object(
            &media_key,
            upload.bytes.clone(),
            upload.content_type.clone(),
        )
        .await
        .map_err(AppError::internal)?;

    Ok(PhotoRecord {
        id: photo_id,
        media_key,
        original_name: upload.original_name.clone(),
        content_type: upload.content_type.clone(),
        size_bytes: upload.bytes.len() as u64,
        checksum: checksum(&upload.bytes),
        width: dimensions.map(|(w, _)| w),
        height: dimensions.map(|(_, h)| h),
        captured_at: Utc::now(),
    })
}

/// Appends the photo to the draft and queues recognition when it became the
/// frontal one. Cleans up the stored object when the draft is gone.
async fn attach_photo(
    state: &AppState,
    draft_id: Uuid,
    photo: PhotoRecord,
) -> AppResult<(StatusCode, Json<DraftView>)> {
    let media_key = photo.media_key.clone();
    let result = state
        .store
        .with_draft(draft_id, move |draft| {
            let trigger = draft.add_photo(photo);
            (trigger, draft.view())
        })
        .await;

    let Some((trigger, view)) = result else {
        if let Err(err) = state.media.delete_object(&media_key).await {
            warn!(error = %err, key = %media_key, "failed to delete orphaned photo");
        }
        return Err(AppError::not_found());
    };

    if let Some(photo_id) = trigger {
        enqueue_recognition(state, draft_id, photo_id, &media_key).await;
    }

    Ok((StatusCode::CREATED, Json(view)))
}

/// Hands a stream back to the draft after a capture. When the draft was
/// aborted in the meantime the stream is stopped instead of leaked.
async fn reattach_camera(state: &AppState, draft_id: Uuid, stream: Box<dyn CameraStream>) {
    let mut slot = Some(stream);
    state
        .store
        .with_draft(draft_id, |draft| {
            if let Some(stream) = slot.take() {
                if let Some(mut raced) = draft.attach_camera(stream) {
                    raced.stop();
                }
            }
        })
        .await;

    if let Some(mut stream) = slot {
        stream.stop();
    }
}

async fn enqueue_recognition(state: &AppState, draft_id: Uuid, photo_id: Uuid, media_key: &str) {
    enqueue_job(
        &state.store,
        JOB_RECOGNIZE_PLATE,
        json!({
            "draft_id": draft_id,
            "photo_id": photo_id,
            "media_key": media_key,
        }),
        None,
    )
    .await;
    info!(draft_id = %draft_id, photo_id = %photo_id, "plate recognition queued");
}

fn clean(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
