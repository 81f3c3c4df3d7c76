use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::SecurityContext,
    error::AppError,
    handlers::{read_blobs, read_single_blob},
    media::{FailureReason, ItemFailure, MediaObject, Namespace, UploadStage},
    models::{BatchUploadResponse, ImageResponse, PlaceImage, TempUploadResponse},
    policy::endpoints,
};

/// Writes the image row for a stored object. When the row cannot be written the object
/// is deleted again so nothing in the store is left unreferenced.
async fn record_image(
    state: &AppState,
    place_id: Uuid,
    object: &MediaObject,
) -> Result<PlaceImage, AppError> {
    match state.repo.add_place_image(place_id, object).await {
        Ok(image) => {
            tracing::debug!(stage = ?UploadStage::Recorded, key = %object.key);
            Ok(image)
        }
        Err(e) => {
            tracing::error!("Recording {} failed, removing blob: {}", object.key, e);
            state.media.delete(&object.url).await;
            Err(e)
        }
    }
}

/// Ownership of the place, checked before the body is read.
async fn authorize_place_upload(
    ctx: &SecurityContext,
    state: &AppState,
    place_id: Uuid,
) -> Result<(), AppError> {
    let place = state.repo.get_place(place_id).await?;
    endpoints::UPLOAD_PLACE_IMAGES.authorize_resource(
        ctx,
        place.map(|p| p.owner_id),
        &format!("place {}", place_id),
    )
}

/// upload_place_image
///
/// [Authenticated Route] One image, multipart part `file`. Owner only.
#[utoipa::path(
    post,
    path = "/api/places/{id}/images",
    params(("id" = Uuid, Path, description = "Place ID")),
    responses(
        (status = 201, description = "Stored", body = ImageResponse),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found"),
        (status = 422, description = "Rejected file or image limit reached"),
        (status = 502, description = "Object store failure")
    )
)]
pub async fn upload_place_image(
    ctx: SecurityContext,
    State(state): State<AppState>,
    Path(place_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ImageResponse>), AppError> {
    authorize_place_upload(&ctx, &state, place_id).await?;

    let blob = read_single_blob(multipart, "file").await?;
    let existing = state.repo.count_place_images(place_id).await?;
    state.media.check_quota(1, existing)?;

    let object = state
        .media
        .upload_one(&blob, Namespace::Places, place_id)
        .await?;
    let image = record_image(&state, place_id, &object).await?;

    Ok((StatusCode::CREATED, Json(ImageResponse::from(&image))))
}

/// upload_place_images
///
/// [Authenticated Route] Up to the batch ceiling of images, multipart parts `files`.
///
/// Each file is handled on its own: failures are listed by zero-based index and do not
/// stop the others. Answers 200 as long as one file was stored and recorded.
#[utoipa::path(
    post,
    path = "/api/places/{id}/images/batch",
    params(("id" = Uuid, Path, description = "Place ID")),
    responses(
        (status = 200, description = "At least one image stored", body = BatchUploadResponse),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found"),
        (status = 422, description = "Batch rejected, or every file invalid"),
        (status = 502, description = "Every file failed in the object store")
    )
)]
pub async fn upload_place_images(
    ctx: SecurityContext,
    State(state): State<AppState>,
    Path(place_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<BatchUploadResponse>, AppError> {
    authorize_place_upload(&ctx, &state, place_id).await?;

    let blobs = read_blobs(multipart, "files").await?;
    let existing = state.repo.count_place_images(place_id).await?;
    let outcome = state
        .media
        .upload_batch(blobs, place_id, existing)
        .await?;

    let mut succeeded = Vec::with_capacity(outcome.succeeded.len());
    let mut failed = outcome.failed;

    for item in outcome.succeeded {
        match record_image(&state, place_id, &item.object).await {
            Ok(image) => succeeded.push(ImageResponse::from(&image)),
            Err(_) => failed.push(ItemFailure {
                index: item.index,
                filename: item.filename,
                reason: FailureReason::RecordFailed,
                message: "image could not be saved".to_string(),
            }),
        }
    }
    failed.sort_by_key(|f| f.index);

    if succeeded.is_empty() {
        return Err(AppError::UploadFailed { failed });
    }

    Ok(Json(BatchUploadResponse {
        succeeded,
        failed,
        total: outcome.total,
    }))
}

/// delete_place_image
///
/// [Authenticated Route] Owner of the place, or ADMIN. The row is removed first and the
/// blob best-effort afterwards.
#[utoipa::path(
    delete,
    path = "/api/places/{id}/images/{image_id}",
    params(
        ("id" = Uuid, Path, description = "Place ID"),
        ("image_id" = Uuid, Path, description = "Image ID")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_place_image(
    ctx: SecurityContext,
    State(state): State<AppState>,
    Path((place_id, image_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let place = state.repo.get_place(place_id).await?;
    let image = state
        .repo
        .get_place_image(image_id)
        .await?
        .filter(|image| image.place_id == place_id);

    // An image that exists under another place is just as absent as a missing one.
    let owner_id = place.zip(image.as_ref()).map(|(p, _)| p.owner_id);
    endpoints::DELETE_PLACE_IMAGE.authorize_resource(
        &ctx,
        owner_id,
        &format!("image {} of place {}", image_id, place_id),
    )?;

    let Some(image) = image else {
        return Err(AppError::NotFound(format!("image {}", image_id)));
    };
    if !state.repo.delete_place_image(image.id).await? {
        return Err(AppError::NotFound(format!("image {}", image_id)));
    }
    state.media.delete(&image.url).await;

    Ok(StatusCode::NO_CONTENT)
}

/// upload_temp_image
///
/// [Authenticated Route] Stores an image before its place exists, under the caller's
/// temp area. The returned URL goes into `tempImageUrls` when the place is created.
#[utoipa::path(
    post,
    path = "/api/uploads/temp",
    responses(
        (status = 201, description = "Stored", body = TempUploadResponse),
        (status = 422, description = "Rejected file"),
        (status = 502, description = "Object store failure")
    )
)]
pub async fn upload_temp_image(
    ctx: SecurityContext,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<TempUploadResponse>), AppError> {
    endpoints::UPLOAD_TEMP_IMAGE.authorize(&ctx)?;
    let uploader_id = ctx.identity().ok_or(AppError::Unauthenticated)?.id;

    let blob = read_single_blob(multipart, "file").await?;
    let object = state.media.upload_temp_image(&blob, uploader_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(TempUploadResponse {
            url: object.url,
            key: object.key,
        }),
    ))
}
