use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    AppState,
    auth::SecurityContext,
    error::AppError,
    handlers::{place_response, place_responses},
    models::{EdibilityCategory, PlaceFilter, PlaceRequest, PlaceResponse},
    policy::endpoints,
};

/// RecentQuery
///
/// Query parameters of `GET /api/places/recent`.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct RecentQuery {
    /// How many places to return, 1 to 100. Defaults to 10.
    pub limit: Option<i64>,
}

async fn require_mushroom_type(state: &AppState, type_id: Option<i64>) -> Result<(), AppError> {
    if let Some(id) = type_id {
        if state.repo.get_mushroom_type(id).await?.is_none() {
            return Err(AppError::NotFound(format!("mushroom type {}", id)));
        }
    }
    Ok(())
}

/// get_places
///
/// [Public Route] Every place, newest first.
#[utoipa::path(
    get,
    path = "/api/places",
    responses((status = 200, description = "All places", body = [PlaceResponse]))
)]
pub async fn get_places(State(state): State<AppState>) -> Result<Json<Vec<PlaceResponse>>, AppError> {
    let places = state.repo.list_places(PlaceFilter::All).await?;
    Ok(Json(place_responses(&state, places).await?))
}

#[utoipa::path(
    get,
    path = "/api/places/recent",
    params(RecentQuery),
    responses((status = 200, description = "Most recent places", body = [PlaceResponse]))
)]
pub async fn get_recent_places(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<PlaceResponse>>, AppError> {
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let places = state.repo.list_places(PlaceFilter::Recent(limit)).await?;
    Ok(Json(place_responses(&state, places).await?))
}

#[utoipa::path(
    get,
    path = "/api/places/by-category/{category}",
    params(("category" = EdibilityCategory, Path, description = "EDIBLE, CONDITIONALLY_EDIBLE or POISONOUS")),
    responses((status = 200, description = "Places by edibility", body = [PlaceResponse]))
)]
pub async fn get_places_by_category(
    State(state): State<AppState>,
    Path(category): Path<EdibilityCategory>,
) -> Result<Json<Vec<PlaceResponse>>, AppError> {
    let places = state.repo.list_places(PlaceFilter::Category(category)).await?;
    Ok(Json(place_responses(&state, places).await?))
}

#[utoipa::path(
    get,
    path = "/api/places/by-type/{type_id}",
    params(("type_id" = i64, Path, description = "Mushroom type ID")),
    responses((status = 200, description = "Places by mushroom type", body = [PlaceResponse]))
)]
pub async fn get_places_by_type(
    State(state): State<AppState>,
    Path(type_id): Path<i64>,
) -> Result<Json<Vec<PlaceResponse>>, AppError> {
    let places = state
        .repo
        .list_places(PlaceFilter::MushroomType(type_id))
        .await?;
    Ok(Json(place_responses(&state, places).await?))
}

#[utoipa::path(
    get,
    path = "/api/places/{id}",
    params(("id" = Uuid, Path, description = "Place ID")),
    responses(
        (status = 200, description = "Place details", body = PlaceResponse),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_place(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PlaceResponse>, AppError> {
    let place = state
        .repo
        .get_place(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("place {}", id)))?;
    Ok(Json(place_response(&state, place).await?))
}

/// get_my_places
///
/// [Authenticated Route] Places owned by the caller. Shares its prefix with the public
/// place routes and is carved out of the allow-list explicitly.
#[utoipa::path(
    get,
    path = "/api/places/my",
    responses(
        (status = 200, description = "My places", body = [PlaceResponse]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_my_places(
    ctx: SecurityContext,
    State(state): State<AppState>,
) -> Result<Json<Vec<PlaceResponse>>, AppError> {
    endpoints::VIEW_OWN.authorize(&ctx)?;
    let owner_id = ctx.identity().ok_or(AppError::Unauthenticated)?.id;
    let places = state.repo.list_places(PlaceFilter::Owner(owner_id)).await?;
    Ok(Json(place_responses(&state, places).await?))
}

/// create_place
///
/// [Authenticated Route] Creates a place owned by the caller.
///
/// Images listed in `tempImageUrls` are moved from the caller's temp area under the new
/// place. The quota is checked before the place is written. A temp image that cannot be
/// moved is logged and left out; the place itself is kept.
#[utoipa::path(
    post,
    path = "/api/places",
    request_body = PlaceRequest,
    responses(
        (status = 201, description = "Created", body = PlaceResponse),
        (status = 404, description = "Unknown mushroom type"),
        (status = 422, description = "Invalid payload or too many images")
    )
)]
pub async fn create_place(
    ctx: SecurityContext,
    State(state): State<AppState>,
    Json(payload): Json<PlaceRequest>,
) -> Result<(StatusCode, Json<PlaceResponse>), AppError> {
    // 1. Authorization
    endpoints::CREATE_PLACE.authorize(&ctx)?;
    let owner_id = ctx.identity().ok_or(AppError::Unauthenticated)?.id;

    // 2. Payload checks, before anything is written
    payload.validate()?;
    require_mushroom_type(&state, payload.mushroom_type_id).await?;
    if !payload.temp_image_urls.is_empty() {
        state.media.check_quota(payload.temp_image_urls.len(), 0)?;
    }

    // 3. Persist
    let place = state.repo.create_place(owner_id, &payload).await?;
    tracing::info!("Place {} created by {}", place.id, owner_id);

    // 4. Attach temp images
    for temp_url in &payload.temp_image_urls {
        let object = match state
            .media
            .move_temp_to_place(temp_url, owner_id, place.id)
            .await
        {
            Ok(object) => object,
            Err(e) => {
                tracing::warn!("Temp image {} not attached to {}: {}", temp_url, place.id, e);
                continue;
            }
        };
        if let Err(e) = state.repo.add_place_image(place.id, &object).await {
            tracing::error!("Recording moved image {} failed: {}", object.key, e);
            state.media.delete(&object.url).await;
        }
    }

    Ok((StatusCode::CREATED, Json(place_response(&state, place).await?)))
}

/// update_place
///
/// [Authenticated Route] Owner only: an ADMIN cannot edit someone else's place.
#[utoipa::path(
    put,
    path = "/api/places/{id}",
    params(("id" = Uuid, Path, description = "Place ID")),
    request_body = PlaceRequest,
    responses(
        (status = 200, description = "Updated", body = PlaceResponse),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_place(
    ctx: SecurityContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PlaceRequest>,
) -> Result<Json<PlaceResponse>, AppError> {
    let existing = state.repo.get_place(id).await?;
    endpoints::UPDATE_PLACE.authorize_resource(
        &ctx,
        existing.map(|p| p.owner_id),
        &format!("place {}", id),
    )?;

    payload.validate()?;
    require_mushroom_type(&state, payload.mushroom_type_id).await?;

    let place = state
        .repo
        .update_place(id, &payload)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("place {}", id)))?;
    Ok(Json(place_response(&state, place).await?))
}

/// delete_place
///
/// [Authenticated Route] Owner, or ADMIN. The record goes first; stored images are then
/// deleted best-effort, so a store outage can leave orphaned objects but never a place
/// pointing at deleted ones.
#[utoipa::path(
    delete,
    path = "/api/places/{id}",
    params(("id" = Uuid, Path, description = "Place ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_place(
    ctx: SecurityContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let existing = state.repo.get_place(id).await?;
    endpoints::DELETE_PLACE.authorize_resource(
        &ctx,
        existing.map(|p| p.owner_id),
        &format!("place {}", id),
    )?;

    let images = state.repo.place_images(id).await?;
    if !state.repo.delete_place(id).await? {
        return Err(AppError::NotFound(format!("place {}", id)));
    }

    for image in &images {
        state.media.delete(&image.url).await;
    }

    tracing::info!("Place {} deleted with {} images", id, images.len());
    Ok(StatusCode::NO_CONTENT)
}
