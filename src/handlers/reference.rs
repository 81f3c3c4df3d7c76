use axum::{
    Json,
    extract::{Path, State},
};

use crate::{AppState, error::AppError, models::MushroomType};

#[utoipa::path(
    get,
    path = "/api/mushroom-types",
    responses((status = 200, description = "Mushroom types", body = [MushroomType]))
)]
pub async fn list_mushroom_types(
    State(state): State<AppState>,
) -> Result<Json<Vec<MushroomType>>, AppError> {
    Ok(Json(state.repo.list_mushroom_types().await?))
}

#[utoipa::path(
    get,
    path = "/api/mushroom-types/{id}",
    params(("id" = i64, Path, description = "Mushroom type ID")),
    responses(
        (status = 200, description = "Mushroom type", body = MushroomType),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_mushroom_type(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MushroomType>, AppError> {
    state
        .repo
        .get_mushroom_type(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("mushroom type {}", id)))
}
