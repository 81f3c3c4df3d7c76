//! HTTP handlers, grouped by resource. Each handler resolves the addressed resource, asks
//! `policy` whether the caller may act on it, and only then touches storage or the database.

pub mod accounts;
pub mod images;
pub mod places;
pub mod reference;

use std::collections::HashMap;

use axum::extract::Multipart;
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    media::Blob,
    models::{Place, PlaceImage, PlaceResponse},
};

/// read_blobs
///
/// Collects every part named `field` from a multipart body. Other parts are drained and
/// ignored. A part without a filename is still accepted; validation decides what to do
/// with it.
pub(crate) async fn read_blobs(mut multipart: Multipart, field: &str) -> Result<Vec<Blob>, AppError> {
    let mut blobs = Vec::new();

    while let Some(part) = multipart.next_field().await? {
        if part.name() != Some(field) {
            continue;
        }
        let filename = part.file_name().map(str::to_owned);
        let content_type = part.content_type().map(str::to_owned);
        let bytes = part.bytes().await?;

        blobs.push(Blob {
            filename,
            content_type,
            bytes,
        });
    }

    Ok(blobs)
}

/// Exactly one part named `field`.
pub(crate) async fn read_single_blob(multipart: Multipart, field: &str) -> Result<Blob, AppError> {
    let mut blobs = read_blobs(multipart, field).await?;
    match blobs.len() {
        1 => Ok(blobs.remove(0)),
        0 => Err(AppError::Validation(format!("missing `{}` part", field))),
        n => Err(AppError::Validation(format!(
            "expected one `{}` part, got {}",
            field, n
        ))),
    }
}

/// Attaches images to a listing with one image query for all places.
pub(crate) async fn place_responses(
    state: &AppState,
    places: Vec<Place>,
) -> Result<Vec<PlaceResponse>, AppError> {
    let ids: Vec<Uuid> = places.iter().map(|p| p.id).collect();
    let mut by_place: HashMap<Uuid, Vec<PlaceImage>> = HashMap::new();
    for image in state.repo.images_for_places(&ids).await? {
        by_place.entry(image.place_id).or_default().push(image);
    }

    Ok(places
        .into_iter()
        .map(|place| {
            let images = by_place.remove(&place.id).unwrap_or_default();
            PlaceResponse::new(place, &images)
        })
        .collect())
}

pub(crate) async fn place_response(state: &AppState, place: Place) -> Result<PlaceResponse, AppError> {
    let images = state.repo.place_images(place.id).await?;
    Ok(PlaceResponse::new(place, &images))
}
