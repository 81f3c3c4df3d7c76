use crate::{
    AppState,
    handlers::{accounts, images, places},
};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Authenticated Router Module
///
/// Routes open to USER and ADMIN. The gate guarantees an authenticated `SecurityContext`
/// by the time a handler runs; ownership is then decided per handler through `policy`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /api/me
        .route("/api/me", get(accounts::get_me))
        // GET /api/places/my
        // Static segment, so it wins over the public `/api/places/{id}` route.
        .route("/api/places/my", get(places::get_my_places))
        // --- Place lifecycle ---
        .route("/api/places", post(places::create_place))
        // PUT is owner only, DELETE also admits ADMIN.
        .route(
            "/api/places/{id}",
            put(places::update_place).delete(places::delete_place),
        )
        // --- Media ---
        // POST /api/places/{id}/images (part `file`)
        .route("/api/places/{id}/images", post(images::upload_place_image))
        // POST /api/places/{id}/images/batch (parts `files`)
        .route(
            "/api/places/{id}/images/batch",
            post(images::upload_place_images),
        )
        .route(
            "/api/places/{id}/images/{image_id}",
            delete(images::delete_place_image),
        )
        // POST /api/uploads/temp
        // Images uploaded ahead of place creation.
        .route("/api/uploads/temp", post(images::upload_temp_image))
}
