use crate::{
    AppState,
    handlers::{accounts, places, reference},
};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without credentials. Every path here must also match an entry of
/// `AllowList::standard`, otherwise the gate answers 401 before the handler runs.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for the load balancer.
        .route("/health", get(|| async { "ok" }))
        // --- Identity ---
        .route("/api/auth/register", post(accounts::register))
        .route("/api/auth/login", post(accounts::login))
        .route("/api/auth/refresh", post(accounts::refresh))
        // --- Places (read-only) ---
        .route("/api/places", get(places::get_places))
        .route("/api/places/recent", get(places::get_recent_places))
        .route(
            "/api/places/by-category/{category}",
            get(places::get_places_by_category),
        )
        .route("/api/places/by-type/{type_id}", get(places::get_places_by_type))
        .route("/api/places/{id}", get(places::get_place))
        // --- Reference data ---
        .route("/api/mushroom-types", get(reference::list_mushroom_types))
        .route("/api/mushroom-types/{id}", get(reference::get_mushroom_type))
}
