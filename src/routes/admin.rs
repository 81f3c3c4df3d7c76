use crate::{AppState, handlers::accounts};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Routes open to ADMIN only. The role check happens in each handler through its
/// `policy::endpoints` entry, so USER callers get 403 rather than 404.
///
/// Admin overrides on shared routes (deleting any place or image) live with those routes
/// in the authenticated router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /api/users
        .route("/api/users", get(accounts::list_users))
}
