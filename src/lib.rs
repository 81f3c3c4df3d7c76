use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderName,
    middleware,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod media;
pub mod models;
pub mod password;
pub mod policy;
pub mod repository;
pub mod storage;
pub mod token;

pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use auth::{AllowList, SecurityContext};
pub use config::{AppConfig, ConfigError};
pub use error::AppError;
pub use media::MediaPipeline;
pub use repository::{PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};
pub use token::TokenService;

/// ApiDoc
///
/// OpenAPI document for every routed handler, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::accounts::register, handlers::accounts::login, handlers::accounts::refresh,
        handlers::accounts::get_me, handlers::accounts::list_users,
        handlers::places::get_places, handlers::places::get_recent_places,
        handlers::places::get_places_by_category, handlers::places::get_places_by_type,
        handlers::places::get_place, handlers::places::get_my_places,
        handlers::places::create_place, handlers::places::update_place,
        handlers::places::delete_place,
        handlers::images::upload_place_image, handlers::images::upload_place_images,
        handlers::images::delete_place_image, handlers::images::upload_temp_image,
        handlers::reference::list_mushroom_types, handlers::reference::get_mushroom_type
    ),
    components(
        schemas(
            models::Role, models::EdibilityCategory, models::MushroomType,
            models::RegisterRequest, models::LoginRequest, models::RefreshRequest,
            models::AuthResponse, models::UserSummary, models::PlaceRequest,
            models::PlaceResponse, models::ImageResponse, models::BatchUploadResponse,
            models::TempUploadResponse, media::ItemFailure, media::FailureReason,
        )
    ),
    tags(
        (name = "forest-places", description = "Mushroom foraging places API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared state. Everything in it is immutable after start-up.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub media: Arc<MediaPipeline>,
    pub tokens: Arc<TokenService>,
    /// Routes the gate lets through without credentials.
    pub public_routes: Arc<AllowList>,
    pub config: AppConfig,
}

impl AppState {
    /// Wires the services from one configuration. Fails only on an unusable signing key.
    pub fn new(
        repo: RepositoryState,
        storage: StorageState,
        config: AppConfig,
    ) -> Result<Self, ConfigError> {
        let tokens = TokenService::from_config(&config)?;
        let media = MediaPipeline::from_config(storage, &config);

        Ok(Self {
            repo,
            media: Arc::new(media),
            tokens: Arc::new(tokens),
            public_routes: Arc::new(AllowList::standard()),
            config,
        })
    }
}

/// create_router
///
/// Assembles all routes behind the authentication gate and wraps them in the
/// observability stack.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // A full batch plus multipart framing.
    let limits = state.media.limits();
    let body_limit = limits
        .max_batch_size
        .saturating_mul(limits.max_file_bytes)
        .saturating_add(1024 * 1024);

    // 2. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(authenticated::authenticated_routes())
        .merge(admin::admin_routes())
        // The gate runs for every matched route, public ones included: allow-listed
        // requests pass with an anonymous context.
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::authenticate,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Span per request carrying the `x-request-id`, so every log line of a request can be
/// correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
