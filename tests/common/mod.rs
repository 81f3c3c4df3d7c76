#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use chrono::{Duration, Utc};
use forest_places::{
    AppConfig, AppError, AppState, MockStorageService, create_router,
    media::MediaObject,
    models::{
        EdibilityCategory, Identity, MushroomType, NewIdentity, Place, PlaceFilter, PlaceImage,
        PlaceRequest, Role,
    },
    repository::{Repository, RepositoryState},
    storage::StorageState,
};
use std::sync::{Arc, Mutex, PoisonError};
use tower::ServiceExt;
use uuid::Uuid;

// --- IN-MEMORY REPOSITORY ---

#[derive(Default)]
struct Tables {
    users: Vec<Identity>,
    places: Vec<Place>,
    images: Vec<PlaceImage>,
    types: Vec<MushroomType>,
}

/// A `Repository` over plain vectors, with the same joins and ordering as Postgres.
/// `fail_image_inserts` makes every `add_place_image` fail.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
    pub fail_image_inserts: std::sync::atomic::AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        let repo = Self::default();
        repo.lock().types = vec![
            MushroomType {
                id: 1,
                name: "Porcini".into(),
                latin_name: Some("Boletus edulis".into()),
                category: EdibilityCategory::Edible,
                icon_url: None,
            },
            MushroomType {
                id: 2,
                name: "Fly agaric".into(),
                latin_name: Some("Amanita muscaria".into()),
                category: EdibilityCategory::Poisonous,
                icon_url: None,
            },
        ];
        repo
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts an identity directly, bypassing registration.
    pub fn seed_user(&self, email: &str, username: &str, role: Role) -> Identity {
        let identity = identity(email, username, role);
        self.lock().users.push(identity.clone());
        identity
    }

    pub fn deactivate(&self, id: Uuid) {
        if let Some(user) = self.lock().users.iter_mut().find(|u| u.id == id) {
            user.active = false;
        }
    }

    pub fn image_count(&self) -> usize {
        self.lock().images.len()
    }

    fn joined(tables: &Tables, mut place: Place) -> Place {
        if let Some(owner) = tables.users.iter().find(|u| u.id == place.owner_id) {
            place.owner_username = owner.username.clone();
        }
        place.mushroom_type_name = place
            .mushroom_type_id
            .and_then(|id| tables.types.iter().find(|t| t.id == id))
            .map(|t| t.name.clone());
        place
    }
}

pub fn identity(email: &str, username: &str, role: Role) -> Identity {
    Identity {
        id: Uuid::new_v4(),
        email: email.to_string(),
        username: username.to_string(),
        password_hash: "not-a-real-hash".to_string(),
        first_name: None,
        last_name: None,
        role,
        active: true,
        created_at: Utc::now(),
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<Identity>, AppError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn email_taken(&self, email: &str) -> Result<bool, AppError> {
        Ok(self.find_user_by_email(email).await?.is_some())
    }

    async fn username_taken(&self, username: &str) -> Result<bool, AppError> {
        Ok(self.lock().users.iter().any(|u| u.username == username))
    }

    async fn create_user(&self, user: NewIdentity) -> Result<Identity, AppError> {
        let mut tables = self.lock();
        if tables
            .users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email) || u.username == user.username)
        {
            return Err(AppError::Conflict("email or username already in use".into()));
        }
        let identity = Identity {
            id: Uuid::new_v4(),
            email: user.email,
            username: user.username,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            active: true,
            created_at: Utc::now(),
        };
        tables.users.push(identity.clone());
        Ok(identity)
    }

    async fn list_users(&self) -> Result<Vec<Identity>, AppError> {
        Ok(self.lock().users.clone())
    }

    async fn list_places(&self, filter: PlaceFilter) -> Result<Vec<Place>, AppError> {
        let tables = self.lock();
        let mut places: Vec<Place> = tables
            .places
            .iter()
            .cloned()
            .map(|p| Self::joined(&tables, p))
            .filter(|p| match filter {
                PlaceFilter::All | PlaceFilter::Recent(_) => true,
                PlaceFilter::Owner(owner) => p.owner_id == owner,
                PlaceFilter::MushroomType(id) => p.mushroom_type_id == Some(id),
                PlaceFilter::Category(category) => p
                    .mushroom_type_id
                    .and_then(|id| tables.types.iter().find(|t| t.id == id))
                    .is_some_and(|t| t.category == category),
            })
            .collect();
        places.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let PlaceFilter::Recent(limit) = filter {
            places.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(places)
    }

    async fn get_place(&self, id: Uuid) -> Result<Option<Place>, AppError> {
        let tables = self.lock();
        Ok(tables
            .places
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .map(|p| Self::joined(&tables, p)))
    }

    async fn create_place(&self, owner_id: Uuid, req: &PlaceRequest) -> Result<Place, AppError> {
        let mut tables = self.lock();
        let now = Utc::now();
        let place = Place {
            id: Uuid::new_v4(),
            owner_id,
            owner_username: String::new(),
            title: req.title.trim().to_string(),
            description: req.description.clone(),
            latitude: req.latitude,
            longitude: req.longitude,
            address: req.address.clone(),
            mushroom_type_id: req.mushroom_type_id,
            mushroom_type_name: None,
            created_at: now,
            updated_at: now,
        };
        tables.places.push(place.clone());
        Ok(Self::joined(&tables, place))
    }

    async fn update_place(&self, id: Uuid, req: &PlaceRequest) -> Result<Option<Place>, AppError> {
        let mut tables = self.lock();
        let Some(place) = tables.places.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        place.title = req.title.trim().to_string();
        place.description = req.description.clone();
        place.latitude = req.latitude;
        place.longitude = req.longitude;
        place.address = req.address.clone();
        place.mushroom_type_id = req.mushroom_type_id;
        place.updated_at = Utc::now();
        let place = place.clone();
        Ok(Some(Self::joined(&tables, place)))
    }

    async fn delete_place(&self, id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.lock();
        let before = tables.places.len();
        tables.places.retain(|p| p.id != id);
        tables.images.retain(|i| i.place_id != id);
        Ok(tables.places.len() < before)
    }

    async fn place_images(&self, place_id: Uuid) -> Result<Vec<PlaceImage>, AppError> {
        Ok(self
            .lock()
            .images
            .iter()
            .filter(|i| i.place_id == place_id)
            .cloned()
            .collect())
    }

    async fn images_for_places(&self, place_ids: &[Uuid]) -> Result<Vec<PlaceImage>, AppError> {
        Ok(self
            .lock()
            .images
            .iter()
            .filter(|i| place_ids.contains(&i.place_id))
            .cloned()
            .collect())
    }

    async fn count_place_images(&self, place_id: Uuid) -> Result<usize, AppError> {
        Ok(self.place_images(place_id).await?.len())
    }

    async fn add_place_image(
        &self,
        place_id: Uuid,
        object: &MediaObject,
    ) -> Result<PlaceImage, AppError> {
        if self
            .fail_image_inserts
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            return Err(AppError::Internal("simulated insert failure".into()));
        }
        let image = PlaceImage {
            id: Uuid::new_v4(),
            place_id,
            url: object.url.clone(),
            storage_key: object.key.clone(),
            uploaded_at: object.uploaded_at,
        };
        self.lock().images.push(image.clone());
        Ok(image)
    }

    async fn get_place_image(&self, id: Uuid) -> Result<Option<PlaceImage>, AppError> {
        Ok(self.lock().images.iter().find(|i| i.id == id).cloned())
    }

    async fn delete_place_image(&self, id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.lock();
        let before = tables.images.len();
        tables.images.retain(|i| i.id != id);
        Ok(tables.images.len() < before)
    }

    async fn list_mushroom_types(&self) -> Result<Vec<MushroomType>, AppError> {
        Ok(self.lock().types.clone())
    }

    async fn get_mushroom_type(&self, id: i64) -> Result<Option<MushroomType>, AppError> {
        Ok(self.lock().types.iter().find(|t| t.id == id).cloned())
    }
}

// --- APP SCAFFOLDING ---

pub struct TestApp {
    pub state: AppState,
    pub repo: Arc<InMemoryRepository>,
    pub storage: MockStorageService,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_storage(MockStorageService::new())
    }

    pub fn with_storage(storage: MockStorageService) -> Self {
        Self::with_config(storage, AppConfig::default())
    }

    pub fn with_config(storage: MockStorageService, config: AppConfig) -> Self {
        let repo = Arc::new(InMemoryRepository::new());
        let state = AppState::new(
            repo.clone() as RepositoryState,
            Arc::new(storage.clone()) as StorageState,
            config,
        )
        .expect("test config is valid");
        Self {
            state,
            repo,
            storage,
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// A valid access token for `identity`.
    pub fn token_for(&self, identity: &Identity) -> String {
        self.state
            .tokens
            .issue(identity, forest_places::token::TokenKind::Access)
            .expect("token issues")
    }

    /// An access token that expired an hour ago.
    pub fn expired_token_for(&self, identity: &Identity) -> String {
        let ttl = self.state.config.access_token_ttl;
        self.state
            .tokens
            .issue_at(
                identity,
                forest_places::token::TokenKind::Access,
                Utc::now() - ttl - Duration::hours(1),
            )
            .expect("token issues")
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router().oneshot(request).await.expect("router is infallible")
    }
}

// --- REQUEST HELPERS ---

pub const BOUNDARY: &str = "forest-places-test-boundary";

/// A hand-built `multipart/form-data` body with one part per file, all under `field`.
pub fn multipart_body(field: &str, files: &[(&str, &str, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (filename, content_type, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(uri: &str, token: &str, field: &str, files: &[(&str, &str, Vec<u8>)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(field, files)))
        .expect("valid request")
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

pub fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).expect("valid request")
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body reads");
    serde_json::from_slice(&bytes).expect("body is JSON")
}

pub fn jpeg(size: usize) -> Vec<u8> {
    vec![0xFF; size]
}
