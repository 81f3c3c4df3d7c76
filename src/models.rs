use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{error::AppError, media::ItemFailure};

// --- Identity ---

/// Role
///
/// The closed set of roles an identity can hold. Stored as the `user_role` Postgres enum
/// and carried verbatim in token claims.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[ts(export)]
pub enum Role {
    User,
    Admin,
}

/// Identity
///
/// A registered account as stored in the `users` table. The password hash never leaves the
/// process: this type is not `Serialize`, API responses use `UserSummary` instead.
#[derive(Debug, Clone, FromRow)]
pub struct Identity {
    pub id: Uuid,
    // Login key, unique.
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Whether the identity may still authenticate. Tokens stay cryptographically valid after
/// deactivation; the gate consults this on every request.
pub fn is_active(identity: &Identity) -> bool {
    identity.active
}

/// The roles an identity is granted. There is no role hierarchy: an ADMIN holds ADMIN only,
/// and endpoints that accept both list both.
pub fn authorities_of(identity: &Identity) -> Vec<Role> {
    vec![identity.role]
}

/// Input for `Repository::create_user`, produced by the register handler after hashing.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
}

// --- Places & media ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "edibility_category", rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum EdibilityCategory {
    Edible,
    ConditionallyEdible,
    Poisonous,
}

/// MushroomType
///
/// Seeded reference data; read-only over the API.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MushroomType {
    pub id: i64,
    pub name: String,
    pub latin_name: Option<String>,
    pub category: EdibilityCategory,
    pub icon_url: Option<String>,
}

/// Place
///
/// A foraging site. `owner_id` is fixed at creation; there is no transfer operation.
/// The owner's username and the mushroom type's name are joined in by the repository.
#[derive(Debug, Clone, FromRow)]
pub struct Place {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub owner_username: String,
    pub title: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub mushroom_type_id: Option<i64>,
    pub mushroom_type_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// PlaceImage
///
/// The persisted record of a stored object attached to a place. It refers to its place by
/// id only; the place never holds image objects.
#[derive(Debug, Clone, FromRow)]
pub struct PlaceImage {
    pub id: Uuid,
    pub place_id: Uuid,
    pub url: String,
    pub storage_key: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Selects which places a listing returns.
#[derive(Debug, Clone, Copy)]
pub enum PlaceFilter {
    All,
    Owner(Uuid),
    Category(EdibilityCategory),
    MushroomType(i64),
    Recent(i64),
}

// --- Request payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RegisterRequest {
    #[schema(example = "a@x.com")]
    pub email: String,
    #[schema(example = "alice")]
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            return Err(AppError::Validation("email: invalid address".into()));
        }
        let username_len = self.username.trim().chars().count();
        if !(3..=50).contains(&username_len) {
            return Err(AppError::Validation(
                "username: must be between 3 and 50 characters".into(),
            ));
        }
        if self.password.chars().count() < 6 {
            return Err(AppError::Validation(
                "password: must be at least 6 characters".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// PlaceRequest
///
/// Body of create and update. `tempImageUrls` lists images previously uploaded through
/// `/api/uploads/temp`; on create they are moved under the new place.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PlaceRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub mushroom_type_id: Option<i64>,
    #[serde(default)]
    pub temp_image_urls: Vec<String>,
}

impl PlaceRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let title_len = self.title.trim().chars().count();
        if title_len == 0 {
            return Err(AppError::Validation("title: required".into()));
        }
        if title_len > 200 {
            return Err(AppError::Validation("title: at most 200 characters".into()));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(AppError::Validation("latitude: out of range".into()));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(AppError::Validation("longitude: out of range".into()));
        }
        Ok(())
    }
}

// --- Response payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub active: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<&Identity> for UserSummary {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            email: identity.email.clone(),
            username: identity.username.clone(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            role: identity.role,
            active: identity.active,
            created_at: identity.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ImageResponse {
    pub id: Uuid,
    pub url: String,
    #[ts(type = "string")]
    pub uploaded_at: DateTime<Utc>,
}

impl From<&PlaceImage> for ImageResponse {
    fn from(image: &PlaceImage) -> Self {
        Self {
            id: image.id,
            url: image.url.clone(),
            uploaded_at: image.uploaded_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PlaceResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub owner_id: Uuid,
    pub owner_username: String,
    pub mushroom_type_id: Option<i64>,
    pub mushroom_type: Option<String>,
    pub image_count: usize,
    pub images: Vec<ImageResponse>,
}

impl PlaceResponse {
    pub fn new(place: Place, images: &[PlaceImage]) -> Self {
        Self {
            id: place.id,
            title: place.title,
            description: place.description,
            latitude: place.latitude,
            longitude: place.longitude,
            address: place.address,
            created_at: place.created_at,
            owner_id: place.owner_id,
            owner_username: place.owner_username,
            mushroom_type_id: place.mushroom_type_id,
            mushroom_type: place.mushroom_type_name,
            image_count: images.len(),
            images: images.iter().map(ImageResponse::from).collect(),
        }
    }
}

/// BatchUploadResponse
///
/// Returned with 200 whenever at least one file was stored and recorded. `failed` keeps the
/// zero-based index of each rejected file in the submitted order.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BatchUploadResponse {
    pub succeeded: Vec<ImageResponse>,
    pub failed: Vec<ItemFailure>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TempUploadResponse {
    pub url: String,
    pub key: String,
}
