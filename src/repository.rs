use async_trait::async_trait;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::AppError,
    media::MediaObject,
    models::{Identity, MushroomType, NewIdentity, Place, PlaceFilter, PlaceImage, PlaceRequest},
};

/// Repository Trait
///
/// The persistence contract. Handlers and the authentication gate only ever see
/// `Arc<dyn Repository>`, so tests substitute an in-memory implementation.
///
/// Authorization is not enforced here: ownership is decided by `policy` before any
/// mutating call, and these methods act on whatever id they are given.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Identities ---
    async fn find_user_by_email(&self, email: &str) -> Result<Option<Identity>, AppError>;
    async fn email_taken(&self, email: &str) -> Result<bool, AppError>;
    async fn username_taken(&self, username: &str) -> Result<bool, AppError>;
    /// Fails with `Conflict` when email or username is already in use.
    async fn create_user(&self, user: NewIdentity) -> Result<Identity, AppError>;
    async fn list_users(&self) -> Result<Vec<Identity>, AppError>;

    // --- Places ---
    async fn list_places(&self, filter: PlaceFilter) -> Result<Vec<Place>, AppError>;
    async fn get_place(&self, id: Uuid) -> Result<Option<Place>, AppError>;
    async fn create_place(&self, owner_id: Uuid, req: &PlaceRequest) -> Result<Place, AppError>;
    async fn update_place(&self, id: Uuid, req: &PlaceRequest) -> Result<Option<Place>, AppError>;
    /// Removes the place and its image rows. Returns false when nothing was deleted.
    async fn delete_place(&self, id: Uuid) -> Result<bool, AppError>;

    // --- Place images ---
    async fn place_images(&self, place_id: Uuid) -> Result<Vec<PlaceImage>, AppError>;
    /// Images of several places in one round trip, for listings.
    async fn images_for_places(&self, place_ids: &[Uuid]) -> Result<Vec<PlaceImage>, AppError>;
    async fn count_place_images(&self, place_id: Uuid) -> Result<usize, AppError>;
    async fn add_place_image(
        &self,
        place_id: Uuid,
        object: &MediaObject,
    ) -> Result<PlaceImage, AppError>;
    async fn get_place_image(&self, id: Uuid) -> Result<Option<PlaceImage>, AppError>;
    async fn delete_place_image(&self, id: Uuid) -> Result<bool, AppError>;

    // --- Reference data ---
    async fn list_mushroom_types(&self) -> Result<Vec<MushroomType>, AppError>;
    async fn get_mushroom_type(&self, id: i64) -> Result<Option<MushroomType>, AppError>;
}

/// RepositoryState
///
/// The shared handle to the persistence layer held in the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str =
    "id, email, username, password_hash, first_name, last_name, role, active, created_at";

const PLACE_SELECT: &str = r#"
    SELECT
        p.id, p.owner_id, u.username AS owner_username, p.title, p.description,
        p.latitude, p.longitude, p.address, p.mushroom_type_id,
        t.name AS mushroom_type_name, p.created_at, p.updated_at
    FROM places p
    JOIN users u ON u.id = p.owner_id
    LEFT JOIN mushroom_types t ON t.id = p.mushroom_type_id
"#;

const IMAGE_COLUMNS: &str = "id, place_id, url, storage_key, uploaded_at";

/// PostgresRepository
///
/// The `Repository` backed by PostgreSQL. Queries are checked at runtime so the crate
/// builds without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn unique_violation(e: sqlx::Error, what: &str) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(format!("{} already in use", what))
        }
        _ => AppError::Database(e),
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<Identity>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE lower(email) = lower($1)", USER_COLUMNS);
        Ok(sqlx::query_as::<_, Identity>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn email_taken(&self, email: &str) -> Result<bool, AppError> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE lower(email) = lower($1))",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn username_taken(&self, username: &str) -> Result<bool, AppError> {
        Ok(
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    /// create_user
    ///
    /// The pre-checks in the register handler leave a window between check and insert;
    /// the unique indexes close it and surface here as `Conflict`.
    async fn create_user(&self, user: NewIdentity) -> Result<Identity, AppError> {
        let sql = format!(
            r#"
            INSERT INTO users (email, username, password_hash, first_name, last_name, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        sqlx::query_as::<_, Identity>(&sql)
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.role)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| unique_violation(e, "email or username"))
    }

    async fn list_users(&self) -> Result<Vec<Identity>, AppError> {
        let sql = format!("SELECT {} FROM users ORDER BY created_at DESC", USER_COLUMNS);
        Ok(sqlx::query_as::<_, Identity>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    /// list_places
    ///
    /// One base query, narrowed by the filter with bound parameters only.
    async fn list_places(&self, filter: PlaceFilter) -> Result<Vec<Place>, AppError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(PLACE_SELECT);

        match filter {
            PlaceFilter::All | PlaceFilter::Recent(_) => {}
            PlaceFilter::Owner(owner_id) => {
                builder.push(" WHERE p.owner_id = ");
                builder.push_bind(owner_id);
            }
            PlaceFilter::Category(category) => {
                builder.push(" WHERE t.category = ");
                builder.push_bind(category);
            }
            PlaceFilter::MushroomType(type_id) => {
                builder.push(" WHERE p.mushroom_type_id = ");
                builder.push_bind(type_id);
            }
        }

        builder.push(" ORDER BY p.created_at DESC");

        if let PlaceFilter::Recent(limit) = filter {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
        }

        Ok(builder
            .build_query_as::<Place>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_place(&self, id: Uuid) -> Result<Option<Place>, AppError> {
        let sql = format!("{} WHERE p.id = $1", PLACE_SELECT);
        Ok(sqlx::query_as::<_, Place>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_place(&self, owner_id: Uuid, req: &PlaceRequest) -> Result<Place, AppError> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO places (owner_id, title, description, latitude, longitude, address, mushroom_type_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(owner_id)
        .bind(req.title.trim())
        .bind(&req.description)
        .bind(req.latitude)
        .bind(req.longitude)
        .bind(&req.address)
        .bind(req.mushroom_type_id)
        .fetch_one(&self.pool)
        .await?;

        self.get_place(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("place {} vanished after insert", id)))
    }

    async fn update_place(&self, id: Uuid, req: &PlaceRequest) -> Result<Option<Place>, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE places
            SET title = $2, description = $3, latitude = $4, longitude = $5,
                address = $6, mushroom_type_id = $7, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(req.title.trim())
        .bind(&req.description)
        .bind(req.latitude)
        .bind(req.longitude)
        .bind(&req.address)
        .bind(req.mushroom_type_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_place(id).await
    }

    async fn delete_place(&self, id: Uuid) -> Result<bool, AppError> {
        // place_images rows go with it (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM places WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn place_images(&self, place_id: Uuid) -> Result<Vec<PlaceImage>, AppError> {
        let sql = format!(
            "SELECT {} FROM place_images WHERE place_id = $1 ORDER BY uploaded_at, id",
            IMAGE_COLUMNS
        );
        Ok(sqlx::query_as::<_, PlaceImage>(&sql)
            .bind(place_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn images_for_places(&self, place_ids: &[Uuid]) -> Result<Vec<PlaceImage>, AppError> {
        if place_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM place_images WHERE place_id = ANY($1) ORDER BY uploaded_at, id",
            IMAGE_COLUMNS
        );
        Ok(sqlx::query_as::<_, PlaceImage>(&sql)
            .bind(place_ids)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_place_images(&self, place_id: Uuid) -> Result<usize, AppError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM place_images WHERE place_id = $1")
                .bind(place_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn add_place_image(
        &self,
        place_id: Uuid,
        object: &MediaObject,
    ) -> Result<PlaceImage, AppError> {
        let sql = format!(
            r#"
            INSERT INTO place_images (place_id, url, storage_key, uploaded_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            IMAGE_COLUMNS
        );
        Ok(sqlx::query_as::<_, PlaceImage>(&sql)
            .bind(place_id)
            .bind(&object.url)
            .bind(&object.key)
            .bind(object.uploaded_at)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_place_image(&self, id: Uuid) -> Result<Option<PlaceImage>, AppError> {
        let sql = format!("SELECT {} FROM place_images WHERE id = $1", IMAGE_COLUMNS);
        Ok(sqlx::query_as::<_, PlaceImage>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_place_image(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM place_images WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_mushroom_types(&self) -> Result<Vec<MushroomType>, AppError> {
        Ok(sqlx::query_as::<_, MushroomType>(
            "SELECT id, name, latin_name, category, icon_url FROM mushroom_types ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_mushroom_type(&self, id: i64) -> Result<Option<MushroomType>, AppError> {
        Ok(sqlx::query_as::<_, MushroomType>(
            "SELECT id, name, latin_name, category, icon_url FROM mushroom_types WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }
}
