//! `PostgreSQL` storage for the storefront notification engine.
//!
//! Implements [`Storage`] on top of `sqlx` with runtime-checked queries.
//!
//! # Schema
//!
//! Migrations under `migrations/` create:
//!
//! - `users`: local users, linked to chat principals through `tid`
//! - `orders` and `feedback`: the two service request kinds
//! - `order_telegram_messages` and `feedback_telegram_messages`: where each
//!   request is mirrored in the chat
//!
//! Mapping rows are append-only. [`Storage::get_mapping`] returns the one with
//! the highest message id.
//!
//! # Example
//!
//! ```no_run
//! use storefront_sync_postgres::PostgresStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = PostgresStorage::connect("postgres://localhost/storefront", 10).await?;
//! storage.migrate().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::str::FromStr;
use storefront_sync_core::StorageError;
use storefront_sync_core::environment::Storage;
use storefront_sync_core::request::{
    FeedbackType, MessageMapping, NewServiceRequest, OrderSource, RequestKind, RequestStatus,
    ServiceRequest,
};
use storefront_sync_core::user::{AuthorProfile, NewUser, User, UserRole};
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL-backed [`Storage`].
#[derive(Clone, Debug)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Create a storage using an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` with at most `max_connections` connections.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Database(format!("Failed to connect: {e}")))?;

        Ok(Self::from_pool(pool))
    }

    /// Run the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const fn request_table(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Order => "orders",
        RequestKind::Feedback => "feedback",
    }
}

const fn type_column(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Order => "NULL::TEXT",
        RequestKind::Feedback => "type",
    }
}

const fn mapping_table(kind: RequestKind) -> (&'static str, &'static str) {
    match kind {
        RequestKind::Order => ("order_telegram_messages", "order_id"),
        RequestKind::Feedback => ("feedback_telegram_messages", "feedback_id"),
    }
}

fn select_request(kind: RequestKind, filter: &str) -> String {
    format!(
        "SELECT id, uuid, status, source, {} AS type, name, phone, content, user_id, created_at, updated_at \
         FROM {} WHERE {filter}",
        type_column(kind),
        request_table(kind),
    )
}

fn map_db_error(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::RowNotFound => StorageError::NotFound,
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StorageError::Conflict(db.message().to_string())
        }
        other => StorageError::Database(other.to_string()),
    }
}

fn parse_column<T>(value: &str, column: &str) -> Result<T, StorageError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| StorageError::Database(format!("invalid {column}: {e}")))
}

fn row_to_request(kind: RequestKind, row: &PgRow) -> Result<ServiceRequest, StorageError> {
    let get_err = |e: sqlx::Error| StorageError::Database(e.to_string());

    let status: String = row.try_get("status").map_err(get_err)?;
    let source: Option<String> = row.try_get("source").map_err(get_err)?;
    let feedback_type: Option<String> = row.try_get("type").map_err(get_err)?;

    Ok(ServiceRequest {
        kind,
        id: row.try_get("id").map_err(get_err)?,
        uuid: row.try_get("uuid").map_err(get_err)?,
        status: parse_column::<RequestStatus>(&status, "status")?,
        source: source
            .as_deref()
            .map(|s| parse_column::<OrderSource>(s, "source"))
            .transpose()?,
        feedback_type: feedback_type
            .as_deref()
            .map(|t| parse_column::<FeedbackType>(t, "type"))
            .transpose()?,
        name: row.try_get("name").map_err(get_err)?,
        phone: row.try_get("phone").map_err(get_err)?,
        content: row.try_get("content").map_err(get_err)?,
        user_id: row.try_get("user_id").map_err(get_err)?,
        created_at: row.try_get("created_at").map_err(get_err)?,
        updated_at: row.try_get("updated_at").map_err(get_err)?,
    })
}

fn row_to_user(row: &PgRow) -> Result<User, StorageError> {
    let get_err = |e: sqlx::Error| StorageError::Database(e.to_string());
    let role: String = row.try_get("role").map_err(get_err)?;

    Ok(User {
        id: row.try_get("id").map_err(get_err)?,
        external_id: row.try_get("tid").map_err(get_err)?,
        uuid: row.try_get("uuid").map_err(get_err)?,
        first_name: row.try_get("first_name").map_err(get_err)?,
        last_name: row.try_get("last_name").map_err(get_err)?,
        username: row.try_get("username").map_err(get_err)?,
        role: parse_column::<UserRole>(&role, "role")?,
        created_at: row.try_get("created_at").map_err(get_err)?,
        updated_at: row.try_get("updated_at").map_err(get_err)?,
    })
}

const SELECT_USER: &str =
    "SELECT id, tid, uuid, first_name, last_name, username, role, created_at, updated_at FROM users";

#[async_trait]
impl Storage for PostgresStorage {
    async fn load_request(
        &self,
        kind: RequestKind,
        id: i64,
    ) -> Result<ServiceRequest, StorageError> {
        let row = sqlx::query(&select_request(kind, "id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;

        row_to_request(kind, &row)
    }

    async fn load_request_by_uuid(
        &self,
        kind: RequestKind,
        uuid: Uuid,
    ) -> Result<ServiceRequest, StorageError> {
        let row = sqlx::query(&select_request(kind, "uuid = $1"))
            .bind(uuid)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;

        row_to_request(kind, &row)
    }

    async fn create_request(
        &self,
        kind: RequestKind,
        draft: &NewServiceRequest,
    ) -> Result<ServiceRequest, StorageError> {
        let source = draft.source.map(OrderSource::slug);
        let query = match kind {
            RequestKind::Order => sqlx::query_as::<_, (i64,)>(
                r"
                INSERT INTO orders (uuid, status, source, name, phone, content, user_id, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
                RETURNING id
                ",
            ),
            RequestKind::Feedback => sqlx::query_as::<_, (i64,)>(
                r"
                INSERT INTO feedback (uuid, status, source, name, phone, content, user_id, created_at, updated_at, type)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $9)
                RETURNING id
                ",
            ),
        };

        let mut query = query
            .bind(draft.uuid)
            .bind(RequestStatus::Created.slug())
            .bind(source)
            .bind(&draft.name)
            .bind(&draft.phone)
            .bind(&draft.content)
            .bind(draft.user_id)
            .bind(draft.created_at);
        if kind == RequestKind::Feedback {
            query = query.bind(draft.feedback_type.map(FeedbackType::slug));
        }

        let (id,) = query.fetch_one(&self.pool).await.map_err(map_db_error)?;

        tracing::debug!(kind = %kind, request_id = id, "Request created");
        Ok(draft.clone().into_request(kind, id))
    }

    async fn save_status(&self, request: &ServiceRequest) -> Result<(), StorageError> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET status = $1, updated_at = $2 WHERE id = $3",
            request_table(request.kind)
        ))
        .bind(request.status.slug())
        .bind(request.updated_at)
        .bind(request.id)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn create_mapping(&self, mapping: &MessageMapping) -> Result<(), StorageError> {
        let (table, column) = mapping_table(mapping.kind);
        sqlx::query(&format!(
            "INSERT INTO {table} ({column}, chat_id, message_id) VALUES ($1, $2, $3)"
        ))
        .bind(mapping.request_id)
        .bind(mapping.chat_id)
        .bind(mapping.message_id)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    async fn get_mapping(
        &self,
        kind: RequestKind,
        request_id: i64,
    ) -> Result<MessageMapping, StorageError> {
        let (table, column) = mapping_table(kind);
        let (chat_id, message_id): (i64, i64) = sqlx::query_as(&format!(
            "SELECT chat_id, message_id FROM {table} WHERE {column} = $1 ORDER BY message_id DESC LIMIT 1"
        ))
        .bind(request_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(MessageMapping {
            kind,
            request_id,
            chat_id,
            message_id,
        })
    }

    async fn resolve_author(&self, user_id: i64) -> Result<AuthorProfile, StorageError> {
        let row = sqlx::query(&format!("{SELECT_USER} WHERE id = $1"))
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;

        row_to_user(&row).map(|user| AuthorProfile::from(&user))
    }

    async fn find_user_by_external_id(&self, external_id: i64) -> Result<User, StorageError> {
        let row = sqlx::query(&format!("{SELECT_USER} WHERE tid = $1"))
            .bind(external_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;

        row_to_user(&row)
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, StorageError> {
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO users (tid, uuid, first_name, last_name, username, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING id
            ",
        )
        .bind(user.external_id)
        .bind(user.uuid)
        .bind(&user.first_name)
        .bind(user.last_name.as_deref())
        .bind(user.username.as_deref())
        .bind(user.role.slug())
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        tracing::info!(user_id = id, external_id = ?user.external_id, "User created");
        Ok(user.clone().into_user(id))
    }
}
