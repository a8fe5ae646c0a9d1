//! PostgreSQL storage backend for Warden.
//!
//! Provides persistent implementations of the `warden-auth` storage traits:
//!
//! - users (`users` table)
//! - service clients (`clients` table)
//! - policy rules and grouping edges (`policy_rules` table)
//!
//! # Example
//!
//! ```ignore
//! use warden_auth_postgres::PostgresAuthStorage;
//!
//! let storage = PostgresAuthStorage::connect("postgres://localhost/warden", 10).await?;
//! storage.migrate().await?;
//!
//! let users = storage.users();
//! let user = users.find_by_email("a@example.com").await?;
//! ```

pub mod client;
pub mod migrations;
pub mod policy;
pub mod user;

use std::sync::Arc;

use sqlx_core::pool::{Pool, PoolOptions};
use sqlx_postgres::Postgres;
use warden_auth::AuthError;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use client::PostgresClientStorage;
pub use policy::PostgresPolicyStorage;
pub use user::PostgresUserStorage;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Requested record was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StorageError {
    /// Create a `NotFound` error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create an `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Returns `true` if this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` if the database rejected a write on a unique constraint.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            Self::Database(sqlx_core::Error::Database(db_err)) if db_err.is_unique_violation()
        )
    }

    /// Returns `true` if this is a server error (5xx equivalent).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Migration(_))
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => AuthError::not_found(what),
            StorageError::InvalidInput(message) => AuthError::invalid_request(message),
            other => AuthError::infrastructure(other.to_string()),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// PostgreSQL Auth Storage
// =============================================================================

/// PostgreSQL storage backend.
///
/// Holds the connection pool and hands out Arc-owning storage adapters
/// usable as `Arc<dyn UserStorage>` and friends.
#[derive(Debug, Clone)]
pub struct PostgresAuthStorage {
    pool: Arc<PgPool>,
}

impl PostgresAuthStorage {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create new storage by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        let pool = PoolOptions::<Postgres>::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;
        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::new(Arc::new(pool)))
    }

    /// Applies pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> StorageResult<()> {
        migrations::run(&self.pool).await
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// User storage backed by this pool.
    #[must_use]
    pub fn users(&self) -> PostgresUserStorage {
        PostgresUserStorage::new(Arc::clone(&self.pool))
    }

    /// Client storage backed by this pool.
    #[must_use]
    pub fn clients(&self) -> PostgresClientStorage {
        PostgresClientStorage::new(Arc::clone(&self.pool))
    }

    /// Policy storage backed by this pool.
    #[must_use]
    pub fn policies(&self) -> PostgresPolicyStorage {
        PostgresPolicyStorage::new(Arc::clone(&self.pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_not_found() {
        let err = StorageError::not_found("user u-1");
        assert!(err.is_not_found());
        assert!(!err.is_server_error());
        assert!(err.to_string().contains("u-1"));
    }

    #[test]
    fn test_storage_error_into_auth_error() {
        let auth: AuthError = StorageError::not_found("user u-1").into();
        assert!(matches!(auth, AuthError::NotFound { .. }));

        let auth: AuthError = StorageError::invalid_input("empty filter").into();
        assert!(matches!(auth, AuthError::InvalidRequest { .. }));

        let auth: AuthError = StorageError::Migration("boom".into()).into();
        assert!(auth.is_server_error());

        let auth: AuthError = StorageError::Database(sqlx_core::Error::PoolTimedOut).into();
        assert!(matches!(auth, AuthError::Infrastructure { .. }));
    }

    #[test]
    fn test_pool_timeout_is_not_unique_violation() {
        let err = StorageError::Database(sqlx_core::Error::PoolTimedOut);
        assert!(!err.is_unique_violation());
        assert!(err.is_server_error());
    }
}
