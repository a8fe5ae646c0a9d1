//! User storage.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use warden_auth::storage::{User, UserStatus, UserStorage};
use warden_auth::{AuthError, AuthResult};

use crate::{PgPool, StorageError};

/// Row shape shared by every user query.
type UserTuple = (
    String,
    String,
    String,
    String,
    String,
    String,
    OffsetDateTime,
    OffsetDateTime,
);

const USER_COLUMNS: &str = "id, name, email, password, role, status, created_at, updated_at";

fn user_from_tuple(row: UserTuple) -> User {
    let status = row.5.parse().unwrap_or_else(|_| {
        tracing::warn!(user_id = %row.0, status = %row.5, "Unknown user status, treating as inactive");
        UserStatus::Inactive
    });
    User {
        id: row.0,
        name: row.1,
        email: row.2,
        password_hash: row.3,
        role: row.4,
        status,
        created_at: row.6,
        updated_at: row.7,
    }
}

/// Maps a write error, turning a unique violation on `email` into
/// `AuthError::DuplicateEmail`.
fn map_write_error(err: sqlx_core::Error) -> AuthError {
    let err = StorageError::from(err);
    if err.is_unique_violation() {
        AuthError::DuplicateEmail
    } else {
        err.into()
    }
}

/// PostgreSQL-backed [`UserStorage`].
#[derive(Debug, Clone)]
pub struct PostgresUserStorage {
    pool: Arc<PgPool>,
}

impl PostgresUserStorage {
    /// Create a new user storage over a shared pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> AuthResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let row: Option<UserTuple> = query_as(&sql)
            .bind(value)
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(StorageError::from)?;

        Ok(row.map(user_from_tuple))
    }
}

#[async_trait]
impl UserStorage for PostgresUserStorage {
    async fn create(&self, user: &User) -> AuthResult<()> {
        query(
            r#"
            INSERT INTO users (id, name, email, password, role, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(user.status.as_str())
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(map_write_error)?;

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        self.find_one("email", email).await
    }

    async fn find_by_id(&self, user_id: &str) -> AuthResult<Option<User>> {
        self.find_one("id", user_id).await
    }

    async fn update(&self, user: &User) -> AuthResult<()> {
        let result = query(
            r#"
            UPDATE users
            SET name = $2,
                email = $3,
                password = $4,
                role = $5,
                status = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(user.status.as_str())
        .bind(user.updated_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(map_write_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(format!("user {}", user.id)).into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(status: &str) -> UserTuple {
        let now = OffsetDateTime::now_utc();
        (
            "u-1".into(),
            "Ada".into(),
            "ada@example.com".into(),
            "$argon2id$v=19$...".into(),
            "user".into(),
            status.into(),
            now,
            now,
        )
    }

    #[test]
    fn test_user_from_tuple() {
        let user = user_from_tuple(tuple("suspended"));
        assert_eq!(user.id, "u-1");
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.status, UserStatus::Suspended);
        assert!(!user.is_active());
    }

    #[test]
    fn test_unknown_status_is_inactive() {
        let user = user_from_tuple(tuple("archived"));
        assert_eq!(user.status, UserStatus::Inactive);
    }

    #[test]
    fn test_non_unique_write_error_is_infrastructure() {
        let err = map_write_error(sqlx_core::Error::PoolClosed);
        assert!(matches!(err, AuthError::Infrastructure { .. }));
    }
}
