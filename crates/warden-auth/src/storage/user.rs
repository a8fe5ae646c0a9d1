//! User storage trait.
//!
//! Defines the interface for user persistence operations.
//! Implementations are provided by storage backends (in-memory, PostgreSQL).

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;

// =============================================================================
// User Status
// =============================================================================

/// Account status. Only `Active` accounts may log in or refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Account may authenticate.
    #[default]
    Active,
    /// Account disabled by an operator.
    Inactive,
    /// Account temporarily blocked.
    Suspended,
}

impl UserStatus {
    /// Returns the status as stored.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "suspended" => Ok(Self::Suspended),
            other => Err(format!("unknown user status '{}'", other)),
        }
    }
}

// =============================================================================
// User
// =============================================================================

/// A registered user account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Unique identifier (UUID string), minted at registration.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Email address, unique across accounts.
    pub email: String,

    /// Argon2id PHC hash. Never serialized.
    #[serde(default, skip_serializing)]
    pub password_hash: String,

    /// Role label carried into access credentials.
    pub role: String,

    /// Account status.
    #[serde(default)]
    pub status: UserStatus,

    /// When the user was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the user was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    /// Creates an active user with a freshly minted ID.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            role: role.into(),
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` if the account may authenticate.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    /// Bumps `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = OffsetDateTime::now_utc();
    }
}

// =============================================================================
// User Storage Trait
// =============================================================================

/// Storage operations for user accounts.
///
/// A missing record is `Ok(None)`, never an error. Errors mean the store
/// itself failed.
///
/// # Example
///
/// ```ignore
/// use warden_auth::storage::UserStorage;
///
/// async fn example(storage: &impl UserStorage) {
///     if let Some(user) = storage.find_by_email("a@example.com").await? {
///         println!("Found user: {}", user.id);
///     }
/// }
/// ```
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Persists a new user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::DuplicateEmail` if the email is taken, or a
    /// storage error.
    async fn create(&self, user: &User) -> AuthResult<()>;

    /// Finds a user by email.
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Finds a user by ID.
    async fn find_by_id(&self, user_id: &str) -> AuthResult<Option<User>>;

    /// Replaces an existing user record.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if no user has this ID,
    /// `AuthError::DuplicateEmail` if the new email is taken, or a storage
    /// error.
    async fn update(&self, user: &User) -> AuthResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_is_active() {
        let user = User::new("Ada", "ada@example.com", "$argon2id$...", "user");
        assert!(user.is_active());
        assert!(uuid::Uuid::parse_str(&user.id).is_ok());
        assert_eq!(user.created_at, user.updated_at);
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("Ada", "ada@example.com", "secret-hash", "user");
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["status"], "active");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("active".parse::<UserStatus>().unwrap(), UserStatus::Active);
        assert_eq!("suspended".parse::<UserStatus>().unwrap(), UserStatus::Suspended);
        assert!("deleted".parse::<UserStatus>().is_err());
    }
}
