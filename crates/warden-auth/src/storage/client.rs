//! Service-client storage trait.
//!
//! Service clients are machine callers identified by an opaque bearer key.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;

/// A registered service client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Client {
    /// Unique identifier.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Opaque key the client presents as its bearer credential.
    pub bearer_key: String,

    /// When the client was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the client was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Input for creating or updating a client. Upserts are keyed by `bearer_key`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientInput {
    /// Human-readable name.
    pub name: String,
    /// Bearer key.
    pub bearer_key: String,
}

/// Selects clients by ID, name or bearer key.
///
/// Each non-empty list constrains the match; lists are combined with AND,
/// values within a list with OR. An empty filter matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientFilter {
    /// Match any of these IDs.
    pub ids: Vec<String>,
    /// Match any of these names.
    pub names: Vec<String>,
    /// Match any of these bearer keys.
    pub bearer_keys: Vec<String>,
}

impl ClientFilter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter matching a single bearer key.
    #[must_use]
    pub fn by_bearer_key(key: impl Into<String>) -> Self {
        Self {
            bearer_keys: vec![key.into()],
            ..Self::default()
        }
    }

    /// Adds an ID constraint.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.ids.push(id.into());
        self
    }

    /// Adds a name constraint.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    /// Returns `true` if no constraint is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.names.is_empty() && self.bearer_keys.is_empty()
    }

    /// Evaluates the filter against a client.
    #[must_use]
    pub fn matches(&self, client: &Client) -> bool {
        fn any(list: &[String], value: &str) -> bool {
            list.is_empty() || list.iter().any(|v| v == value)
        }

        any(&self.ids, &client.id)
            && any(&self.names, &client.name)
            && any(&self.bearer_keys, &client.bearer_key)
    }
}

/// Storage operations for service clients.
#[async_trait]
pub trait ClientStorage: Send + Sync {
    /// Returns whether a client with this bearer key exists.
    ///
    /// `Ok(false)` means absent; `Err` means the store could not answer.
    async fn is_exists(&self, bearer_key: &str) -> AuthResult<bool>;

    /// Returns every client matching `filter`.
    async fn find_by_filter(&self, filter: &ClientFilter) -> AuthResult<Vec<Client>>;

    /// Creates clients, or renames existing ones with the same bearer key.
    /// Returns the stored records in input order.
    async fn upsert(&self, inputs: &[ClientInput]) -> AuthResult<Vec<Client>>;

    /// Deletes every client matching `filter` and returns how many were
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` for an empty filter.
    async fn delete_by_filter(&self, filter: &ClientFilter) -> AuthResult<u64>;
}
