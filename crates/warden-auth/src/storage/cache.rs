//! Client cache trait.
//!
//! The cache maps a bearer key to a [`Client`] snapshot. It is a pure
//! performance layer: a miss is always followed by a store lookup.

use async_trait::async_trait;

use super::client::Client;

/// Errors returned by client caches.
///
/// `Miss` is a normal outcome and must be kept distinct from backend failures.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// No live entry for the key.
    #[error("Cache miss")]
    Miss,

    /// The cache backend could not be reached or rejected the command.
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// A cached value could not be encoded or decoded.
    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

impl CacheError {
    /// Returns `true` for a plain miss.
    #[must_use]
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss)
    }
}

/// Cache of client records keyed by bearer key.
#[async_trait]
pub trait ClientCache: Send + Sync {
    /// Returns the cached client, or `CacheError::Miss`.
    async fn get(&self, bearer_key: &str) -> Result<Client, CacheError>;

    /// Stores a client under its bearer key.
    async fn set(&self, client: &Client) -> Result<(), CacheError>;

    /// Drops the entry for a bearer key, if any.
    async fn invalidate(&self, bearer_key: &str) -> Result<(), CacheError>;
}
