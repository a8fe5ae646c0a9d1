//! Request context types and handler extractors.

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};

use crate::client::AuthenticatedClient;
use crate::error::AuthError;

/// Identity of the user behind a verified access credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    /// User ID (`sub` claim).
    pub user_id: String,
    /// Role carried by the credential. Empty if absent.
    pub role: String,
}

/// Extracts the [`UserContext`] inserted by `user_auth`.
///
/// Rejects with 401 if the route is not behind `user_auth`.
pub struct CurrentUser(pub UserContext);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserContext>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AuthError::unauthorized("no user context"))
    }
}

/// Extracts the [`AuthenticatedClient`] inserted by `client_auth`.
pub struct CurrentClient(pub AuthenticatedClient);

impl<S> FromRequestParts<S> for CurrentClient
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedClient>()
            .cloned()
            .map(CurrentClient)
            .ok_or_else(|| AuthError::unauthorized("no client context"))
    }
}
