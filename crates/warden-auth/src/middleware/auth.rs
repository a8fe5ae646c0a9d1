//! Route-guard middleware.
//!
//! Each guard is an axum middleware function meant for
//! `axum::middleware::from_fn_with_state`:
//!
//! - [`internal_auth`] - pre-shared key for internal services
//! - [`client_auth`] - service-client bearer via the configured
//!   [`ClientAuthenticator`]
//! - [`user_auth`] - user access credential
//! - [`rbac`] - policy check of `(user, path, method)`; must run after
//!   [`user_auth`]
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware::from_fn_with_state, routing::get};
//! use warden_auth::middleware::{AuthState, rbac, user_auth};
//!
//! let app = Router::new()
//!     .route("/user/profile", get(profile))
//!     .layer(from_fn_with_state(state.clone(), rbac))
//!     .layer(from_fn_with_state(state.clone(), user_auth));
//! ```

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{OriginalUri, State},
    http::{HeaderMap, Request, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::client::ClientAuthenticator;
use crate::error::AuthError;
use crate::session::SessionService;
use crate::token::TokenKind;

use super::types::UserContext;

// =============================================================================
// Auth State
// =============================================================================

/// Shared state for the route guards.
#[derive(Clone)]
pub struct AuthState {
    /// Session service (credential codec and policy engine).
    pub sessions: Arc<SessionService>,

    /// Service-client verification strategy.
    pub clients: Arc<dyn ClientAuthenticator>,

    /// Pre-shared key for internal routes. Empty disables internal access.
    pub internal_key: Arc<str>,
}

impl AuthState {
    /// Creates a new auth state.
    pub fn new(
        sessions: Arc<SessionService>,
        clients: Arc<dyn ClientAuthenticator>,
        internal_key: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            sessions,
            clients,
            internal_key: internal_key.into(),
        }
    }
}

// =============================================================================
// Header Parsing
// =============================================================================

/// Returns the token of an `Authorization: Bearer <token>` header, exactly
/// as sent. Extra whitespace stays part of the token.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

/// Like [`bearer_token`], but also accepts a bare credential without the
/// `Bearer ` scheme.
fn bearer_or_raw(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = match value.strip_prefix("Bearer") {
        Some(rest) if rest.is_empty() || rest.starts_with(' ') => rest.trim(),
        _ => value,
    };
    (!token.is_empty()).then_some(token)
}

// =============================================================================
// Guards
// =============================================================================

/// Admits requests carrying the configured internal key.
pub async fn internal_auth(
    State(state): State<AuthState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if state.internal_key.is_empty() {
        tracing::warn!("Internal route called but no internal key is configured");
        return AuthError::unauthorized("internal access disabled").into_response();
    }

    let rejection = match bearer_token(req.headers()) {
        Some(key) if key == &*state.internal_key => None,
        Some(_) => Some("internal key mismatch"),
        None => Some("missing bearer"),
    };

    match rejection {
        None => next.run(req).await,
        Some(reason) => AuthError::unauthorized(reason).into_response(),
    }
}

/// Admits authenticated service clients.
///
/// Inserts [`AuthenticatedClient`](crate::client::AuthenticatedClient) into
/// the request extensions.
pub async fn client_auth(
    State(state): State<AuthState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(bearer) = bearer_token(req.headers()).map(str::to_string) else {
        return AuthError::unauthorized("missing bearer").into_response();
    };

    match state.clients.authenticate(&bearer).await {
        Ok(client) => {
            tracing::debug!(client_id = %client.id, "Client authenticated");
            req.extensions_mut().insert(client);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

/// Admits requests with a valid access credential.
///
/// Inserts [`UserContext`] into the request extensions.
pub async fn user_auth(
    State(state): State<AuthState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_or_raw(req.headers()).map(str::to_string) else {
        return AuthError::unauthorized("missing credential").into_response();
    };

    let claims = match state
        .sessions
        .jwt()
        .verify_async(token, TokenKind::Access)
        .await
    {
        Ok(claims) => claims,
        Err(AuthError::InvalidCredentials) => {
            return AuthError::unauthorized("invalid access credential").into_response();
        }
        Err(e) => return e.into_response(),
    };

    if claims.sub.is_empty() {
        return AuthError::unauthorized("credential has no subject").into_response();
    }

    req.extensions_mut().insert(UserContext {
        user_id: claims.sub,
        role: claims.role.unwrap_or_default(),
    });
    next.run(req).await
}

/// Admits the request iff the policy engine permits
/// `(user_id, path, method)`.
pub async fn rbac(State(state): State<AuthState>, req: Request<Body>, next: Next) -> Response {
    let Some(user) = req.extensions().get::<UserContext>().cloned() else {
        return AuthError::unauthorized("no user context").into_response();
    };

    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().as_str().to_string();

    match state.sessions.enforce(&user.user_id, &path, &method).await {
        Ok(true) => next.run(req).await,
        Ok(false) => {
            tracing::info!(user_id = %user.user_id, path = %path, method = %method, "Access denied");
            AuthError::forbidden("access denied").into_response()
        }
        Err(e) => e.into_response(),
    }
}
