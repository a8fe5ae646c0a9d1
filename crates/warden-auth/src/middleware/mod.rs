//! HTTP middleware for authentication and authorization.
//!
//! This module provides:
//!
//! - route guards for internal services, service clients and users
//! - role-based authorization of `(user, path, method)`
//! - request context extractors for handlers
//! - the error response envelope

pub mod auth;
pub mod error;
pub mod types;

pub use auth::{AuthState, client_auth, internal_auth, rbac, user_auth};
pub use error::error_body;
pub use types::{CurrentClient, CurrentUser, UserContext};
