//! Authentication and authorization core for Warden.
//!
//! This crate decides, for every inbound request, who is making it and
//! whether they may proceed:
//!
//! - [`session`] - user session lifecycle (login, registration, refresh,
//!   password change, logout, profile)
//! - [`token`] - HS256 user credentials and remote key sets for service
//!   client tokens
//! - [`password`] - Argon2id password hashing
//! - [`policy`] - role graph evaluation over persisted grouping edges and
//!   allow rules
//! - [`client`] - service-client authentication (cache-aside or stateless)
//! - [`middleware`] - axum route guards and request context extractors
//! - [`storage`] - storage traits plus in-memory implementations
//!
//! Persistent backends live in `warden-auth-postgres`; the HTTP server and
//! the Redis client cache live in `warden-server`.

pub mod client;
pub mod config;
pub mod error;
pub mod middleware;
pub mod password;
pub mod policy;
pub mod session;
pub mod storage;
pub mod token;

#[cfg(test)]
mod testing;

pub use config::{AuthConfig, ClientAuthConfig, ClientAuthMode, ConfigError, TokenConfig};
pub use error::{AuthError, ErrorCategory};

/// Result type alias for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Commonly used types.
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::client::{
        AuthenticatedClient, ClientAuthenticator, JwksClientAuthenticator,
        StoreClientAuthenticator, build_client_authenticator,
    };
    pub use crate::config::{AuthConfig, ClientAuthConfig, ClientAuthMode, TokenConfig};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::middleware::{AuthState, CurrentClient, CurrentUser, UserContext};
    pub use crate::policy::PolicyEngine;
    pub use crate::session::{
        ChangePasswordRequest, LoginRequest, RefreshTokenRequest, RegisterRequest, SessionService,
        UpdateProfileRequest,
    };
    pub use crate::storage::{
        CacheError, Client, ClientCache, ClientFilter, ClientInput, ClientStorage, GroupingEdge,
        PolicyRule, PolicyStorage, User, UserStatus, UserStorage,
    };
    pub use crate::token::{Claims, JwtService, TokenKind, TokenPair};
}
