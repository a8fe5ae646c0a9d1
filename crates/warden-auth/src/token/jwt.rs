//! JWT credential signing and verification.
//!
//! Two credential kinds are issued, each signed with its own HMAC secret:
//!
//! - **access**: `sub`, `role`, `iat`, `exp` (default lifetime 24 hours)
//! - **refresh**: `sub`, `iat`, `exp` (default lifetime 7 days)
//!
//! Verification selects the secret by the *expected* kind, so an access
//! credential presented where a refresh credential is required fails the
//! signature check and vice versa.
//!
//! ## Example
//!
//! ```ignore
//! use warden_auth::token::{JwtService, TokenKind};
//!
//! let jwt = JwtService::new(&config.token);
//! let token = jwt.issue_access("user-1", "admin")?;
//! let claims = jwt.verify(&token, TokenKind::Access)?;
//! assert_eq!(claims.sub, "user-1");
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::TokenConfig;
use crate::error::AuthError;

// ============================================================================
// Error Types
// ============================================================================

/// Reasons a credential failed verification.
///
/// These never leave the crate boundary as-is; they are logged and collapsed
/// into [`AuthError::InvalidCredentials`].
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token was signed with an algorithm other than the expected one.
    #[error("Unexpected signing algorithm")]
    InvalidAlgorithm,

    /// A required claim is missing or malformed.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },

    /// The token could not be decoded at all.
    #[error("Malformed token: {message}")]
    Malformed {
        /// Description of the decoding error.
        message: String,
    },
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => Self::InvalidAlgorithm,
            ErrorKind::InvalidSubject | ErrorKind::MissingRequiredClaim(_) => Self::InvalidClaims {
                message: err.to_string(),
            },
            _ => Self::Malformed {
                message: err.to_string(),
            },
        }
    }
}

// ============================================================================
// Token Kinds and Claims
// ============================================================================

/// The two credential kinds. Never interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Short-lived credential presented on every request.
    Access,
    /// Long-lived credential exchanged for a new pair.
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access => f.write_str("access"),
            Self::Refresh => f.write_str("refresh"),
        }
    }
}

/// Claims carried by both credential kinds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,

    /// Role label at issuance time. Access credentials only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,
}

impl Claims {
    /// Builds claims issued now and valid for `lifetime`.
    #[must_use]
    pub fn new(subject: impl Into<String>, role: Option<String>, lifetime: Duration) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Self {
            sub: subject.into(),
            role,
            iat: now,
            exp: now + lifetime.as_secs() as i64,
        }
    }
}

/// An access + refresh credential pair returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access credential.
    pub access_token: String,
    /// Refresh credential.
    pub refresh_token: String,
}

// ============================================================================
// JWT Service
// ============================================================================

/// Signing and verification keys for one credential kind.
#[derive(Clone)]
struct HmacKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl HmacKeys {
    fn from_secret(secret: &str) -> Option<Self> {
        if secret.is_empty() {
            return None;
        }
        Some(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        })
    }
}

struct Inner {
    access: Option<HmacKeys>,
    refresh: Option<HmacKeys>,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
}

/// Service for issuing and verifying HS256 credentials.
///
/// Cheap to clone; all clones share the same keys.
#[derive(Clone)]
pub struct JwtService {
    inner: Arc<Inner>,
}

impl JwtService {
    /// The only algorithm this service signs with or accepts.
    pub const ALGORITHM: Algorithm = Algorithm::HS256;

    /// Creates a new JWT service.
    ///
    /// An empty secret leaves that kind unconfigured; issuing or verifying it
    /// then fails with a configuration error.
    #[must_use]
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                access: HmacKeys::from_secret(&config.access_secret),
                refresh: HmacKeys::from_secret(&config.refresh_secret),
                access_lifetime: config.access_token_lifetime,
                refresh_lifetime: config.refresh_token_lifetime,
            }),
        }
    }

    fn keys(&self, kind: TokenKind) -> AuthResult<&HmacKeys> {
        let keys = match kind {
            TokenKind::Access => self.inner.access.as_ref(),
            TokenKind::Refresh => self.inner.refresh.as_ref(),
        };
        keys.ok_or_else(|| AuthError::configuration(format!("{} token secret not set", kind)))
    }

    /// Issues an access credential for `user_id` carrying `role`.
    ///
    /// # Errors
    /// Returns `Configuration` if the access secret is unset.
    pub fn issue_access(&self, user_id: &str, role: &str) -> AuthResult<String> {
        let claims = Claims::new(user_id, Some(role.to_string()), self.inner.access_lifetime);
        self.encode(TokenKind::Access, &claims)
    }

    /// Issues a refresh credential for `user_id`.
    ///
    /// # Errors
    /// Returns `Configuration` if the refresh secret is unset.
    pub fn issue_refresh(&self, user_id: &str) -> AuthResult<String> {
        let claims = Claims::new(user_id, None, self.inner.refresh_lifetime);
        self.encode(TokenKind::Refresh, &claims)
    }

    /// Issues an access + refresh pair.
    ///
    /// # Errors
    /// Returns `Configuration` if either secret is unset.
    pub fn issue_pair(&self, user_id: &str, role: &str) -> AuthResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access(user_id, role)?,
            refresh_token: self.issue_refresh(user_id)?,
        })
    }

    /// Signs arbitrary claims as a credential of `kind`.
    ///
    /// # Errors
    /// Returns `Configuration` if the secret for `kind` is unset.
    pub fn encode(&self, kind: TokenKind, claims: &Claims) -> AuthResult<String> {
        let keys = self.keys(kind)?;
        encode(&Header::new(Self::ALGORITHM), claims, &keys.encoding)
            .map_err(|e| AuthError::internal(format!("failed to sign {} token: {}", kind, e)))
    }

    /// Verifies a credential expected to be of `kind`.
    ///
    /// # Errors
    /// Returns `InvalidCredentials` for a wrong signature, an unexpected
    /// algorithm, an elapsed expiry, missing claims or a malformed encoding.
    /// Returns `Configuration` if the secret for `kind` is unset.
    pub fn verify(&self, token: &str, kind: TokenKind) -> AuthResult<Claims> {
        let keys = self.keys(kind)?;

        let mut validation = Validation::new(Self::ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<Claims>(token, &keys.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let reason = JwtError::from(e);
                tracing::debug!(kind = %kind, reason = %reason, "Credential rejected");
                AuthError::InvalidCredentials
            })
    }

    /// Verifies a credential on the blocking thread pool.
    ///
    /// # Errors
    /// Same as [`JwtService::verify`].
    pub async fn verify_async(&self, token: String, kind: TokenKind) -> AuthResult<Claims> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.verify(&token, kind))
            .await
            .map_err(|e| AuthError::internal(format!("verification task failed: {}", e)))?
    }
}

// ============================================================================
// Tests
// ============================================================================
