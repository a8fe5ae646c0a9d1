//! Authentication and authorization error types.
//!
//! Every failure that leaves the core is an [`AuthError`]. The variants are
//! deliberately coarse on the authentication side: a bad password, an unknown
//! email, a forged signature and an expired token all collapse into
//! [`AuthError::InvalidCredentials`] so callers cannot tell them apart.

use std::fmt;

/// Errors that can occur during authentication and authorization operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Login or token verification failed. The cause is never exposed.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The account exists but its status is not `active`.
    #[error("Account inactive")]
    AccountInactive,

    /// Another account already uses this email address.
    #[error("Email already exists")]
    DuplicateEmail,

    /// The current password supplied for a password change is wrong.
    #[error("Incorrect old password")]
    IncorrectPassword,

    /// The policy engine could not evaluate or persist a policy.
    #[error("Policy engine error: {message}")]
    PolicyEngine {
        /// Description of the engine failure.
        message: String,
    },

    /// The request lacks a credential the subject could be recognised by.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of why the request is unauthorized.
        message: String,
    },

    /// The subject is recognised but may not perform the action.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Description of why access is forbidden.
        message: String,
    },

    /// A required secret or URL is missing or invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// A store, cache or key-set endpoint could not be reached.
    #[error("Infrastructure error: {message}")]
    Infrastructure {
        /// Description of the infrastructure failure.
        message: String,
    },

    /// The request payload is malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// The requested record does not exist.
    #[error("Not found: {message}")]
    NotFound {
        /// Description of what was not found.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `PolicyEngine` error.
    #[must_use]
    pub fn policy_engine(message: impl Into<String>) -> Self {
        Self::PolicyEngine {
            message: message.into(),
        }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Infrastructure` error.
    #[must_use]
    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::Infrastructure {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::AccountInactive
                | Self::DuplicateEmail
                | Self::IncorrectPassword
                | Self::Unauthorized { .. }
                | Self::Forbidden { .. }
                | Self::InvalidRequest { .. }
                | Self::NotFound { .. }
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::PolicyEngine { .. }
                | Self::Configuration { .. }
                | Self::Infrastructure { .. }
                | Self::Internal { .. }
        )
    }

    /// Returns `true` if this is an authentication error.
    #[must_use]
    pub fn is_authentication_error(&self) -> bool {
        matches!(self, Self::InvalidCredentials | Self::Unauthorized { .. })
    }

    /// Returns `true` if this is an authorization error.
    #[must_use]
    pub fn is_authorization_error(&self) -> bool {
        matches!(self, Self::AccountInactive | Self::Forbidden { .. })
    }

    /// Returns the error category for logging and response bodies.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidCredentials => ErrorCategory::Authentication,
            Self::AccountInactive => ErrorCategory::Authorization,
            Self::DuplicateEmail => ErrorCategory::Conflict,
            Self::IncorrectPassword => ErrorCategory::Validation,
            Self::PolicyEngine { .. } => ErrorCategory::PolicyEngine,
            Self::Unauthorized { .. } => ErrorCategory::Authentication,
            Self::Forbidden { .. } => ErrorCategory::Authorization,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Infrastructure { .. } => ErrorCategory::Infrastructure,
            Self::InvalidRequest { .. } => ErrorCategory::Validation,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Stable categories of authentication/authorization errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Identity could not be established.
    Authentication,
    /// Identity established, action not permitted.
    Authorization,
    /// Uniqueness violated.
    Conflict,
    /// Request validation errors.
    Validation,
    /// The requested record is absent.
    NotFound,
    /// Policy evaluation or persistence failed.
    PolicyEngine,
    /// Store, cache or remote endpoint failure.
    Infrastructure,
    /// Missing or invalid configuration.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl ErrorCategory {
    /// Returns the category as a stable snake_case string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::Conflict => "conflict",
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::PolicyEngine => "policy_engine",
            Self::Infrastructure => "infrastructure",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(AuthError::InvalidCredentials.to_string(), "Invalid credentials");
        assert_eq!(AuthError::DuplicateEmail.to_string(), "Email already exists");
        assert_eq!(
            AuthError::policy_engine("storage down").to_string(),
            "Policy engine error: storage down"
        );
        assert_eq!(
            AuthError::infrastructure("redis unreachable").to_string(),
            "Infrastructure error: redis unreachable"
        );
    }

    #[test]
    fn test_error_predicates() {
        let err = AuthError::InvalidCredentials;
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
        assert!(err.is_authentication_error());
        assert!(!err.is_authorization_error());

        let err = AuthError::forbidden("no access");
        assert!(err.is_client_error());
        assert!(!err.is_authentication_error());
        assert!(err.is_authorization_error());

        let err = AuthError::policy_engine("boom");
        assert!(!err.is_client_error());
        assert!(err.is_server_error());

        let err = AuthError::infrastructure("database down");
        assert!(err.is_server_error());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::InvalidCredentials.category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            AuthError::unauthorized("x").category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            AuthError::forbidden("x").category(),
            ErrorCategory::Authorization
        );
        assert_eq!(
            AuthError::configuration("x").category(),
            ErrorCategory::Configuration
        );
        assert_eq!(AuthError::DuplicateEmail.category(), ErrorCategory::Conflict);
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Authentication.to_string(), "authentication");
        assert_eq!(ErrorCategory::PolicyEngine.to_string(), "policy_engine");
        assert_eq!(ErrorCategory::NotFound.to_string(), "not_found");
    }
}
