//! Authentication and authorization configuration.
//!
//! The configuration is an explicit value threaded through constructors; the
//! core never reads the process environment itself. The server crate fills it
//! from `warden.toml` and `WARDEN__AUTH__*` environment variables.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Root authentication and authorization configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// internal_key = "change-me"
/// default_role = "user"
///
/// [auth.token]
/// access_secret = "..."
/// refresh_secret = "..."
/// access_token_lifetime = "24h"
/// refresh_token_lifetime = "7d"
///
/// [auth.client_auth]
/// mode = "store"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Credential signing configuration.
    pub token: TokenConfig,

    /// Pre-shared key guarding internal-service routes.
    pub internal_key: String,

    /// Role assigned to users that register without one.
    pub default_role: String,

    /// Service-client authentication configuration.
    pub client_auth: ClientAuthConfig,
}

/// Credential signing configuration.
///
/// Access and refresh credentials are signed with different secrets so one
/// can never be accepted in place of the other.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// HMAC secret for access credentials.
    pub access_secret: String,

    /// HMAC secret for refresh credentials.
    pub refresh_secret: String,

    /// Access credential lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh credential lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_secret: String::new(),
            refresh_secret: String::new(),
            access_token_lifetime: Duration::from_secs(24 * 3600), // 24 hours
            refresh_token_lifetime: Duration::from_secs(7 * 24 * 3600), // 7 days
        }
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &redacted(&self.access_secret))
            .field("refresh_secret", &redacted(&self.refresh_secret))
            .field("access_token_lifetime", &self.access_token_lifetime)
            .field("refresh_token_lifetime", &self.refresh_token_lifetime)
            .finish()
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() { "<unset>" } else { "<redacted>" }
}

/// How service clients prove their identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientAuthMode {
    /// Bearer key looked up in the client cache, falling back to the store.
    #[default]
    Store,
    /// Bearer is a JWT verified against a remote JSON Web Key Set.
    Jwks,
}

/// Service-client authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientAuthConfig {
    /// Verification strategy, selected once at startup.
    pub mode: ClientAuthMode,

    /// Key set location, required in `jwks` mode.
    pub jwks_url: Option<Url>,

    /// How long a fetched key set is trusted.
    #[serde(with = "humantime_serde")]
    pub jwks_ttl: Duration,

    /// HTTP timeout for key set fetches.
    #[serde(with = "humantime_serde")]
    pub jwks_timeout: Duration,

    /// Permit `http://` key set URLs. Development and tests only.
    pub allow_http: bool,

    /// Lifetime of client entries in the client cache.
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
}

impl Default for ClientAuthConfig {
    fn default() -> Self {
        Self {
            mode: ClientAuthMode::Store,
            jwks_url: None,
            jwks_ttl: Duration::from_secs(3600),
            jwks_timeout: Duration::from_secs(10),
            allow_http: false,
            cache_ttl: Duration::from_secs(300),
        }
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Returns the role given to users registering without one.
    #[must_use]
    pub fn default_role(&self) -> &str {
        if self.default_role.is_empty() {
            "user"
        } else {
            &self.default_role
        }
    }

    /// Validates the configuration. Intended to run once at startup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if a secret, the internal key, or the
    /// key set URL in `jwks` mode is absent, and `ConfigError::InvalidValue`
    /// if the two signing secrets are identical, a lifetime is zero, or the
    /// key set URL scheme is not allowed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.access_secret.is_empty() {
            return Err(ConfigError::Missing("auth.token.access_secret".to_string()));
        }
        if self.token.refresh_secret.is_empty() {
            return Err(ConfigError::Missing(
                "auth.token.refresh_secret".to_string(),
            ));
        }
        if self.token.access_secret == self.token.refresh_secret {
            return Err(ConfigError::InvalidValue(
                "access and refresh secrets must differ".to_string(),
            ));
        }
        if self.token.access_token_lifetime.is_zero() || self.token.refresh_token_lifetime.is_zero()
        {
            return Err(ConfigError::InvalidValue(
                "token lifetimes must be > 0".to_string(),
            ));
        }
        if self.internal_key.is_empty() {
            return Err(ConfigError::Missing("auth.internal_key".to_string()));
        }

        if self.client_auth.mode == ClientAuthMode::Jwks {
            let url = self
                .client_auth
                .jwks_url
                .as_ref()
                .ok_or_else(|| ConfigError::Missing("auth.client_auth.jwks_url".to_string()))?;
            match url.scheme() {
                "https" => {}
                "http" if self.client_auth.allow_http => {}
                other => {
                    return Err(ConfigError::InvalidValue(format!(
                        "jwks_url scheme '{}' is not allowed",
                        other
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AuthConfig {
        AuthConfig {
            token: TokenConfig {
                access_secret: "access-secret".to_string(),
                refresh_secret: "refresh-secret".to_string(),
                ..TokenConfig::default()
            },
            internal_key: "internal".to_string(),
            ..AuthConfig::default()
        }
    }

    #[test]
    fn test_default_lifetimes() {
        let config = TokenConfig::default();
        assert_eq!(config.access_token_lifetime, Duration::from_secs(86_400));
        assert_eq!(config.refresh_token_lifetime, Duration::from_secs(604_800));
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_access_secret_fails() {
        let mut config = valid_config();
        config.token.access_secret.clear();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
        assert!(err.to_string().contains("access_secret"));
    }

    #[test]
    fn test_identical_secrets_fail() {
        let mut config = valid_config();
        config.token.refresh_secret = config.token.access_secret.clone();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_jwks_mode_requires_url() {
        let mut config = valid_config();
        config.client_auth.mode = ClientAuthMode::Jwks;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Missing(_)
        ));

        config.client_auth.jwks_url = Some(Url::parse("http://keys.local/jwks").unwrap());
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::InvalidValue(_)
        ));

        config.client_auth.allow_http = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_role_fallback() {
        let mut config = valid_config();
        assert_eq!(config.default_role(), "user");
        config.default_role = "viewer".to_string();
        assert_eq!(config.default_role(), "viewer");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = valid_config();
        let rendered = format!("{:?}", config.token);
        assert!(!rendered.contains("access-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_deserialize_humantime() {
        let json = r#"{
            "token": { "access_secret": "a", "refresh_secret": "b", "access_token_lifetime": "15m" },
            "internal_key": "k",
            "client_auth": { "mode": "jwks", "jwks_url": "https://keys.example.com/jwks" }
        }"#;
        let config: AuthConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.token.access_token_lifetime, Duration::from_secs(900));
        assert_eq!(config.client_auth.mode, ClientAuthMode::Jwks);
        assert!(config.validate().is_ok());
    }
}
