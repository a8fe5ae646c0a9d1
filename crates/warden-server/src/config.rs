use serde::{Deserialize, Serialize};
use warden_auth::AuthConfig;

/// Server configuration, loaded from `warden.toml` and `WARDEN__*`
/// environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.auth.validate().map_err(|e| e.to_string())?;

        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.storage.backend == StorageBackend::Postgres && self.storage.postgres.url.is_empty()
        {
            return Err("storage.postgres.url is required when storage.backend = \"postgres\"".into());
        }
        if self.cache.backend == CacheBackendKind::Redis && self.cache.redis.url.is_empty() {
            return Err("cache.redis.url is required when cache.backend = \"redis\"".into());
        }
        if self.cache.max_entries == 0 {
            return Err("cache.max_entries must be > 0".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub postgres: PostgresConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_pg_pool_size")]
    pub pool_size: u32,
}

fn default_pg_pool_size() -> u32 {
    10
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_size: default_pg_pool_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Local,
    Redis,
}

/// Client cache configuration. Entry lifetime is `auth.client_auth.cache_ttl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackendKind,
    #[serde(default)]
    pub redis: RedisConfig,
    /// Capacity of the local cache.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_entries() -> usize {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Local,
            redis: RedisConfig::default(),
            max_entries: default_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_pool_size() -> usize {
    10
}
fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_PATH: &str = "warden.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        let mut builder = Config::builder();
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., WARDEN__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("WARDEN")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};
    use warden_auth::ClientAuthMode;

    fn parse(toml: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    const VALID: &str = r#"
        [auth]
        internal_key = "internal"

        [auth.token]
        access_secret = "access"
        refresh_secret = "refresh"
    "#;

    #[test]
    fn test_defaults() {
        let cfg = parse(VALID);
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.storage.backend, StorageBackend::Memory);
        assert_eq!(cfg.cache.backend, CacheBackendKind::Local);
        assert_eq!(cfg.cache.max_entries, 10_000);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.auth.default_role(), "user");
        assert_eq!(cfg.auth.client_auth.mode, ClientAuthMode::Store);
        assert_eq!(
            cfg.auth.token.access_token_lifetime,
            std::time::Duration::from_secs(24 * 3600)
        );
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_humantime_lifetimes() {
        let cfg = parse(&format!(
            "{VALID}\naccess_token_lifetime = \"15m\"\nrefresh_token_lifetime = \"2d\"\n"
        ));
        assert_eq!(
            cfg.auth.token.access_token_lifetime,
            std::time::Duration::from_secs(15 * 60)
        );
        assert_eq!(
            cfg.auth.token.refresh_token_lifetime,
            std::time::Duration::from_secs(2 * 24 * 3600)
        );
    }

    #[test]
    fn test_missing_secrets_rejected() {
        let cfg = parse("[auth]\ninternal_key = \"internal\"\n");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_postgres_requires_url() {
        let cfg = parse(&format!("{VALID}\n[storage]\nbackend = \"postgres\"\n"));
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("storage.postgres.url"));
    }

    #[test]
    fn test_redis_requires_url() {
        let cfg = parse(&format!("{VALID}\n[cache]\nbackend = \"redis\"\n"));
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("cache.redis.url"));
    }

    #[test]
    fn test_jwks_mode_requires_url() {
        let cfg = parse(&format!("{VALID}\n[auth.client_auth]\nmode = \"jwks\"\n"));
        assert!(cfg.validate().is_err());
    }
}
