//! Service-client authentication.
//!
//! A service client presents a bearer credential. How it is checked is a
//! deployment decision made once at startup ([`ClientAuthMode`]):
//!
//! - **store**: the bearer is an opaque key. [`StoreClientAuthenticator`]
//!   looks it up cache-aside: cache first, then the durable store, writing
//!   the result back into the cache.
//! - **jwks**: the bearer is a JWT signed by an external issuer.
//!   [`JwksClientAuthenticator`] verifies it against the issuer's published
//!   key set and never touches the store or cache.

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::config::{ClientAuthConfig, ClientAuthMode};
use crate::error::AuthError;
use crate::storage::{CacheError, Client, ClientCache, ClientFilter, ClientStorage};
use crate::token::RemoteKeySet;

/// A service client whose credential has been accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedClient {
    /// Client ID (store mode) or token subject (jwks mode).
    pub id: String,
    /// Client name, when known.
    pub name: String,
    /// Which strategy accepted the credential.
    pub mode: ClientAuthMode,
}

impl From<Client> for AuthenticatedClient {
    fn from(client: Client) -> Self {
        Self {
            id: client.id,
            name: client.name,
            mode: ClientAuthMode::Store,
        }
    }
}

/// Verifies service-client bearer credentials.
#[async_trait]
pub trait ClientAuthenticator: Send + Sync {
    /// Authenticates a bearer credential.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` / `InvalidCredentials` if the credential is rejected
    /// - `Infrastructure` if the store or key set cannot be consulted
    async fn authenticate(&self, bearer: &str) -> AuthResult<AuthenticatedClient>;
}

/// Builds the authenticator selected by configuration.
///
/// # Errors
///
/// Returns `Configuration` if `jwks` mode lacks a usable key set URL.
pub fn build_client_authenticator(
    config: &ClientAuthConfig,
    store: Arc<dyn ClientStorage>,
    cache: Arc<dyn ClientCache>,
) -> AuthResult<Arc<dyn ClientAuthenticator>> {
    match config.mode {
        ClientAuthMode::Store => Ok(Arc::new(StoreClientAuthenticator::new(store, cache))),
        ClientAuthMode::Jwks => {
            let url = config
                .jwks_url
                .clone()
                .ok_or_else(|| AuthError::configuration("client_auth.jwks_url is required"))?;
            let keys = RemoteKeySet::new(url, config.jwks_ttl, config.jwks_timeout, config.allow_http)
                .map_err(|e| AuthError::configuration(format!("invalid key set: {}", e)))?;
            Ok(Arc::new(JwksClientAuthenticator::new(keys)))
        }
    }
}

// =============================================================================
// Store (cache-aside)
// =============================================================================

/// Cache-aside lookup of opaque bearer keys.
///
/// The cache is an optimization only. Every miss, and every cache failure,
/// falls through to the store before a negative answer is given. Concurrent
/// misses for the same key are not coalesced.
pub struct StoreClientAuthenticator {
    store: Arc<dyn ClientStorage>,
    cache: Arc<dyn ClientCache>,
}

impl StoreClientAuthenticator {
    /// Creates a new store-backed authenticator.
    #[must_use]
    pub fn new(store: Arc<dyn ClientStorage>, cache: Arc<dyn ClientCache>) -> Self {
        Self { store, cache }
    }
}

#[async_trait]
impl ClientAuthenticator for StoreClientAuthenticator {
    async fn authenticate(&self, bearer: &str) -> AuthResult<AuthenticatedClient> {
        match self.cache.get(bearer).await {
            Ok(client) => {
                tracing::debug!(client_id = %client.id, "Client cache hit");
                return Ok(client.into());
            }
            Err(CacheError::Miss) => tracing::debug!("Client cache miss"),
            Err(e) => tracing::warn!(error = %e, "Client cache lookup failed, using store"),
        }

        let exists = self.store.is_exists(bearer).await.map_err(|e| {
            tracing::error!(error = %e, "Client store lookup failed");
            AuthError::infrastructure("client store unavailable")
        })?;
        if !exists {
            return Err(AuthError::unauthorized("unknown client"));
        }

        let client = self
            .store
            .find_by_filter(&ClientFilter::by_bearer_key(bearer))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Client store fetch failed");
                AuthError::infrastructure("client store unavailable")
            })?
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::unauthorized("unknown client"))?;

        if let Err(e) = self.cache.set(&client).await {
            tracing::warn!(client_id = %client.id, error = %e, "Failed to populate client cache");
        }

        Ok(client.into())
    }
}

// =============================================================================
// JWKS (stateless)
// =============================================================================

#[derive(Debug, Deserialize)]
struct ClientTokenClaims {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    client_name: Option<String>,
}

/// Stateless verification of client JWTs against a remote key set.
pub struct JwksClientAuthenticator {
    keys: RemoteKeySet,
}

impl JwksClientAuthenticator {
    /// Creates an authenticator over `keys`.
    #[must_use]
    pub fn new(keys: RemoteKeySet) -> Self {
        Self { keys }
    }
}

fn is_asymmetric(alg: Algorithm) -> bool {
    !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

#[async_trait]
impl ClientAuthenticator for JwksClientAuthenticator {
    async fn authenticate(&self, bearer: &str) -> AuthResult<AuthenticatedClient> {
        let header = decode_header(bearer).map_err(|e| {
            tracing::debug!(error = %e, "Client token header unreadable");
            AuthError::InvalidCredentials
        })?;

        if !is_asymmetric(header.alg) {
            tracing::debug!(alg = ?header.alg, "Client token uses a symmetric algorithm");
            return Err(AuthError::InvalidCredentials);
        }

        let candidates = self
            .keys
            .decoding_keys(header.kid.as_deref())
            .await
            .map_err(|e| {
                if e.is_fetch_error() {
                    tracing::error!(url = %self.keys.url(), error = %e, "Key set unavailable");
                    AuthError::infrastructure("client key set unavailable")
                } else {
                    tracing::debug!(error = %e, "No key for client token");
                    AuthError::InvalidCredentials
                }
            })?;

        let mut validation = Validation::new(header.alg);
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        for (key, alg) in candidates.iter().filter(|(_, alg)| *alg == header.alg) {
            match decode::<ClientTokenClaims>(bearer, key, &validation) {
                Ok(data) => {
                    let claims = data.claims;
                    let name = claims
                        .name
                        .or(claims.client_name)
                        .unwrap_or_else(|| claims.sub.clone());
                    tracing::debug!(client_id = %claims.sub, alg = ?alg, "Client token accepted");
                    return Ok(AuthenticatedClient {
                        id: claims.sub,
                        name,
                        mode: ClientAuthMode::Jwks,
                    });
                }
                Err(e) => tracing::debug!(error = %e, "Client token rejected by key"),
            }
        }

        Err(AuthError::InvalidCredentials)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use time::OffsetDateTime;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::storage::{ClientInput, LocalClientCache, MemoryClientStorage};
    use crate::testing::EcKey;

    // -------------------------------------------------------------------------
    // Doubles
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct CountingStore {
        inner: MemoryClientStorage,
        exists_calls: AtomicUsize,
        find_calls: AtomicUsize,
        fail: AtomicBool,
        hide_on_find: AtomicBool,
    }

    #[async_trait]
    impl ClientStorage for CountingStore {
        async fn is_exists(&self, bearer_key: &str) -> AuthResult<bool> {
            self.exists_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(AuthError::infrastructure("connection refused"));
            }
            self.inner.is_exists(bearer_key).await
        }

        async fn find_by_filter(&self, filter: &ClientFilter) -> AuthResult<Vec<Client>> {
            self.find_calls.fetch_add(1, Ordering::SeqCst);
            if self.hide_on_find.load(Ordering::SeqCst) {
                return Ok(Vec::new());
            }
            self.inner.find_by_filter(filter).await
        }

        async fn upsert(&self, inputs: &[ClientInput]) -> AuthResult<Vec<Client>> {
            self.inner.upsert(inputs).await
        }

        async fn delete_by_filter(&self, filter: &ClientFilter) -> AuthResult<u64> {
            self.inner.delete_by_filter(filter).await
        }
    }

    struct BrokenCache {
        inner: LocalClientCache,
        fail_get: bool,
        fail_set: bool,
    }

    #[async_trait]
    impl ClientCache for BrokenCache {
        async fn get(&self, bearer_key: &str) -> Result<Client, CacheError> {
            if self.fail_get {
                return Err(CacheError::Backend("connection reset".to_string()));
            }
            self.inner.get(bearer_key).await
        }

        async fn set(&self, client: &Client) -> Result<(), CacheError> {
            if self.fail_set {
                return Err(CacheError::Backend("read-only replica".to_string()));
            }
            self.inner.set(client).await
        }

        async fn invalidate(&self, bearer_key: &str) -> Result<(), CacheError> {
            self.inner.invalidate(bearer_key).await
        }
    }

    fn local_cache() -> Arc<LocalClientCache> {
        Arc::new(LocalClientCache::new(Duration::from_secs(60), 100))
    }

    async fn seeded_store() -> Arc<CountingStore> {
        let store = Arc::new(CountingStore::default());
        store
            .inner
            .upsert(&[ClientInput {
                name: "billing".to_string(),
                bearer_key: "key-1".to_string(),
            }])
            .await
            .unwrap();
        store
    }

    // -------------------------------------------------------------------------
    // Store mode
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_store_hit_populates_cache() {
        let store = seeded_store().await;
        let cache = local_cache();
        let auth = StoreClientAuthenticator::new(store.clone(), cache.clone());

        let first = auth.authenticate("key-1").await.unwrap();
        assert_eq!(first.name, "billing");
        assert_eq!(first.mode, ClientAuthMode::Store);
        assert!(cache.get("key-1").await.is_ok());

        let second = auth.authenticate("key-1").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.exists_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.find_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_store() {
        let store = seeded_store().await;
        let cache = local_cache();
        let now = OffsetDateTime::now_utc();
        cache
            .set(&Client {
                id: "cached".to_string(),
                name: "from-cache".to_string(),
                bearer_key: "key-9".to_string(),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let auth = StoreClientAuthenticator::new(store.clone(), cache);
        let client = auth.authenticate("key-9").await.unwrap();
        assert_eq!(client.id, "cached");
        assert_eq!(store.exists_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_key_unauthorized_and_not_cached() {
        let store = seeded_store().await;
        let cache = local_cache();
        let auth = StoreClientAuthenticator::new(store.clone(), cache.clone());

        assert!(matches!(
            auth.authenticate("nope").await,
            Err(AuthError::Unauthorized { .. })
        ));
        assert!(cache.get("nope").await.unwrap_err().is_miss());
        assert_eq!(store.find_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_infrastructure() {
        let store = seeded_store().await;
        store.fail.store(true, Ordering::SeqCst);
        let auth = StoreClientAuthenticator::new(store, local_cache());

        let err = auth.authenticate("key-1").await.unwrap_err();
        assert!(matches!(err, AuthError::Infrastructure { .. }));
        assert!(err.is_server_error());
    }

    #[tokio::test]
    async fn test_cache_failure_falls_through_to_store() {
        let store = seeded_store().await;
        let cache = Arc::new(BrokenCache {
            inner: LocalClientCache::new(Duration::from_secs(60), 10),
            fail_get: true,
            fail_set: true,
        });
        let auth = StoreClientAuthenticator::new(store.clone(), cache);

        assert!(auth.authenticate("key-1").await.is_ok());
        assert!(auth.authenticate("key-1").await.is_ok());
        assert_eq!(store.exists_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_write_failure_still_authenticates() {
        let store = seeded_store().await;
        let cache = Arc::new(BrokenCache {
            inner: LocalClientCache::new(Duration::from_secs(60), 10),
            fail_get: false,
            fail_set: true,
        });
        let auth = StoreClientAuthenticator::new(store, cache.clone());

        assert!(auth.authenticate("key-1").await.is_ok());
        assert!(cache.inner.get("key-1").await.unwrap_err().is_miss());
    }

    #[tokio::test]
    async fn test_record_vanishing_between_calls() {
        let store = seeded_store().await;
        store.hide_on_find.store(true, Ordering::SeqCst);
        let auth = StoreClientAuthenticator::new(store, local_cache());

        assert!(matches!(
            auth.authenticate("key-1").await,
            Err(AuthError::Unauthorized { .. })
        ));
    }

    // -------------------------------------------------------------------------
    // JWKS mode
    // -------------------------------------------------------------------------

    #[derive(Serialize)]
    struct TestClaims<'a> {
        sub: &'a str,
        name: &'a str,
        exp: i64,
    }

    async fn jwks_server(key: &EcKey) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(key.jwks()))
            .mount(&server)
            .await;
        server
    }

    fn jwks_config(server: &MockServer) -> ClientAuthConfig {
        ClientAuthConfig {
            mode: ClientAuthMode::Jwks,
            jwks_url: Some(
                Url::parse(&format!("{}/.well-known/jwks.json", server.uri())).unwrap(),
            ),
            allow_http: true,
            ..ClientAuthConfig::default()
        }
    }

    fn in_future() -> i64 {
        OffsetDateTime::now_utc().unix_timestamp() + 300
    }

    #[tokio::test]
    async fn test_jwks_accepts_signed_token_without_store() {
        let key = EcKey::generate("svc-key");
        let server = jwks_server(&key).await;
        let store = seeded_store().await;
        let auth =
            build_client_authenticator(&jwks_config(&server), store.clone(), local_cache()).unwrap();

        let token = key.sign(&TestClaims {
            sub: "reporting",
            name: "Reporting Service",
            exp: in_future(),
        });
        let client = auth.authenticate(&token).await.unwrap();

        assert_eq!(client.id, "reporting");
        assert_eq!(client.name, "Reporting Service");
        assert_eq!(client.mode, ClientAuthMode::Jwks);
        assert_eq!(store.exists_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_jwks_rejects_foreign_key() {
        let published = EcKey::generate("svc-key");
        let forged = EcKey::generate("svc-key");
        let server = jwks_server(&published).await;
        let auth =
            build_client_authenticator(&jwks_config(&server), seeded_store().await, local_cache())
                .unwrap();

        let token = forged.sign(&TestClaims {
            sub: "reporting",
            name: "x",
            exp: in_future(),
        });
        assert!(matches!(
            auth.authenticate(&token).await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_jwks_rejects_expired_token() {
        let key = EcKey::generate("svc-key");
        let server = jwks_server(&key).await;
        let auth =
            build_client_authenticator(&jwks_config(&server), seeded_store().await, local_cache())
                .unwrap();

        let token = key.sign(&TestClaims {
            sub: "reporting",
            name: "x",
            exp: OffsetDateTime::now_utc().unix_timestamp() - 3600,
        });
        assert!(matches!(
            auth.authenticate(&token).await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_jwks_rejects_symmetric_and_garbage() {
        let key = EcKey::generate("svc-key");
        let server = jwks_server(&key).await;
        let auth =
            build_client_authenticator(&jwks_config(&server), seeded_store().await, local_cache())
                .unwrap();

        let hmac = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(Algorithm::HS256),
            &TestClaims {
                sub: "reporting",
                name: "x",
                exp: in_future(),
            },
            &jsonwebtoken::EncodingKey::from_secret(b"shared"),
        )
        .unwrap();

        assert!(matches!(
            auth.authenticate(&hmac).await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.authenticate("key-1").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_jwks_endpoint_down_is_infrastructure() {
        let key = EcKey::generate("svc-key");
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let auth =
            build_client_authenticator(&jwks_config(&server), seeded_store().await, local_cache())
                .unwrap();

        let token = key.sign(&TestClaims {
            sub: "reporting",
            name: "x",
            exp: in_future(),
        });
        assert!(matches!(
            auth.authenticate(&token).await,
            Err(AuthError::Infrastructure { .. })
        ));
    }

    #[tokio::test]
    async fn test_jwks_mode_requires_url() {
        let config = ClientAuthConfig {
            mode: ClientAuthMode::Jwks,
            ..ClientAuthConfig::default()
        };
        let result = build_client_authenticator(&config, seeded_store().await, local_cache());
        assert!(matches!(result, Err(AuthError::Configuration { .. })));
    }
}
