//! Remote JSON Web Key Set fetching and caching.
//!
//! [`RemoteKeySet`] holds the public keys published at a single JWKS URL.
//! Keys are fetched lazily, trusted for a configured TTL, and refetched early
//! when a token names a `kid` that the cached set does not contain (key
//! rotation on the issuer side). Early refetches are spaced at least
//! [`RemoteKeySet::min_refetch_interval`] apart, so tokens carrying random
//! `kid`s cannot drive traffic to the key set endpoint.
//!
//! Only asymmetric keys are ever returned. Symmetric (`oct`) entries and
//! encryption keys are skipped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::{Mutex, RwLock};
use url::Url;

/// Maximum accepted key set response size in bytes.
const MAX_RESPONSE_SIZE: u64 = 1024 * 1024;

/// Upper bound on the spacing of unknown-`kid` refetches.
const MAX_REFETCH_INTERVAL: Duration = Duration::from_secs(30);

/// Errors that can occur while obtaining keys.
#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Client(String),

    /// A network error occurred while fetching the key set.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The endpoint returned a non-success status code.
    #[error("HTTP error: status {0}")]
    HttpError(u16),

    /// The response body was not a key set.
    #[error("Failed to parse JWKS: {0}")]
    ParseError(String),

    /// The response exceeded [`MAX_RESPONSE_SIZE`].
    #[error("JWKS response too large")]
    ResponseTooLarge,

    /// The key set URL scheme is not allowed.
    #[error("Invalid URL scheme: only HTTPS is allowed")]
    InvalidScheme,

    /// No usable key matches the token.
    #[error("Key not found: {0}")]
    KeyNotFound(String),
}

impl JwksError {
    /// Returns `true` if the key set itself could not be obtained, as opposed
    /// to the token referencing a key the set does not contain.
    #[must_use]
    pub fn is_fetch_error(&self) -> bool {
        !matches!(self, Self::KeyNotFound(_))
    }
}

struct CachedKeys {
    set: JwkSet,
    fetched_at: Instant,
}

/// Cached view of one remote key set.
pub struct RemoteKeySet {
    http_client: reqwest::Client,
    url: Url,
    ttl: Duration,
    min_refetch_interval: Duration,
    allow_http: bool,
    cache: Arc<RwLock<Option<CachedKeys>>>,
    refetch_gate: Mutex<()>,
}

impl RemoteKeySet {
    /// Creates a key set bound to `url`. Nothing is fetched until first use.
    ///
    /// # Errors
    ///
    /// Returns `JwksError::InvalidScheme` for a non-HTTPS URL when
    /// `allow_http` is off, or `JwksError::Client` if the HTTP client
    /// cannot be built.
    pub fn new(
        url: Url,
        ttl: Duration,
        timeout: Duration,
        allow_http: bool,
    ) -> Result<Self, JwksError> {
        match url.scheme() {
            "https" => {}
            "http" if allow_http => {}
            _ => return Err(JwksError::InvalidScheme),
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| JwksError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            url,
            ttl,
            min_refetch_interval: (ttl / 10).min(MAX_REFETCH_INTERVAL),
            allow_http,
            cache: Arc::new(RwLock::new(None)),
            refetch_gate: Mutex::new(()),
        })
    }

    /// Overrides the minimum spacing between unknown-`kid` refetches.
    /// Defaults to a tenth of the TTL, capped at 30 seconds.
    #[must_use]
    pub fn with_min_refetch_interval(mut self, interval: Duration) -> Self {
        self.min_refetch_interval = interval;
        self
    }

    /// Returns the minimum spacing between unknown-`kid` refetches.
    #[must_use]
    pub fn min_refetch_interval(&self) -> Duration {
        self.min_refetch_interval
    }

    /// Returns the key set URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the candidate verification keys for a token.
    ///
    /// With a `kid`, at most one key is returned; an unknown `kid` triggers a
    /// single refetch before giving up, unless the set was fetched less than
    /// [`Self::min_refetch_interval`] ago. Without a `kid`, every signing key
    /// in the set is returned.
    ///
    /// # Errors
    ///
    /// Returns a fetch error if the set cannot be obtained, or
    /// `JwksError::KeyNotFound` if no usable key matches.
    pub async fn decoding_keys(
        &self,
        kid: Option<&str>,
    ) -> Result<Vec<(DecodingKey, Algorithm)>, JwksError> {
        let refreshed = self.ensure_fresh().await?;

        let keys = self.select(kid).await;
        if !keys.is_empty() {
            return Ok(keys);
        }

        if let Some(kid) = kid
            && !refreshed
        {
            // Concurrent misses queue here and see the set the first one fetched.
            let _gate = self.refetch_gate.lock().await;
            if self.fetched_within(self.min_refetch_interval).await {
                tracing::debug!(kid = %kid, url = %self.url, "Unknown kid, key set fetched recently");
            } else {
                tracing::debug!(kid = %kid, url = %self.url, "Unknown kid, refetching key set");
                self.refresh().await?;
            }
            let keys = self.select(Some(kid)).await;
            if !keys.is_empty() {
                return Ok(keys);
            }
        }

        Err(JwksError::KeyNotFound(
            kid.unwrap_or("<no kid>").to_string(),
        ))
    }

    /// Fetches the set if nothing is cached or the cached copy is stale.
    /// Returns whether a fetch happened.
    async fn ensure_fresh(&self) -> Result<bool, JwksError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref()
                && cached.fetched_at.elapsed() < self.ttl
            {
                return Ok(false);
            }
        }

        self.refresh().await?;
        Ok(true)
    }

    async fn fetched_within(&self, window: Duration) -> bool {
        self.cache
            .read()
            .await
            .as_ref()
            .is_some_and(|cached| cached.fetched_at.elapsed() < window)
    }

    async fn select(&self, kid: Option<&str>) -> Vec<(DecodingKey, Algorithm)> {
        let cache = self.cache.read().await;
        let Some(cached) = cache.as_ref() else {
            return Vec::new();
        };

        cached
            .set
            .keys
            .iter()
            .filter(|jwk| match kid {
                Some(kid) => jwk.common.key_id.as_deref() == Some(kid),
                None => true,
            })
            .filter(|jwk| !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)))
            .filter_map(|jwk| {
                let alg = asymmetric_algorithm(jwk)?;
                DecodingKey::from_jwk(jwk).ok().map(|key| (key, alg))
            })
            .collect()
    }

    /// Fetches the key set unconditionally and replaces the cached copy.
    ///
    /// # Errors
    ///
    /// Returns a fetch error on network failure, a non-success status, an
    /// oversized body, or an unparsable body.
    pub async fn refresh(&self) -> Result<(), JwksError> {
        if self.url.scheme() == "http" && !self.allow_http {
            return Err(JwksError::InvalidScheme);
        }

        tracing::debug!(url = %self.url, "Fetching JWKS");

        let response = self
            .http_client
            .get(self.url.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %self.url, error = %e, "Failed to fetch JWKS");
                JwksError::NetworkError(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(JwksError::HttpError(response.status().as_u16()));
        }

        if let Some(len) = response.content_length()
            && len > MAX_RESPONSE_SIZE
        {
            return Err(JwksError::ResponseTooLarge);
        }

        let set: JwkSet = response.json().await.map_err(|e| {
            tracing::warn!(url = %self.url, error = %e, "Failed to parse JWKS");
            JwksError::ParseError(e.to_string())
        })?;

        tracing::debug!(url = %self.url, keys = set.keys.len(), "Cached JWKS");

        *self.cache.write().await = Some(CachedKeys {
            set,
            fetched_at: Instant::now(),
        });

        Ok(())
    }

    /// Drops the cached set so the next lookup fetches again.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }
}

/// Resolves the signing algorithm of an asymmetric key.
///
/// The declared `alg` wins; otherwise it is inferred from the key type.
/// Symmetric keys yield `None`.
fn asymmetric_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    if let Some(alg) = jwk.common.key_algorithm.as_ref() {
        return match alg {
            KeyAlgorithm::RS256 => Some(Algorithm::RS256),
            KeyAlgorithm::RS384 => Some(Algorithm::RS384),
            KeyAlgorithm::RS512 => Some(Algorithm::RS512),
            KeyAlgorithm::PS256 => Some(Algorithm::PS256),
            KeyAlgorithm::PS384 => Some(Algorithm::PS384),
            KeyAlgorithm::PS512 => Some(Algorithm::PS512),
            KeyAlgorithm::ES256 => Some(Algorithm::ES256),
            KeyAlgorithm::ES384 => Some(Algorithm::ES384),
            KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
            _ => None,
        };
    }

    match &jwk.algorithm {
        AlgorithmParameters::RSA(_) => Some(Algorithm::RS256),
        AlgorithmParameters::EllipticCurve(params) => match params.curve {
            EllipticCurve::P256 => Some(Algorithm::ES256),
            EllipticCurve::P384 => Some(Algorithm::ES384),
            _ => None,
        },
        AlgorithmParameters::OctetKeyPair(_) => Some(Algorithm::EdDSA),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::EcKey;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn key_set(server: &MockServer) -> RemoteKeySet {
        let url = Url::parse(&format!("{}/jwks", server.uri())).unwrap();
        RemoteKeySet::new(url, Duration::from_secs(3600), Duration::from_secs(5), true).unwrap()
    }

    #[test]
    fn test_http_rejected_unless_allowed() {
        let url = Url::parse("http://keys.local/jwks").unwrap();
        let result = RemoteKeySet::new(url, Duration::from_secs(60), Duration::from_secs(1), false);
        assert!(matches!(result, Err(JwksError::InvalidScheme)));
    }

    #[test]
    fn test_symmetric_keys_are_skipped() {
        let jwk: Jwk = serde_json::from_value(serde_json::json!({
            "kty": "oct",
            "k": "c2VjcmV0",
            "kid": "hmac"
        }))
        .unwrap();
        assert!(asymmetric_algorithm(&jwk).is_none());
    }

    #[test]
    fn test_ec_algorithm_inferred_from_curve() {
        let key = EcKey::generate("k1");
        let mut jwk_json = key.jwk();
        jwk_json.as_object_mut().unwrap().remove("alg");
        let jwk: Jwk = serde_json::from_value(jwk_json).unwrap();
        assert_eq!(asymmetric_algorithm(&jwk), Some(Algorithm::ES384));
    }

    #[tokio::test]
    async fn test_keys_cached_within_ttl() {
        let server = MockServer::start().await;
        let key = EcKey::generate("k1");

        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(key.jwks()))
            .expect(1)
            .mount(&server)
            .await;

        let keys = key_set(&server);
        assert_eq!(keys.decoding_keys(Some("k1")).await.unwrap().len(), 1);
        assert_eq!(keys.decoding_keys(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_triggers_one_refetch() {
        let server = MockServer::start().await;
        let key = EcKey::generate("k1");

        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(key.jwks()))
            .expect(2)
            .mount(&server)
            .await;

        let keys = key_set(&server).with_min_refetch_interval(Duration::ZERO);
        keys.decoding_keys(Some("k1")).await.unwrap();

        let err = keys.decoding_keys(Some("rotated")).await.unwrap_err();
        assert!(matches!(err, JwksError::KeyNotFound(_)));
        assert!(!err.is_fetch_error());
    }

    #[tokio::test]
    async fn test_unknown_kids_do_not_refetch_fresh_set() {
        let server = MockServer::start().await;
        let key = EcKey::generate("k1");

        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(key.jwks()))
            .mount(&server)
            .await;

        let keys = key_set(&server);
        assert_eq!(keys.min_refetch_interval(), Duration::from_secs(30));
        keys.decoding_keys(Some("k1")).await.unwrap();

        for i in 0..20 {
            let kid = format!("bogus-{}", i);
            let err = keys.decoding_keys(Some(&kid)).await.unwrap_err();
            assert!(matches!(err, JwksError::KeyNotFound(_)));
        }

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_refetches_after_interval() {
        let server = MockServer::start().await;
        let key = EcKey::generate("k1");

        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(key.jwks()))
            .mount(&server)
            .await;

        let keys = key_set(&server).with_min_refetch_interval(Duration::from_millis(50));
        keys.decoding_keys(Some("k1")).await.unwrap();
        keys.decoding_keys(Some("rotated")).await.unwrap_err();
        assert_eq!(server.received_requests().await.unwrap().len(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        keys.decoding_keys(Some("rotated")).await.unwrap_err();
        keys.decoding_keys(Some("rotated-again")).await.unwrap_err();
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[test]
    fn test_refetch_interval_scales_with_short_ttl() {
        let url = Url::parse("https://keys.local/jwks").unwrap();
        let keys =
            RemoteKeySet::new(url, Duration::from_secs(60), Duration::from_secs(1), false).unwrap();
        assert_eq!(keys.min_refetch_interval(), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_endpoint_failure_is_fetch_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = key_set(&server).decoding_keys(None).await.unwrap_err();
        assert!(matches!(err, JwksError::HttpError(503)));
        assert!(err.is_fetch_error());
    }

    #[tokio::test]
    async fn test_garbage_body_is_parse_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = key_set(&server).decoding_keys(None).await.unwrap_err();
        assert!(matches!(err, JwksError::ParseError(_)));
    }
}
