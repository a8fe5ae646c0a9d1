use std::sync::Arc;

use axum::{
    Router,
    middleware,
    routing::{delete, get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use warden_auth::client::build_client_authenticator;
use warden_auth::middleware::{AuthState, client_auth, internal_auth, rbac, user_auth};
use warden_auth::policy::PolicyEngine;
use warden_auth::session::SessionService;
use warden_auth::storage::{ClientCache, ClientStorage};
use warden_auth::token::JwtService;

use crate::cache::create_client_cache;
use crate::config::AppConfig;
use crate::handlers;
use crate::storage::{Backends, create_backends, seed_default_rules};

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub clients: Arc<dyn ClientStorage>,
    pub client_cache: Arc<dyn ClientCache>,
}

impl AppState {
    /// Wires the core services over already-created backends.
    pub async fn build(
        cfg: &AppConfig,
        backends: Backends,
        client_cache: Arc<dyn ClientCache>,
    ) -> anyhow::Result<Self> {
        let jwt = Arc::new(JwtService::new(&cfg.auth.token));

        let policy = Arc::new(PolicyEngine::new(backends.policies.clone()));
        policy.load().await?;
        seed_default_rules(&policy, cfg.auth.default_role()).await?;

        let sessions = Arc::new(SessionService::new(
            jwt,
            backends.users.clone(),
            policy,
            cfg.auth.default_role(),
        ));

        let authenticator = build_client_authenticator(
            &cfg.auth.client_auth,
            backends.clients.clone(),
            client_cache.clone(),
        )?;

        Ok(Self {
            auth: AuthState::new(sessions, authenticator, cfg.auth.internal_key.as_str()),
            clients: backends.clients,
            client_cache,
        })
    }

    /// Drops a client from the cache after a write. Failures are logged; the
    /// entry still expires on its own.
    pub async fn invalidate_cached(&self, bearer_key: &str) {
        if let Err(e) = self.client_cache.invalidate(bearer_key).await {
            tracing::warn!(error = %e, "Failed to invalidate cached client");
        }
    }
}

/// Builds the router with its route groups and guards.
pub fn build_router(state: AppState) -> Router {
    let auth = state.auth.clone();

    let internal = Router::new()
        .route("/client-upsert", post(handlers::client_upsert))
        .route("/client-find", post(handlers::client_find))
        .route("/client-delete", delete(handlers::client_delete))
        .route_layer(middleware::from_fn_with_state(auth.clone(), internal_auth));

    let v1 = Router::new()
        .route("/ping", get(handlers::ping))
        .route_layer(middleware::from_fn_with_state(auth.clone(), client_auth));

    let public_auth = Router::new()
        .route("/login", post(handlers::login))
        .route("/register", post(handlers::register))
        .route("/refresh", post(handlers::refresh));

    let profile = Router::new()
        .route(
            "/profile",
            get(handlers::get_profile).put(handlers::update_profile),
        )
        .route_layer(middleware::from_fn_with_state(auth.clone(), rbac));

    // user_auth wraps rbac, so the profile routes see a UserContext.
    let user = Router::new()
        .route("/change-password", post(handlers::change_password))
        .route("/logout", post(handlers::logout))
        .merge(profile)
        .route_layer(middleware::from_fn_with_state(auth, user_auth));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/internal", internal)
        .nest("/v1", v1)
        .nest("/auth", public_auth)
        .nest("/user", user)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct Server {
    addr: String,
    app: Router,
}

impl Server {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.addr).await?;
        tracing::info!(addr = %self.addr, "Server listening");
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

pub struct ServerBuilder {
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn build(self) -> anyhow::Result<Server> {
        let cfg = self.config;
        let backends = create_backends(&cfg.storage).await?;
        let cache = create_client_cache(&cfg.cache, cfg.auth.client_auth.cache_ttl).await;
        let state = AppState::build(&cfg, backends, cache).await?;

        tracing::info!(
            storage = ?cfg.storage.backend,
            cache = ?cfg.cache.backend,
            client_auth = ?cfg.auth.client_auth.mode,
            "Gateway initialized"
        );

        Ok(Server {
            addr: cfg.addr(),
            app: build_router(state),
        })
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
