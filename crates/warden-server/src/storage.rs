//! Storage backend selection and policy seeding.

use std::sync::Arc;

use warden_auth::policy::PolicyEngine;
use warden_auth::storage::{
    ClientStorage, MemoryClientStorage, MemoryPolicyStorage, MemoryUserStorage, PolicyRule,
    PolicyStorage, UserStorage,
};
use warden_auth::AuthResult;
use warden_auth_postgres::PostgresAuthStorage;

use crate::config::{StorageBackend, StorageConfig};

/// The durable stores behind the gateway.
#[derive(Clone)]
pub struct Backends {
    pub users: Arc<dyn UserStorage>,
    pub clients: Arc<dyn ClientStorage>,
    pub policies: Arc<dyn PolicyStorage>,
}

impl Backends {
    /// Fresh in-memory stores.
    pub fn memory() -> Self {
        Self {
            users: Arc::new(MemoryUserStorage::new()),
            clients: Arc::new(MemoryClientStorage::new()),
            policies: Arc::new(MemoryPolicyStorage::new()),
        }
    }
}

/// Creates the configured storage backend, running migrations for PostgreSQL.
pub async fn create_backends(config: &StorageConfig) -> anyhow::Result<Backends> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Ok(Backends::memory())
        }
        StorageBackend::Postgres => {
            let storage =
                PostgresAuthStorage::connect(&config.postgres.url, config.postgres.pool_size)
                    .await?;
            storage.migrate().await?;
            Ok(Backends {
                users: Arc::new(storage.users()),
                clients: Arc::new(storage.clients()),
                policies: Arc::new(storage.policies()),
            })
        }
    }
}

/// Rules granting a role access to its own profile.
pub fn profile_rules(role: &str) -> Vec<PolicyRule> {
    ["GET", "PUT"]
        .into_iter()
        .map(|method| PolicyRule::new(role, "/user/profile", method))
        .collect()
}

/// Ensures the default role can read and update its profile. Existing rules
/// are left untouched.
pub async fn seed_default_rules(policy: &PolicyEngine, role: &str) -> AuthResult<()> {
    for rule in profile_rules(role) {
        if policy.add_rule(rule.clone()).await? {
            tracing::info!(
                subject = %rule.subject,
                resource = %rule.resource,
                action = %rule.action,
                "Seeded policy rule"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seeding_is_idempotent() {
        let backends = Backends::memory();
        let policy = PolicyEngine::new(backends.policies.clone());

        seed_default_rules(&policy, "user").await.unwrap();
        seed_default_rules(&policy, "user").await.unwrap();

        assert_eq!(backends.policies.load_rules().await.unwrap().len(), 2);
        assert!(policy.enforce("user", "/user/profile", "GET").await.unwrap());
        assert!(policy.enforce("user", "/user/profile", "PUT").await.unwrap());
        assert!(!policy.enforce("user", "/user/profile", "DELETE").await.unwrap());
    }
}
