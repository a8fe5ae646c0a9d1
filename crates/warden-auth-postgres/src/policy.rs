//! Policy storage.
//!
//! Allow rules and grouping edges share the `policy_rules` table,
//! distinguished by `ptype`.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use warden_auth::AuthResult;
use warden_auth::storage::{GroupingEdge, PolicyRule, PolicyStorage};

use crate::{PgPool, StorageError};

const PTYPE_RULE: &str = "p";
const PTYPE_GROUPING: &str = "g";

/// PostgreSQL-backed [`PolicyStorage`].
#[derive(Debug, Clone)]
pub struct PostgresPolicyStorage {
    pool: Arc<PgPool>,
}

impl PostgresPolicyStorage {
    /// Create a new policy storage over a shared pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn load(&self, ptype: &str) -> AuthResult<Vec<(String, String, String)>> {
        let rows: Vec<(String, String, String)> =
            query_as("SELECT v0, v1, v2 FROM policy_rules WHERE ptype = $1 ORDER BY id")
                .bind(ptype)
                .fetch_all(self.pool.as_ref())
                .await
                .map_err(StorageError::from)?;
        Ok(rows)
    }

    /// Inserts a row; `false` if an identical row already exists.
    async fn insert(&self, ptype: &str, v0: &str, v1: &str, v2: &str) -> AuthResult<bool> {
        let result = query(
            r#"
            INSERT INTO policy_rules (ptype, v0, v1, v2)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (ptype, v0, v1, v2) DO NOTHING
            "#,
        )
        .bind(ptype)
        .bind(v0)
        .bind(v1)
        .bind(v2)
        .execute(self.pool.as_ref())
        .await
        .map_err(StorageError::from)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl PolicyStorage for PostgresPolicyStorage {
    async fn load_rules(&self) -> AuthResult<Vec<PolicyRule>> {
        let rows = self.load(PTYPE_RULE).await?;
        Ok(rows
            .into_iter()
            .map(|(subject, resource, action)| PolicyRule::new(subject, resource, action))
            .collect())
    }

    async fn load_groupings(&self) -> AuthResult<Vec<GroupingEdge>> {
        let rows = self.load(PTYPE_GROUPING).await?;
        Ok(rows
            .into_iter()
            .map(|(subject, role, _)| GroupingEdge::new(subject, role))
            .collect())
    }

    async fn add_rule(&self, rule: &PolicyRule) -> AuthResult<bool> {
        self.insert(PTYPE_RULE, &rule.subject, &rule.resource, &rule.action)
            .await
    }

    async fn add_grouping(&self, edge: &GroupingEdge) -> AuthResult<bool> {
        self.insert(PTYPE_GROUPING, &edge.subject, &edge.role, "")
            .await
    }

    async fn remove_grouping(&self, edge: &GroupingEdge) -> AuthResult<bool> {
        let result = query("DELETE FROM policy_rules WHERE ptype = $1 AND v0 = $2 AND v1 = $3")
            .bind(PTYPE_GROUPING)
            .bind(&edge.subject)
            .bind(&edge.role)
            .execute(self.pool.as_ref())
            .await
            .map_err(StorageError::from)?;

        Ok(result.rows_affected() > 0)
    }
}
