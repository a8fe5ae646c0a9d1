//! Service-client storage.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use uuid::Uuid;
use warden_auth::AuthResult;
use warden_auth::storage::{Client, ClientFilter, ClientInput, ClientStorage};

use crate::{PgPool, StorageError};

type ClientTuple = (String, String, String, OffsetDateTime, OffsetDateTime);

fn client_from_tuple(row: ClientTuple) -> Client {
    Client {
        id: row.0,
        name: row.1,
        bearer_key: row.2,
        created_at: row.3,
        updated_at: row.4,
    }
}

/// Filter predicate over `$1` ids, `$2` names and `$3` bearer keys. An empty
/// array leaves its column unconstrained.
const FILTER_CLAUSE: &str = r#"
    (cardinality($1::text[]) = 0 OR id = ANY($1))
    AND (cardinality($2::text[]) = 0 OR name = ANY($2))
    AND (cardinality($3::text[]) = 0 OR bearer_key = ANY($3))
"#;

/// PostgreSQL-backed [`ClientStorage`].
#[derive(Debug, Clone)]
pub struct PostgresClientStorage {
    pool: Arc<PgPool>,
}

impl PostgresClientStorage {
    /// Create a new client storage over a shared pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClientStorage for PostgresClientStorage {
    async fn is_exists(&self, bearer_key: &str) -> AuthResult<bool> {
        let (exists,): (bool,) =
            query_as("SELECT EXISTS (SELECT 1 FROM clients WHERE bearer_key = $1)")
                .bind(bearer_key)
                .fetch_one(self.pool.as_ref())
                .await
                .map_err(StorageError::from)?;

        Ok(exists)
    }

    async fn find_by_filter(&self, filter: &ClientFilter) -> AuthResult<Vec<Client>> {
        let sql = format!(
            "SELECT id, name, bearer_key, created_at, updated_at FROM clients \
             WHERE {FILTER_CLAUSE} ORDER BY created_at, id"
        );
        let rows: Vec<ClientTuple> = query_as(&sql)
            .bind(&filter.ids)
            .bind(&filter.names)
            .bind(&filter.bearer_keys)
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(client_from_tuple).collect())
    }

    async fn upsert(&self, inputs: &[ClientInput]) -> AuthResult<Vec<Client>> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;
        let mut saved = Vec::with_capacity(inputs.len());

        for input in inputs {
            let row: ClientTuple = query_as(
                r#"
                INSERT INTO clients (id, name, bearer_key, created_at, updated_at)
                VALUES ($1, $2, $3, NOW(), NOW())
                ON CONFLICT (bearer_key)
                DO UPDATE SET name = EXCLUDED.name, updated_at = NOW()
                RETURNING id, name, bearer_key, created_at, updated_at
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&input.name)
            .bind(&input.bearer_key)
            .fetch_one(&mut *tx)
            .await
            .map_err(StorageError::from)?;

            saved.push(client_from_tuple(row));
        }

        tx.commit().await.map_err(StorageError::from)?;
        Ok(saved)
    }

    async fn delete_by_filter(&self, filter: &ClientFilter) -> AuthResult<u64> {
        if filter.is_empty() {
            return Err(StorageError::invalid_input("delete requires a non-empty filter").into());
        }

        let sql = format!("DELETE FROM clients WHERE {FILTER_CLAUSE}");
        let result = query(&sql)
            .bind(&filter.ids)
            .bind(&filter.names)
            .bind(&filter.bearer_keys)
            .execute(self.pool.as_ref())
            .await
            .map_err(StorageError::from)?;

        Ok(result.rows_affected())
    }
}
