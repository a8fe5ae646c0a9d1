//! Policy storage trait.
//!
//! Durable home of the policy graph: grouping edges and allow rules.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::AuthResult;

/// Allow rule: `subject` may perform `action` on `resource`.
///
/// `subject` is a user ID or a role name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyRule {
    /// User ID or role.
    pub subject: String,
    /// Resource path, matched exactly.
    pub resource: String,
    /// Action (HTTP method), matched exactly.
    pub action: String,
}

impl PolicyRule {
    /// Creates a new rule.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            resource: resource.into(),
            action: action.into(),
        }
    }
}

/// Grouping edge: `subject` inherits every rule held by `role`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupingEdge {
    /// User ID or role.
    pub subject: String,
    /// Role inherited.
    pub role: String,
}

impl GroupingEdge {
    /// Creates a new edge.
    #[must_use]
    pub fn new(subject: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            role: role.into(),
        }
    }
}

/// Durable storage for the policy graph.
///
/// The `add_*`/`remove_*` operations report whether anything changed, so
/// repeating them is harmless.
#[async_trait]
pub trait PolicyStorage: Send + Sync {
    /// Loads every allow rule.
    async fn load_rules(&self) -> AuthResult<Vec<PolicyRule>>;

    /// Loads every grouping edge.
    async fn load_groupings(&self) -> AuthResult<Vec<GroupingEdge>>;

    /// Persists a rule. Returns `false` if it already existed.
    async fn add_rule(&self, rule: &PolicyRule) -> AuthResult<bool>;

    /// Persists a grouping edge. Returns `false` if it already existed.
    async fn add_grouping(&self, edge: &GroupingEdge) -> AuthResult<bool>;

    /// Removes a grouping edge. Returns `false` if it did not exist.
    async fn remove_grouping(&self, edge: &GroupingEdge) -> AuthResult<bool>;
}
