//! Role-based policy engine.
//!
//! The policy graph has two parts:
//!
//! - grouping edges `subject -> role`, stored as adjacency sets
//! - allow rules indexed by `(resource, action)` to the set of subjects
//!   holding them
//!
//! A request `(sub, obj, act)` is permitted iff some subject reachable from
//! `sub` over grouping edges (including `sub` itself) holds a rule with
//! exactly `obj` and `act`. Reachability is a breadth-first walk with a
//! visited set, so role cycles terminate.
//!
//! The graph is loaded from [`PolicyStorage`] on first use. Mutations go to
//! storage first and only then to memory.
//!
//! # Example
//!
//! ```ignore
//! use warden_auth::policy::PolicyEngine;
//!
//! let engine = PolicyEngine::new(storage);
//! engine.add_grouping("user-1", "admin").await?;
//! assert!(engine.enforce("user-1", "/user/profile", "GET").await?);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::{GroupingEdge, PolicyRule, PolicyStorage};

// =============================================================================
// Policy Graph
// =============================================================================

#[derive(Default)]
struct PolicyGraph {
    /// subject -> roles it inherits directly.
    roles: HashMap<String, HashSet<String>>,
    /// (resource, action) -> subjects holding an allow rule.
    rules: HashMap<(String, String), HashSet<String>>,
    loaded: bool,
}

impl PolicyGraph {
    fn build(rules: Vec<PolicyRule>, groupings: Vec<GroupingEdge>) -> Self {
        let mut graph = Self {
            loaded: true,
            ..Self::default()
        };
        for rule in rules {
            graph.insert_rule(rule);
        }
        for edge in groupings {
            graph.insert_grouping(edge);
        }
        graph
    }

    fn insert_rule(&mut self, rule: PolicyRule) -> bool {
        self.rules
            .entry((rule.resource, rule.action))
            .or_default()
            .insert(rule.subject)
    }

    fn insert_grouping(&mut self, edge: GroupingEdge) -> bool {
        self.roles.entry(edge.subject).or_default().insert(edge.role)
    }

    fn remove_grouping(&mut self, edge: &GroupingEdge) -> bool {
        let Some(roles) = self.roles.get_mut(&edge.subject) else {
            return false;
        };
        let removed = roles.remove(&edge.role);
        if roles.is_empty() {
            self.roles.remove(&edge.subject);
        }
        removed
    }

    /// Breadth-first walk over grouping edges. Visits `start` first.
    fn walk<F>(&self, start: &str, mut visit: F)
    where
        F: FnMut(&str) -> bool,
    {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        visited.insert(start);
        queue.push_back(start);

        while let Some(subject) = queue.pop_front() {
            if visit(subject) {
                return;
            }
            if let Some(roles) = self.roles.get(subject) {
                for role in roles {
                    if visited.insert(role.as_str()) {
                        queue.push_back(role.as_str());
                    }
                }
            }
        }
    }

    fn permits(&self, sub: &str, obj: &str, act: &str) -> bool {
        let Some(holders) = self.rules.get(&(obj.to_string(), act.to_string())) else {
            return false;
        };

        let mut allowed = false;
        self.walk(sub, |subject| {
            allowed = holders.contains(subject);
            allowed
        });
        allowed
    }

    fn implicit_roles(&self, sub: &str) -> Vec<String> {
        let mut roles = Vec::new();
        self.walk(sub, |subject| {
            if subject != sub {
                roles.push(subject.to_string());
            }
            false
        });
        roles.sort();
        roles
    }
}

// =============================================================================
// Policy Engine
// =============================================================================

/// Evaluates and mutates the persisted role graph.
///
/// Cheap to share behind an `Arc`; all state is behind a `tokio` `RwLock`
/// so concurrent `enforce` calls only take read locks.
pub struct PolicyEngine {
    storage: Arc<dyn PolicyStorage>,
    graph: Arc<RwLock<PolicyGraph>>,
}

impl PolicyEngine {
    /// Creates an engine over `storage`. Nothing is loaded until first use.
    #[must_use]
    pub fn new(storage: Arc<dyn PolicyStorage>) -> Self {
        Self {
            storage,
            graph: Arc::new(RwLock::new(PolicyGraph::default())),
        }
    }

    /// Loads the full graph from storage, replacing any in-memory state.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PolicyEngine` if storage cannot be read.
    pub async fn load(&self) -> AuthResult<()> {
        let rules = self
            .storage
            .load_rules()
            .await
            .map_err(|e| AuthError::policy_engine(format!("failed to load rules: {}", e)))?;
        let groupings = self
            .storage
            .load_groupings()
            .await
            .map_err(|e| AuthError::policy_engine(format!("failed to load groupings: {}", e)))?;

        tracing::debug!(
            rules = rules.len(),
            groupings = groupings.len(),
            "Policy graph loaded"
        );

        *self.graph.write().await = PolicyGraph::build(rules, groupings);
        Ok(())
    }

    /// Discards in-memory state and loads again from storage.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PolicyEngine` if storage cannot be read. The
    /// previous graph stays in place on failure.
    pub async fn reload(&self) -> AuthResult<()> {
        self.load().await?;
        tracing::info!("Policy graph reloaded");
        Ok(())
    }

    async fn ensure_loaded(&self) -> AuthResult<()> {
        if self.graph.read().await.loaded {
            return Ok(());
        }
        self.load().await
    }

    /// Decides whether `sub` may perform `act` on `obj`.
    ///
    /// Pure with respect to the graph: repeated calls without intervening
    /// mutation return the same answer.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PolicyEngine` if the graph cannot be loaded.
    pub async fn enforce(&self, sub: &str, obj: &str, act: &str) -> AuthResult<bool> {
        self.ensure_loaded().await?;
        let allowed = self.graph.read().await.permits(sub, obj, act);
        tracing::debug!(subject = %sub, resource = %obj, action = %act, allowed, "Policy decision");
        Ok(allowed)
    }

    /// Adds the grouping edge `subject -> role`.
    ///
    /// Returns whether the edge is new.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PolicyEngine` if the edge cannot be persisted;
    /// memory is left untouched in that case.
    pub async fn add_grouping(&self, subject: &str, role: &str) -> AuthResult<bool> {
        self.ensure_loaded().await?;

        let edge = GroupingEdge::new(subject, role);
        let added = self
            .storage
            .add_grouping(&edge)
            .await
            .map_err(|e| AuthError::policy_engine(format!("failed to persist grouping: {}", e)))?;

        self.graph.write().await.insert_grouping(edge);
        Ok(added)
    }

    /// Removes the grouping edge `subject -> role`.
    ///
    /// Returns whether the edge existed.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PolicyEngine` if storage rejects the removal.
    pub async fn remove_grouping(&self, subject: &str, role: &str) -> AuthResult<bool> {
        self.ensure_loaded().await?;

        let edge = GroupingEdge::new(subject, role);
        let removed = self
            .storage
            .remove_grouping(&edge)
            .await
            .map_err(|e| AuthError::policy_engine(format!("failed to remove grouping: {}", e)))?;

        self.graph.write().await.remove_grouping(&edge);
        Ok(removed)
    }

    /// Adds an allow rule. Returns whether it is new.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PolicyEngine` if the rule cannot be persisted.
    pub async fn add_rule(&self, rule: PolicyRule) -> AuthResult<bool> {
        self.ensure_loaded().await?;

        let added = self
            .storage
            .add_rule(&rule)
            .await
            .map_err(|e| AuthError::policy_engine(format!("failed to persist rule: {}", e)))?;

        self.graph.write().await.insert_rule(rule);
        Ok(added)
    }

    /// Returns every role reachable from `subject`, sorted.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PolicyEngine` if the graph cannot be loaded.
    pub async fn roles_for(&self, subject: &str) -> AuthResult<Vec<String>> {
        self.ensure_loaded().await?;
        Ok(self.graph.read().await.implicit_roles(subject))
    }
}
