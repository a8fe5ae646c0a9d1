//! Storage traits for users, service clients, policies and the client cache.
//!
//! # Implementations
//!
//! - [`memory`] - in-process backends and the local client cache
//! - `warden-auth-postgres` - PostgreSQL backend
//! - `warden-server` - Redis client cache

pub mod cache;
pub mod client;
pub mod memory;
pub mod policy;
pub mod user;

pub use cache::{CacheError, ClientCache};
pub use client::{Client, ClientFilter, ClientInput, ClientStorage};
pub use memory::{LocalClientCache, MemoryClientStorage, MemoryPolicyStorage, MemoryUserStorage};
pub use policy::{GroupingEdge, PolicyRule, PolicyStorage};
pub use user::{User, UserStatus, UserStorage};
