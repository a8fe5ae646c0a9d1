//! Warden gateway server: configuration, storage and cache selection, and
//! the HTTP router.

pub mod cache;
pub mod config;
pub mod handlers;
pub mod observability;
pub mod server;
pub mod storage;

pub use server::{AppState, Server, ServerBuilder, build_router};
