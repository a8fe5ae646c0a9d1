//! Authorization policy evaluation.

pub mod engine;

pub use engine::PolicyEngine;
