//! Credential issuance and verification.
//!
//! - [`jwt`] signs and verifies the gateway's own HS256 user credentials.
//! - [`jwks`] fetches remote public keys for verifying service-client tokens.

pub mod jwks;
pub mod jwt;

pub use jwks::{JwksError, RemoteKeySet};
pub use jwt::{Claims, JwtError, JwtService, TokenKind, TokenPair};
