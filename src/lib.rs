// src/lib.rs

//! Acquire and verify ID tokens issued by a hosted user-pool identity provider.
//!
//! A [`Config`](config::Config) selects where the token comes from (inline,
//! a JSON token file, or an authorization-code exchange). The
//! [`Validator`](validator::Validator) then resolves the signing key from the
//! pool's JWKS, verifies the RS256 signature and checks `iss`, `aud` and `exp`.

pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod source;
pub mod validator;

/// The public prelude for the `userpool-jwt` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::config::{Config, ConfigBuilder};
    pub use crate::error::UserPoolJwtError;
    pub use crate::source::{read_id_token, TokenSource};
    pub use crate::validator::{Claims, Validator};
}
