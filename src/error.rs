// src/error.rs

use thiserror::Error;

/// The primary error type for the `userpool-jwt` library.
///
/// Every phase of token acquisition and verification fails with exactly one
/// of these variants, carrying enough context to log or display without
/// inspecting internals.
#[derive(Debug, Error)]
pub enum UserPoolJwtError {
    /// Required configuration is missing, malformed, or no token source is usable.
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// The token file (or stream) could not be opened or read.
    #[error("Token file '{path}' is unavailable: {source}")]
    ResourceUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The token document does not contain a usable `id_token`.
    #[error("No id_token found: {0}")]
    TokenNotFound(String),

    /// The authorization-code exchange did not yield an `id_token`.
    #[error("Token exchange failed (status: {status:?}): {detail}")]
    TokenExchangeFailed { status: Option<u16>, detail: String },

    /// The compact token is structurally invalid.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The JWKS endpoint could not be reached or returned a non-success status.
    #[error("Failed to fetch JWKS from {url} (status: {status:?}): {detail}")]
    JwksFetchFailed {
        url: String,
        status: Option<u16>,
        detail: String,
    },

    /// The JWKS response body is not a valid key set.
    #[error("Failed to parse JWKS: {0}")]
    JwksParseFailed(String),

    /// No key in the fetched set matches the token's `kid`.
    #[error("Key not found for kid: {0}")]
    KeyNotFound(String),

    /// Signature verification failed, the algorithm is not allowed, or the key material is unusable.
    #[error("Invalid signature: {0}")]
    SignatureInvalid(String),

    /// The `iss` claim does not match the expected issuer.
    #[error("Issuer mismatch. Expected: {expected}, Actual: {actual:?}")]
    IssuerMismatch {
        expected: String,
        actual: Option<String>,
    },

    /// The `aud` claim does not contain the configured client ID.
    #[error("Audience mismatch. Expected: {expected}, Actual: {actual}")]
    AudienceMismatch {
        expected: String,
        actual: serde_json::Value,
    },

    /// The `exp` claim is not in the future.
    #[error("Token expired at {exp} (now: {now})")]
    TokenExpired { exp: i64, now: i64 },

    /// An outbound HTTP call exceeded its connect or request timeout.
    #[error("Request to {url} timed out")]
    NetworkTimeout { url: String },
}
