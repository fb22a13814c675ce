// src/model.rs

use serde::Deserialize;

/// Represents a single JSON Web Key (JWK) as defined in RFC 7517.
///
/// Only the members needed to select and rebuild an RSA verification key are
/// modelled; anything else the provider publishes is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonWebKey {
    pub kid: Option<String>,
    pub kty: Option<String>,
    #[serde(rename = "use")]
    pub use_purpose: Option<String>,
    pub alg: Option<String>,
    pub n: Option<String>,
    pub e: Option<String>,
}

/// Represents a JSON Web Key Set (JWKS), which is a collection of JWKs.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}

impl JsonWebKeySet {
    /// Returns the first key whose `kid` equals `kid` exactly.
    pub fn find(&self, kid: &str) -> Option<&JsonWebKey> {
        self.keys.iter().find(|key| key.kid.as_deref() == Some(kid))
    }
}

/// The JOSE header fields the validator cares about.
#[derive(Debug, Deserialize)]
pub struct JwtHeader {
    pub alg: Option<String>,
    pub kid: Option<String>,
}

/// A token document, either a token file or the token endpoint's response.
#[derive(Debug, Deserialize)]
pub(crate) struct IdTokenDocument {
    pub id_token: Option<String>,
}
