// src/validator.rs

use crate::client::{build_http_client, JwksClient};
use crate::config::{Config, ValidationDetails};
use crate::error::UserPoolJwtError;
use crate::model::{JsonWebKey, JwtHeader};
use base64::engine::{general_purpose::STANDARD, Engine};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument, trace, warn, Level};

/// The claims of a verified ID Token, exactly as encoded in its payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn iss(&self) -> Option<&str> {
        self.get("iss").and_then(Value::as_str)
    }

    pub fn sub(&self) -> Option<&str> {
        self.get("sub").and_then(Value::as_str)
    }

    /// The audience, either a string or an array of strings.
    pub fn aud(&self) -> Option<&Value> {
        self.get("aud")
    }

    pub fn exp(&self) -> Option<i64> {
        self.get("exp").and_then(numeric_date)
    }

    /// Provider-specific: `id` for ID tokens, `access` for access tokens.
    pub fn token_use(&self) -> Option<&str> {
        self.get("token_use").and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Claims> for Value {
    fn from(claims: Claims) -> Self {
        Value::Object(claims.0)
    }
}

/// The ID Token validator.
///
/// This struct is initialized with a `Config` and can be reused for any
/// number of validations. It holds the HTTP client (with the configured
/// timeouts) and the JWKS client; it carries no other state between calls.
#[derive(Clone)]
pub struct Validator {
    config: Config,
    http_client: reqwest::Client,
    jwks_client: JwksClient,
}

impl Validator {
    /// Creates a new `Validator` with the given configuration.
    pub fn new(config: Config) -> Result<Self, UserPoolJwtError> {
        let http_client = build_http_client(config.http())?;
        let jwks_client = JwksClient::new(http_client.clone(), config.jwks_cache_ttl());
        Ok(Self {
            config,
            http_client,
            jwks_client,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolves the raw token from the configured source.
    pub async fn acquire_token(&self) -> Result<String, UserPoolJwtError> {
        self.config
            .token_source()
            .resolve(&self.http_client, self.config.client_id())
            .await
    }

    /// Acquires the token and validates it.
    pub async fn acquire_and_validate(&self) -> Result<Claims, UserPoolJwtError> {
        let token = self.acquire_token().await?;
        self.validate(&token).await
    }

    /// Validates an ID Token.
    ///
    /// This method performs, in order and failing fast:
    /// 1. Structural checks on the compact form and decoding of header and payload.
    /// 2. Key resolution against the user pool's JWKS using the header `kid`.
    /// 3. RS256 signature verification.
    /// 4. `iss`, `aud` and (unless disabled) `exp` checks.
    ///
    /// With `decode_only` set, only step 1 runs and the decoded payload is returned.
    #[instrument(skip_all, err)]
    pub async fn validate(&self, token: &str) -> Result<Claims, UserPoolJwtError> {
        let segments = split_token(token)?;
        let header = decode_header(segments[0])?;
        let payload: Map<String, Value> = decode_segment_json(segments[1], "payload")?;

        if tracing::enabled!(Level::TRACE) {
            let unverified = Value::Object(payload.clone());
            trace!(claims = %unverified, "Unverified token claims");
        }

        if self.config.validation().decode_only {
            warn!("decode_only is set: returning claims without signature or claim verification");
            return Ok(Claims(payload));
        }

        let kid = header
            .kid
            .as_deref()
            .ok_or_else(|| UserPoolJwtError::MalformedToken("header has no 'kid'".to_string()))?;

        let jwks_uri = self.config.jwks_uri()?;
        let jwk = self.jwks_client.get_key(&jwks_uri, kid).await?;

        let claims = verify_signature(token, &header, &jwk)?;

        check_claims(
            &claims,
            &self.config.issuer(),
            self.config.client_id(),
            self.config.validation(),
            chrono::Utc::now().timestamp(),
        )?;

        debug!(kid = %kid, sub = ?claims.get("sub"), "Token validated successfully");
        Ok(Claims(claims))
    }
}

/// Splits a compact JWT into exactly three non-empty segments.
fn split_token(token: &str) -> Result<[&str; 3], UserPoolJwtError> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None)
            if !header.is_empty() && !payload.is_empty() && !signature.is_empty() =>
        {
            Ok([header, payload, signature])
        }
        _ => Err(UserPoolJwtError::MalformedToken(
            "expected three non-empty dot-separated segments".to_string(),
        )),
    }
}

/// Decodes a base64url segment: `-`/`_` become `+`/`/`, `=` padding is
/// appended to a multiple of four, then standard base64 applies.
pub fn decode_segment(segment: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let mut standard: String = segment
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while standard.len() % 4 != 0 {
        standard.push('=');
    }
    STANDARD.decode(standard)
}

fn decode_segment_json<T: DeserializeOwned>(segment: &str, what: &str) -> Result<T, UserPoolJwtError> {
    let bytes = decode_segment(segment)
        .map_err(|e| UserPoolJwtError::MalformedToken(format!("{what} is not valid base64url: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| UserPoolJwtError::MalformedToken(format!("{what} is not valid JSON: {e}")))
}

/// The JOSE header must be a JSON object; arrays and scalars are rejected before key lookup.
fn decode_header(segment: &str) -> Result<JwtHeader, UserPoolJwtError> {
    let fields: Map<String, Value> = decode_segment_json(segment, "header")?;
    serde_json::from_value(Value::Object(fields))
        .map_err(|e| UserPoolJwtError::MalformedToken(format!("header has invalid fields: {e}")))
}

fn verify_signature(
    token: &str,
    header: &JwtHeader,
    jwk: &JsonWebKey,
) -> Result<Map<String, Value>, UserPoolJwtError> {
    if header.alg.as_deref() != Some("RS256") {
        return Err(UserPoolJwtError::SignatureInvalid(format!(
            "algorithm {:?} is not allowed, expected RS256",
            header.alg
        )));
    }
    if jwk.kty.as_deref() != Some("RSA") {
        return Err(UserPoolJwtError::SignatureInvalid(format!(
            "key type {:?} cannot verify RS256",
            jwk.kty
        )));
    }
    if let Some(alg) = jwk.alg.as_deref() {
        if alg != "RS256" {
            return Err(UserPoolJwtError::SignatureInvalid(format!(
                "key is published for {alg}, not RS256"
            )));
        }
    }

    let n = jwk
        .n
        .as_deref()
        .ok_or_else(|| UserPoolJwtError::SignatureInvalid("RSA key missing 'n' component".to_string()))?;
    let e = jwk
        .e
        .as_deref()
        .ok_or_else(|| UserPoolJwtError::SignatureInvalid("RSA key missing 'e' component".to_string()))?;
    let decoding_key = DecodingKey::from_rsa_components(n, e)
        .map_err(|err| UserPoolJwtError::SignatureInvalid(format!("unusable RSA key material: {err}")))?;

    // Claims are checked separately so each failure keeps its own error kind.
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<Map<String, Value>>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| UserPoolJwtError::SignatureInvalid(e.to_string()))
}

fn numeric_date(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

fn check_claims(
    claims: &Map<String, Value>,
    expected_issuer: &str,
    client_id: &str,
    validation: &ValidationDetails,
    now: i64,
) -> Result<(), UserPoolJwtError> {
    let iss = claims.get("iss").and_then(Value::as_str);
    if iss != Some(expected_issuer) {
        return Err(UserPoolJwtError::IssuerMismatch {
            expected: expected_issuer.to_string(),
            actual: iss.map(str::to_string),
        });
    }

    let aud = claims.get("aud").cloned().unwrap_or(Value::Null);
    let audience_matches = match &aud {
        Value::String(aud) => aud == client_id,
        Value::Array(auds) => auds.iter().any(|a| a.as_str() == Some(client_id)),
        _ => false,
    };
    if !audience_matches {
        return Err(UserPoolJwtError::AudienceMismatch {
            expected: client_id.to_string(),
            actual: aud,
        });
    }

    if validation.verify_expiration {
        let exp = claims
            .get("exp")
            .and_then(numeric_date)
            .ok_or_else(|| UserPoolJwtError::MalformedToken("token has no numeric 'exp' claim".to_string()))?;
        let leeway = i64::try_from(validation.leeway.as_secs()).unwrap_or(i64::MAX);
        if exp.saturating_add(leeway) <= now {
            return Err(UserPoolJwtError::TokenExpired { exp, now });
        }
    }

    Ok(())
}
