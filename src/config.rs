// src/config.rs

use crate::error::UserPoolJwtError;
use crate::source::TokenSource;
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Base URL of the hosted identity provider. The issuer of a user pool is
/// `<base>/<region>/<user_pool_id>`.
pub const DEFAULT_IDP_BASE_URL: &str = "https://cognito-idp.amazonaws.com";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Contains the validation settings applied to an ID Token's claims.
#[derive(Clone, Debug)]
pub struct ValidationDetails {
    /// Whether the `exp` claim is enforced. Defaults to `true`.
    pub verify_expiration: bool,
    /// Skip key resolution, signature and claim checks and only decode the token.
    /// Meant for debugging; never trust claims produced this way.
    pub decode_only: bool,
    /// The tolerance for clock skew when checking `exp`.
    /// Defaults to zero: the token must expire strictly after now.
    pub leeway: Duration,
}

impl Default for ValidationDetails {
    fn default() -> Self {
        Self {
            verify_expiration: true,
            decode_only: false,
            leeway: Duration::ZERO,
        }
    }
}

/// Settings for outbound HTTP calls (JWKS fetch and code exchange).
#[derive(Clone, Debug)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// The validated configuration consumed by the [`Validator`](crate::validator::Validator).
///
/// A `Config` can only be obtained through [`ConfigBuilder::build`], which
/// enforces every invariant up front, so the rest of the crate never has to
/// re-check field presence.
#[derive(Clone, Debug)]
pub struct Config {
    client_id: String,
    user_pool_id: String,
    region: String,
    idp_base_url: Url,
    jwks_uri_override: Option<Url>,
    token_source: TokenSource,
    validation: ValidationDetails,
    http: HttpSettings,
    jwks_cache_ttl: Option<Duration>,
}

impl Config {
    /// The application client ID, expected in the `aud` claim.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn user_pool_id(&self) -> &str {
        &self.user_pool_id
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// The expected `iss` claim: `<idp_base_url>/<region>/<user_pool_id>`.
    pub fn issuer(&self) -> String {
        format!(
            "{}/{}/{}",
            self.idp_base_url.as_str().trim_end_matches('/'),
            self.region,
            self.user_pool_id
        )
    }

    /// The JWKS endpoint, either the configured override or `<issuer>/.well-known/jwks.json`.
    pub fn jwks_uri(&self) -> Result<Url, UserPoolJwtError> {
        if let Some(uri) = &self.jwks_uri_override {
            return Ok(uri.clone());
        }
        let raw = format!("{}/.well-known/jwks.json", self.issuer());
        Url::parse(&raw).map_err(|e| {
            UserPoolJwtError::ConfigurationInvalid(format!("derived JWKS URL '{raw}' is invalid: {e}"))
        })
    }

    /// The single token origin selected at build time.
    pub fn token_source(&self) -> &TokenSource {
        &self.token_source
    }

    pub fn validation(&self) -> &ValidationDetails {
        &self.validation
    }

    pub fn http(&self) -> &HttpSettings {
        &self.http
    }

    /// Time-to-live of the JWKS cache. `None` means every verification fetches fresh keys.
    pub fn jwks_cache_ttl(&self) -> Option<Duration> {
        self.jwks_cache_ttl
    }
}

/// A builder for creating a `Config` instance.
///
/// The builder is also the on-disk configuration format: a YAML or JSON
/// document deserializes straight into it, and [`ConfigBuilder::build`]
/// applies the same rules either way.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigBuilder {
    client_id: Option<String>,
    user_pool_id: Option<String>,
    region: Option<String>,
    redirect_uri: Option<String>,
    code: Option<String>,
    oauth_url: Option<Url>,
    token_file: Option<PathBuf>,
    id_token: Option<String>,
    verify_expiration: Option<bool>,
    decode_only: Option<bool>,
    idp_base_url: Option<Url>,
    jwks_uri: Option<Url>,
    #[serde(default, rename = "leeway_secs", deserialize_with = "deserialize_secs")]
    leeway: Option<Duration>,
    #[serde(default, rename = "connect_timeout_secs", deserialize_with = "deserialize_secs")]
    connect_timeout: Option<Duration>,
    #[serde(default, rename = "request_timeout_secs", deserialize_with = "deserialize_secs")]
    request_timeout: Option<Duration>,
    #[serde(default, rename = "jwks_cache_ttl_secs", deserialize_with = "deserialize_secs")]
    jwks_cache_ttl: Option<Duration>,
}

/// Durations in the file form are whole seconds; the builder keeps full precision.
fn deserialize_secs<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
}

fn non_zero(field: &str, value: Option<Duration>, default: Duration) -> Result<Duration, UserPoolJwtError> {
    match value {
        Some(d) if d.is_zero() => Err(UserPoolJwtError::ConfigurationInvalid(format!(
            "{field} must be greater than zero"
        ))),
        Some(d) => Ok(d),
        None => Ok(default),
    }
}

fn parse_url(field: &str, value: &str) -> Result<Url, UserPoolJwtError> {
    Url::parse(value)
        .map_err(|e| UserPoolJwtError::ConfigurationInvalid(format!("{field} '{value}' is not a valid URL: {e}")))
}

fn non_empty(field: &str, value: Option<String>) -> Result<String, UserPoolJwtError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(UserPoolJwtError::ConfigurationInvalid(format!("{field} is required"))),
    }
}

/// User pool IDs have the form `<region>_<suffix>`, e.g. `eu-west-1_AbCdEf123`.
fn region_from_pool_id(user_pool_id: &str) -> Option<&str> {
    let (region, suffix) = user_pool_id.split_once('_')?;
    if region.is_empty() || suffix.is_empty() || !region.contains('-') {
        return None;
    }
    Some(region)
}

impl ConfigBuilder {
    /// Creates a new `ConfigBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application client ID. This is a required field.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the user pool (tenant) ID. This is a required field.
    pub fn user_pool_id(mut self, user_pool_id: impl Into<String>) -> Self {
        self.user_pool_id = Some(user_pool_id.into());
        self
    }

    /// Sets the provider region. Derived from the user pool ID when omitted.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets the redirect URI registered for the client. Required for the code exchange.
    pub fn redirect_uri(mut self, uri: &str) -> Result<Self, UserPoolJwtError> {
        parse_url("redirect_uri", uri)?;
        self.redirect_uri = Some(uri.to_string());
        Ok(self)
    }

    /// Sets the authorization code to exchange. Only used together with `oauth_url`.
    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Sets the provider's OAuth2 token endpoint.
    pub fn oauth_url(mut self, url: &str) -> Result<Self, UserPoolJwtError> {
        self.oauth_url = Some(parse_url("oauth_url", url)?);
        Ok(self)
    }

    /// Reads the token from a JSON file with an `id_token` field. `-` means standard input.
    pub fn token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = Some(path.into());
        self
    }

    /// Supplies the raw ID token directly.
    pub fn id_token(mut self, token: impl Into<String>) -> Self {
        self.id_token = Some(token.into());
        self
    }

    /// Enables or disables the `exp` check. Defaults to `true`.
    pub fn verify_expiration(mut self, enabled: bool) -> Self {
        self.verify_expiration = Some(enabled);
        self
    }

    /// Only decode the token, skipping all verification.
    pub fn decode_only(mut self, enabled: bool) -> Self {
        self.decode_only = Some(enabled);
        self
    }

    /// Overrides the identity provider base URL used to derive the issuer.
    pub fn idp_base_url(mut self, url: &str) -> Result<Self, UserPoolJwtError> {
        self.idp_base_url = Some(parse_url("idp_base_url", url)?);
        Ok(self)
    }

    /// Sets an explicit JWKS URI instead of deriving it from the issuer.
    pub fn jwks_uri(mut self, url: &str) -> Result<Self, UserPoolJwtError> {
        self.jwks_uri = Some(parse_url("jwks_uri", url)?);
        Ok(self)
    }

    /// Sets the clock skew tolerance for the `exp` check.
    pub fn leeway(mut self, leeway: Duration) -> Self {
        self.leeway = Some(leeway);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Caches the fetched key set for `ttl`. Unset by default.
    pub fn jwks_cache_ttl(mut self, ttl: Duration) -> Self {
        self.jwks_cache_ttl = Some(ttl);
        self
    }

    /// Consumes the builder and returns a `Config` object.
    ///
    /// # Errors
    ///
    /// Returns [`UserPoolJwtError::ConfigurationInvalid`] if `client_id` or
    /// `user_pool_id` is missing, the region can be neither read nor derived,
    /// or none of the token sources (`id_token`, `token_file`, `code` with
    /// `oauth_url`) is usable. A zero connect or request timeout is also rejected.
    pub fn build(self) -> Result<Config, UserPoolJwtError> {
        let client_id = non_empty("client_id", self.client_id)?;
        let user_pool_id = non_empty("user_pool_id", self.user_pool_id)?;

        let region = match self.region.filter(|r| !r.trim().is_empty()) {
            Some(region) => region,
            None => region_from_pool_id(&user_pool_id)
                .map(str::to_string)
                .ok_or_else(|| {
                    UserPoolJwtError::ConfigurationInvalid(format!(
                        "region is required and cannot be derived from user_pool_id '{user_pool_id}'"
                    ))
                })?,
        };

        // Precedence: direct token, then file, then code exchange.
        let token_source = match (self.id_token, self.token_file, self.code, self.oauth_url) {
            (Some(token), _, _, _) => TokenSource::Inline(token),
            (None, Some(path), _, _) => TokenSource::File(path),
            (None, None, Some(code), Some(oauth_url)) => {
                let redirect_uri = non_empty("redirect_uri (for the code exchange)", self.redirect_uri)?;
                TokenSource::CodeExchange {
                    code,
                    oauth_url,
                    redirect_uri,
                }
            }
            _ => {
                return Err(UserPoolJwtError::ConfigurationInvalid(
                    "one of id_token, token_file, or code together with oauth_url must be set".to_string(),
                ))
            }
        };

        let idp_base_url = match self.idp_base_url {
            Some(url) => url,
            None => parse_url("idp_base_url", DEFAULT_IDP_BASE_URL)?,
        };

        let defaults = ValidationDetails::default();
        let validation = ValidationDetails {
            verify_expiration: self.verify_expiration.unwrap_or(defaults.verify_expiration),
            decode_only: self.decode_only.unwrap_or(defaults.decode_only),
            leeway: self.leeway.unwrap_or(defaults.leeway),
        };

        let http = HttpSettings {
            connect_timeout: non_zero("connect_timeout", self.connect_timeout, DEFAULT_CONNECT_TIMEOUT)?,
            request_timeout: non_zero("request_timeout", self.request_timeout, DEFAULT_REQUEST_TIMEOUT)?,
        };

        Ok(Config {
            client_id,
            user_pool_id,
            region,
            idp_base_url,
            jwks_uri_override: self.jwks_uri,
            token_source,
            validation,
            http,
            jwks_cache_ttl: self.jwks_cache_ttl.filter(|ttl| !ttl.is_zero()),
        })
    }
}
