use base64::engine::{general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{pkcs8::DecodePrivateKey, RsaPrivateKey};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::time::Duration;
use tempfile::tempdir;
use userpool_jwt::prelude::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REGION: &str = "us-east-1";
const POOL_ID: &str = "us-east-1_TestPool";
const CLIENT_ID: &str = "test-client";
const KID: &str = "test-kid";

/// Signs RS256 test tokens with the fixture key and publishes the matching JWK.
struct SigningKey {
    encoding_key: EncodingKey,
    n: String,
    e: String,
}

impl SigningKey {
    fn load() -> Self {
        let pem = include_str!("fixtures/test_private_key.pem");
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem).unwrap();
        let pkcs1_der = private_key.to_pkcs1_der().unwrap();
        let public_key = private_key.to_public_key();
        Self {
            encoding_key: EncodingKey::from_rsa_der(pkcs1_der.as_bytes()),
            n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }
    }

    fn jwk(&self, kid: &str) -> Value {
        json!({
            "kty": "RSA",
            "n": self.n,
            "e": self.e,
            "alg": "RS256",
            "use": "sig",
            "kid": kid,
        })
    }

    fn sign(&self, kid: &str, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        encode(&header, claims, &self.encoding_key).unwrap()
    }
}

fn jwks_path() -> String {
    format!("/{REGION}/{POOL_ID}/.well-known/jwks.json")
}

fn issuer(server: &MockServer) -> String {
    format!("{}/{REGION}/{POOL_ID}", server.uri())
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn id_token_claims(server: &MockServer, exp: i64) -> Value {
    json!({
        "iss": issuer(server),
        "aud": CLIENT_ID,
        "sub": "5f1c2e8a-user",
        "token_use": "id",
        "email": "jane@example.com",
        "email_verified": true,
        "iat": now() - 60,
        "exp": exp,
    })
}

async fn serve_jwks(server: &MockServer, jwks: Value) {
    Mock::given(method("GET"))
        .and(path(jwks_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks))
        .mount(server)
        .await;
}

fn base_builder(server: &MockServer) -> ConfigBuilder {
    ConfigBuilder::new()
        .client_id(CLIENT_ID)
        .user_pool_id(POOL_ID)
        .idp_base_url(&server.uri())
        .unwrap()
}

async fn validate_inline(server: &MockServer, token: &str) -> Result<Claims, UserPoolJwtError> {
    let config = base_builder(server).id_token(token).build().unwrap();
    Validator::new(config).unwrap().acquire_and_validate().await
}

#[tokio::test]
async fn test_token_file_end_to_end() {
    let key = SigningKey::load();
    let server = MockServer::start().await;
    serve_jwks(&server, json!({ "keys": [key.jwk("unrelated"), key.jwk(KID)] })).await;

    let payload = id_token_claims(&server, now() + 3600);
    let token = key.sign(KID, &payload);

    let dir = tempdir().unwrap();
    let token_path = dir.path().join("token.json");
    fs::write(
        &token_path,
        json!({ "id_token": token, "access_token": "opaque", "token_type": "Bearer" }).to_string(),
    )
    .unwrap();

    let config = base_builder(&server).token_file(&token_path).build().unwrap();
    let claims = Validator::new(config).unwrap().acquire_and_validate().await.unwrap();

    assert_eq!(Value::from(claims), payload);
}

#[tokio::test]
async fn test_expired_token_is_rejected_unless_expiration_check_disabled() {
    let key = SigningKey::load();
    let server = MockServer::start().await;
    serve_jwks(&server, json!({ "keys": [key.jwk(KID)] })).await;

    let exp = now() - 1;
    let token = key.sign(KID, &id_token_claims(&server, exp));

    let result = validate_inline(&server, &token).await;
    assert!(
        matches!(result, Err(UserPoolJwtError::TokenExpired { exp: e, .. }) if e == exp),
        "expected TokenExpired, got {result:?}"
    );

    let config = base_builder(&server)
        .id_token(token)
        .verify_expiration(false)
        .build()
        .unwrap();
    let claims = Validator::new(config).unwrap().acquire_and_validate().await.unwrap();
    assert_eq!(claims.exp(), Some(exp));
}

#[tokio::test]
async fn test_jwks_server_error_fails_fetch() {
    let key = SigningKey::load();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(jwks_path()))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .expect(1)
        .mount(&server)
        .await;

    let token = key.sign(KID, &id_token_claims(&server, now() + 3600));
    let result = validate_inline(&server, &token).await;

    assert!(
        matches!(result, Err(UserPoolJwtError::JwksFetchFailed { status: Some(500), .. })),
        "expected JwksFetchFailed, got {result:?}"
    );
}

#[tokio::test]
async fn test_audience_mismatch() {
    let key = SigningKey::load();
    let server = MockServer::start().await;
    serve_jwks(&server, json!({ "keys": [key.jwk(KID)] })).await;

    let mut payload = id_token_claims(&server, now() + 3600);
    payload["aud"] = json!("some-other-client");
    let token = key.sign(KID, &payload);

    let result = validate_inline(&server, &token).await;
    assert!(
        matches!(&result, Err(UserPoolJwtError::AudienceMismatch { expected, actual })
            if expected == CLIENT_ID && actual == &json!("some-other-client")),
        "expected AudienceMismatch, got {result:?}"
    );
}

#[tokio::test]
async fn test_issuer_mismatch() {
    let key = SigningKey::load();
    let server = MockServer::start().await;
    serve_jwks(&server, json!({ "keys": [key.jwk(KID)] })).await;

    let mut payload = id_token_claims(&server, now() + 3600);
    payload["iss"] = json!(format!("{}/{REGION}/us-east-1_OtherPool", server.uri()));
    let token = key.sign(KID, &payload);

    let result = validate_inline(&server, &token).await;
    assert!(
        matches!(&result, Err(UserPoolJwtError::IssuerMismatch { expected, .. }) if expected == &issuer(&server)),
        "expected IssuerMismatch, got {result:?}"
    );
}

#[tokio::test]
async fn test_tampered_payload_fails_signature() {
    let key = SigningKey::load();
    let server = MockServer::start().await;
    serve_jwks(&server, json!({ "keys": [key.jwk(KID)] })).await;

    let payload = id_token_claims(&server, now() + 3600);
    let token = key.sign(KID, &payload);

    // Swap in a payload claiming a different subject but keep the original signature.
    let mut forged = payload.clone();
    forged["sub"] = json!("admin");
    let segments: Vec<&str> = token.split('.').collect();
    let forged_token = format!(
        "{}.{}.{}",
        segments[0],
        URL_SAFE_NO_PAD.encode(forged.to_string()),
        segments[2]
    );

    let result = validate_inline(&server, &forged_token).await;
    assert!(
        matches!(result, Err(UserPoolJwtError::SignatureInvalid(_))),
        "expected SignatureInvalid, got {result:?}"
    );
}

#[tokio::test]
async fn test_symmetric_algorithm_is_rejected() {
    let key = SigningKey::load();
    let server = MockServer::start().await;
    serve_jwks(&server, json!({ "keys": [key.jwk(KID)] })).await;

    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(KID.to_string());
    let token = encode(
        &header,
        &id_token_claims(&server, now() + 3600),
        &EncodingKey::from_secret(b"guessable"),
    )
    .unwrap();

    let result = validate_inline(&server, &token).await;
    assert!(
        matches!(result, Err(UserPoolJwtError::SignatureInvalid(_))),
        "expected SignatureInvalid, got {result:?}"
    );
}

#[tokio::test]
async fn test_unknown_kid_is_key_not_found() {
    let key = SigningKey::load();
    let server = MockServer::start().await;
    serve_jwks(&server, json!({ "keys": [key.jwk(KID)] })).await;

    let token = key.sign("rotated-away", &id_token_claims(&server, now() + 3600));
    let result = validate_inline(&server, &token).await;

    assert!(
        matches!(&result, Err(UserPoolJwtError::KeyNotFound(kid)) if kid == "rotated-away"),
        "expected KeyNotFound, got {result:?}"
    );
}

#[tokio::test]
async fn test_malformed_jwks_body() {
    let key = SigningKey::load();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(jwks_path()))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let token = key.sign(KID, &id_token_claims(&server, now() + 3600));
    let result = validate_inline(&server, &token).await;
    assert!(
        matches!(result, Err(UserPoolJwtError::JwksParseFailed(_))),
        "expected JwksParseFailed, got {result:?}"
    );
}

#[tokio::test]
async fn test_jwks_timeout() {
    let key = SigningKey::load();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(jwks_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "keys": [key.jwk(KID)] }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let token = key.sign(KID, &id_token_claims(&server, now() + 3600));
    let config = base_builder(&server)
        .id_token(token)
        .request_timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    let result = Validator::new(config).unwrap().acquire_and_validate().await;

    assert!(
        matches!(result, Err(UserPoolJwtError::NetworkTimeout { .. })),
        "expected NetworkTimeout, got {result:?}"
    );
}

#[tokio::test]
async fn test_sub_second_request_timeout_is_honoured() {
    let key = SigningKey::load();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(jwks_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "keys": [key.jwk(KID)] }))
                .set_delay(Duration::from_millis(50)),
        )
        .mount(&server)
        .await;

    let payload = id_token_claims(&server, now() + 3600);
    let config = base_builder(&server)
        .id_token(key.sign(KID, &payload))
        .request_timeout(Duration::from_millis(500))
        .build()
        .unwrap();
    assert_eq!(config.http().request_timeout, Duration::from_millis(500));

    let claims = Validator::new(config).unwrap().acquire_and_validate().await.unwrap();
    assert_eq!(Value::from(claims), payload);
}

#[tokio::test]
async fn test_authorization_code_exchange() {
    let key = SigningKey::load();
    let server = MockServer::start().await;
    serve_jwks(&server, json!({ "keys": [key.jwk(KID)] })).await;

    let payload = id_token_claims(&server, now() + 3600);
    let token = key.sign(KID, &payload);
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id_token": token,
            "access_token": "opaque",
            "refresh_token": "opaque",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = base_builder(&server)
        .code("code with spaces&symbols=")
        .oauth_url(&format!("{}/oauth2/token", server.uri()))
        .unwrap()
        .redirect_uri("https://app.example.com/callback?from=login")
        .unwrap()
        .build()
        .unwrap();
    let claims = Validator::new(config).unwrap().acquire_and_validate().await.unwrap();
    assert_eq!(Value::from(claims), payload);

    let requests = server.received_requests().await.unwrap();
    let exchange = requests
        .iter()
        .find(|r| r.url.path() == "/oauth2/token")
        .expect("token endpoint was called");
    assert_eq!(
        exchange.headers.get("content-type").unwrap(),
        "application/x-www-form-urlencoded"
    );
    let form: HashMap<String, String> = serde_urlencoded::from_bytes(&exchange.body).unwrap();
    assert_eq!(form["grant_type"], "authorization_code");
    assert_eq!(form["client_id"], CLIENT_ID);
    assert_eq!(form["code"], "code with spaces&symbols=");
    assert_eq!(form["redirect_uri"], "https://app.example.com/callback?from=login");
    assert!(!String::from_utf8_lossy(&exchange.body).contains("https://"));
}

#[tokio::test]
async fn test_authorization_code_exchange_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rejecting/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/empty/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "opaque" })))
        .mount(&server)
        .await;

    let exchange = |endpoint: &str| {
        base_builder(&server)
            .code("auth-code")
            .oauth_url(&format!("{}{endpoint}", server.uri()))
            .unwrap()
            .redirect_uri("https://app.example.com/callback")
            .unwrap()
            .build()
            .unwrap()
    };

    let rejected = Validator::new(exchange("/rejecting/token")).unwrap().acquire_token().await;
    assert!(
        matches!(&rejected, Err(UserPoolJwtError::TokenExchangeFailed { status: Some(400), detail })
            if detail.contains("invalid_grant")),
        "expected TokenExchangeFailed(400), got {rejected:?}"
    );

    let empty = Validator::new(exchange("/empty/token")).unwrap().acquire_token().await;
    assert!(
        matches!(empty, Err(UserPoolJwtError::TokenExchangeFailed { status: Some(200), .. })),
        "expected TokenExchangeFailed, got {empty:?}"
    );
}

#[tokio::test]
async fn test_jwks_fetched_fresh_on_every_validation_by_default() {
    let key = SigningKey::load();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(jwks_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": [key.jwk(KID)] })))
        .expect(2)
        .mount(&server)
        .await;

    let token = key.sign(KID, &id_token_claims(&server, now() + 3600));
    let config = base_builder(&server).id_token(token.clone()).build().unwrap();
    let validator = Validator::new(config).unwrap();

    validator.validate(&token).await.unwrap();
    validator.validate(&token).await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn test_cached_jwks_is_refetched_when_kid_is_missing() {
    let key = SigningKey::load();
    let server = MockServer::start().await;
    // The first download only knows the old key; afterwards the provider has rotated in a new one.
    Mock::given(method("GET"))
        .and(path(jwks_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": [key.jwk("old-kid")] })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    serve_jwks(&server, json!({ "keys": [key.jwk("old-kid"), key.jwk("new-kid")] })).await;

    let claims = id_token_claims(&server, now() + 3600);
    let old_token = key.sign("old-kid", &claims);
    let new_token = key.sign("new-kid", &claims);

    let config = base_builder(&server)
        .id_token(old_token.clone())
        .jwks_cache_ttl(Duration::from_secs(300))
        .build()
        .unwrap();
    let validator = Validator::new(config).unwrap();

    validator.validate(&old_token).await.unwrap();
    validator.validate(&old_token).await.unwrap();
    assert_eq!(server.received_requests().await.unwrap().len(), 1, "second lookup is served from cache");

    validator.validate(&new_token).await.unwrap();
    assert_eq!(server.received_requests().await.unwrap().len(), 2, "unknown kid forces a refetch");

    validator.validate(&new_token).await.unwrap();
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}
