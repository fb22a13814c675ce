// src/source.rs

use crate::error::UserPoolJwtError;
use crate::model::IdTokenDocument;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, instrument, warn};
use url::Url;

/// Where the raw ID token comes from. Chosen once by [`ConfigBuilder::build`](crate::config::ConfigBuilder::build).
#[derive(Clone, Debug)]
pub enum TokenSource {
    /// The token string itself.
    Inline(String),
    /// A JSON document with an `id_token` field. `-` reads standard input.
    File(PathBuf),
    /// An OAuth2 authorization-code exchange against the provider's token endpoint.
    CodeExchange {
        code: String,
        oauth_url: Url,
        redirect_uri: String,
    },
}

impl TokenSource {
    /// Produces the raw token. Exactly one origin is consulted.
    #[instrument(skip_all, fields(source = self.kind()), err)]
    pub async fn resolve(&self, http_client: &reqwest::Client, client_id: &str) -> Result<String, UserPoolJwtError> {
        match self {
            TokenSource::Inline(token) => Ok(token.clone()),
            TokenSource::File(path) => read_token_file(path).await,
            TokenSource::CodeExchange {
                code,
                oauth_url,
                redirect_uri,
            } => exchange_code(http_client, oauth_url, client_id, code, redirect_uri).await,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            TokenSource::Inline(_) => "inline",
            TokenSource::File(_) => "file",
            TokenSource::CodeExchange { .. } => "code_exchange",
        }
    }
}

/// Reads a whole JSON document from an already-open handle and extracts `id_token`.
///
/// # Errors
///
/// `ResourceUnavailable` if the reader fails, `TokenNotFound` if the content is
/// not JSON or has no string `id_token`.
pub fn read_id_token<R: Read>(mut reader: R) -> Result<String, UserPoolJwtError> {
    let mut contents = Vec::new();
    reader
        .read_to_end(&mut contents)
        .map_err(|source| UserPoolJwtError::ResourceUnavailable {
            path: "<stream>".to_string(),
            source,
        })?;
    id_token_from_document(&contents)
}

fn id_token_from_document(contents: &[u8]) -> Result<String, UserPoolJwtError> {
    let document: IdTokenDocument = serde_json::from_slice(contents)
        .map_err(|e| UserPoolJwtError::TokenNotFound(format!("token document is not valid JSON: {e}")))?;
    document
        .id_token
        .ok_or_else(|| UserPoolJwtError::TokenNotFound("token document has no 'id_token' field".to_string()))
}

async fn read_token_file(path: &Path) -> Result<String, UserPoolJwtError> {
    if path == Path::new("-") {
        debug!("Reading token document from stdin");
        return read_token_stream(tokio::io::stdin(), "<stdin>").await;
    }

    debug!("Reading token document from {}", path.display());
    let contents = tokio::fs::read(path)
        .await
        .map_err(|source| UserPoolJwtError::ResourceUnavailable {
            path: path.display().to_string(),
            source,
        })?;
    id_token_from_document(&contents)
}

async fn read_token_stream<R: AsyncRead + Unpin>(mut reader: R, label: &str) -> Result<String, UserPoolJwtError> {
    let mut contents = Vec::new();
    reader
        .read_to_end(&mut contents)
        .await
        .map_err(|source| UserPoolJwtError::ResourceUnavailable {
            path: label.to_string(),
            source,
        })?;
    id_token_from_document(&contents)
}

async fn exchange_code(
    http_client: &reqwest::Client,
    oauth_url: &Url,
    client_id: &str,
    code: &str,
    redirect_uri: &str,
) -> Result<String, UserPoolJwtError> {
    debug!("Exchanging authorization code at: {}", oauth_url);
    let transport_error = |e: reqwest::Error, status: Option<u16>| {
        if e.is_timeout() {
            UserPoolJwtError::NetworkTimeout { url: oauth_url.to_string() }
        } else {
            UserPoolJwtError::TokenExchangeFailed {
                status,
                detail: e.to_string(),
            }
        }
    };

    let response = http_client
        .post(oauth_url.clone())
        .header(reqwest::header::ACCEPT, "application/json")
        .form(&[
            ("grant_type", "authorization_code"),
            ("client_id", client_id),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .send()
        .await
        .map_err(|e| transport_error(e, None))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| transport_error(e, Some(status.as_u16())))?;

    if !status.is_success() {
        warn!(status = status.as_u16(), "Token endpoint rejected the authorization code");
        return Err(UserPoolJwtError::TokenExchangeFailed {
            status: Some(status.as_u16()),
            detail: text,
        });
    }

    let document: IdTokenDocument =
        serde_json::from_str(&text).map_err(|e| UserPoolJwtError::TokenExchangeFailed {
            status: Some(status.as_u16()),
            detail: format!("token response is not valid JSON: {e}"),
        })?;
    document.id_token.ok_or_else(|| UserPoolJwtError::TokenExchangeFailed {
        status: Some(status.as_u16()),
        detail: "token response has no 'id_token' field".to_string(),
    })
}
