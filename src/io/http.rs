use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use url::Url;

use super::location::Credentials;
use super::transport::{normalize_relative, Transport};
use crate::error::TransportError;

/// HTTP(S) implementation of [`Transport`].
///
/// Relative paths are resolved against a base URL whose path ends with `/`.
/// Credentials, when present, are passed through as HTTP basic auth.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base: Url,
    credentials: Option<Credentials>,
    identifier: String,
}

impl HttpTransport {
    /// Create a transport rooted at `base`.
    pub fn new(base: Url, credentials: Option<Credentials>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .build()
            .map_err(|e| TransportError::Connection(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(client, base, credentials))
    }

    /// Create a transport that reuses an existing client.
    pub fn with_client(client: Client, base: Url, credentials: Option<Credentials>) -> Self {
        let identifier = base.to_string();
        Self {
            client,
            base,
            credentials,
            identifier,
        }
    }

    /// Get the base URL.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve a relative resource path against the base URL.
    pub fn resolve(&self, path: &str) -> Result<Url, TransportError> {
        self.base
            .join(normalize_relative(path))
            .map_err(|e| TransportError::InvalidLocation(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> Result<Bytes, TransportError> {
        let url = self.resolve(path)?;

        let mut request = self.client.get(url.clone());
        if let Some(ref credentials) = self.credentials {
            request = request.basic_auth(&credentials.username, credentials.password.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                path: url.path().to_string(),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| TransportError::Connection(format!("failed to read response: {}", e)))
    }

    fn location(&self) -> &str {
        &self.identifier
    }
}
