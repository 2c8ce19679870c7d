use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use url::Url;

use super::http::HttpTransport;
use super::s3::{create_s3_client, normalize_prefix, S3Transport};
use super::transport::Transport;
use crate::error::TransportError;

/// Default AWS region for `s3://` locations.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Username and optional password passed through to the transport.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Options that only matter when opening a connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Custom S3 endpoint for S3-compatible services
    pub s3_endpoint: Option<String>,

    /// AWS region for S3
    pub s3_region: String,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            s3_endpoint: None,
            s3_region: DEFAULT_REGION.to_string(),
        }
    }
}

/// Base location of a remote pyramid.
///
/// Parsed from `http://`, `https://` or `s3://` URLs. HTTP locations always
/// end with `/` so that relative resources resolve inside the pyramid
/// directory; userinfo in the URL is split off into [`Credentials`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Http {
        base: Url,
        credentials: Option<Credentials>,
    },
    S3 {
        bucket: String,
        prefix: String,
    },
}

impl Location {
    /// Parse a base location.
    pub fn parse(input: &str) -> Result<Self, TransportError> {
        let mut url = Url::parse(input.trim())
            .map_err(|e| TransportError::InvalidLocation(format!("{}: {}", input, e)))?;

        match url.scheme() {
            "http" | "https" => {
                let credentials = if url.username().is_empty() {
                    None
                } else {
                    Some(Credentials::new(
                        url.username(),
                        url.password().map(str::to_string),
                    ))
                };
                let _ = url.set_username("");
                let _ = url.set_password(None);

                if !url.path().ends_with('/') {
                    let path = format!("{}/", url.path());
                    url.set_path(&path);
                }
                url.set_query(None);
                url.set_fragment(None);

                Ok(Location::Http {
                    base: url,
                    credentials,
                })
            }
            "s3" => {
                let bucket = url
                    .host_str()
                    .filter(|b| !b.is_empty())
                    .ok_or_else(|| {
                        TransportError::InvalidLocation(format!("{}: missing bucket", input))
                    })?
                    .to_string();
                Ok(Location::S3 {
                    bucket,
                    prefix: normalize_prefix(url.path()),
                })
            }
            other => Err(TransportError::InvalidLocation(format!(
                "unsupported scheme '{}' in {}",
                other, input
            ))),
        }
    }

    /// Replace the credentials of an HTTP location.
    ///
    /// S3 locations authenticate through the AWS credential chain and are
    /// returned unchanged.
    pub fn with_credentials(self, credentials: Credentials) -> Self {
        match self {
            Location::Http { base, .. } => Location::Http {
                base,
                credentials: Some(credentials),
            },
            other => other,
        }
    }

    /// Credentials attached to this location, if any.
    pub fn credentials(&self) -> Option<&Credentials> {
        match self {
            Location::Http { credentials, .. } => credentials.as_ref(),
            Location::S3 { .. } => None,
        }
    }

    /// Open a transport rooted at this location.
    pub async fn connect(
        &self,
        options: &ConnectOptions,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        match self {
            Location::Http { base, credentials } => Ok(Arc::new(HttpTransport::new(
                base.clone(),
                credentials.clone(),
            )?)),
            Location::S3 { bucket, prefix } => {
                let client =
                    create_s3_client(options.s3_endpoint.as_deref(), &options.s3_region).await;
                Ok(Arc::new(S3Transport::new(
                    client,
                    bucket.clone(),
                    prefix.clone(),
                )))
            }
        }
    }
}

impl FromStr for Location {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Location::parse(s)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Http { base, .. } => write!(f, "{}", base),
            Location::S3 { bucket, prefix } => write!(f, "s3://{}/{}", bucket, prefix),
        }
    }
}
