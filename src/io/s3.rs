use async_trait::async_trait;
use aws_sdk_s3::Client;
use bytes::Bytes;

use super::transport::{normalize_relative, Transport};
use crate::error::TransportError;

/// S3-backed implementation of [`Transport`].
///
/// Resources live under a key prefix in one bucket: the relative path
/// `tile_lvl2_7.jpg` with prefix `pyramids/mural/` is fetched from the key
/// `pyramids/mural/tile_lvl2_7.jpg`.
#[derive(Clone)]
pub struct S3Transport {
    client: Client,
    bucket: String,
    prefix: String,
    identifier: String,
}

impl S3Transport {
    /// Create a transport for the given bucket and key prefix.
    ///
    /// A non-empty prefix is normalized to end with `/`.
    pub fn new(client: Client, bucket: String, prefix: String) -> Self {
        let prefix = normalize_prefix(&prefix);
        let identifier = format!("s3://{}/{}", bucket, prefix);
        Self {
            client,
            bucket,
            prefix,
            identifier,
        }
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Get the key prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Object key for a relative resource path.
    pub fn key_for(&self, path: &str) -> String {
        format!("{}{}", self.prefix, normalize_relative(path))
    }
}

pub(crate) fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

#[async_trait]
impl Transport for S3Transport {
    async fn get(&self, path: &str) -> Result<Bytes, TransportError> {
        let key = self.key_for(path);

        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                let is_not_found = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);

                let status_is_404 = e
                    .raw_response()
                    .map(|r| r.status().as_u16() == 404)
                    .unwrap_or(false);

                if is_not_found || status_is_404 {
                    return TransportError::NotFound(format!("s3://{}/{}", self.bucket, key));
                }

                TransportError::S3(e.to_string())
            })?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?
            .into_bytes();

        Ok(data)
    }

    fn location(&self) -> &str {
        &self.identifier
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services usually need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
