use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;

/// Trait for fetching resources relative to a remote base location.
///
/// The streaming worker only ever asks for whole resources by relative path
/// (`info.json`, `thumb.jpg`, `tile_lvl3_17.jpg`, ...). Each call is one
/// request: the returned future completing is the completion callback, and
/// dropping or aborting the task that drives it cancels the request.
///
/// Implementations must treat any non-success response as an error.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the resource at `path`, resolved against the base location.
    async fn get(&self, path: &str) -> Result<Bytes, TransportError>;

    /// Identifier of the base location (for logging).
    ///
    /// Never includes credentials.
    fn location(&self) -> &str;
}

/// Strip a leading `./` so paths can be appended to a key prefix.
pub(crate) fn normalize_relative(path: &str) -> &str {
    path.trim_start_matches("./").trim_start_matches('/')
}
