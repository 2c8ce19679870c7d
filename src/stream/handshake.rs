//! One-shot rendezvous for metadata and thumbnail requests.
//!
//! The caller issues a request through the handle and receives a
//! [`Handshake`]; the worker task answers exactly once with the typed result.

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::error::StreamError;
use crate::io::Transport;
use crate::pyramid::{PyramidMetadata, METADATA_PATH, THUMBNAIL_PATH};

/// Resource fetched before streaming starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Metadata,
    Thumbnail,
}

impl Resource {
    /// Path of the resource relative to the base location.
    pub fn path(&self) -> &'static str {
        match self {
            Resource::Metadata => METADATA_PATH,
            Resource::Thumbnail => THUMBNAIL_PATH,
        }
    }
}

/// Successful handshake payload.
#[derive(Debug, Clone)]
pub enum HandshakePayload {
    Metadata(PyramidMetadata),
    Thumbnail(Bytes),
}

pub(crate) type HandshakeResult = Result<HandshakePayload, StreamError>;

/// Pending answer to a metadata or thumbnail request.
#[derive(Debug)]
pub struct Handshake {
    rx: oneshot::Receiver<HandshakeResult>,
}

impl Handshake {
    pub(crate) fn channel() -> (oneshot::Sender<HandshakeResult>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Wait for the worker's answer.
    pub async fn wait(self) -> Result<HandshakePayload, StreamError> {
        self.rx.await.map_err(|_| StreamError::WorkerStopped)?
    }

    /// Blocking variant of [`wait`](Self::wait).
    ///
    /// # Panics
    ///
    /// Panics when called from within an async execution context.
    pub fn blocking_wait(self) -> Result<HandshakePayload, StreamError> {
        self.rx.blocking_recv().map_err(|_| StreamError::WorkerStopped)?
    }
}

impl HandshakePayload {
    pub fn into_metadata(self) -> Result<PyramidMetadata, StreamError> {
        match self {
            HandshakePayload::Metadata(metadata) => Ok(metadata),
            HandshakePayload::Thumbnail(_) => Err(StreamError::ProtocolViolation(
                "expected metadata, got thumbnail".to_string(),
            )),
        }
    }

    pub fn into_thumbnail(self) -> Result<Bytes, StreamError> {
        match self {
            HandshakePayload::Thumbnail(bytes) => Ok(bytes),
            HandshakePayload::Metadata(_) => Err(StreamError::ProtocolViolation(
                "expected thumbnail, got metadata".to_string(),
            )),
        }
    }
}

/// Fetch `resource` and check that it is usable.
pub(crate) async fn perform(transport: &dyn Transport, resource: Resource) -> HandshakeResult {
    let payload = transport.get(resource.path()).await?;
    match resource {
        Resource::Metadata => {
            let metadata = PyramidMetadata::from_slice(&payload)?;
            Ok(HandshakePayload::Metadata(metadata))
        }
        Resource::Thumbnail => Ok(HandshakePayload::Thumbnail(payload)),
    }
}
