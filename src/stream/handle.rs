use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::io::{ConnectOptions, Location, Transport};
use crate::pyramid::{PyramidMetadata, SharedPyramid};

use super::driver::{Command, Driver};
use super::events::{StreamEvents, StreamProgress};
use super::handshake::{Handshake, Resource};
use super::viewport::Viewport;

/// Start a streaming worker task on the current tokio runtime.
///
/// Returns the command handle and the event receiver. The task exits once
/// every clone of the handle has been dropped.
///
/// # Panics
///
/// Panics when called outside a tokio runtime.
pub fn spawn(config: StreamConfig) -> (StreamHandle, StreamEvents) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let driver = Driver::new(&config, command_rx, event_tx);
    tokio::spawn(driver.run());

    (
        StreamHandle {
            commands: command_tx,
        },
        StreamEvents::new(event_rx),
    )
}

/// Cloneable handle for sending commands to a streaming worker.
///
/// Commands are delivered in the order they are sent from one handle.
#[derive(Clone)]
pub struct StreamHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl StreamHandle {
    fn send(&self, command: Command) -> Result<(), StreamError> {
        self.commands
            .send(command)
            .map_err(|_| StreamError::WorkerStopped)
    }

    /// Open a transport for `location` and make it the worker's connection.
    pub async fn connect(
        &self,
        location: &Location,
        options: &ConnectOptions,
    ) -> Result<(), StreamError> {
        let transport = location.connect(options).await?;
        self.set_connection(transport)
    }

    /// Replace the worker's connection, discarding all streaming state.
    pub fn set_connection(&self, transport: Arc<dyn Transport>) -> Result<(), StreamError> {
        self.send(Command::SetConnection(transport))
    }

    pub fn bind_image(&self, image: SharedPyramid) -> Result<(), StreamError> {
        self.send(Command::BindImage(image))
    }

    /// Issue a handshake request. The answer arrives on the returned
    /// [`Handshake`].
    pub fn request(&self, resource: Resource) -> Result<Handshake, StreamError> {
        let (reply, handshake) = Handshake::channel();
        self.send(Command::Handshake { resource, reply })?;
        Ok(handshake)
    }

    /// Fetch and parse the pyramid metadata.
    pub async fn request_metadata(&self) -> Result<PyramidMetadata, StreamError> {
        self.request(Resource::Metadata)?.wait().await?.into_metadata()
    }

    /// Fetch the raw thumbnail payload.
    pub async fn request_thumbnail(&self) -> Result<Bytes, StreamError> {
        self.request(Resource::Thumbnail)?.wait().await?.into_thumbnail()
    }

    /// Blocking variant of [`request_metadata`](Self::request_metadata).
    pub fn request_metadata_blocking(&self) -> Result<PyramidMetadata, StreamError> {
        self.request(Resource::Metadata)?
            .blocking_wait()?
            .into_metadata()
    }

    /// Blocking variant of [`request_thumbnail`](Self::request_thumbnail).
    pub fn request_thumbnail_blocking(&self) -> Result<Bytes, StreamError> {
        self.request(Resource::Thumbnail)?
            .blocking_wait()?
            .into_thumbnail()
    }

    /// Begin streaming tiles. Failures to start are reported as
    /// [`StreamEvent::Error`](super::StreamEvent::Error).
    pub fn start_streaming(&self) -> Result<(), StreamError> {
        self.send(Command::StartStreaming)
    }

    pub fn viewport_changed(&self, viewport: Viewport) -> Result<(), StreamError> {
        self.send(Command::ViewportChanged(viewport))
    }

    /// Cancel the in-flight fetch, stop the pump and release the image.
    pub fn abort(&self) -> Result<(), StreamError> {
        self.send(Command::Abort)
    }

    /// Current progress of the worker.
    pub async fn progress(&self) -> Result<StreamProgress, StreamError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Progress(reply))?;
        rx.await.map_err(|_| StreamError::WorkerStopped)
    }
}
