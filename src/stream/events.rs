use std::fmt;

use tokio::sync::mpsc;

use super::request::TileCoord;

/// Notification from the worker to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// New tile data is in the pyramid; the view can be redrawn.
    ViewUpdated,

    /// Every tile has been fetched or abandoned.
    StreamFinished,

    /// A metadata or thumbnail request failed.
    Error(String),
}

/// When the worker emits [`StreamEvent::ViewUpdated`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyPolicy {
    /// After every decoded tile.
    EveryTile,

    /// After a coarsest-level tile, and whenever the traversal moves on to a
    /// finer level than the tile just consumed.
    #[default]
    ResolutionImproving,
}

/// Lifecycle state of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    Connected,
    Streaming,
    Finished,
    Aborted,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Idle => "idle",
            StreamState::Connected => "connected",
            StreamState::Streaming => "streaming",
            StreamState::Finished => "finished",
            StreamState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of streaming progress.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamProgress {
    pub state: StreamState,
    pub received: u64,
    pub given_up: u64,
    pub current: Option<TileCoord>,
    pub next: Option<TileCoord>,
}

/// Receiving side of the worker's event channel.
#[derive(Debug)]
pub struct StreamEvents {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
}

impl StreamEvents {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<StreamEvent>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the worker task has exited.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Blocking variant of [`recv`](Self::recv) for non-async callers.
    pub fn blocking_recv(&mut self) -> Option<StreamEvent> {
        self.rx.blocking_recv()
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        self.rx.try_recv().ok()
    }
}
