//! Streaming worker state machine.
//!
//! [`StreamWorker`] holds all streaming state and is driven entirely by the
//! task in [`driver`](super::driver): pump ticks call
//! [`poll_fetch`](StreamWorker::poll_fetch), transport completions call
//! [`on_fetch_completed`](StreamWorker::on_fetch_completed). It performs no
//! I/O itself, which keeps every transition synchronous and testable.
//!
//! At most one tile is in flight. `current` is the tile being fetched (or
//! retried) and `next` the candidate after it:
//!
//! ```text
//!   tick ──► fetch(current) ──► ok   ──► decode + mark ──┐
//!                           └─► err  ──► attempts += 1   │
//!                                         │ < 3: retry   │
//!                                         │ = 3: give up─┤
//!                                                        ▼
//!                               current ← next, next ← search.advance()
//! ```

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::error::{PyramidError, StreamError, TransportError};
use crate::pyramid::{tile_rect, SharedPyramid};

use super::events::{NotifyPolicy, StreamEvent, StreamProgress, StreamState};
use super::request::{TileCoord, TileRequest, MAX_ATTEMPTS};
use super::traversal::RingSearch;
use super::viewport::Viewport;

/// A fetch the driver should issue on behalf of the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOrder {
    /// Identifies the completion that belongs to this fetch
    pub request_id: u64,

    /// Tile resource path relative to the connection's base location
    pub path: String,

    pub coord: TileCoord,
}

/// Result of one completed fetch for the current tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOutcome {
    Received,
    Retry,
    GivenUp,
}

/// Streaming state for one connection and one bound image.
pub struct StreamWorker {
    state: StreamState,
    policy: NotifyPolicy,
    image: Option<SharedPyramid>,
    /// Set when a handshake on the current connection failed
    errored: bool,
    viewport: Option<Viewport>,
    search: Option<RingSearch>,
    extension: String,
    min_level: u32,
    current: Option<TileRequest>,
    next: Option<TileRequest>,
    in_flight: Option<u64>,
    next_request_id: u64,
    received: u64,
    given_up: u64,
}

impl StreamWorker {
    pub fn new(policy: NotifyPolicy) -> Self {
        Self {
            state: StreamState::Idle,
            policy,
            image: None,
            errored: false,
            viewport: None,
            search: None,
            extension: String::new(),
            min_level: 0,
            current: None,
            next: None,
            in_flight: None,
            next_request_id: 1,
            received: 0,
            given_up: 0,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn current(&self) -> Option<&TileRequest> {
        self.current.as_ref()
    }

    pub fn next(&self) -> Option<&TileRequest> {
        self.next.as_ref()
    }

    pub fn is_errored(&self) -> bool {
        self.errored
    }

    /// Whether no fetch is outstanding.
    pub fn is_settled(&self) -> bool {
        self.in_flight.is_none()
    }

    pub fn progress(&self) -> StreamProgress {
        StreamProgress {
            state: self.state,
            received: self.received,
            given_up: self.given_up,
            current: self.current.as_ref().map(TileRequest::coord),
            next: self.next.as_ref().map(TileRequest::coord),
        }
    }

    /// Discard everything tied to the previous connection.
    pub fn set_connection(&mut self) {
        self.clear_pipeline();
        self.errored = false;
        self.received = 0;
        self.given_up = 0;
        self.state = StreamState::Connected;
        info!("Connection set");
    }

    /// Associate the pyramid that fetched tiles are decoded into.
    pub fn bind_image(&mut self, image: SharedPyramid) {
        if self.state == StreamState::Streaming {
            info!("Image rebound while streaming, stream stopped");
            self.state = StreamState::Connected;
        }
        self.clear_pipeline();
        self.image = Some(image);
    }

    /// Record that a metadata or thumbnail request failed on this connection.
    pub fn mark_handshake_failed(&mut self) {
        self.errored = true;
    }

    /// Seed `current`/`next` from the coarsest level and enter `Streaming`.
    ///
    /// Returns the events to emit: `[StreamFinished]` when nothing is left
    /// to fetch, otherwise none.
    pub fn start_streaming(&mut self) -> Result<Vec<StreamEvent>, StreamError> {
        match self.state {
            StreamState::Idle | StreamState::Aborted => return Err(StreamError::NotConnected),
            StreamState::Streaming => {
                debug!("start_streaming ignored, already streaming");
                return Ok(Vec::new());
            }
            StreamState::Connected | StreamState::Finished => {}
        }
        if self.errored {
            return Err(StreamError::ConnectionErrored);
        }
        let image = self.image.clone().ok_or(StreamError::NoImage)?;

        self.clear_pipeline();
        {
            let pyramid = image.read();
            let viewport = self
                .viewport
                .unwrap_or_else(|| Viewport::full(pyramid.width(), pyramid.height()));
            self.search = Some(RingSearch::for_image(&*pyramid, &viewport));
            self.extension = pyramid.tile_extension().to_string();
            self.min_level = pyramid.min_level();
        }

        self.current = self.next_candidate(true);
        if self.current.is_none() {
            info!("Nothing left to stream");
            self.state = StreamState::Finished;
            return Ok(vec![StreamEvent::StreamFinished]);
        }
        self.next = self.next_candidate(false);
        self.state = StreamState::Streaming;

        info!(
            current = ?self.current.as_ref().map(TileRequest::coord),
            next = ?self.next.as_ref().map(TileRequest::coord),
            "Streaming started"
        );
        Ok(Vec::new())
    }

    /// Pump tick: hand out the fetch for `current` if the previous one has
    /// settled.
    pub fn poll_fetch(&mut self) -> Option<FetchOrder> {
        if self.state != StreamState::Streaming || self.in_flight.is_some() {
            return None;
        }
        let current = self.current.as_ref()?;

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.in_flight = Some(request_id);

        let order = FetchOrder {
            request_id,
            path: current.path(&self.extension),
            coord: current.coord(),
        };
        debug!(
            request_id,
            tile = %order.coord,
            attempt = current.attempts + 1,
            "Fetching tile"
        );
        Some(order)
    }

    /// Apply the result of the fetch identified by `request_id`.
    ///
    /// Completions for any other id, or arriving outside `Streaming`, are
    /// ignored.
    pub fn on_fetch_completed(
        &mut self,
        request_id: u64,
        result: Result<Bytes, TransportError>,
    ) -> Vec<StreamEvent> {
        if self.state != StreamState::Streaming || self.in_flight != Some(request_id) {
            debug!(request_id, state = %self.state, "Ignoring stale fetch completion");
            return Vec::new();
        }
        self.in_flight = None;

        let Some(coord) = self.current.as_ref().map(TileRequest::coord) else {
            return Vec::new();
        };

        let outcome = match result {
            Ok(payload) => match self.store_tile(coord, &payload) {
                Ok(()) => TileOutcome::Received,
                Err(e) => {
                    debug!(tile = %coord, error = %e, "Tile decode failed");
                    self.record_failure()
                }
            },
            Err(e) => {
                debug!(tile = %coord, error = %e, "Tile fetch failed");
                self.record_failure()
            }
        };

        match outcome {
            TileOutcome::Received => {
                self.received += 1;
                debug!(tile = %coord, "Tile received");
                self.advance_pipeline(coord.level)
            }
            TileOutcome::Retry => Vec::new(),
            TileOutcome::GivenUp => {
                self.given_up += 1;
                warn!(tile = %coord, attempts = MAX_ATTEMPTS, "Giving up on tile");
                self.advance_pipeline(coord.level)
            }
        }
    }

    /// Re-anchor the traversal. `current` is left alone; only `next` is
    /// recomputed.
    pub fn on_viewport_changed(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
        if self.state != StreamState::Streaming {
            return;
        }
        let (Some(image), Some(search)) = (self.image.as_ref(), self.search.as_mut()) else {
            return;
        };
        {
            let pyramid = image.read();
            search.restart(viewport.to_pixel_rect(pyramid.width(), pyramid.height()));
        }
        self.next = self.next_candidate(true);
        debug!(
            next = ?self.next.as_ref().map(TileRequest::coord),
            "Viewport changed"
        );
    }

    /// Stop streaming and release the image.
    ///
    /// Returns the id of the fetch that was in flight, if any.
    pub fn abort(&mut self) -> Option<u64> {
        let in_flight = self.in_flight;
        self.clear_pipeline();
        self.image = None;
        self.state = StreamState::Aborted;
        info!(received = self.received, given_up = self.given_up, "Stream aborted");
        in_flight
    }

    fn clear_pipeline(&mut self) {
        self.search = None;
        self.current = None;
        self.next = None;
        self.in_flight = None;
    }

    fn record_failure(&mut self) -> TileOutcome {
        match self.current.as_mut().map(TileRequest::record_failure) {
            Some(true) => TileOutcome::GivenUp,
            _ => TileOutcome::Retry,
        }
    }

    fn store_tile(&self, coord: TileCoord, payload: &[u8]) -> Result<(), PyramidError> {
        let Some(image) = self.image.as_ref() else {
            return Err(PyramidError::ProtocolViolation("no image bound".to_string()));
        };
        let mut pyramid = image.write();
        let rect = tile_rect(
            pyramid.width(),
            pyramid.height(),
            coord.row,
            coord.col,
            coord.level,
        );
        pyramid.decode_tile_into(payload, rect, coord.level)?;
        pyramid
            .presence_mut()
            .mark_received(coord.row, coord.col, coord.level);
        Ok(())
    }

    /// Promote `next` to `current` and look up a new `next`.
    ///
    /// `settled_level` is the level of the tile just decoded or abandoned;
    /// both advance the same way.
    fn advance_pipeline(&mut self, settled_level: u32) -> Vec<StreamEvent> {
        self.current = self.next.take();

        let Some(promoted) = self.current.as_ref().map(TileRequest::coord) else {
            self.search = None;
            self.state = StreamState::Finished;
            info!(
                received = self.received,
                given_up = self.given_up,
                "Stream finished"
            );
            return vec![StreamEvent::ViewUpdated, StreamEvent::StreamFinished];
        };

        self.next = self.next_candidate(false);

        if self.should_notify(settled_level, promoted.level) {
            vec![StreamEvent::ViewUpdated]
        } else {
            Vec::new()
        }
    }

    fn should_notify(&self, settled_level: u32, promoted_level: u32) -> bool {
        match self.policy {
            NotifyPolicy::EveryTile => true,
            NotifyPolicy::ResolutionImproving => {
                settled_level == self.min_level || promoted_level > settled_level
            }
        }
    }

    /// Pull the next traversal candidate that is not `current`.
    ///
    /// `from_cursor` includes the cell under the cursor, used right after
    /// the search was (re)started.
    fn next_candidate(&mut self, from_cursor: bool) -> Option<TileRequest> {
        let skip = self.current.as_ref().map(TileRequest::coord);
        let image = self.image.as_ref()?;
        let search = self.search.as_mut()?;
        let pyramid = image.read();
        let presence = pyramid.presence();

        let mut candidate = if from_cursor {
            search.first(presence)
        } else {
            search.advance(presence)
        };
        while candidate.is_some() && candidate == skip {
            candidate = search.advance(presence);
        }
        candidate.map(TileRequest::new)
    }
}
