//! Progressive tile streaming.
//!
//! A streaming worker fetches one tile at a time from a [`Transport`],
//! decodes it into a shared [`PyramidImage`] and notifies its owner. Tiles
//! are visited coarse to fine around the viewport by an expanding ring
//! search, so the visible area sharpens first.
//!
//! ```text
//!   caller ── StreamHandle ──► commands ──► driver task ──► Transport::get
//!      ▲                                      │   ▲              │
//!      │                                      │   └── completion ┘
//!      └───────── StreamEvents ◄── events ────┘
//! ```
//!
//! [`Transport`]: crate::io::Transport
//! [`PyramidImage`]: crate::pyramid::PyramidImage

mod driver;
mod events;
mod handle;
mod handshake;
mod request;
mod traversal;
mod viewport;
mod worker;

pub use events::{NotifyPolicy, StreamEvent, StreamEvents, StreamProgress, StreamState};
pub use handle::{spawn, StreamHandle};
pub use handshake::{Handshake, HandshakePayload, Resource};
pub use request::{TileCoord, TileRequest, MAX_ATTEMPTS};
pub use traversal::{RingSearch, Window};
pub use viewport::Viewport;
pub use worker::{FetchOrder, StreamWorker, TileOutcome};
