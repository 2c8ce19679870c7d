//! # Pyramid Streamer
//!
//! Progressive streaming of remote multi-resolution image pyramids.
//!
//! A pyramid is stored remotely as a metadata document, a thumbnail and one
//! resource per tile per level. This library fetches the tiles one at a time,
//! coarse to fine, starting with the ones under the viewport, so a viewer can
//! show a sharpening image long before every tile has arrived.
//!
//! ## Features
//!
//! - **Morton-indexed tiles**: tile names and the presence map use Z-order
//!   indices, so a tile's descendants form one contiguous run
//! - **Expanding ring traversal**: the viewport's area is fetched first at
//!   every level, then the search widens ring by ring
//! - **Retry with give-up**: a tile is retried up to three times, then skipped
//! - **HTTP and S3 transports**: `http(s)://` via reqwest, `s3://` via the
//!   AWS SDK
//!
//! ## Architecture
//!
//! - [`pyramid`] - Morton indexing, presence map, metadata and the
//!   [`PyramidImage`] capability trait
//! - [`io`] - Transports and location parsing
//! - [`stream`] - Ring search, worker state machine and the worker task
//! - [`config`] - CLI and worker configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use pyramid_streamer::{share, spawn, Location, ConnectOptions, RasterPyramid, StreamConfig, StreamEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (handle, mut events) = spawn(StreamConfig::default());
//!
//!     let location = Location::parse("https://example.com/pyramids/mural/")?;
//!     handle.connect(&location, &ConnectOptions::default()).await?;
//!
//!     let metadata = handle.request_metadata().await?;
//!     let image = share(RasterPyramid::new(metadata)?);
//!     handle.bind_image(image)?;
//!     handle.start_streaming()?;
//!
//!     while let Some(event) = events.recv().await {
//!         if event == StreamEvent::StreamFinished {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod pyramid;
pub mod stream;

// Re-export commonly used types
pub use config::{Cli, Command, ConnectionArgs, InfoArgs, NotifyArg, StreamArgs, StreamConfig};
pub use error::{PyramidError, StreamError, TransportError};
pub use io::{
    create_s3_client, ConnectOptions, Credentials, HttpTransport, Location, S3Transport,
    Transport,
};
pub use pyramid::{
    share, tile_rect, PixelRect, PresenceMap, PyramidImage, PyramidMetadata, RasterPyramid,
    SharedPyramid, MAX_SUPPORTED_LEVEL,
};
pub use stream::{
    spawn, Handshake, NotifyPolicy, Resource, RingSearch, StreamEvent, StreamEvents,
    StreamHandle, StreamProgress, StreamState, StreamWorker, TileCoord, TileRequest, Viewport,
};
