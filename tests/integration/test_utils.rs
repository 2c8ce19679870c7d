//! Test utilities for integration tests.
//!
//! This module provides a scripted mock transport, an in-memory pyramid
//! fixture and a small axum server that serves a fixture over HTTP.

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use pyramid_streamer::error::TransportError;
use pyramid_streamer::io::Transport;
use pyramid_streamer::pyramid::{tile_rect, zorder, METADATA_PATH, THUMBNAIL_PATH};
use pyramid_streamer::stream::{StreamEvent, StreamEvents};

// =============================================================================
// Mock Transport with Request Tracking
// =============================================================================

/// A mock transport serving in-memory resources.
///
/// Individual paths can be scripted to fail a number of times before
/// succeeding, and every request is recorded in order.
pub struct MockTransport {
    resources: Arc<HashMap<String, Bytes>>,
    failures: Arc<RwLock<HashMap<String, usize>>>,
    delay: Option<Duration>,
    identifier: String,
    request_count: Arc<AtomicUsize>,
    requests: Arc<RwLock<Vec<String>>>,
}

impl MockTransport {
    pub fn new(resources: HashMap<String, Bytes>) -> Self {
        Self {
            resources: Arc::new(resources),
            failures: Arc::new(RwLock::new(HashMap::new())),
            delay: None,
            identifier: "mock://pyramid/".to_string(),
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Fail the next `times` requests for `path` with a 503.
    pub fn with_failures(self, path: impl Into<String>, times: usize) -> Self {
        self.failures
            .try_write()
            .expect("fresh transport")
            .insert(path.into(), times);
        self
    }

    /// Delay every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<String> {
        self.requests.read().await.clone()
    }

    /// Requested tile paths, in order, without handshake resources.
    pub async fn tile_requests(&self) -> Vec<String> {
        self.requests()
            .await
            .into_iter()
            .filter(|p| p.starts_with("tile_"))
            .collect()
    }

    pub async fn count_for(&self, path: &str) -> usize {
        self.requests
            .read()
            .await
            .iter()
            .filter(|p| p.as_str() == path)
            .count()
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            resources: Arc::clone(&self.resources),
            failures: Arc::clone(&self.failures),
            delay: self.delay,
            identifier: self.identifier.clone(),
            request_count: Arc::clone(&self.request_count),
            requests: Arc::clone(&self.requests),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, path: &str) -> Result<Bytes, TransportError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.write().await.push(path.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.failures.write().await;
            if let Some(remaining) = failures.get_mut(path) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(TransportError::Status {
                        status: 503,
                        path: path.to_string(),
                    });
                }
            }
        }

        self.resources
            .get(path)
            .cloned()
            .ok_or_else(|| TransportError::Status {
                status: 404,
                path: path.to_string(),
            })
    }

    fn location(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// Image Helpers
// =============================================================================

/// Create a solid-color PNG image.
pub fn create_test_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width.max(1), height.max(1), Rgba(color));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Create a test RGB JPEG image.
pub fn create_test_jpeg(width: u32, height: u32, quality: u8) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let r = (x % 256) as u8;
        let g = (y % 256) as u8;
        let b = ((x + y) % 256) as u8;
        Rgb([r, g, b])
    });

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode_image(&img).unwrap();
    buf
}

/// Color used for every tile of `level`, so composed output shows which
/// level won.
pub fn level_color(level: u32) -> [u8; 4] {
    match level % 3 {
        0 => [255, 0, 0, 255],
        1 => [0, 255, 0, 255],
        _ => [0, 0, 255, 255],
    }
}

/// Assert two colors match within resampling error.
pub fn assert_color_near(actual: [u8; 4], expected: [u8; 4]) {
    for (a, e) in actual.iter().zip(expected.iter()) {
        assert!(
            a.abs_diff(*e) <= 2,
            "color {:?} differs from {:?}",
            actual,
            expected
        );
    }
}

// =============================================================================
// Pyramid Fixture
// =============================================================================

/// Complete remote pyramid: metadata, thumbnail and every PNG tile.
pub struct PyramidFixture {
    pub min_level: u32,
    pub max_level: u32,
    resources: HashMap<String, Bytes>,
}

impl PyramidFixture {
    pub fn new(width: u32, height: u32, min_level: u32, max_level: u32) -> Self {
        let mut resources = HashMap::new();

        let metadata = serde_json::json!({
            "width": width,
            "height": height,
            "min_level": min_level,
            "max_level": max_level,
            "format": "png",
            "type": "raster",
        });
        resources.insert(
            METADATA_PATH.to_string(),
            Bytes::from(serde_json::to_vec(&metadata).unwrap()),
        );
        resources.insert(
            THUMBNAIL_PATH.to_string(),
            Bytes::from(create_test_jpeg(16, 16, 80)),
        );

        for level in min_level..=max_level {
            let side = zorder::grid_side(level);
            for row in 0..side {
                for col in 0..side {
                    let rect = tile_rect(width, height, row, col, level);
                    resources.insert(
                        tile_path(row, col, level),
                        Bytes::from(create_test_png(rect.width, rect.height, level_color(level))),
                    );
                }
            }
        }

        Self {
            min_level,
            max_level,
            resources,
        }
    }

    /// Replace the metadata document.
    pub fn with_metadata(mut self, body: &[u8]) -> Self {
        self.resources
            .insert(METADATA_PATH.to_string(), Bytes::copy_from_slice(body));
        self
    }

    /// Drop a resource so requests for it return 404.
    pub fn without(mut self, path: &str) -> Self {
        self.resources.remove(path);
        self
    }

    pub fn tile_count(&self) -> usize {
        (self.min_level..=self.max_level)
            .map(|level| zorder::grid_len(level) as usize)
            .sum()
    }

    pub fn resources(&self) -> HashMap<String, Bytes> {
        self.resources.clone()
    }

    pub fn transport(&self) -> MockTransport {
        MockTransport::new(self.resources())
    }
}

/// Remote path of tile `(row, col)` at `level` in a PNG fixture.
pub fn tile_path(row: u32, col: u32, level: u32) -> String {
    format!("tile_lvl{}_{}.png", level, zorder::index(row, col, level))
}

// =============================================================================
// HTTP Fixture Server
// =============================================================================

struct FixtureState {
    resources: HashMap<String, Bytes>,
    require_auth: bool,
    hits: AtomicUsize,
}

/// A running axum server serving a fixture under `/pyramid/`.
pub struct FixtureServer {
    pub addr: SocketAddr,
    state: Arc<FixtureState>,
    task: JoinHandle<()>,
}

impl FixtureServer {
    /// Base URL of the pyramid, without credentials.
    pub fn base_url(&self) -> String {
        format!("http://{}/pyramid/", self.addr)
    }

    /// Base URL with basic-auth userinfo.
    pub fn base_url_with_credentials(&self, user: &str, password: &str) -> String {
        format!("http://{}:{}@{}/pyramid/", user, password, self.addr)
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_resource(
    State(state): State<Arc<FixtureState>>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);

    if state.require_auth {
        let authorized = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("Basic "))
            .unwrap_or(false);
        if !authorized {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    match state.resources.get(&file) {
        Some(body) => (StatusCode::OK, body.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Serve `fixture` on an ephemeral localhost port.
pub async fn serve_fixture(fixture: &PyramidFixture, require_auth: bool) -> FixtureServer {
    let state = Arc::new(FixtureState {
        resources: fixture.resources(),
        require_auth,
        hits: AtomicUsize::new(0),
    });

    let router = Router::new()
        .route("/pyramid/{file}", get(serve_resource))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    FixtureServer { addr, state, task }
}

// =============================================================================
// Event Helpers
// =============================================================================

/// Collect events until `StreamFinished` or an `Error`, failing the test
/// after `timeout`.
pub async fn collect_until_done(events: &mut StreamEvents, timeout: Duration) -> Vec<StreamEvent> {
    let mut seen = Vec::new();
    let result = tokio::time::timeout(timeout, async {
        while let Some(event) = events.recv().await {
            let done = matches!(event, StreamEvent::StreamFinished | StreamEvent::Error(_));
            seen.push(event);
            if done {
                break;
            }
        }
    })
    .await;
    assert!(result.is_ok(), "stream did not finish in time, saw {:?}", seen);
    seen
}

/// Wait for the next event, failing the test after `timeout`.
pub async fn next_event(events: &mut StreamEvents, timeout: Duration) -> StreamEvent {
    tokio::time::timeout(timeout, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("worker stopped")
}
