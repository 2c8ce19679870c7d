//! Streaming worker integration tests.
//!
//! Tests verify:
//! - Full streams decode every tile and finish
//! - Handshake failures surface as errors and block streaming
//! - Failing tiles are retried, then given up
//! - Viewport anchoring of the tile order
//! - Abort stops all further work

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use pyramid_streamer::error::{StreamError, TransportError};
use pyramid_streamer::pyramid::{PyramidImage, RasterPyramid, SharedPyramid};
use pyramid_streamer::stream::{
    spawn, NotifyPolicy, Resource, StreamEvent, StreamHandle, StreamEvents, StreamState, Viewport,
};
use pyramid_streamer::StreamConfig;

use super::test_utils::{
    assert_color_near, collect_until_done, level_color, next_event, tile_path, MockTransport,
    PyramidFixture,
};

const TIMEOUT: Duration = Duration::from_secs(10);

fn fast_config() -> StreamConfig {
    StreamConfig::default().with_pump_interval(Duration::from_millis(5))
}

/// Connect, fetch metadata and thumbnail, and bind a fresh raster pyramid.
async fn prepare(
    transport: MockTransport,
    config: StreamConfig,
) -> (StreamHandle, StreamEvents, Arc<RwLock<RasterPyramid>>) {
    let (handle, events) = spawn(config);
    handle.set_connection(Arc::new(transport)).unwrap();

    let metadata = handle.request_metadata().await.unwrap();
    let mut pyramid = RasterPyramid::new(metadata).unwrap();
    let thumbnail = handle.request_thumbnail().await.unwrap();
    pyramid.set_thumbnail(&thumbnail).unwrap();

    let pyramid = Arc::new(RwLock::new(pyramid));
    let shared: SharedPyramid = pyramid.clone();
    handle.bind_image(shared).unwrap();

    (handle, events, pyramid)
}

// =============================================================================
// Full Streams
// =============================================================================

#[tokio::test]
async fn test_full_stream_receives_every_tile() {
    let fixture = PyramidFixture::new(64, 64, 0, 2);
    let transport = fixture.transport();
    let (handle, mut events, pyramid) = prepare(transport.clone(), fast_config()).await;

    handle.start_streaming().unwrap();
    let seen = collect_until_done(&mut events, TIMEOUT).await;

    assert_eq!(seen.last(), Some(&StreamEvent::StreamFinished));
    assert!(seen.contains(&StreamEvent::ViewUpdated));

    let pyramid = pyramid.read();
    assert!(pyramid.presence().is_complete());
    assert_eq!(pyramid.decoded_tiles(), fixture.tile_count());

    let progress = handle.progress().await.unwrap();
    assert_eq!(progress.state, StreamState::Finished);
    assert_eq!(progress.received, 21);
    assert_eq!(progress.given_up, 0);

    // Each tile fetched exactly once.
    assert_eq!(transport.tile_requests().await.len(), 21);
}

#[tokio::test]
async fn test_tiles_are_fetched_coarse_to_fine() {
    let fixture = PyramidFixture::new(64, 64, 0, 2);
    let transport = fixture.transport();
    let (handle, mut events, _pyramid) = prepare(transport.clone(), fast_config()).await;

    handle.start_streaming().unwrap();
    collect_until_done(&mut events, TIMEOUT).await;

    let requests = transport.tile_requests().await;
    let levels: Vec<u32> = requests
        .iter()
        .map(|p| {
            p.trim_start_matches("tile_lvl")
                .split('_')
                .next()
                .unwrap()
                .parse()
                .unwrap()
        })
        .collect();
    let mut sorted = levels.clone();
    sorted.sort_unstable();
    assert_eq!(levels, sorted);
    assert_eq!(requests[0], "tile_lvl0_0.png");
}

#[tokio::test]
async fn test_composed_image_uses_finest_tiles() {
    let fixture = PyramidFixture::new(64, 64, 0, 2);
    let (handle, mut events, pyramid) = prepare(fixture.transport(), fast_config()).await;

    handle.start_streaming().unwrap();
    collect_until_done(&mut events, TIMEOUT).await;

    let composed = pyramid.read().compose(1.0);
    assert_eq!(composed.dimensions(), (64, 64));
    assert_color_near(composed.get_pixel(5, 5).0, level_color(2));
    assert_color_near(composed.get_pixel(60, 40).0, level_color(2));
}

#[tokio::test]
async fn test_every_tile_policy_notifies_per_tile() {
    let fixture = PyramidFixture::new(32, 32, 0, 1);
    let config = fast_config().with_notify_policy(NotifyPolicy::EveryTile);
    let (handle, mut events, _pyramid) = prepare(fixture.transport(), config).await;

    handle.start_streaming().unwrap();
    let seen = collect_until_done(&mut events, TIMEOUT).await;

    let updates = seen
        .iter()
        .filter(|e| **e == StreamEvent::ViewUpdated)
        .count();
    assert_eq!(updates, 5);
}

// =============================================================================
// Viewport
// =============================================================================

#[tokio::test]
async fn test_viewport_anchors_tile_order() {
    let fixture = PyramidFixture::new(64, 64, 0, 2);
    let transport = fixture.transport();
    let (handle, mut events, _pyramid) = prepare(transport.clone(), fast_config()).await;

    // Bottom-right finest tile.
    handle
        .viewport_changed(Viewport::new(48.0, 48.0, 16.0, 16.0))
        .unwrap();
    handle.start_streaming().unwrap();
    collect_until_done(&mut events, TIMEOUT).await;

    let requests = transport.tile_requests().await;
    assert_eq!(
        &requests[..3],
        &[tile_path(0, 0, 0), tile_path(1, 1, 1), tile_path(3, 3, 2)]
    );
    // Ring 1 goes back to level 1, then the finest band around the anchor.
    let ring_one: Vec<String> = vec![
        tile_path(0, 0, 1),
        tile_path(0, 1, 1),
        tile_path(1, 0, 1),
        tile_path(2, 2, 2),
        tile_path(2, 3, 2),
        tile_path(3, 2, 2),
    ];
    assert_eq!(&requests[3..9], ring_one.as_slice());
    assert_eq!(requests.len(), fixture.tile_count());
}

// =============================================================================
// Handshake Failures
// =============================================================================

#[tokio::test]
async fn test_missing_metadata_reports_error() {
    let fixture = PyramidFixture::new(64, 64, 0, 2).without("info.json");
    let (handle, mut events) = spawn(fast_config());
    handle.set_connection(Arc::new(fixture.transport())).unwrap();

    let result = handle.request_metadata().await;
    assert!(matches!(
        result,
        Err(StreamError::Transport(TransportError::Status { status: 404, .. }))
    ));
    assert!(matches!(
        next_event(&mut events, TIMEOUT).await,
        StreamEvent::Error(_)
    ));
}

#[tokio::test]
async fn test_malformed_metadata_is_protocol_violation() {
    let fixture = PyramidFixture::new(64, 64, 0, 2).with_metadata(b"{\"width\": 10");
    let (handle, mut events) = spawn(fast_config());
    handle.set_connection(Arc::new(fixture.transport())).unwrap();

    assert!(matches!(
        handle.request_metadata().await,
        Err(StreamError::ProtocolViolation(_))
    ));
    assert!(matches!(
        next_event(&mut events, TIMEOUT).await,
        StreamEvent::Error(_)
    ));
}

#[tokio::test]
async fn test_handshake_failure_blocks_streaming_until_reconnect() {
    let fixture = PyramidFixture::new(32, 32, 0, 1);
    let broken = fixture.transport().with_failures("thumb.jpg", 1);
    let (handle, mut events, _pyramid) = {
        let (handle, events) = spawn(fast_config());
        handle.set_connection(Arc::new(broken)).unwrap();
        let metadata = handle.request_metadata().await.unwrap();
        assert!(handle.request_thumbnail().await.is_err());
        let pyramid = Arc::new(RwLock::new(RasterPyramid::new(metadata).unwrap()));
        let shared: SharedPyramid = pyramid.clone();
        handle.bind_image(shared).unwrap();
        (handle, events, pyramid)
    };
    assert!(matches!(
        next_event(&mut events, TIMEOUT).await,
        StreamEvent::Error(_)
    ));

    // Streaming refuses to start on the errored connection.
    handle.start_streaming().unwrap();
    match next_event(&mut events, TIMEOUT).await {
        StreamEvent::Error(message) => assert!(message.contains("error state")),
        other => panic!("expected error, got {:?}", other),
    }

    // A new connection clears the error; the image must be bound again.
    let transport = fixture.transport();
    handle.set_connection(Arc::new(transport.clone())).unwrap();
    let metadata = handle.request_metadata().await.unwrap();
    let pyramid = Arc::new(RwLock::new(RasterPyramid::new(metadata).unwrap()));
    let shared: SharedPyramid = pyramid.clone();
    handle.bind_image(shared).unwrap();
    handle.start_streaming().unwrap();

    let seen = collect_until_done(&mut events, TIMEOUT).await;
    assert_eq!(seen.last(), Some(&StreamEvent::StreamFinished));
    assert!(pyramid.read().presence().is_complete());
}

#[tokio::test]
async fn test_start_without_connection_reports_error() {
    let (handle, mut events) = spawn(fast_config());
    handle.start_streaming().unwrap();
    match next_event(&mut events, TIMEOUT).await {
        StreamEvent::Error(message) => assert!(message.contains("No connection")),
        other => panic!("expected error, got {:?}", other),
    }
    assert!(matches!(
        handle.request_metadata().await,
        Err(StreamError::NotConnected)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_handshake() {
    let fixture = PyramidFixture::new(64, 32, 1, 2);
    let (handle, _events) = spawn(fast_config());
    handle.set_connection(Arc::new(fixture.transport())).unwrap();

    let metadata = tokio::task::spawn_blocking(move || handle.request_metadata_blocking())
        .await
        .unwrap()
        .unwrap();
    assert_eq!((metadata.width, metadata.height), (64, 32));
    assert_eq!((metadata.min_level, metadata.max_level), (1, 2));
    assert_eq!(metadata.format, "png");
}

// =============================================================================
// Tile Failures
// =============================================================================

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let fixture = PyramidFixture::new(32, 32, 0, 1);
    let path = tile_path(0, 1, 1);
    let transport = fixture.transport().with_failures(path.clone(), 2);
    let (handle, mut events, pyramid) = prepare(transport.clone(), fast_config()).await;

    handle.start_streaming().unwrap();
    collect_until_done(&mut events, TIMEOUT).await;

    assert_eq!(transport.count_for(&path).await, 3);
    assert!(pyramid.read().presence().is_tile_present(0, 1, 1));

    let progress = handle.progress().await.unwrap();
    assert_eq!(progress.received, 5);
    assert_eq!(progress.given_up, 0);
}

#[tokio::test]
async fn test_persistent_failure_is_given_up() {
    let fixture = PyramidFixture::new(32, 32, 0, 1);
    let path = tile_path(0, 0, 1);
    let transport = fixture.transport().with_failures(path.clone(), 100);
    let (handle, mut events, pyramid) = prepare(transport.clone(), fast_config()).await;

    handle.start_streaming().unwrap();
    let seen = collect_until_done(&mut events, TIMEOUT).await;

    // Per-tile failures never surface as errors.
    assert!(!seen.iter().any(|e| matches!(e, StreamEvent::Error(_))));
    assert_eq!(seen.last(), Some(&StreamEvent::StreamFinished));

    assert_eq!(transport.count_for(&path).await, 3);
    assert!(!pyramid.read().presence().is_tile_present(0, 0, 1));

    let progress = handle.progress().await.unwrap();
    assert_eq!(progress.received, 4);
    assert_eq!(progress.given_up, 1);

    // The tile after the abandoned one was fetched right after it.
    let requests = transport.tile_requests().await;
    let last_attempt = requests.iter().rposition(|p| *p == path).unwrap();
    assert_eq!(requests[last_attempt + 1], tile_path(0, 1, 1));
}

#[tokio::test]
async fn test_undecodable_tile_is_given_up() {
    let fixture = PyramidFixture::new(32, 32, 0, 1);
    let mut resources = fixture.resources();
    resources.insert(tile_path(1, 1, 1), bytes::Bytes::from_static(b"not an image"));
    let transport = MockTransport::new(resources);
    let (handle, mut events, pyramid) = prepare(transport.clone(), fast_config()).await;

    handle.start_streaming().unwrap();
    collect_until_done(&mut events, TIMEOUT).await;

    assert_eq!(transport.count_for(&tile_path(1, 1, 1)).await, 3);
    assert!(!pyramid.read().presence().is_tile_present(1, 1, 1));
    assert_eq!(handle.progress().await.unwrap().given_up, 1);
}

// =============================================================================
// Abort
// =============================================================================

#[tokio::test]
async fn test_abort_stops_streaming() {
    let fixture = PyramidFixture::new(64, 64, 0, 2);
    let (handle, mut events, pyramid) = prepare(fixture.transport(), fast_config()).await;

    // Swap in a slow connection so a fetch is in flight when aborting.
    let slow = fixture.transport().with_delay(Duration::from_millis(200));
    handle.set_connection(Arc::new(slow.clone())).unwrap();
    let shared: SharedPyramid = pyramid.clone();
    handle.bind_image(shared).unwrap();
    handle.start_streaming().unwrap();

    // Let the first fetch go out.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(slow.request_count(), 1);
    handle.abort().unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(slow.request_count(), 1);
    assert_eq!(pyramid.read().presence().covered_cells(0), 0);
    assert!(events.try_recv().is_none());

    let progress = handle.progress().await.unwrap();
    assert_eq!(progress.state, StreamState::Aborted);
    assert_eq!(progress.received, 0);

    // The image was released: the test now holds the only reference.
    assert_eq!(Arc::strong_count(&pyramid), 1);
}

#[tokio::test]
async fn test_abort_silences_pending_handshake() {
    let fixture = PyramidFixture::new(32, 32, 0, 1).without("info.json");
    let slow = fixture.transport().with_delay(Duration::from_millis(100));
    let (handle, mut events) = spawn(fast_config());
    handle.set_connection(Arc::new(slow)).unwrap();

    let pending = handle.request(Resource::Metadata).unwrap();
    handle.abort().unwrap();

    // The caller still gets its answer.
    assert!(matches!(
        pending.wait().await,
        Err(StreamError::Transport(TransportError::Status { status: 404, .. }))
    ));

    let progress = handle.progress().await.unwrap();
    assert_eq!(progress.state, StreamState::Aborted);
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn test_non_finite_viewport_keeps_worker_alive() {
    let fixture = PyramidFixture::new(32, 32, 0, 1);
    let (handle, mut events, pyramid) = prepare(fixture.transport(), fast_config()).await;

    handle.start_streaming().unwrap();
    handle
        .viewport_changed(Viewport::new(f64::NAN, 0.0, 10.0, 10.0))
        .unwrap();

    let seen = collect_until_done(&mut events, TIMEOUT).await;
    assert_eq!(seen.last(), Some(&StreamEvent::StreamFinished));
    assert!(pyramid.read().presence().is_complete());
    assert_eq!(
        handle.progress().await.unwrap().state,
        StreamState::Finished
    );
}

#[tokio::test]
async fn test_worker_exits_when_handle_dropped() {
    let (handle, mut events) = spawn(fast_config());
    drop(handle);
    let closed = tokio::time::timeout(TIMEOUT, events.recv()).await.unwrap();
    assert_eq!(closed, None);
}
