//! Pyramid Streamer - progressive tile streaming from the command line.
//!
//! This binary connects to a remote pyramid, streams its tiles and can write
//! the composed result to a PNG file.

use clap::Parser;
use parking_lot::RwLock;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pyramid_streamer::{
    config::{Cli, Command, ConnectionArgs, InfoArgs, StreamArgs},
    spawn, Location, RasterPyramid, SharedPyramid, StreamConfig, StreamEvent, StreamHandle,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Stream(args) => run_stream(args).await,
        Command::Info(args) => run_info(args).await,
    }
}

// =============================================================================
// Stream Command
// =============================================================================

async fn run_stream(args: StreamArgs) -> ExitCode {
    init_logging(args.connection.verbose);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }
    let Some(location) = resolve_location(&args.connection) else {
        return ExitCode::FAILURE;
    };

    let config = args.stream_config();
    info!("Configuration:");
    info!("  Location: {}", location);
    if let Some(ref endpoint) = args.connection.s3_endpoint {
        info!("  S3 endpoint: {}", endpoint);
    }
    info!("  Pump interval: {:?}", config.pump_interval);
    info!("  Notify: {:?}", config.notify_policy);

    let (handle, mut events) = spawn(config);
    if !connect(&handle, &location, &args.connection).await {
        return ExitCode::FAILURE;
    }

    let metadata = match handle.request_metadata().await {
        Ok(metadata) => metadata,
        Err(e) => {
            error!("Failed to fetch metadata: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "  Image: {}x{}, levels {}-{}, {} tiles",
        metadata.width,
        metadata.height,
        metadata.min_level,
        metadata.max_level,
        metadata.tile_count()
    );

    let mut pyramid = match RasterPyramid::new(metadata) {
        Ok(pyramid) => pyramid,
        Err(e) => {
            error!("Unusable metadata: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match handle.request_thumbnail().await {
        Ok(payload) => {
            if let Err(e) = pyramid.set_thumbnail(&payload) {
                warn!("Ignoring undecodable thumbnail: {}", e);
            }
        }
        Err(e) => {
            error!("Failed to fetch thumbnail: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let pyramid = Arc::new(RwLock::new(pyramid));
    let shared: SharedPyramid = pyramid.clone();
    let started = Instant::now();

    let sent = handle.bind_image(shared).and_then(|_| match args.viewport() {
        Some(viewport) => handle.viewport_changed(viewport),
        None => Ok(()),
    });
    if let Err(e) = sent.and_then(|_| handle.start_streaming()) {
        error!("Failed to start streaming: {}", e);
        return ExitCode::FAILURE;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(StreamEvent::ViewUpdated) => {
                    if let Ok(progress) = handle.progress().await {
                        info!(
                            received = progress.received,
                            given_up = progress.given_up,
                            current = ?progress.current,
                            "View updated"
                        );
                    }
                }
                Some(StreamEvent::StreamFinished) => break,
                Some(StreamEvent::Error(message)) => {
                    error!("Streaming failed: {}", message);
                    return ExitCode::FAILURE;
                }
                None => {
                    error!("Streaming worker stopped unexpectedly");
                    return ExitCode::FAILURE;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, aborting stream");
                let _ = handle.abort();
                return ExitCode::FAILURE;
            }
        }
    }

    if let Ok(progress) = handle.progress().await {
        info!(
            "Streamed {} tiles ({} given up) in {:.1?}",
            progress.received,
            progress.given_up,
            started.elapsed()
        );
    }

    if let Some(ref output) = args.output {
        let composed = pyramid.read().compose(args.scale);
        if let Err(e) = composed.save(output) {
            error!("Failed to write {}: {}", output, e);
            return ExitCode::FAILURE;
        }
        info!("Wrote {}x{} image to {}", composed.width(), composed.height(), output);
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Info Command
// =============================================================================

async fn run_info(args: InfoArgs) -> ExitCode {
    if args.connection.verbose {
        init_logging(true);
    }

    if let Err(e) = args.connection.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }
    let Some(location) = resolve_location(&args.connection) else {
        return ExitCode::FAILURE;
    };

    let (handle, _events) = spawn(StreamConfig::default());
    if !connect(&handle, &location, &args.connection).await {
        return ExitCode::FAILURE;
    }

    let metadata = match handle.request_metadata().await {
        Ok(metadata) => metadata,
        Err(e) => {
            eprintln!("Error: failed to fetch metadata: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&metadata) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    println!("Location:   {}", location);
    println!("Dimensions: {} x {}", metadata.width, metadata.height);
    println!("Levels:     {} - {}", metadata.min_level, metadata.max_level);
    println!("Format:     {}", metadata.format);
    if let Some(ref image_type) = metadata.image_type {
        println!("Type:       {}", image_type);
    }
    println!("Tiles:      {}", metadata.tile_count());

    ExitCode::SUCCESS
}

// =============================================================================
// Helpers
// =============================================================================

fn resolve_location(args: &ConnectionArgs) -> Option<Location> {
    match args.location() {
        Ok(location) => Some(location),
        Err(e) => {
            error!("Invalid location: {}", e);
            None
        }
    }
}

async fn connect(handle: &StreamHandle, location: &Location, args: &ConnectionArgs) -> bool {
    match handle.connect(location, &args.connect_options()).await {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to connect to {}: {}", location, e);
            false
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "pyramid_streamer=debug"
    } else {
        "pyramid_streamer=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
