//! Configuration for the pyramid streamer.
//!
//! Command-line arguments are parsed with clap; every option can also be set
//! through an environment variable with the `PYR_` prefix:
//!
//! - `PYR_USER` / `PYR_PASSWORD` - Credentials for HTTP locations
//! - `PYR_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `PYR_S3_REGION` - AWS region (default: us-east-1)
//! - `PYR_PUMP_INTERVAL_MS` - Pump period in milliseconds (default: 200)
//! - `PYR_NOTIFY` - `every-tile` or `resolution-improving`
//!
//! [`StreamConfig`] is the library-side configuration of a streaming worker
//! and does not depend on the CLI.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::io::{ConnectOptions, Credentials, Location, DEFAULT_REGION};
use crate::stream::{NotifyPolicy, Viewport};

// =============================================================================
// Default Values
// =============================================================================

/// Default pump period in milliseconds.
pub const DEFAULT_PUMP_INTERVAL_MS: u64 = 200;

/// Default scale of the composed preview image.
pub const DEFAULT_SCALE: f64 = 1.0;

// =============================================================================
// Stream Configuration
// =============================================================================

/// Settings of one streaming worker.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Period of the fetch pump
    pub pump_interval: Duration,

    /// When `ViewUpdated` events are emitted
    pub notify_policy: NotifyPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            pump_interval: Duration::from_millis(DEFAULT_PUMP_INTERVAL_MS),
            notify_policy: NotifyPolicy::default(),
        }
    }
}

impl StreamConfig {
    pub fn with_pump_interval(mut self, interval: Duration) -> Self {
        self.pump_interval = interval;
        self
    }

    pub fn with_notify_policy(mut self, policy: NotifyPolicy) -> Self {
        self.notify_policy = policy;
        self
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// Pyramid Streamer - progressive multi-resolution tile streaming.
///
/// Fetches the tiles of a remote image pyramid coarse to fine, starting
/// around the viewport.
#[derive(Parser, Debug, Clone)]
#[command(name = "pyramid-streamer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Stream every tile of a pyramid and optionally write a preview image.
    Stream(StreamArgs),

    /// Fetch and print the metadata of a pyramid.
    Info(InfoArgs),
}

/// Options shared by every subcommand that opens a connection.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Base location of the pyramid (http://, https:// or s3://).
    pub location: String,

    /// Username for HTTP basic auth.
    #[arg(long, env = "PYR_USER")]
    pub user: Option<String>,

    /// Password for HTTP basic auth.
    #[arg(long, env = "PYR_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "PYR_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "PYR_S3_REGION")]
    pub s3_region: String,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ConnectionArgs {
    /// Parse the location and attach any configured credentials.
    pub fn location(&self) -> Result<Location, String> {
        let location = Location::parse(&self.location).map_err(|e| e.to_string())?;
        Ok(match &self.user {
            Some(user) => location.with_credentials(Credentials::new(user, self.password.clone())),
            None => location,
        })
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            s3_endpoint: self.s3_endpoint.clone(),
            s3_region: self.s3_region.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.location()?;
        if self.password.is_some() && self.user.is_none() {
            return Err("--password requires --user (or PYR_USER)".to_string());
        }
        if self.s3_region.is_empty() {
            return Err("S3 region must not be empty".to_string());
        }
        Ok(())
    }
}

/// When to report view updates, as accepted on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyArg {
    EveryTile,
    #[default]
    ResolutionImproving,
}

impl From<NotifyArg> for NotifyPolicy {
    fn from(arg: NotifyArg) -> Self {
        match arg {
            NotifyArg::EveryTile => NotifyPolicy::EveryTile,
            NotifyArg::ResolutionImproving => NotifyPolicy::ResolutionImproving,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct StreamArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Viewport as x,y,width,height in full-resolution pixels.
    ///
    /// Defaults to the whole image.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub viewport: Option<Vec<f64>>,

    /// Write the composed image to this PNG file when streaming finishes.
    #[arg(short, long)]
    pub output: Option<String>,

    /// Scale of the composed image relative to full resolution.
    #[arg(long, default_value_t = DEFAULT_SCALE)]
    pub scale: f64,

    /// Pump period in milliseconds.
    #[arg(long, default_value_t = DEFAULT_PUMP_INTERVAL_MS, env = "PYR_PUMP_INTERVAL_MS")]
    pub pump_interval_ms: u64,

    /// When to report view updates.
    #[arg(long, value_enum, default_value_t = NotifyArg::default(), env = "PYR_NOTIFY")]
    pub notify: NotifyArg,
}

impl StreamArgs {
    pub fn validate(&self) -> Result<(), String> {
        self.connection.validate()?;

        if self.pump_interval_ms == 0 {
            return Err("pump_interval_ms must be greater than 0".to_string());
        }

        if !(self.scale > 0.0 && self.scale <= 1.0) {
            return Err("scale must be in (0, 1]".to_string());
        }

        if let Some(ref values) = self.viewport {
            if values.len() != 4 {
                return Err("viewport takes exactly four values: x,y,width,height".to_string());
            }
            if values.iter().any(|v| !v.is_finite()) {
                return Err("viewport values must be finite numbers".to_string());
            }
            if values[2] <= 0.0 || values[3] <= 0.0 {
                return Err("viewport width and height must be positive".to_string());
            }
        }

        Ok(())
    }

    /// Parsed viewport, if one was given.
    pub fn viewport(&self) -> Option<Viewport> {
        match self.viewport.as_deref() {
            Some(&[x, y, width, height]) => Some(Viewport::new(x, y, width, height)),
            _ => None,
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig::default()
            .with_pump_interval(Duration::from_millis(self.pump_interval_ms))
            .with_notify_policy(self.notify.into())
    }
}

#[derive(Args, Debug, Clone)]
pub struct InfoArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Print the metadata as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

// =============================================================================
// Tests
// =============================================================================
