use thiserror::Error;

/// Errors raised by a transport while fetching a remote resource
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The server answered with a non-success status
    #[error("HTTP {status} for {path}")]
    Status { status: u16, path: String },

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// The base location could not be parsed or resolved against
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    /// The request was cancelled before it completed
    #[error("Request aborted")]
    Aborted,
}

/// Errors raised by a pyramid collaborator
#[derive(Debug, Clone, Error)]
pub enum PyramidError {
    /// Tile payload could not be decoded
    #[error("Failed to decode tile at level {level}: {message}")]
    Decode { level: u32, message: String },

    /// The metadata document is malformed or inconsistent
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Resolution bounds are unusable
    #[error("Invalid resolution levels: min {min_level}, max {max_level} (supported up to {supported})")]
    InvalidLevels {
        min_level: u32,
        max_level: u32,
        supported: u32,
    },

    /// A tile was offered for a level the pyramid does not serve
    #[error("Level {level} outside served range {min_level}..={max_level}")]
    LevelOutOfRange {
        level: u32,
        min_level: u32,
        max_level: u32,
    },
}

/// Errors surfaced to the caller of the streaming engine
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// A handshake fetch failed at the transport
    #[error("Connection failed: {0}")]
    Transport(#[from] TransportError),

    /// The metadata document could not be understood
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// No connection has been set on the worker
    #[error("No connection has been set")]
    NotConnected,

    /// Streaming was requested without a bound image
    #[error("No image is bound to the worker")]
    NoImage,

    /// A handshake failed earlier on this connection
    #[error("Connection is in an error state; set a new connection first")]
    ConnectionErrored,

    /// The worker task is no longer running
    #[error("Streaming worker has stopped")]
    WorkerStopped,
}

impl From<PyramidError> for StreamError {
    fn from(err: PyramidError) -> Self {
        StreamError::ProtocolViolation(err.to_string())
    }
}
