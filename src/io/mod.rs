mod http;
mod location;
mod s3;
mod transport;

pub use http::HttpTransport;
pub use location::{ConnectOptions, Credentials, Location, DEFAULT_REGION};
pub use s3::{create_s3_client, S3Transport};
pub use transport::Transport;
