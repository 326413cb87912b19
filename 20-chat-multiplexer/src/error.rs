use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

/// Failure to establish the session. Fatal: the client never starts.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to connect to {address}: {source}")]
    Io {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to read root certificates from {path}: {source}")]
    ReadRootCertificates {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no usable root certificates in {0}")]
    NoRootCertificates(PathBuf),
    #[error("invalid server name '{0}'")]
    InvalidServerName(String),
    #[error("TLS handshake with {server_name} failed: {source}")]
    Tls {
        server_name: String,
        #[source]
        source: io::Error,
    },
}

/// Failure of a single client call. The session may or may not survive it;
/// only [`ClientError::Disconnected`] means it is gone.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection to the server was lost")]
    Disconnected,
    #[error("{operation} failed: server answered with '{tag}'")]
    Rejected { operation: &'static str, tag: String },
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("cannot send '{tag}' frame: {source}")]
    InvalidFrame {
        tag: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode request: {0}")]
    Encode(#[from] prost::EncodeError),
    #[error("failed to decode response: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("file error on {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path} is {size} bytes, more than the {limit} byte frame limit")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        limit: usize,
    },
    #[error("server returned an unusable file id '{0}'")]
    InvalidFileId(String),
}

impl ClientError {
    /// True when the server explicitly refused the request.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ClientError::Rejected { .. })
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self, ClientError::Disconnected)
    }
}
