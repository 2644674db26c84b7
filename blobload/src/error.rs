use std::fmt;

use thiserror::Error;
use tokio::io;

/// A boxed error coming out of a transport implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Transfer direction, used to label size mismatches and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Direction::Download => "DOWNLOAD",
            Direction::Upload => "UPLOAD",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Local file read failure while scanning, digesting or uploading.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The client to the remote service could not be established.
    #[error("unable to connect to `{addr}`: {source}")]
    Connection {
        addr: String,
        #[source]
        source: BoxError,
    },
    /// A stream send or receive failed mid-transfer.
    #[error("transfer of `{resource_name}` failed: {source}")]
    Transfer {
        resource_name: String,
        #[source]
        source: BoxError,
    },
    /// Declared size and observed (or committed) size disagree.
    #[error("{direction} `{resource_name}`: size {actual} != expected size {expected}")]
    SizeMismatch {
        direction: Direction,
        resource_name: String,
        expected: u64,
        actual: u64,
    },
    #[error("invalid digest state: {0}")]
    InvalidDigestState(&'static str),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn transfer(resource_name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Transfer {
            resource_name: resource_name.into(),
            source: source.into(),
        }
    }

    pub(crate) fn connection(addr: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Connection {
            addr: addr.into(),
            source: source.into(),
        }
    }
}
