use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a remote call that did not come from the remote method itself.
///
/// Every method of a remote interface must be able to return this, which in
/// Rust means its error type implements `From<RemoteCallError>`. The variants
/// are serializable because the skeleton sends some of them back to the stub
/// (for example when the requested method does not exist).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RemoteCallError {
    #[error("cannot connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("codec failure: {0}")]
    Codec(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("no remote method {method}({signature})")]
    NoSuchMethod { method: String, signature: String },

    #[error("remote method panicked: {0}")]
    Panicked(String),

    #[error("remote failure could not be reconstructed: {0}")]
    UnrecognizedFault(String),
}

impl From<io::Error> for RemoteCallError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::InvalidData => RemoteCallError::Protocol(err.to_string()),
            _ => RemoteCallError::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RemoteCallError {
    fn from(err: serde_json::Error) -> Self {
        RemoteCallError::Codec(err.to_string())
    }
}

/// Errors raised locally by skeletons, stubs and configuration loading.
///
/// None of these ever cross the wire.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{interface} is not a remote interface: {reason}")]
    InvalidContract { interface: String, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("skeleton has not been assigned an address")]
    Unbound,

    #[error("skeleton is already running")]
    AlreadyRunning,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
