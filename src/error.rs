//! Unified error types.

use thiserror::Error;

/// The error type returned by faultgate's fallible infrastructure operations.
///
/// Failures raised by request handlers are not `Error`s. They travel as
/// [`Fault`](crate::Fault) values and are resolved by the exception
/// middleware. This type surfaces the rest: binding to a port, reading
/// configuration, and streaming bodies that had to be cut short.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(String),

    /// A streaming response body failed after its headers were sent.
    #[error("response body aborted: {0}")]
    BodyAborted(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Failure to persist an [`ExceptionRecord`](crate::audit::ExceptionRecord).
///
/// Never reaches the client whose request faulted. The audit task reports it
/// through `tracing` and moves on.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink io: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink serialize: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}
