//! Bridge error types.
//!
//! None of these reach the host: the dispatch path logs and absorbs them.
//! They surface only to local callers awaiting a request or driving the
//! stream host.

use thiserror::Error;

/// Failures delivering a message or state to the host.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Writing to the host stream failed.
    #[error("host i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The message could not be encoded as JSON.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outcomes of waiting on a request that did not produce a response.
#[derive(Debug, Error)]
pub enum RequestError {
    /// No response arrived before the request deadline.
    #[error("request {seq} timed out")]
    TimedOut { seq: u64 },

    /// The pending entry was dropped (explicit cancel or teardown).
    #[error("request {seq} was cancelled")]
    Cancelled { seq: u64 },

    /// The in-flight table is full.
    #[error("too many in-flight requests (limit {limit})")]
    TooManyInFlight { limit: usize },

    /// The host rejected the outbound message.
    #[error("request {seq} could not be sent: {source}")]
    Transport {
        seq: u64,
        #[source]
        source: TransportError,
    },
}

impl RequestError {
    /// Sequence number of the request this error belongs to, if one was allocated.
    #[must_use]
    pub fn seq(&self) -> Option<u64> {
        match self {
            Self::TimedOut { seq } | Self::Cancelled { seq } | Self::Transport { seq, .. } => {
                Some(*seq)
            }
            Self::TooManyInFlight { .. } => None,
        }
    }
}

/// Inbound payloads that cannot be interpreted.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload is not a well-formed message.
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    /// A known command carried arguments of the wrong shape.
    #[error("invalid arguments for '{command}': {source}")]
    InvalidArguments {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}
