//! Error Types
//!
//! Validation errors are raised before any session exists and become an HTTP
//! 4xx at the surface. Everything else happens after the stream has opened
//! and is converted by the session into a terminal fragment or a
//! cancellation; none of it escapes the session loop.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::frame::FrameError;

/// Request rejected before streaming started
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// `message` missing, null, empty or not a string
    #[error("message required")]
    MessageRequired,

    /// `message` longer than the configured limit
    #[error("message too long")]
    MessageTooLong {
        /// Length of the rejected message in characters
        length: usize,
        /// Configured maximum
        max: usize,
    },
}

/// Failure while a stream is open
#[derive(Debug, Error)]
pub enum StreamError {
    /// The producer failed while generating fragments
    #[error("producer failed [{code}]: {message}")]
    Producer {
        /// Human-readable description
        message: String,
        /// Machine-readable code
        code: String,
    },

    /// The client went away; the sink refused the write
    #[error("sink closed")]
    SinkClosed,

    /// No fragment was produced within the idle window
    #[error("no progress within {idle:?}")]
    Timeout {
        /// The idle window that elapsed
        idle: Duration,
    },

    /// A fragment could not be framed
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The session was told to stop
    #[error("stream cancelled: {0}")]
    Cancelled(CancelReason),
}

/// Why a session was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The client closed the connection
    ClientDisconnected,
    /// The producer made no progress within the idle window
    IdleTimeout,
    /// Stop requested explicitly (e.g. server shutdown)
    StopRequested,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientDisconnected => write!(f, "client disconnected"),
            Self::IdleTimeout => write!(f, "idle timeout"),
            Self::StopRequested => write!(f, "stop requested"),
        }
    }
}

impl StreamError {
    /// The cancellation this error implies, if it is not a failure
    ///
    /// Disconnects and idle timeouts end a session as `Cancelled`; producer
    /// and framing errors end it as `Failed`.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            Self::SinkClosed => Some(CancelReason::ClientDisconnected),
            Self::Timeout { .. } => Some(CancelReason::IdleTimeout),
            Self::Cancelled(reason) => Some(*reason),
            Self::Producer { .. } | Self::Frame(_) => None,
        }
    }
}
