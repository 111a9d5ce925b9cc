//! Stream Session
//!
//! One session per client connection. The session pulls fragments from its
//! producer, frames each one and flushes it to the sink before pulling the
//! next, so ordering is the producer's order and nothing is buffered across
//! fragments.
//!
//! # State Machine
//!
//! ```text
//!   Created ──► Streaming ──┬──► Completed   (Done written)
//!      │                    ├──► Failed      (error fragment written)
//!      │                    └──► Cancelled   (disconnect, idle, stop)
//!      └──────────► Failed | Cancelled
//! ```
//!
//! Terminal states have no outgoing transitions. The session registers
//! itself on creation and deregisters on reaching a terminal state.
//!
//! # Cancellation
//!
//! Every pull races the cancellation token, the sink's `closed()` signal and
//! the idle timer. Whichever wins, the producer's `stop()` is called exactly
//! once and no further frames are written.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CancelReason, StreamError};
use crate::fragment::{ErrorCode, Fragment};
use crate::frame::{FrameEncoder, FrameError};
use crate::producer::{FragmentSource, Producer};
use crate::registry::{Registration, SessionEntry, SessionRegistry};
use crate::request::StreamRequest;
use crate::sink::FragmentSink;

/// Default idle window between fragments
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Registered, producer not started
    Created,
    /// Fragments are flowing
    Streaming,
    /// `Done` was written
    Completed,
    /// A terminal `error` fragment was written
    Failed,
    /// Stopped without a terminal fragment
    Cancelled,
}

impl SessionState {
    /// Check if the state is terminal
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if moving to `next` is a legal transition
    #[must_use]
    pub fn can_transition_to(self, next: SessionState) -> bool {
        match self {
            Self::Created => matches!(next, Self::Streaming | Self::Failed | Self::Cancelled),
            Self::Streaming => next.is_terminal(),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }

    /// Lowercase name, as used on the wire
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Streaming => 1,
            Self::Completed => 2,
            Self::Failed => 3,
            Self::Cancelled => 4,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Streaming,
            2 => Self::Completed,
            3 => Self::Failed,
            _ => Self::Cancelled,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-session tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Longest wait for the next fragment before cancelling
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Session identifier
    pub id: SessionId,
    /// Final state; always terminal
    pub state: SessionState,
    /// Frames flushed to the sink, terminal fragment included
    pub fragments_written: u64,
    /// Wall time from `run` to the terminal state
    pub elapsed: Duration,
    /// Set when `state` is `Cancelled`
    pub cancel_reason: Option<CancelReason>,
    /// Set when `state` is `Failed`
    pub error: Option<String>,
}

/// A single streaming exchange bound to one connection
pub struct StreamSession<S> {
    registration: Registration,
    state: SessionState,
    request: StreamRequest,
    producer: Arc<dyn Producer>,
    sink: S,
    config: SessionConfig,
    encoder: FrameEncoder,
    fragments_written: u64,
}

impl<S: FragmentSink> StreamSession<S> {
    /// Create a session and register it as `Created`
    pub fn new(
        registry: &SessionRegistry,
        producer: Arc<dyn Producer>,
        request: StreamRequest,
        sink: S,
        config: SessionConfig,
    ) -> Self {
        let entry = SessionEntry::new(SessionId::new(), producer.name(), request.context().clone());
        let registration = registry.admit(entry);

        Self {
            registration,
            state: SessionState::Created,
            request,
            producer,
            sink,
            config,
            encoder: FrameEncoder::new(),
            fragments_written: 0,
        }
    }

    /// Session identifier
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.registration.id()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Token that stops this session when cancelled
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.registration.entry().cancel_token()
    }

    /// Drive the session to a terminal state
    ///
    /// Consumes the session; the sink is dropped on return, which closes the
    /// connection.
    pub async fn run(mut self) -> SessionOutcome {
        let started = Instant::now();
        let id = self.id();
        let cancel = self.cancel_token();

        info!(
            session_id = %id,
            producer = %self.producer.name(),
            prompt_chars = self.request.prompt().chars().count(),
            "Stream session started"
        );

        if cancel.is_cancelled() {
            return self.finish(started, Err(StreamError::Cancelled(CancelReason::StopRequested)));
        }

        self.transition(SessionState::Streaming);
        let mut source = self.producer.start(self.request.clone()).await;

        let result = self.pump(source.as_mut(), &cancel).await;

        let result = match result {
            Err(StreamError::Frame(error)) => {
                // Best effort: the stream still owes the client a terminal fragment
                let code = match error {
                    FrameError::TooLarge { .. } => ErrorCode::FRAME_TOO_LARGE,
                    FrameError::Serialization(_) | FrameError::MissingData => {
                        ErrorCode::ENCODING_FAILED
                    }
                };
                let fragment = Fragment::error(error.to_string(), code);
                let delivered = self.deliver(&fragment, &cancel).await;
                source.stop().await;
                match delivered {
                    Ok(()) => Err(StreamError::Frame(error)),
                    Err(e) => Err(e),
                }
            }
            Err(e) if e.cancel_reason().is_some() => {
                source.stop().await;
                Err(e)
            }
            other => other,
        };

        self.finish(started, result)
    }

    /// Pull, frame and flush until a terminal fragment is written
    ///
    /// Returns `Ok(())` once `Done` is flushed. A flushed `error` fragment
    /// comes back as `StreamError::Producer`.
    async fn pump(
        &mut self,
        source: &mut dyn FragmentSource,
        cancel: &CancellationToken,
    ) -> Result<(), StreamError> {
        loop {
            let Some(fragment) = self.pull(source, cancel).await? else {
                let fragment = Fragment::error(
                    "producer ended without a terminal fragment",
                    ErrorCode::PRODUCER_INCOMPLETE,
                );
                self.deliver(&fragment, cancel).await?;
                return Err(StreamError::Producer {
                    message: "producer ended without a terminal fragment".to_string(),
                    code: ErrorCode::PRODUCER_INCOMPLETE.to_string(),
                });
            };

            self.deliver(&fragment, cancel).await?;

            match fragment {
                Fragment::Text { .. } => {}
                Fragment::Done => return Ok(()),
                Fragment::Error { message, code } => {
                    return Err(StreamError::Producer { message, code })
                }
            }
        }
    }

    async fn pull(
        &self,
        source: &mut dyn FragmentSource,
        cancel: &CancellationToken,
    ) -> Result<Option<Fragment>, StreamError> {
        let idle = self.config.idle_timeout;
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(StreamError::Cancelled(CancelReason::StopRequested)),
            () = self.sink.closed() => Err(StreamError::SinkClosed),
            pulled = tokio::time::timeout(idle, source.next_fragment()) => {
                pulled.map_err(|_| StreamError::Timeout { idle })
            }
        }
    }

    async fn deliver(
        &mut self,
        fragment: &Fragment,
        cancel: &CancellationToken,
    ) -> Result<(), StreamError> {
        let frame = self.encoder.encode(fragment)?;

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(StreamError::Cancelled(CancelReason::StopRequested));
            }
            sent = self.sink.send(frame) => {
                sent.map_err(|_| StreamError::SinkClosed)?;
            }
        }

        self.fragments_written += 1;
        self.registration.record_fragment();
        debug!(
            session_id = %self.id(),
            kind = fragment.kind(),
            seq = self.fragments_written,
            "Fragment flushed"
        );
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        if !self.state.can_transition_to(next) {
            warn!(
                session_id = %self.id(),
                from = %self.state,
                to = %next,
                "Ignoring illegal session transition"
            );
            return;
        }
        self.state = next;
        self.registration.set_state(next);
    }

    fn finish(mut self, started: Instant, result: Result<(), StreamError>) -> SessionOutcome {
        let id = self.id();
        let elapsed = started.elapsed();
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        let (state, cancel_reason, error) = match result {
            Ok(()) => (SessionState::Completed, None, None),
            Err(e) => match e.cancel_reason() {
                Some(reason) => (SessionState::Cancelled, Some(reason), None),
                None => (SessionState::Failed, None, Some(e.to_string())),
            },
        };

        // Leave the registry before the terminal state is recorded
        self.registration.release();
        self.transition(state);

        match state {
            SessionState::Completed => info!(
                session_id = %id,
                elapsed_ms,
                fragments = self.fragments_written,
                "Stream session completed"
            ),
            SessionState::Cancelled => warn!(
                session_id = %id,
                elapsed_ms,
                fragments = self.fragments_written,
                reason = %cancel_reason.map_or("unknown".to_string(), |r| r.to_string()),
                "Stream session cancelled"
            ),
            _ => warn!(
                session_id = %id,
                elapsed_ms,
                fragments = self.fragments_written,
                error = error.as_deref().unwrap_or_default(),
                "Stream session failed"
            ),
        }

        SessionOutcome {
            id,
            state: self.state,
            fragments_written: self.fragments_written,
            elapsed,
            cancel_reason,
            error,
        }
    }
}

impl<S> fmt::Debug for StreamSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.registration.id())
            .field("state", &self.state)
            .field("producer", &self.producer.name())
            .field("fragments_written", &self.fragments_written)
            .finish_non_exhaustive()
    }
}
