//! Tutor Core - Incremental Response Streaming for ai-teacher
//!
//! This crate provides the streaming core behind the chat endpoint: it turns a
//! validated chat request into an ordered sequence of fragments, frames each
//! fragment as a server-sent event and pushes it to the client as soon as it
//! is produced.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      HTTP surface (daemon)                        │
//! │        POST /api/chat/stream ──► validate ──► StreamSession       │
//! └───────────────────────────────────┬──────────────────────────────┘
//!                                     │
//! ┌───────────────────────────────────┼──────────────────────────────┐
//! │                           TUTOR CORE                              │
//! │                                   │                               │
//! │   ┌──────────┐  next_fragment()  ┌▼─────────────┐  register /     │
//! │   │ Producer ├──────────────────►│ StreamSession├──deregister──┐  │
//! │   │ (echo,   │◄── stop() ────────┤  state machine│             │  │
//! │   │  rag..)  │                   └──────┬───────┘     ┌───────▼┐ │
//! │   └──────────┘                          │ encode()    │Session │ │
//! │                                  ┌──────▼───────┐     │Registry│ │
//! │                                  │ FrameEncoder │     └────────┘ │
//! │                                  └──────┬───────┘                 │
//! │                                         │ send() + flush          │
//! │                                  ┌──────▼───────┐                 │
//! │                                  │ FragmentSink │                 │
//! │                                  └──────────────┘                 │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Overview
//!
//! - [`config`]: TOML/env configuration with source tracking
//! - [`error`]: Error taxonomy (validation, producer, sink, timeout)
//! - [`fragment`]: The closed `Fragment` variant streamed to clients
//! - [`frame`]: SSE wire encoding and incremental decoding
//! - [`producer`]: Producer contract plus the echo and channel producers
//! - [`registry`]: Active-session bookkeeping and bulk cancellation
//! - [`request`]: Validated stream requests
//! - [`session`]: Per-connection session state machine
//! - [`sink`]: Flushable output sinks tied to a connection
//!
//! # No HTTP Framework Dependencies
//!
//! The core never imports an HTTP framework. The daemon adapts a
//! [`sink::ChannelSink`] receiver into a response body.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod fragment;
pub mod frame;
pub mod producer;
pub mod registry;
pub mod request;
pub mod session;
pub mod sink;

// Re-exports for convenience
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, TutorConfig, TutorToml,
};
pub use error::{CancelReason, StreamError, ValidationError};
pub use fragment::{ErrorCode, Fragment};
pub use frame::{FrameDecoder, FrameEncoder, FrameError, MAX_FRAME_SIZE};
pub use producer::{ChannelProducer, EchoProducer, FragmentSource, Producer};
pub use registry::{
    Registration, RegistrySummary, SessionEntry, SessionInfo, SessionRegistry, SessionStatus,
};
pub use request::{ChatStreamBody, StreamContext, StreamRequest};
pub use session::{SessionConfig, SessionId, SessionOutcome, SessionState, StreamSession};
pub use sink::{ChannelSink, FragmentSink, SinkError};
