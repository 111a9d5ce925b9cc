//! Producer Traits
//!
//! Trait definitions for fragment producers.
//!
//! # Contract
//!
//! - `start` hands back a lazy, pull-based [`FragmentSource`]; nothing is
//!   generated until the session pulls
//! - A source yields exactly one terminal fragment (`Done` or `Error`) as its
//!   last element, translating internal faults into `Fragment::Error`
//! - `stop` is only called on cancellation, at most once; the source must
//!   release what it holds and needs not yield anything afterwards

use async_trait::async_trait;

use crate::fragment::Fragment;
use crate::request::StreamRequest;

/// A running, non-restartable sequence of fragments
#[async_trait]
pub trait FragmentSource: Send {
    /// Pull the next fragment
    ///
    /// Returns `None` once the sequence is exhausted. May suspend while
    /// waiting on upstream work.
    async fn next_fragment(&mut self) -> Option<Fragment>;

    /// Stop producing and release resources
    async fn stop(&mut self) {}
}

/// Producer trait
///
/// Implement this trait to plug a new generation strategy into the stream
/// sessions.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Get the producer name (e.g., "echo")
    fn name(&self) -> &str;

    /// Start generating for a request
    async fn start(&self, request: StreamRequest) -> Box<dyn FragmentSource>;
}
