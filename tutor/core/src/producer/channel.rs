//! Channel Producer
//!
//! Adapter for producers that generate on their own task, the way an LLM
//! backend reads an upstream HTTP stream: the generator pushes text into a
//! bounded channel and the session pulls from the other end.
//!
//! The adapter owns the terminal fragment. A generator returning `Ok(())`
//! ends the stream with `Done`; returning an error ends it with an `error`
//! fragment. A generator that panics drops its sender, which the session
//! sees as a source ending without a terminal fragment.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::traits::{FragmentSource, Producer};
use crate::fragment::{ErrorCode, Fragment};
use crate::request::StreamRequest;

/// Default channel capacity between generator and session
const DEFAULT_CAPACITY: usize = 32;

/// Handle given to a generator for emitting text
#[derive(Debug, Clone)]
pub struct TextSender {
    tx: mpsc::Sender<Fragment>,
}

impl TextSender {
    /// Emit one text fragment
    ///
    /// # Errors
    ///
    /// Fails once the session has stopped pulling; generators should return
    /// promptly when that happens.
    pub async fn send(&self, text: impl Into<String>) -> anyhow::Result<()> {
        self.tx
            .send(Fragment::text(text))
            .await
            .map_err(|_| anyhow::anyhow!("stream consumer has gone away"))
    }

    /// Check if the session stopped pulling
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Producer that runs an async generator on a spawned task
pub struct ChannelProducer<F> {
    name: String,
    capacity: usize,
    generate: Arc<F>,
}

impl<F, Fut> ChannelProducer<F>
where
    F: Fn(StreamRequest, TextSender) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    /// Create a producer from a generator function
    pub fn new(name: impl Into<String>, generate: F) -> Self {
        Self {
            name: name.into(),
            capacity: DEFAULT_CAPACITY,
            generate: Arc::new(generate),
        }
    }

    /// Set the channel capacity
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

impl<F> std::fmt::Debug for ChannelProducer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelProducer")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Producer for ChannelProducer<F>
where
    F: Fn(StreamRequest, TextSender) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, request: StreamRequest) -> Box<dyn FragmentSource> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let generate = Arc::clone(&self.generate);
        let producer = self.name.clone();

        let task = tokio::spawn(async move {
            let sender = TextSender { tx: tx.clone() };
            let terminal = match generate(request, sender).await {
                Ok(()) => Fragment::Done,
                Err(e) => {
                    tracing::warn!(producer = %producer, error = %e, "Generator failed");
                    Fragment::error(e.to_string(), ErrorCode::PRODUCER_FAILED)
                }
            };
            // Receiver may already be gone after a stop
            let _ = tx.send(terminal).await;
        });

        Box::new(ChannelSource {
            rx,
            task: Some(task),
        })
    }
}

/// Fragment source fed by a generator task
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Fragment>,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl FragmentSource for ChannelSource {
    async fn next_fragment(&mut self) -> Option<Fragment> {
        self.rx.recv().await
    }

    async fn stop(&mut self) {
        self.rx.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ChannelSource {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
