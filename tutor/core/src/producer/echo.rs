//! Echo Producer
//!
//! Placeholder generation strategy kept until retrieval-augmented answers
//! exist: the prompt comes back one word at a time, each word followed by a
//! single space, then the stream completes.

use std::collections::VecDeque;

use async_trait::async_trait;

use super::traits::{FragmentSource, Producer};
use crate::fragment::Fragment;
use crate::request::StreamRequest;

/// Split on runs of whitespace, keeping empty words at the edges
///
/// `" a  b "` yields `["", "a", "b", ""]`: a leading or trailing run
/// produces one empty word at that end, and runs in the middle separate
/// words without producing empties.
#[must_use]
pub fn split_words(input: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut start = 0;
    let mut in_whitespace = false;

    for (idx, ch) in input.char_indices() {
        if ch.is_whitespace() {
            if !in_whitespace {
                words.push(&input[start..idx]);
                in_whitespace = true;
            }
        } else if in_whitespace {
            start = idx;
            in_whitespace = false;
        }
    }

    if in_whitespace {
        words.push("");
    } else {
        words.push(&input[start..]);
    }
    words
}

/// Producer that echoes the prompt back word by word
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoProducer;

impl EchoProducer {
    /// Create a new echo producer
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Producer for EchoProducer {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn start(&self, request: StreamRequest) -> Box<dyn FragmentSource> {
        Box::new(EchoSource::new(request.prompt()))
    }
}

/// Fragment source returned by [`EchoProducer`]
#[derive(Debug)]
pub struct EchoSource {
    words: VecDeque<String>,
    finished: bool,
}

impl EchoSource {
    /// Create a source for a prompt
    #[must_use]
    pub fn new(prompt: &str) -> Self {
        Self {
            words: split_words(prompt).into_iter().map(String::from).collect(),
            finished: false,
        }
    }
}

#[async_trait]
impl FragmentSource for EchoSource {
    async fn next_fragment(&mut self) -> Option<Fragment> {
        if let Some(word) = self.words.pop_front() {
            return Some(Fragment::text(format!("{word} ")));
        }
        if self.finished {
            return None;
        }
        self.finished = true;
        Some(Fragment::Done)
    }

    async fn stop(&mut self) {
        self.words.clear();
        self.finished = true;
    }
}
