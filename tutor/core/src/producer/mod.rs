//! Producers
//!
//! A producer encapsulates how output is generated. Sessions only ever see
//! the [`Producer`] and [`FragmentSource`] traits, so the echo placeholder
//! and a future retrieval-augmented producer are interchangeable.
//!
//! # Available Producers
//!
//! - [`EchoProducer`]: echoes the prompt back word by word (default and test double)
//! - [`ChannelProducer`]: runs an async generator on its own task and
//!   forwards its text through a channel

mod channel;
mod echo;
mod traits;

pub use channel::{ChannelProducer, ChannelSource, TextSender};
pub use echo::{split_words, EchoProducer, EchoSource};
pub use traits::{FragmentSource, Producer};
