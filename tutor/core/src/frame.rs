//! Frame Protocol
//!
//! Wire format for fragments sent to the client: one server-sent event per
//! fragment, each carrying a single JSON-encoded [`Fragment`].
//!
//! # Frame Format
//!
//! ```text
//! data: {"type":"text","data":"hello "}\n\n
//! └────┘└──────────── JSON ────────────┘└──┘
//! field        Fragment payload        event terminator
//! ```
//!
//! Each event is self-delimited by a blank line, so a reader can find event
//! boundaries without any global framing state. `serde_json` never emits raw
//! newlines inside a compact document, so a payload always fits on a single
//! `data:` line.
//!
//! # Security
//!
//! - Maximum frame size is enforced on both encode and decode
//! - The decoder refuses to buffer an unterminated event beyond that size

use bytes::Bytes;
use thiserror::Error;

use crate::fragment::Fragment;

/// Maximum frame size (1 MB)
///
/// Applies to the encoded event including the `data: ` prefix and terminator.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Minimum buffer capacity for decoder
const MIN_BUFFER_CAPACITY: usize = 4096;

/// Field prefix for the payload line
const DATA_PREFIX: &[u8] = b"data: ";

/// Event terminator (blank line)
const EVENT_TERMINATOR: &[u8] = b"\n\n";

/// Errors produced while framing or parsing events
#[derive(Debug, Error)]
pub enum FrameError {
    /// The fragment could not be serialized
    #[error("failed to serialize fragment: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The event would exceed [`MAX_FRAME_SIZE`]
    #[error("frame too large: {size} bytes (max: {max})")]
    TooLarge {
        /// Size of the offending frame
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// An event arrived without a `data:` field
    #[error("event has no data field")]
    MissingData,
}

/// Encode a fragment to a single SSE event
///
/// # Errors
///
/// Returns `FrameError::Serialization` if JSON serialization fails and
/// `FrameError::TooLarge` if the resulting event exceeds `MAX_FRAME_SIZE`.
pub fn encode(fragment: &Fragment) -> Result<Bytes, FrameError> {
    let json = serde_json::to_vec(fragment)?;

    let size = DATA_PREFIX.len() + json.len() + EVENT_TERMINATOR.len();
    if size > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut buf = Vec::with_capacity(size);
    buf.extend_from_slice(DATA_PREFIX);
    buf.extend_from_slice(&json);
    buf.extend_from_slice(EVENT_TERMINATOR);
    Ok(Bytes::from(buf))
}

/// Encoder for streaming frame output
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameEncoder;

impl FrameEncoder {
    /// Create a new encoder
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Encode a fragment to bytes
    ///
    /// # Errors
    ///
    /// See [`encode`].
    pub fn encode(&self, fragment: &Fragment) -> Result<Bytes, FrameError> {
        encode(fragment)
    }
}

/// Decoder state machine for streaming event parsing
///
/// Buffers incoming bytes and yields complete fragments. Used by tests and
/// by Rust clients of the stream endpoint.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Position where we've consumed up to
    read_pos: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a new decoder with default buffer capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
        }
    }

    /// Append bytes to the buffer
    pub fn push(&mut self, data: &[u8]) {
        // Compact buffer if we've consumed a lot
        if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Get the number of bytes available in the buffer
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Try to decode the next event
    ///
    /// Returns:
    /// - `Ok(Some(fragment))` if a complete event was decoded
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` if the event is invalid or oversized
    ///
    /// # Errors
    ///
    /// Returns `FrameError::TooLarge` when an unterminated event outgrows
    /// `MAX_FRAME_SIZE`, `FrameError::MissingData` for events without a
    /// `data:` line and `FrameError::Serialization` for malformed JSON.
    pub fn decode(&mut self) -> Result<Option<Fragment>, FrameError> {
        let pending = &self.buffer[self.read_pos..];

        let Some(end) = find_subslice(pending, EVENT_TERMINATOR) else {
            if pending.len() > MAX_FRAME_SIZE {
                return Err(FrameError::TooLarge {
                    size: pending.len(),
                    max: MAX_FRAME_SIZE,
                });
            }
            return Ok(None);
        };

        let event = &pending[..end];
        let consumed = end + EVENT_TERMINATOR.len();

        // Multiple data lines in one event are joined with '\n' (SSE rules)
        let mut payload: Option<Vec<u8>> = None;
        for line in event.split(|b| *b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let Some(rest) = line.strip_prefix(b"data:") else {
                continue;
            };
            let rest = rest.strip_prefix(b" ").unwrap_or(rest);
            match payload.as_mut() {
                Some(p) => {
                    p.push(b'\n');
                    p.extend_from_slice(rest);
                }
                None => payload = Some(rest.to_vec()),
            }
        }

        // Advance before parsing so a bad event is skipped, not re-read forever
        self.read_pos += consumed;

        let payload = payload.ok_or(FrameError::MissingData)?;
        let fragment = serde_json::from_slice(&payload)?;
        Ok(Some(fragment))
    }

    /// Decode every complete event currently buffered
    ///
    /// # Errors
    ///
    /// Stops at the first invalid event; see [`FrameDecoder::decode`].
    pub fn decode_all(&mut self) -> Result<Vec<Fragment>, FrameError> {
        let mut fragments = Vec::new();
        while let Some(fragment) = self.decode()? {
            fragments.push(fragment);
        }
        Ok(fragments)
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
