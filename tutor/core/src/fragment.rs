//! Stream Fragments
//!
//! A fragment is one unit of incremental output. The set of variants is
//! closed: adding a new kind of fragment means touching every exhaustive
//! match, starting with the wire representation below.
//!
//! # Wire Shape
//!
//! ```text
//! {"type":"text","data":"hello "}
//! {"type":"error","data":"upstream unavailable","code":"producer_failed"}
//! {"type":"done"}
//! ```
//!
//! The field name `data` is kept for compatibility with the existing web
//! client's `StreamChunk` type. Error fragments carry their human-readable
//! message in `data` and a machine-readable `code` next to it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Machine-readable error codes carried by `error` fragments
pub struct ErrorCode;

impl ErrorCode {
    /// Producer reported a failure while generating output
    pub const PRODUCER_FAILED: &'static str = "producer_failed";
    /// Producer stopped yielding without a terminal fragment
    pub const PRODUCER_INCOMPLETE: &'static str = "producer_incomplete";
    /// A fragment could not be framed for the wire
    pub const FRAME_TOO_LARGE: &'static str = "frame_too_large";
    /// A fragment could not be serialized
    pub const ENCODING_FAILED: &'static str = "encoding_failed";
}

/// One unit of incremental output
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fragment {
    /// A piece of response text
    Text {
        /// The text to append on the client
        text: String,
    },
    /// Terminal failure; nothing follows it
    Error {
        /// Human-readable description
        message: String,
        /// Machine-readable code (see [`ErrorCode`])
        code: String,
    },
    /// Terminal success; nothing follows it
    Done,
}

impl Fragment {
    /// Create a text fragment
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create an error fragment
    pub fn error(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            code: code.into(),
        }
    }

    /// Whether this fragment ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Done)
    }

    /// Machine code of an error fragment
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Error { code, .. } => Some(code),
            Self::Text { .. } | Self::Done => None,
        }
    }

    /// The wire `type` tag
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { text } => write!(f, "text({text:?})"),
            Self::Error { message, code } => write!(f, "error[{code}]({message:?})"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Serialized form of a fragment
#[derive(Serialize, Deserialize)]
struct WireFragment {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl Serialize for Fragment {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Text { text } => WireFragment {
                kind: "text".to_string(),
                data: Some(text.clone()),
                code: None,
            },
            Self::Error { message, code } => WireFragment {
                kind: "error".to_string(),
                data: Some(message.clone()),
                code: Some(code.clone()),
            },
            Self::Done => WireFragment {
                kind: "done".to_string(),
                data: None,
                code: None,
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Fragment {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireFragment::deserialize(deserializer)?;
        match wire.kind.as_str() {
            "text" => Ok(Self::Text {
                text: wire.data.unwrap_or_default(),
            }),
            "error" => Ok(Self::Error {
                message: wire.data.unwrap_or_default(),
                code: wire.code.unwrap_or_default(),
            }),
            "done" => Ok(Self::Done),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["text", "error", "done"],
            )),
        }
    }
}
