//! Stream Requests
//!
//! A [`StreamRequest`] is the immutable input of one session. It can only be
//! obtained through validation, so a session never sees an empty prompt.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// Optional scope identifiers forwarded to the producer
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamContext {
    /// Subject the question is about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    /// Class the student asks from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
}

impl StreamContext {
    /// Check if no scope was supplied
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subject_id.is_none() && self.class_id.is_none()
    }
}

/// Validated input to a stream session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamRequest {
    prompt: String,
    context: StreamContext,
}

impl StreamRequest {
    /// Create a request from a prompt
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MessageRequired` for an empty prompt.
    pub fn new(prompt: impl Into<String>) -> Result<Self, ValidationError> {
        let prompt = prompt.into();
        if prompt.is_empty() {
            return Err(ValidationError::MessageRequired);
        }
        Ok(Self {
            prompt,
            context: StreamContext::default(),
        })
    }

    /// Attach scope identifiers
    #[must_use]
    pub fn with_context(mut self, context: StreamContext) -> Self {
        self.context = context;
        self
    }

    /// The user's prompt
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The request scope
    #[must_use]
    pub fn context(&self) -> &StreamContext {
        &self.context
    }
}

/// Body of `POST /api/chat/stream` as received
///
/// Parsing is deliberately lenient: anything that is not a JSON object, or a
/// `message` that is not a string, surfaces as a missing message during
/// [`ChatStreamBody::validate`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatStreamBody {
    /// Raw `message` field, any JSON type
    pub message: Option<Value>,
    /// `subjectId` when it is a string
    pub subject_id: Option<String>,
    /// `classId` when it is a string
    pub class_id: Option<String>,
}

impl ChatStreamBody {
    /// Parse a raw request body
    #[must_use]
    pub fn parse(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => Self::from_value(&value),
            Err(_) => Self::default(),
        }
    }

    /// Extract the known fields from a JSON value
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };
        let string_field = |name: &str| {
            object
                .get(name)
                .and_then(Value::as_str)
                .map(ToString::to_string)
        };
        Self {
            message: object.get("message").cloned(),
            subject_id: string_field("subjectId"),
            class_id: string_field("classId"),
        }
    }

    /// Validate into a [`StreamRequest`]
    ///
    /// `max_length` is measured in characters.
    ///
    /// # Errors
    ///
    /// - `ValidationError::MessageRequired` when `message` is absent, null,
    ///   not a string or empty
    /// - `ValidationError::MessageTooLong` when it exceeds `max_length`
    pub fn validate(self, max_length: usize) -> Result<StreamRequest, ValidationError> {
        let message = match self.message {
            Some(Value::String(message)) if !message.is_empty() => message,
            _ => return Err(ValidationError::MessageRequired),
        };

        let length = message.chars().count();
        if length > max_length {
            return Err(ValidationError::MessageTooLong {
                length,
                max: max_length,
            });
        }

        Ok(StreamRequest::new(message)?.with_context(StreamContext {
            subject_id: self.subject_id,
            class_id: self.class_id,
        }))
    }
}
