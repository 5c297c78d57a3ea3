//! Errors raised by the backend client.

use serde_json::Value;
use thiserror::Error;

/// Failure of a single backend request.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("could not build HTTP client: {0}")]
    Build(String),

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unauthorized")]
    Unauthorized { body: Option<Value> },

    #[error("backend returned status {status}")]
    Status { status: u16, body: Option<Value> },

    #[error("could not decode response body: {0}")]
    Decode(String),
}

impl ClientError {
    /// Classify a reqwest failure.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }

    /// The message the backend declared in its error body, if any.
    ///
    /// Looks for `message` at the top level, then for `error` as either a
    /// string or an object carrying its own `message`.
    pub fn message(&self) -> Option<String> {
        let body = match self {
            ClientError::Unauthorized { body } | ClientError::Status { body, .. } => {
                body.as_ref()?
            }
            _ => return None,
        };

        if let Some(message) = body.get("message").and_then(Value::as_str) {
            return Some(message.to_string());
        }

        match body.get("error") {
            Some(Value::String(message)) => Some(message.clone()),
            Some(nested) => nested
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            None => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized { .. })
    }
}
