//! Error taxonomy for the bridge.
//!
//! `CommandError` is the cross-boundary error type: it carries a stable wire
//! code and converts losslessly to and from the [`ErrorBody`] that travels
//! inside `Error` envelopes. Handlers return it, the dispatcher returns it,
//! and the server serializes it. `ClientError` covers client-internal
//! transport faults; the public client API folds it into synthetic error
//! envelopes rather than surfacing it.

use serde_json::{json, Value};
use thiserror::Error;

use crate::protocol::ErrorBody;

/// Wire code constants.
pub mod codes {
    pub const PARSE_ERROR: &str = "PARSE_ERROR";
    pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
    pub const CONNECTION_ERROR: &str = "CONNECTION_ERROR";
    pub const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";
    pub const EXECUTION_ERROR: &str = "EXECUTION_ERROR";
}

/// A failure crossing the dispatch or wire boundary.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommandError {
    /// Malformed JSON or an invalid envelope.
    #[error("Parse error: {0}")]
    Parse(String),

    /// No handler is registered for the requested method.
    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    /// Transport-level failure after all retries were exhausted.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A bounded wait expired (engine queue or read timeout).
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A handler failed in an untyped way, including panics.
    #[error("Execution error: {0}")]
    Execution(String),

    /// A handler-defined typed failure (e.g. `OBJECT_NOT_FOUND`).
    #[error("{message}")]
    Handler {
        code: String,
        message: String,
        details: Value,
    },
}

impl CommandError {
    /// Build a handler-defined error with empty details.
    pub fn handler(code: impl Into<String>, message: impl Into<String>) -> Self {
        CommandError::Handler {
            code: code.into(),
            message: message.into(),
            details: json!({}),
        }
    }

    /// The stable wire code for this error.
    pub fn code(&self) -> &str {
        match self {
            CommandError::Parse(_) => codes::PARSE_ERROR,
            CommandError::MethodNotFound { .. } => codes::METHOD_NOT_FOUND,
            CommandError::Connection(_) => codes::CONNECTION_ERROR,
            CommandError::Timeout(_) => codes::TIMEOUT_ERROR,
            CommandError::Execution(_) => codes::EXECUTION_ERROR,
            CommandError::Handler { code, .. } => code,
        }
    }

    /// The structured details map for this error.
    pub fn details(&self) -> Value {
        match self {
            CommandError::MethodNotFound { method } => json!({ "method": method }),
            CommandError::Handler { details, .. } => details.clone(),
            _ => json!({}),
        }
    }

    /// The wire representation carried inside an `Error` envelope.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }
}

impl From<CommandError> for ErrorBody {
    fn from(err: CommandError) -> Self {
        err.to_body()
    }
}

impl From<ErrorBody> for CommandError {
    /// Inbound mapping: known codes become their variant, everything else is
    /// a handler-defined error so the code survives round trips verbatim.
    fn from(body: ErrorBody) -> Self {
        match body.code.as_str() {
            codes::PARSE_ERROR => CommandError::Parse(body.message),
            codes::METHOD_NOT_FOUND => {
                let method = body
                    .details
                    .get("method")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                CommandError::MethodNotFound { method }
            }
            codes::CONNECTION_ERROR => CommandError::Connection(body.message),
            codes::TIMEOUT_ERROR => CommandError::Timeout(body.message),
            codes::EXECUTION_ERROR => CommandError::Execution(body.message),
            _ => CommandError::Handler {
                code: body.code,
                message: body.message,
                details: body.details,
            },
        }
    }
}

/// Client-internal transport faults.
///
/// Never returned from `send_command`; used between the connection layer and
/// the retry loop.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not connected")]
    NotConnected,

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("read timed out")]
    ReadTimeout,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
