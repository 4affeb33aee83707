//! Newline-delimited JSON wire protocol.
//!
//! Every message exchanged between a bridge client and a host server is a
//! single UTF-8 JSON object terminated by `\n`. Three envelope kinds exist:
//!
//! - `Request` — `{"method": ..., "params": {...}, "id": "..."}`
//! - `Result` — `{"status": "success", "result": ..., "id": "..."}`
//! - `Error` — `{"status": "error", "error": {"code", "message", "details"}, "id": "..."}`
//!
//! The `id` field is optional everywhere; when absent it is omitted from the
//! serialized line entirely, never emitted as `null`. A line is discriminated
//! on read by the presence of `method` (request), then by `status == "error"`
//! (error), and anything else is treated as a result.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Named parameters carried by a request.
pub type CommandParams = Map<String, Value>;

/// The error payload of an `Error` envelope.
///
/// `code` is a stable machine-readable identifier (e.g. `METHOD_NOT_FOUND`),
/// `message` is human-readable, and `details` is a structured map for
/// programmatic consumers (defaults to `{}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default = "empty_object")]
    pub details: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: empty_object(),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// One wire protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// A command invocation sent to a host.
    Request {
        method: String,
        params: CommandParams,
        id: Option<String>,
    },
    /// A successful response.
    Result { result: Value, id: Option<String> },
    /// A failed response.
    Error { error: ErrorBody, id: Option<String> },
}

impl Envelope {
    /// Build a request envelope.
    pub fn request(method: impl Into<String>, params: CommandParams, id: Option<String>) -> Self {
        Envelope::Request {
            method: method.into(),
            params,
            id,
        }
    }

    /// Build a success envelope.
    pub fn result(result: Value, id: Option<String>) -> Self {
        Envelope::Result { result, id }
    }

    /// Build an error envelope.
    pub fn error(error: ErrorBody, id: Option<String>) -> Self {
        Envelope::Error { error, id }
    }

    /// The correlation id, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            Envelope::Request { id, .. }
            | Envelope::Result { id, .. }
            | Envelope::Error { id, .. } => id.as_deref(),
        }
    }

    /// True for `Result` envelopes.
    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Result { .. })
    }

    /// Serialize to a single JSON line terminated by exactly one `\n`.
    ///
    /// An absent `id` is omitted from the output. The serialized form never
    /// contains an embedded newline (`serde_json` escapes string contents).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(&self.to_value())?;
        line.push('\n');
        Ok(line)
    }

    /// The JSON object form of this envelope, as it appears on the wire.
    pub fn to_value(&self) -> Value {
        match self {
            Envelope::Request { method, params, id } => {
                let mut obj = json!({
                    "method": method,
                    "params": params,
                });
                if let Some(id) = id {
                    obj["id"] = json!(id);
                }
                obj
            }
            Envelope::Result { result, id } => {
                let mut obj = json!({
                    "status": "success",
                    "result": result,
                });
                if let Some(id) = id {
                    obj["id"] = json!(id);
                }
                obj
            }
            Envelope::Error { error, id } => {
                let mut obj = json!({
                    "status": "error",
                    "error": {
                        "code": error.code,
                        "message": error.message,
                        "details": error.details,
                    },
                });
                if let Some(id) = id {
                    obj["id"] = json!(id);
                }
                obj
            }
        }
    }

    /// Parse one line into an envelope.
    ///
    /// Discrimination order: a `method` key makes the line a request;
    /// otherwise `status == "error"` makes it an error; anything else is a
    /// result. Unknown extra keys are ignored. A line that is not a JSON
    /// object is an error.
    pub fn parse(line: &str) -> Result<Envelope, serde_json::Error> {
        let value: Value = serde_json::from_str(line.trim())?;
        let obj = match value {
            Value::Object(obj) => obj,
            other => {
                return Err(serde::de::Error::custom(format!(
                    "expected a JSON object, got {}",
                    type_name(&other)
                )))
            }
        };

        let id = match obj.get("id") {
            Some(Value::String(s)) => Some(s.clone()),
            // Numeric ids from foreign clients are tolerated and stringified.
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        if obj.contains_key("method") {
            let method = match obj.get("method") {
                Some(Value::String(s)) => s.clone(),
                _ => String::new(),
            };
            let params = match obj.get("params") {
                None | Some(Value::Null) => Map::new(),
                Some(Value::Object(map)) => map.clone(),
                Some(other) => {
                    return Err(serde::de::Error::custom(format!(
                        "params must be an object, got {}",
                        type_name(other)
                    )))
                }
            };
            return Ok(Envelope::Request { method, params, id });
        }

        if obj.get("status").and_then(Value::as_str) == Some("error") {
            let error = match obj.get("error") {
                Some(v) => serde_json::from_value(v.clone())?,
                None => ErrorBody::new("UNKNOWN", "Unknown error"),
            };
            return Ok(Envelope::Error { error, id });
        }

        let result = obj.get("result").cloned().unwrap_or(Value::Null);
        Ok(Envelope::Result { result, id })
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
