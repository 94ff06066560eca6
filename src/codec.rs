//! FrameCodec — line-delimited JSON-RPC 2.0 framing.
//!
//! Each frame is exactly one JSON value terminated by `\n`. There is no
//! Content-Length peer in this protocol: every provider speaks newline
//! delimited JSON-RPC only, so the codec is a direct `serde_json` line
//! encode/decode with no header parsing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single JSON-RPC 2.0 message, in any of the three shapes the wire
/// protocol uses: an outgoing/incoming request, a response (success or
/// error), or a notification (no `id`, no response expected).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Message {
    Response {
        jsonrpc: JsonRpcVersion,
        id: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<RpcError>,
    },
    Request {
        jsonrpc: JsonRpcVersion,
        id: Value,
        method: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
    Notification {
        jsonrpc: JsonRpcVersion,
        method: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
}

/// A JSON-RPC error object, as embedded in a [`Message::Response`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Always `"2.0"`; kept as its own type so a malformed version string fails
/// deserialization rather than silently passing through.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s == "2.0" {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported jsonrpc version '{s}'"
            )))
        }
    }
}

/// Errors raised while decoding a line as a JSON-RPC message.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed JSON-RPC frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("frame did not match any known JSON-RPC shape")]
    UnknownShape,
}

/// Build a `Request` message (id + method + params).
pub fn request(id: Value, method: impl Into<String>, params: Option<Value>) -> Message {
    Message::Request {
        jsonrpc: JsonRpcVersion,
        id,
        method: method.into(),
        params,
    }
}

/// Build a `Notification` message (no id, no response expected).
pub fn notification(method: impl Into<String>, params: Option<Value>) -> Message {
    Message::Notification {
        jsonrpc: JsonRpcVersion,
        method: method.into(),
        params,
    }
}

/// Encode a message as a single newline-terminated JSON line.
pub fn encode(message: &Message) -> Vec<u8> {
    let mut bytes = serde_json::to_vec(message).expect("Message always serializes");
    bytes.push(b'\n');
    bytes
}

/// Decode one line (without its trailing newline) as a JSON-RPC message.
///
/// Blank lines are never valid frames; callers filter them out before
/// calling this (mirroring the teacher's stdout filter, which discards
/// non-JSON lines rather than erroring on them).
pub fn decode_line(line: &str) -> Result<Message, FrameError> {
    let value: Value = serde_json::from_str(line)?;
    decode_value(value)
}

fn decode_value(value: Value) -> Result<Message, FrameError> {
    let obj = value.as_object().ok_or(FrameError::UnknownShape)?;
    if obj.contains_key("result") || obj.contains_key("error") {
        let id = obj.get("id").cloned().unwrap_or(Value::Null);
        let result = obj.get("result").cloned();
        let error = match obj.get("error") {
            Some(e) => Some(serde_json::from_value(e.clone())?),
            None => None,
        };
        return Ok(Message::Response {
            jsonrpc: JsonRpcVersion,
            id,
            result,
            error,
        });
    }
    let method = obj
        .get("method")
        .and_then(Value::as_str)
        .ok_or(FrameError::UnknownShape)?
        .to_string();
    let params = obj.get("params").cloned();
    if let Some(id) = obj.get("id").cloned() {
        Ok(Message::Request {
            jsonrpc: JsonRpcVersion,
            id,
            method,
            params,
        })
    } else {
        Ok(Message::Notification {
            jsonrpc: JsonRpcVersion,
            method,
            params,
        })
    }
}
