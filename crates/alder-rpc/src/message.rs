//! JSON-RPC 1.0 message shapes.

use serde_json::Value;
use serde_json::json;

use crate::RpcError;

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A method call (or, with a null id, a notification).
    Request(Request),
    /// A reply to a request this peer sent earlier.
    Response(Response),
}

impl Frame {
    /// Classify a raw JSON value. Objects with a `method` member are
    /// requests; objects with `result` or `error` are responses.
    pub fn from_value(value: Value) -> Result<Frame, RpcError> {
        let object = match value {
            Value::Object(object) => object,
            other => {
                return Err(RpcError::failed(format!("frame is not a JSON object: {other}")));
            }
        };
        if let Some(method) = object.get("method") {
            let method = method
                .as_str()
                .ok_or_else(|| RpcError::failed("request 'method' is not a string"))?
                .to_string();
            let id = match object.get("id") {
                Some(Value::Null) | None => None,
                Some(id) => Some(id.clone()),
            };
            let params = object.get("params").cloned().unwrap_or(Value::Null);
            return Ok(Frame::Request(Request { id, method, params }));
        }
        if object.contains_key("result") || object.contains_key("error") {
            return Ok(Frame::Response(Response {
                id: object.get("id").cloned().unwrap_or(Value::Null),
                result: object.get("result").cloned().unwrap_or(Value::Null),
                error: object.get("error").cloned().unwrap_or(Value::Null),
            }));
        }
        Err(RpcError::failed("frame is neither a request nor a response"))
    }
}

/// An inbound method call.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation id; `None` for notifications.
    pub id: Option<Value>,
    /// The method name.
    pub method: String,
    /// The positional parameters (usually an array).
    pub params: Value,
}

/// An outbound (or ignored inbound) reply.
///
/// JSON-RPC 1.0 style: both `result` and `error` are always present, one of
/// them null.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// The id of the request being answered.
    pub id: Value,
    /// The successful result, or null.
    pub result: Value,
    /// The error value, or null.
    pub error: Value,
}

impl Response {
    /// A successful reply.
    pub fn result(id: Value, result: Value) -> Self {
        Response {
            id,
            result,
            error: Value::Null,
        }
    }

    /// An error reply.
    pub fn error(id: Value, error: Value) -> Self {
        Response {
            id,
            result: Value::Null,
            error,
        }
    }

    /// The wire form.
    pub fn to_value(&self) -> Value {
        json!({"id": self.id, "result": self.result, "error": self.error})
    }
}

/// The wire form of a server-push notification (a request with a null id).
pub fn notification_frame(method: &str, params: Value) -> Value {
    json!({"method": method, "params": params, "id": null})
}
