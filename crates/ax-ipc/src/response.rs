//! Response shapes: `{ok: true, …}` or `{ok: false, error}`.

use serde_json::{Map, Value, json};

/// One response frame.
#[derive(Debug, Clone, PartialEq)]
pub struct IpcResponse(Value);

impl IpcResponse {
    /// A success response carrying `data`'s fields at the top level.
    ///
    /// Non-object data lands under a `result` key.
    #[must_use]
    pub fn ok(data: Value) -> Self {
        let mut map = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            },
        };
        map.insert("ok".to_string(), Value::Bool(true));
        Self(Value::Object(map))
    }

    /// A failure response.
    #[must_use]
    pub fn err(message: impl Into<String>) -> Self {
        Self(json!({"ok": false, "error": message.into()}))
    }

    /// Whether this is a success response.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.0.get("ok").and_then(Value::as_bool) == Some(true)
    }

    /// The error message of a failure response.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.0.get("error").and_then(Value::as_str)
    }

    /// The underlying JSON value.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Serialize to bytes for framing.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.0).unwrap_or_else(|_| b"{\"ok\":false,\"error\":\"serialization\"}".to_vec())
    }
}

impl From<Value> for IpcResponse {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_merges_fields() {
        let response = IpcResponse::ok(json!({"id": "abc"}));
        assert!(response.is_ok());
        assert_eq!(response.as_value()["id"], "abc");
        assert_eq!(response.as_value()["ok"], true);
    }

    #[test]
    fn test_err_shape() {
        let response = IpcResponse::err("blocked by security policy (AX-P01)");
        assert!(!response.is_ok());
        assert_eq!(
            response.error(),
            Some("blocked by security policy (AX-P01)")
        );
    }

    #[test]
    fn test_non_object_data() {
        let response = IpcResponse::ok(json!([1, 2, 3]));
        assert_eq!(response.as_value()["result"][0], 1);
    }
}
