//! Core-to-host request model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of an application instance inside the host.
pub type InstanceId = i64;

/// Identifier of a host-side object referenced by the application.
pub type ObjectId = i64;

/// Script operations understood by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptOperation {
    GetProperty,
    SetProperty,
    /// `value` carries the argument list.
    Call,
    /// `value` carries the expression string.
    Evaluate,
}

impl ScriptOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptOperation::GetProperty => "get_property",
            ScriptOperation::SetProperty => "set_property",
            ScriptOperation::Call => "call",
            ScriptOperation::Evaluate => "evaluate",
        }
    }
}

impl std::fmt::Display for ScriptOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to an object living in the scripting host.
///
/// The bridge never looks inside; it only hands the reference back to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptObject(pub Value);

impl ScriptObject {
    pub fn new(handle: impl Into<Value>) -> Self {
        Self(handle.into())
    }
}

/// A request delivered to the host.
///
/// # Example JSON
///
/// ```json
/// { "request": "notify", "message": "onwindowopen" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum HostRequest {
    /// One-way lifecycle notification such as `onpythonload` or `onwindowopen`.
    Notify { message: String },

    Script {
        operation: ScriptOperation,
        object: ScriptObject,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        property_name: Option<String>,
        #[serde(default)]
        value: Value,
        needs_response: bool,
        request_id: u32,
    },

    /// Blocking wait for the response to a previous `Script` request.
    WaitScriptResponse { request_id: u32 },

    /// The application no longer references this host object.
    #[serde(rename = "drop_p3dobj")]
    DropObject { object_id: ObjectId },
}

impl HostRequest {
    /// Wire name of the request kind.
    pub fn kind(&self) -> &'static str {
        match self {
            HostRequest::Notify { .. } => "notify",
            HostRequest::Script { .. } => "script",
            HostRequest::WaitScriptResponse { .. } => "wait_script_response",
            HostRequest::DropObject { .. } => "drop_p3dobj",
        }
    }

    pub fn notify(message: impl Into<String>) -> Self {
        HostRequest::Notify {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_names_match_kind() {
        let requests = [
            HostRequest::notify("onpythonload"),
            HostRequest::Script {
                operation: ScriptOperation::Evaluate,
                object: ScriptObject::new(json!({"id": 1})),
                property_name: None,
                value: json!("1 + 1"),
                needs_response: false,
                request_id: 7,
            },
            HostRequest::WaitScriptResponse { request_id: 7 },
            HostRequest::DropObject { object_id: 3 },
        ];

        for request in requests {
            let encoded = serde_json::to_value(&request).unwrap();
            assert_eq!(encoded["request"], json!(request.kind()));
        }
    }

    #[test]
    fn test_script_request_encodes_operation_snake_case() {
        let request = HostRequest::Script {
            operation: ScriptOperation::GetProperty,
            object: ScriptObject::new("window"),
            property_name: Some("location".to_string()),
            value: Value::Null,
            needs_response: true,
            request_id: 10_000,
        };
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(encoded["operation"], json!("get_property"));
        assert_eq!(encoded["object"], json!("window"));
        assert_eq!(encoded["property_name"], json!("location"));
    }
}
