// Warden — JSON-RPC 2.0 Protocol Types
//
// Minimal JSON-RPC 2.0 envelope for the UDS gateway, the typed params of
// every method, and the mapping from store error kinds to error codes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::store::{ErrorKind, RequestId, SecretKind};

/// A JSON-RPC 2.0 request.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    pub id: Value,
}

/// A JSON-RPC 2.0 success/error response.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// Standard JSON-RPC 2.0 error codes
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

// Application error codes (JSON-RPC reserves -32000..-32099 for servers)
pub const NOT_FOUND: i32 = -32001;
pub const DUPLICATE_NAME: i32 = -32002;
pub const INVALID_TRANSITION: i32 = -32003;
pub const UNAUTHORIZED: i32 = -32004;

/// Stable wire code for a store error kind. Integrity and storage failures
/// are internal errors; callers cannot correct them.
pub fn error_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::NotFound => NOT_FOUND,
        ErrorKind::DuplicateName => DUPLICATE_NAME,
        ErrorKind::InvalidTransition => INVALID_TRANSITION,
        ErrorKind::Unauthorized => UNAUTHORIZED,
        ErrorKind::Decryption | ErrorKind::Storage | ErrorKind::Internal => INTERNAL_ERROR,
    }
}

// ─── Method Params ───────────────────────────────────────────────────────────

fn default_kind() -> SecretKind {
    SecretKind::Other
}

/// `create_secret`
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSecretParams {
    pub identity: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_kind")]
    pub kind: SecretKind,
    pub value: Zeroizing<String>,
}

/// `get_secret`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretNameParams {
    pub name: String,
}

/// `get_secret_value`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretValueParams {
    pub name: String,
    pub identity: String,
}

/// `approve_request`, `reject_request`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionParams {
    pub id: RequestId,
    pub decider: String,
}

/// `get_request`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestIdParams {
    pub id: RequestId,
}

/// `requester_stats`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequesterParams {
    pub requester: String,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Create an error response.
    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
            id,
        }
    }

    /// Create a parse error response (id is null because we couldn't parse it).
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::error(Value::Null, PARSE_ERROR, message)
    }
}

impl JsonRpcRequest {
    /// Validate that this is a proper JSON-RPC 2.0 request.
    pub fn validate(&self) -> Result<(), String> {
        if self.jsonrpc != "2.0" {
            return Err("jsonrpc must be \"2.0\"".to_string());
        }
        if self.method.is_empty() {
            return Err("method must not be empty".to_string());
        }
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_request() {
        let json = r#"{"jsonrpc":"2.0","method":"list_secrets","params":{},"id":1}"#;
        let req: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.method, "list_secrets");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_parse_request_without_params() {
        let json = r#"{"jsonrpc":"2.0","method":"list","id":1}"#;
        let req: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.params, Value::Null);
    }

    #[test]
    fn test_invalid_jsonrpc_version() {
        let json = r#"{"jsonrpc":"1.0","method":"list","params":{},"id":1}"#;
        let req: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_success_response_serialization() {
        let resp = JsonRpcResponse::success(
            Value::Number(1.into()),
            serde_json::json!({"count": 5}),
        );
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"result\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_error_response_serialization() {
        let resp = JsonRpcResponse::error(
            Value::Number(1.into()),
            METHOD_NOT_FOUND,
            "Method not found",
        );
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("\"result\""));
        assert!(json.contains("\"error\""));
        assert!(json.contains("-32601"));
    }

    #[test]
    fn test_error_codes_by_kind() {
        assert_eq!(error_code(ErrorKind::NotFound), NOT_FOUND);
        assert_eq!(error_code(ErrorKind::Unauthorized), UNAUTHORIZED);
        assert_eq!(error_code(ErrorKind::InvalidTransition), INVALID_TRANSITION);
        assert_eq!(error_code(ErrorKind::Decryption), INTERNAL_ERROR);
        assert_eq!(error_code(ErrorKind::Storage), INTERNAL_ERROR);
    }

    #[test]
    fn test_create_secret_params_defaults() {
        let params: CreateSecretParams =
            serde_json::from_str(r#"{"identity":"root","name":"db","value":"pw"}"#).unwrap();
        assert_eq!(params.kind, SecretKind::Other);
        assert_eq!(params.description, "");
        assert_eq!(params.value.as_str(), "pw");
    }

    #[test]
    fn test_decision_params_reject_bad_uuid_and_unknown_fields() {
        assert!(serde_json::from_str::<DecisionParams>(r#"{"id":"nope","decider":"root"}"#).is_err());
        let id = uuid::Uuid::new_v4();
        let extra = format!(r#"{{"id":"{}","decider":"root","force":true}}"#, id);
        assert!(serde_json::from_str::<DecisionParams>(&extra).is_err());
    }

    #[test]
    fn test_parse_error_has_null_id() {
        let resp = JsonRpcResponse::parse_error("bad json");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"id\":null"));
        assert!(json.contains("-32700"));
    }
}
