//! Wire schemas. Each message is one raw JSON value, no length prefix.

use serde::{Deserialize, Serialize};

/// The only supported query action.
pub const ACTION_GET: &str = "get";

pub const ERR_MALFORMED_REQUEST: &str = "malformed request";
pub const ERR_INVALID_KEY: &str = "invalid key";
pub const ERR_UNSUPPORTED_ACTION: &str = "unsupported action";
pub const ERR_STORAGE: &str = "storage error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRequest {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StoreResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub action: String,
    pub key: String,
}

impl QueryRequest {
    pub fn get(key: impl Into<String>) -> Self {
        Self {
            action: ACTION_GET.to_string(),
            key: key.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResponse {
    pub fn found(value: impl Into<String>) -> Self {
        Self {
            success: true,
            found: Some(true),
            value: Some(value.into()),
            error: None,
        }
    }

    pub fn not_found() -> Self {
        Self {
            success: true,
            found: Some(false),
            value: None,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            found: None,
            value: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_shapes() {
        assert_eq!(
            serde_json::to_value(StoreResponse::ok()).unwrap(),
            json!({"success": true})
        );
        assert_eq!(
            serde_json::to_value(StoreResponse::failure(ERR_MALFORMED_REQUEST)).unwrap(),
            json!({"success": false, "error": "malformed request"})
        );
        assert_eq!(
            serde_json::to_value(QueryResponse::not_found()).unwrap(),
            json!({"success": true, "found": false})
        );
        assert_eq!(
            serde_json::to_value(QueryResponse::found("/ip4/1.2.3.4/udp/9/webrtc-direct"))
                .unwrap(),
            json!({"success": true, "found": true, "value": "/ip4/1.2.3.4/udp/9/webrtc-direct"})
        );
    }

    #[test]
    fn test_query_request_shape() {
        assert_eq!(
            serde_json::to_value(QueryRequest::get("k")).unwrap(),
            json!({"action": "get", "key": "k"})
        );
    }

    #[test]
    fn test_missing_value_field_rejected() {
        assert!(serde_json::from_str::<StoreRequest>(r#"{"key": "abc"}"#).is_err());
    }

    #[test]
    fn test_minimal_query_response_accepted() {
        let parsed: QueryResponse = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert_eq!(parsed.found, None);
        assert_eq!(parsed.value, None);
    }
}
