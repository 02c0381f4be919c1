//! Envelope wire types for the action surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Incoming action envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    /// Optional correlation id, echoed back in the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Flat action name (e.g. `task_start`).
    pub action: String,
    /// Free-form string-keyed parameter map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Outgoing action response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ActionErrorBody>,
}

/// Structured error body inside an [`ActionResponse`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionErrorBody {
    /// Machine-readable code (e.g. `INVALID_TRANSITION`).
    pub code: String,
    /// Human-readable message; engine messages pass through unreworded.
    pub message: String,
}

impl ActionResponse {
    /// Build a success response.
    pub fn success(id: Option<String>, result: Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn error(id: Option<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(ActionErrorBody {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses_with_and_without_params() {
        let req: ActionRequest =
            serde_json::from_str(r#"{"action":"project_list"}"#).unwrap();
        assert_eq!(req.action, "project_list");
        assert!(req.params.is_none());

        let req: ActionRequest = serde_json::from_str(
            r#"{"id":"r1","action":"project_get","params":{"projectId":"p1"}}"#,
        )
        .unwrap();
        assert_eq!(req.id.as_deref(), Some("r1"));
        assert_eq!(req.params.unwrap()["projectId"], "p1");
    }

    #[test]
    fn error_response_shape() {
        let resp = ActionResponse::error(Some("r1".into()), "NOT_FOUND", "Project not found: x");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "NOT_FOUND");
        assert!(json.get("result").is_none());
    }
}
