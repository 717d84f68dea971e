// Message envelopes exchanged between extension contexts
// Wire shape: { type, payload? } -> { success, data?, error? }

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ProtocolError;
use crate::features::Feature;
use crate::settings::{SettingsPatch, Tier};

/// Closed set of message tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageType {
    GetSettings,
    UpdateSettings,
    GetTabInfo,
    ContentScriptReady,
    PerformAction,
    CheckFeatureAccess,
}

impl MessageType {
    pub const ALL: [MessageType; 6] = [
        MessageType::GetSettings,
        MessageType::UpdateSettings,
        MessageType::GetTabInfo,
        MessageType::ContentScriptReady,
        MessageType::PerformAction,
        MessageType::CheckFeatureAccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::GetSettings => "GET_SETTINGS",
            MessageType::UpdateSettings => "UPDATE_SETTINGS",
            MessageType::GetTabInfo => "GET_TAB_INFO",
            MessageType::ContentScriptReady => "CONTENT_SCRIPT_READY",
            MessageType::PerformAction => "PERFORM_ACTION",
            MessageType::CheckFeatureAccess => "CHECK_FEATURE_ACCESS",
        }
    }

    /// Exact match only
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
}

/// Opaque action name plus optional data; business logic hooks in here
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureQuery {
    pub feature: Feature,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    GetSettings,
    UpdateSettings(SettingsPatch),
    GetTabInfo,
    ContentScriptReady(PageInfo),
    PerformAction(ActionRequest),
    CheckFeatureAccess(FeatureQuery),
}

impl Message {
    pub fn kind(&self) -> MessageType {
        match self {
            Message::GetSettings => MessageType::GetSettings,
            Message::UpdateSettings(_) => MessageType::UpdateSettings,
            Message::GetTabInfo => MessageType::GetTabInfo,
            Message::ContentScriptReady(_) => MessageType::ContentScriptReady,
            Message::PerformAction(_) => MessageType::PerformAction,
            Message::CheckFeatureAccess(_) => MessageType::CheckFeatureAccess,
        }
    }

    pub fn to_wire(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Decode an envelope received from another context
    pub fn from_wire(wire: Value) -> Result<Self, ProtocolError> {
        let tag = match wire.get("type") {
            Some(Value::String(tag)) => tag.clone(),
            _ => return Err(ProtocolError::MissingType(wire.to_string())),
        };
        let kind = MessageType::from_tag(&tag).ok_or(ProtocolError::UnknownType(tag))?;
        let payload = match wire {
            Value::Object(mut envelope) => envelope.remove("payload").unwrap_or(Value::Null),
            _ => Value::Null,
        };

        Ok(match kind {
            MessageType::GetSettings => Message::GetSettings,
            // An absent patch merges nothing
            MessageType::UpdateSettings if payload.is_null() => {
                Message::UpdateSettings(SettingsPatch::default())
            }
            MessageType::UpdateSettings => Message::UpdateSettings(decode_payload(kind, payload)?),
            MessageType::GetTabInfo => Message::GetTabInfo,
            MessageType::ContentScriptReady => {
                Message::ContentScriptReady(decode_payload(kind, payload)?)
            }
            MessageType::PerformAction => Message::PerformAction(decode_payload(kind, payload)?),
            MessageType::CheckFeatureAccess => {
                Message::CheckFeatureAccess(decode_payload(kind, payload)?)
            }
        })
    }
}

fn decode_payload<T: DeserializeOwned>(kind: MessageType, payload: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(payload).map_err(|e| ProtocolError::InvalidPayload {
        kind,
        reason: e.to_string(),
    })
}

/// Reply envelope. `success == false` carries an error and no data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response<T = Value> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Response<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Success without payload (fire-and-forget tags)
    pub fn empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn into_result(self) -> Result<Option<T>, String> {
        if self.success {
            Ok(self.data)
        } else {
            Err(self
                .error
                .unwrap_or_else(|| "Request failed".to_string()))
        }
    }
}

impl Response<Value> {
    /// Decode the payload into the type the tag promises
    pub fn decode<T: DeserializeOwned>(self) -> Response<T> {
        let Response {
            success,
            data,
            error,
        } = self;

        match data {
            Some(data) => match serde_json::from_value(data) {
                Ok(data) => Response {
                    success,
                    data: Some(data),
                    error,
                },
                Err(e) => Response::failure(format!("Malformed response data: {}", e)),
            },
            None => Response {
                success,
                data: None,
                error,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureAccess {
    pub feature: Feature,
    pub tier: Tier,
    pub has_access: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Acknowledged,
}

/// Reply to PERFORM_ACTION: `{action, status: "acknowledged"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionAck {
    pub action: String,
    pub status: ActionStatus,
}

impl ActionAck {
    pub fn acknowledged(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            status: ActionStatus::Acknowledged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Theme;
    use serde_json::json;

    #[test]
    fn test_envelope_shapes() {
        assert_eq!(
            Message::GetSettings.to_wire().unwrap(),
            json!({ "type": "GET_SETTINGS" })
        );
        assert_eq!(
            Message::UpdateSettings(SettingsPatch::theme(Theme::Dark))
                .to_wire()
                .unwrap(),
            json!({ "type": "UPDATE_SETTINGS", "payload": { "theme": "dark" } })
        );
        assert_eq!(
            Message::CheckFeatureAccess(FeatureQuery {
                feature: Feature::ExportData
            })
            .to_wire()
            .unwrap(),
            json!({ "type": "CHECK_FEATURE_ACCESS", "payload": { "feature": "export_data" } })
        );
    }

    #[test]
    fn test_every_tag_decodes_from_its_own_encoding() {
        let messages = [
            Message::GetSettings,
            Message::UpdateSettings(SettingsPatch::default()),
            Message::GetTabInfo,
            Message::ContentScriptReady(PageInfo {
                url: "https://example.com".to_string(),
                title: "Example".to_string(),
            }),
            Message::PerformAction(ActionRequest {
                action: "highlight".to_string(),
                data: Some(json!({ "color": "yellow" })),
            }),
            Message::CheckFeatureAccess(FeatureQuery {
                feature: Feature::BasicFeature,
            }),
        ];

        for (message, kind) in messages.iter().zip(MessageType::ALL) {
            assert_eq!(message.kind(), kind);
            let decoded = Message::from_wire(message.to_wire().unwrap()).unwrap();
            assert_eq!(&decoded, message);
        }
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            Message::from_wire(json!({ "type": "NOT_A_REAL_TAG" })),
            Err(ProtocolError::UnknownType("NOT_A_REAL_TAG".to_string()))
        );
        assert_eq!(
            Message::from_wire(json!({ "type": "get_settings" })),
            Err(ProtocolError::UnknownType("get_settings".to_string()))
        );
        let missing = Message::from_wire(json!({ "payload": {} })).unwrap_err();
        assert_eq!(missing.to_string(), r#"Unknown message type: {"payload":{}}"#);
        let missing = Message::from_wire(json!("GET_SETTINGS")).unwrap_err();
        assert_eq!(missing.to_string(), r#"Unknown message type: "GET_SETTINGS""#);
        let missing = Message::from_wire(json!({ "type": 5 })).unwrap_err();
        assert_eq!(missing, ProtocolError::MissingType(r#"{"type":5}"#.to_string()));

        let err = Message::from_wire(json!({ "type": "CONTENT_SCRIPT_READY" })).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidPayload {
                kind: MessageType::ContentScriptReady,
                ..
            }
        ));

        let err = Message::from_wire(json!({
            "type": "CHECK_FEATURE_ACCESS",
            "payload": { "feature": "teleportation" }
        }))
        .unwrap_err();
        assert!(err.to_string().starts_with("Invalid payload for CHECK_FEATURE_ACCESS"));
    }

    #[test]
    fn test_update_without_patch_is_empty_patch() {
        for wire in [
            json!({ "type": "UPDATE_SETTINGS" }),
            json!({ "type": "UPDATE_SETTINGS", "payload": null }),
        ] {
            assert_eq!(
                Message::from_wire(wire),
                Ok(Message::UpdateSettings(SettingsPatch::default()))
            );
        }

        let err = Message::from_wire(json!({ "type": "UPDATE_SETTINGS", "payload": "dark" }))
            .unwrap_err();
        assert!(err.to_string().starts_with("Invalid payload for UPDATE_SETTINGS"));
    }

    #[test]
    fn test_action_ack_wire_shape() {
        assert_eq!(
            serde_json::to_value(ActionAck::acknowledged("highlight")).unwrap(),
            json!({ "action": "highlight", "status": "acknowledged" })
        );
    }

    #[test]
    fn test_response_shapes() {
        assert_eq!(
            serde_json::to_value(Response::ok(json!(1))).unwrap(),
            json!({ "success": true, "data": 1 })
        );
        assert_eq!(
            serde_json::to_value(Response::<Value>::empty()).unwrap(),
            json!({ "success": true })
        );
        assert_eq!(
            serde_json::to_value(Response::<Value>::failure("nope")).unwrap(),
            json!({ "success": false, "error": "nope" })
        );
    }

    #[test]
    fn test_response_decode() {
        let typed: Response<FeatureAccess> = Response::ok(json!({
            "feature": "basic_feature",
            "tier": "free",
            "hasAccess": true
        }))
        .decode();
        assert!(typed.data.unwrap().has_access);

        let broken: Response<FeatureAccess> = Response::ok(json!({ "feature": 3 })).decode();
        assert!(!broken.success);
        assert!(broken.error.unwrap().starts_with("Malformed response data"));

        let failed: Response<FeatureAccess> = Response::<Value>::failure("down").decode();
        assert_eq!(failed.into_result(), Err("down".to_string()));
    }
}
