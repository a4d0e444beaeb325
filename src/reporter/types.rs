//! Records sent to the proctoring backend.

use crate::core::violation::{ViolationCategory, ViolationEvent};
use crate::platform::MediaKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /violations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub session_id: String,
    pub violation_type: String,
    pub details: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    /// Client-side category; not part of the request body
    #[serde(skip)]
    pub category: Option<ViolationCategory>,
}

impl ViolationRecord {
    pub fn from_event(session_id: &str, event: &ViolationEvent) -> Self {
        let mut details = event.details().clone();
        details
            .entry("description")
            .or_insert_with(|| Value::from(event.category().description()));
        Self {
            session_id: session_id.to_string(),
            violation_type: event.category().wire_name().to_string(),
            details,
            timestamp: event.timestamp(),
            category: Some(event.category()),
        }
    }
}

/// Body of `POST /permissions/log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionLogRecord {
    pub session_id: String,
    pub permission_type: MediaKind,
    pub granted: bool,
    pub device_info: String,
    pub error_message: Option<String>,
}

/// Everything the client sends to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outbound {
    Violation(ViolationRecord),
    Permission(PermissionLogRecord),
    /// Auto-submission: confirm the session, then terminate it
    Terminate { session_id: String },
}

impl Outbound {
    pub fn session_id(&self) -> &str {
        match self {
            Outbound::Violation(record) => &record.session_id,
            Outbound::Permission(record) => &record.session_id,
            Outbound::Terminate { session_id } => session_id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outbound::Violation(_) => "violation",
            Outbound::Permission(_) => "permission_log",
            Outbound::Terminate { .. } => "terminate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_record_body() {
        let timestamp = "2024-03-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let event = ViolationEvent::new(ViolationCategory::KeyboardShortcut, timestamp)
            .with_detail("key_combination", "Ctrl+V");
        let record = ViolationRecord::from_event("17", &event);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["session_id"], "17");
        assert_eq!(json["violation_type"], "keyboard_shortcut");
        assert_eq!(json["details"]["key_combination"], "Ctrl+V");
        assert_eq!(
            json["details"]["description"],
            "Restricted keyboard shortcut was attempted"
        );
    }

    #[test]
    fn test_lighting_record_uses_backend_type() {
        let timestamp = "2024-03-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let event = ViolationEvent::new(ViolationCategory::LightingTooDark, timestamp).with_detail(
            "lighting_analysis",
            serde_json::json!({"brightness_level": 0.1, "lighting_condition": "dark"}),
        );
        let record = ViolationRecord::from_event("1", &event);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["violation_type"], "lighting_issue");
        assert_eq!(json["details"]["lighting_analysis"]["lighting_condition"], "dark");
        assert_eq!(json["details"]["lighting_analysis"]["brightness_level"], 0.1);
        assert!(json.get("category").is_none());
        assert_eq!(record.category, Some(ViolationCategory::LightingTooDark));
    }

    #[test]
    fn test_permission_record_body() {
        let record = PermissionLogRecord {
            session_id: "17".to_string(),
            permission_type: MediaKind::Microphone,
            granted: false,
            device_info: "test".to_string(),
            error_message: Some("microphone permission denied".to_string()),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["permission_type"], "microphone");
        assert_eq!(json["granted"], false);
    }
}
