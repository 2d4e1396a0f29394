//! Live update wire protocol.
//!
//! JSON text frames, server to client only:
//!
//! - `update`: replacement code for one module
//! - `reload`: full page reload
//! - `error`: show the overlay, keep the page running
//! - `connected`: handshake carrying the current build generation

use serde::{Deserialize, Serialize};

/// Message broadcast to every connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HmrMessage {
    Update {
        #[serde(rename = "moduleId")]
        module_id: String,
        /// Executable replacement module.
        update: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        generation: Option<u64>,
    },

    Reload {
        /// File whose change forced the reload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        generation: Option<u64>,
    },

    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },

    Connected { generation: u64 },
}

impl HmrMessage {
    pub fn update(module_id: impl Into<String>, code: impl Into<String>, generation: u64) -> Self {
        Self::Update {
            module_id: module_id.into(),
            update: code.into(),
            generation: Some(generation),
        }
    }

    pub fn reload(file: Option<String>, reason: impl Into<String>, generation: u64) -> Self {
        Self::Reload {
            file,
            reason: Some(reason.into()),
            generation: Some(generation),
        }
    }

    /// Sent on connect when the client's last generation is not current.
    #[must_use]
    pub fn stale(generation: u64) -> Self {
        Self::Reload {
            file: None,
            reason: Some("stale".to_string()),
            generation: Some(generation),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
            stack: None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Update { .. } => "update",
            Self::Reload { .. } => "reload",
            Self::Error { .. } => "error",
            Self::Connected { .. } => "connected",
        }
    }

    /// Serialize to a JSON text frame.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"reload"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn value(msg: &HmrMessage) -> serde_json::Value {
        serde_json::from_str(&msg.to_json()).unwrap()
    }

    #[test]
    fn test_update_wire_shape() {
        let msg = HmrMessage::update("/components/Button.module.css", "export default {};", 4);
        assert_eq!(
            value(&msg),
            json!({
                "type": "update",
                "moduleId": "/components/Button.module.css",
                "update": "export default {};",
                "generation": 4
            })
        );
    }

    #[test]
    fn test_reload_wire_shape() {
        let bare = HmrMessage::Reload {
            file: None,
            reason: None,
            generation: None,
        };
        assert_eq!(value(&bare), json!({ "type": "reload" }));

        let msg = HmrMessage::reload(Some("pages/team.tsx".into()), "structural", 2);
        assert_eq!(
            value(&msg),
            json!({ "type": "reload", "file": "pages/team.tsx", "reason": "structural", "generation": 2 })
        );
    }

    #[test]
    fn test_error_wire_shape() {
        assert_eq!(
            value(&HmrMessage::error("pages/index.tsx:3: unclosed '{'")),
            json!({ "type": "error", "error": "pages/index.tsx:3: unclosed '{'" })
        );
    }

    #[test]
    fn test_parse_minimal_frames() {
        let msg: HmrMessage =
            serde_json::from_str(r#"{"type":"update","moduleId":"/a.ts","update":"x"}"#).unwrap();
        assert_eq!(
            msg,
            HmrMessage::Update {
                module_id: "/a.ts".into(),
                update: "x".into(),
                generation: None
            }
        );
        let msg: HmrMessage = serde_json::from_str(r#"{"type":"error","error":"boom"}"#).unwrap();
        assert_eq!(msg.kind(), "error");
    }
}
