use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The first message a client sends on a new connection (spec.md §6):
/// `{"language":"<bcp47>"}`, with an optional existing `session_id` to
/// resume and an optional `sample_rate` (default 16000).
///
/// Accepts both the `language_code` name used by spec.md §4.4's component
/// design and the `language` name used by spec.md §6's wire example.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFrame {
    #[serde(alias = "language")]
    pub language_code: String,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
}

/// Client control frames interleaved with audio (spec.md §4.4).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlMessage {
    Ping,
    ClearHistory,
    ChangeLanguage { language: String },
    GetState,
}

/// Any text frame the client can send once a session exists: either a
/// control message or a raw text-input substitute for audio (spec.md §3's
/// `text-input` Audio Frame variant, used for text-only testing/clients).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClientFrame {
    Control(ControlMessage),
    TextInput { text: String },
}

/// `event` payload kinds (spec.md §3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerEvent {
    Listening,
    Processing,
    Speaking,
    EndOfTurn,
    Error,
}

/// Server -> client JSON frames (spec.md §3). Binary `audio-chunk` frames
/// are sent as raw WebSocket binary messages, not through this enum -- see
/// `api::routes::voice`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    SessionCreated {
        session_id: Uuid,
        language: String,
    },
    Status {
        state: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<&'static str>,
    },
    InterimTranscript {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        confidence: Option<f32>,
    },
    FinalTranscript {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        confidence: Option<f32>,
    },
    ReplyTextChunk {
        text: String,
        is_final: bool,
    },
    Event {
        event: ServerEvent,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    HistoryCleared,
    StateSnapshot {
        session_id: Uuid,
        language: String,
        state: &'static str,
        history_len: usize,
    },
    Pong,
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_frame_accepts_language_alias() {
        let frame: ConfigFrame = serde_json::from_str(r#"{"language":"en-US"}"#).unwrap();
        assert_eq!(frame.language_code, "en-US");
        assert!(frame.session_id.is_none());
    }

    #[test]
    fn config_frame_accepts_language_code_field() {
        let frame: ConfigFrame =
            serde_json::from_str(r#"{"language_code":"hi-IN","sample_rate":8000}"#).unwrap();
        assert_eq!(frame.language_code, "hi-IN");
        assert_eq!(frame.sample_rate, Some(8000));
    }

    #[test]
    fn change_language_control_message_parses() {
        let msg: ControlMessage =
            serde_json::from_str(r#"{"action":"change_language","language":"zz-ZZ"}"#).unwrap();
        assert_eq!(
            msg,
            ControlMessage::ChangeLanguage {
                language: "zz-ZZ".to_string()
            }
        );
    }

    #[test]
    fn clear_history_control_message_parses() {
        let msg: ControlMessage = serde_json::from_str(r#"{"action":"clear_history"}"#).unwrap();
        assert_eq!(msg, ControlMessage::ClearHistory);
    }

    #[test]
    fn server_frame_serializes_with_type_tag() {
        let frame = ServerFrame::Error {
            message: "Unsupported language".to_string(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("Unsupported language"));
    }
}
