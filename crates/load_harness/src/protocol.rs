//! Client-side view of the gateway's server-to-client JSON frames
//! (spec.md §3, §6). A deliberately independent, owned-string mirror of
//! `domain::frame::ServerFrame` rather than a shared type: the harness is
//! an external client exercising the wire protocol, the same way the
//! original load tester built its own protobuf stubs instead of importing
//! the gateway's internal request types.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrameView {
    SessionCreated {
        #[allow(dead_code)]
        session_id: String,
        #[allow(dead_code)]
        language: String,
    },
    Status {
        state: String,
        #[serde(default)]
        #[allow(dead_code)]
        stage: Option<String>,
    },
    InterimTranscript {
        #[allow(dead_code)]
        text: String,
        #[serde(default)]
        #[allow(dead_code)]
        confidence: Option<f32>,
    },
    FinalTranscript {
        #[allow(dead_code)]
        text: String,
        #[serde(default)]
        #[allow(dead_code)]
        confidence: Option<f32>,
    },
    ReplyTextChunk {
        #[allow(dead_code)]
        text: String,
        is_final: bool,
    },
    Event {
        #[allow(dead_code)]
        event: String,
        #[serde(default)]
        #[allow(dead_code)]
        message: Option<String>,
    },
    HistoryCleared,
    StateSnapshot {
        #[allow(dead_code)]
        session_id: String,
        #[allow(dead_code)]
        language: String,
        #[allow(dead_code)]
        state: String,
        #[allow(dead_code)]
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
    fn parses_session_created() {
        let frame: ServerFrameView =
            serde_json::from_str(r#"{"type":"session_created","session_id":"abc","language":"en-US"}"#).unwrap();
        assert!(matches!(frame, ServerFrameView::SessionCreated { .. }));
    }

    #[test]
    fn parses_terminal_reply_text_chunk() {
        let frame: ServerFrameView =
            serde_json::from_str(r#"{"type":"reply_text_chunk","text":"","is_final":true}"#).unwrap();
        assert!(matches!(frame, ServerFrameView::ReplyTextChunk { is_final: true, .. }));
    }

    #[test]
    fn parses_status_idle() {
        let frame: ServerFrameView = serde_json::from_str(r#"{"type":"status","state":"idle"}"#).unwrap();
        assert!(matches!(frame, ServerFrameView::Status { state, .. } if state == "idle"));
    }
}
