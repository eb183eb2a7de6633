use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub text: String,
}

/// Per-stage timestamps recorded on a turn, feeding the metrics surface
/// (spec.md §4.5) on completion.
#[derive(Debug, Clone, Default)]
pub struct TurnTimestamps {
    pub asr_started_at: Option<DateTime<Utc>>,
    pub final_transcript_at: Option<DateTime<Utc>>,
    pub llm_request_sent_at: Option<DateTime<Utc>>,
    pub llm_first_token_at: Option<DateTime<Utc>>,
    pub llm_last_token_at: Option<DateTime<Utc>>,
    pub tts_request_sent_at: Option<DateTime<Utc>>,
    pub first_audio_chunk_at: Option<DateTime<Utc>>,
    pub turn_ended_at: Option<DateTime<Utc>>,
}

/// A transient value-object: created when a client finishes an utterance,
/// destroyed when the reply finishes or an error terminates it (spec.md §3).
/// At most one `Turn` per session is live at any instant.
#[derive(Debug, Clone, Default)]
pub struct Turn {
    pub user_transcript: String,
    pub assistant_reply: String,
    pub timestamps: TurnTimestamps,
}

impl Turn {
    pub fn new() -> Self {
        Self::default()
    }
}

/// `bytes / (sample_rate * 2) * 1000` for 16-bit mono PCM (spec.md §4.3
/// "Numeric semantics").
pub fn audio_duration_ms(byte_len: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    (byte_len as f64) / (sample_rate as f64 * 2.0) * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_duration_matches_spec_formula() {
        // 1 second of 16kHz mono 16-bit PCM is 32000 bytes.
        assert_eq!(audio_duration_ms(32_000, 16_000), 1000.0);
        assert_eq!(audio_duration_ms(16_000, 16_000), 500.0);
    }

    #[test]
    fn zero_sample_rate_does_not_panic() {
        assert_eq!(audio_duration_ms(100, 0), 0.0);
    }
}
