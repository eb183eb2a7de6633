use serde::{Deserialize, Serialize};

/// Recognition config carried on the first request of a streaming ASR call
/// (spec.md §4.1): `encoding=LINEAR_PCM`, language, sample rate, interim
/// results. Subsequent requests carry only the audio payload.
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    pub language_code: String,
    pub sample_rate_hertz: u32,
    pub interim_results: bool,
}

#[derive(Debug, Clone)]
pub struct TranscriptResult {
    pub transcript: String,
    pub is_final: bool,
    pub confidence: f32,
}

/// OpenAI-style chat message (spec.md §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// OpenAI-style chat-completion request payload (spec.md §4.1):
/// `model, messages, stream, max_tokens, temperature, top_p,
/// frequency_penalty, presence_penalty`.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

#[derive(Debug, Clone, Default)]
pub struct GenerateOnceResult {
    pub text: String,
    pub token_count: u32,
    pub finish_reason: String,
}

#[derive(Debug, Clone)]
pub struct SynthesizeFullResult {
    pub audio: Vec<u8>,
    pub duration_ms: f64,
    pub sample_rate: u32,
}
