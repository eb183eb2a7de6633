//! Provider adapters for the voice gateway: ASR (speech-to-text), LLM (chat
//! completion), and TTS (text-to-speech), plus the shared plumbing they're
//! built on (pooled gRPC channels, the blocking-iterator bridge, the LLM
//! response cache, and SSE parsing for the chat-completion stream).
//!
//! Each adapter is a narrow async trait (`AsrProvider`, `LlmProvider`,
//! `TtsProvider`) with a production implementation backed by Riva gRPC or an
//! OpenAI-compatible HTTP endpoint, and a scripted [`mock`] implementation
//! for tests that don't want a live backend.

pub mod asr;
pub mod bridge;
pub mod cache;
pub mod errors;
pub mod llm;
pub mod mock;
pub mod pool;
pub mod riva_proto;
pub mod sse;
pub mod tts;
pub mod types;

pub use asr::{AsrProvider, RivaAsrProvider, RivaChannelFactory, TranscriptStream};
pub use bridge::{Bridge, BridgeItem, BridgeSender};
pub use cache::{cache_key, LlmCache};
pub use errors::{AsrError, CacheError, LlmError, ProviderErrorKind, TtsError};
pub use llm::{HttpLlmProvider, LlmProvider, TextChunkStream};
pub use pool::{ChannelFactory, ChannelPool, PoolGuard, PoolKeepAlive};
pub use tts::{AudioChunkStream, RivaTtsProvider, TtsProvider, DEFAULT_CHUNK_SIZE};
pub use types::{
    ChatMessage, GenerateOnceResult, LlmRequest, RecognitionConfig, SynthesizeFullResult,
    TranscriptResult,
};
