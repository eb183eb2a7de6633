//! Test doubles for the three provider traits, used by `services` and `api`
//! integration tests so they never need a live Riva/LLM backend.
//!
//! Unlike the real `RivaAsrProvider`/`RivaTtsProvider`/`HttpLlmProvider`
//! (which talk to natively async gRPC/HTTP clients), these doubles drive
//! their canned output through a blocking producer on `spawn_blocking` and
//! [`crate::bridge::Bridge`], the way the reference SDK's synchronous
//! iterator-based clients actually behave. This is the one place in the
//! crate that exercises the bridge end to end.

use async_trait::async_trait;
use futures_core::Stream;
use std::pin::Pin;
use std::time::Duration;

use crate::asr::{AsrProvider, TranscriptStream};
use crate::bridge::{Bridge, BridgeItem};
use crate::errors::{AsrError, LlmError, TtsError};
use crate::llm::{LlmProvider, TextChunkStream};
use crate::tts::{AudioChunkStream, TtsProvider};
use crate::types::{GenerateOnceResult, LlmRequest, RecognitionConfig, SynthesizeFullResult, TranscriptResult};
use domain::audio_duration_ms;

/// Scripted ASR double: ignores incoming audio and emits a fixed sequence of
/// transcripts, one interim then one final, with a configurable per-item
/// delay to simulate streaming latency.
pub struct MockAsrProvider {
    pub transcripts: Vec<(String, bool, f32)>,
    pub item_delay: Duration,
}

impl MockAsrProvider {
    pub fn new(transcripts: Vec<(String, bool, f32)>) -> Self {
        Self { transcripts, item_delay: Duration::from_millis(0) }
    }
}

#[async_trait]
impl AsrProvider for MockAsrProvider {
    async fn recognize_streaming(
        &self,
        _config: RecognitionConfig,
        audio_chunks: Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>,
    ) -> Result<TranscriptStream, AsrError> {
        // Drain the caller's audio stream on the async side so callers that
        // await completion of their upload see it consumed, same as a real
        // provider would.
        tokio::spawn(async move {
            let mut chunks = audio_chunks;
            use tokio_stream::StreamExt as _;
            while chunks.next().await.is_some() {}
        });

        let transcripts = self.transcripts.clone();
        let delay = self.item_delay;
        let bridge: Bridge<TranscriptResult, AsrError> = Bridge::spawn(16, move |tx| {
            for (transcript, is_final, confidence) in transcripts {
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                if tx
                    .send_item(TranscriptResult { transcript, is_final, confidence })
                    .is_err()
                {
                    break;
                }
            }
        });

        Ok(Box::pin(async_stream::stream! {
            let mut bridge = bridge;
            while let Some(item) = bridge.recv().await {
                match item {
                    BridgeItem::Item(result) => yield Ok(result),
                    BridgeItem::Error(err) => { yield Err(err); break; }
                    BridgeItem::End => break,
                }
            }
        }))
    }
}

/// Scripted LLM double: replays a fixed reply, split into word-sized chunks
/// for `generate`, and the full string for `generate_once`.
pub struct MockLlmProvider {
    pub reply: String,
    pub item_delay: Duration,
}

impl MockLlmProvider {
    pub fn new(reply: impl Into<String>) -> Self {
        Self { reply: reply.into(), item_delay: Duration::from_millis(0) }
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn generate(&self, _request: LlmRequest) -> Result<TextChunkStream, LlmError> {
        let words: Vec<String> = self
            .reply
            .split_inclusive(' ')
            .map(|w| w.to_string())
            .collect();
        let delay = self.item_delay;
        let bridge: Bridge<String, LlmError> = Bridge::spawn(16, move |tx| {
            for word in words {
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                if tx.send_item(word).is_err() {
                    break;
                }
            }
        });

        Ok(Box::pin(async_stream::stream! {
            let mut bridge = bridge;
            while let Some(item) = bridge.recv().await {
                match item {
                    BridgeItem::Item(word) => yield Ok(word),
                    BridgeItem::Error(err) => { yield Err(err); break; }
                    BridgeItem::End => break,
                }
            }
        }))
    }

    async fn generate_once(&self, _request: LlmRequest) -> Result<GenerateOnceResult, LlmError> {
        Ok(GenerateOnceResult {
            text: self.reply.clone(),
            token_count: self.reply.split_whitespace().count() as u32,
            finish_reason: "stop".to_string(),
        })
    }
}

/// Scripted TTS double: emits `chunk_count` chunks of `silence` of
/// `chunk_len` bytes each.
pub struct MockTtsProvider {
    pub chunk_count: usize,
    pub chunk_len: usize,
}

impl MockTtsProvider {
    pub fn new(chunk_count: usize, chunk_len: usize) -> Self {
        Self { chunk_count, chunk_len }
    }
}

#[async_trait]
impl TtsProvider for MockTtsProvider {
    async fn synthesize_streaming(
        &self,
        _text: &str,
        _language: &str,
        _voice: Option<&str>,
        _sample_rate: u32,
    ) -> Result<AudioChunkStream, TtsError> {
        let count = self.chunk_count;
        let len = self.chunk_len;
        let bridge: Bridge<Vec<u8>, TtsError> = Bridge::spawn(16, move |tx| {
            for _ in 0..count {
                if tx.send_item(vec![0u8; len]).is_err() {
                    break;
                }
            }
        });

        Ok(Box::pin(async_stream::stream! {
            let mut bridge = bridge;
            while let Some(item) = bridge.recv().await {
                match item {
                    BridgeItem::Item(chunk) => yield Ok(chunk),
                    BridgeItem::Error(err) => { yield Err(err); break; }
                    BridgeItem::End => break,
                }
            }
        }))
    }

    async fn synthesize_full(
        &self,
        _text: &str,
        _language: &str,
        _voice: Option<&str>,
        sample_rate: u32,
    ) -> Result<SynthesizeFullResult, TtsError> {
        let audio = vec![0u8; self.chunk_count * self.chunk_len];
        let duration_ms = audio_duration_ms(audio.len(), sample_rate);
        Ok(SynthesizeFullResult { audio, duration_ms, sample_rate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn mock_asr_emits_scripted_transcripts() {
        let provider = MockAsrProvider::new(vec![
            ("hel".to_string(), false, 0.5),
            ("hello".to_string(), true, 0.95),
        ]);
        let audio = Box::pin(futures_util::stream::empty());
        let config = RecognitionConfig {
            language_code: "en-US".to_string(),
            sample_rate_hertz: 16000,
            interim_results: true,
        };
        let mut stream = provider.recognize_streaming(config, audio).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.transcript, "hel");
        assert!(!first.is_final);
        let second = stream.next().await.unwrap().unwrap();
        assert!(second.is_final);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn mock_llm_streams_words_then_ends() {
        let provider = MockLlmProvider::new("hi there");
        let request = LlmRequest {
            model: "test".to_string(),
            messages: vec![],
            max_tokens: 10,
            temperature: 0.7,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        };
        let mut stream = provider.generate(request).await.unwrap();
        let mut joined = String::new();
        while let Some(chunk) = stream.next().await {
            joined.push_str(&chunk.unwrap());
        }
        assert_eq!(joined, "hi there");
    }

    #[tokio::test]
    async fn mock_tts_produces_requested_chunk_count() {
        let provider = MockTtsProvider::new(3, 10);
        let mut stream = provider
            .synthesize_streaming("hi", "en-US", None, 16000)
            .await
            .unwrap();
        let mut count = 0;
        while let Some(chunk) = stream.next().await {
            assert_eq!(chunk.unwrap().len(), 10);
            count += 1;
        }
        assert_eq!(count, 3);
    }
}
