//! TTS adapter (spec.md §4.1): `synthesize_streaming(text, language, voice?,
//! sample_rate) -> sequence of audio chunks` plus a non-streaming
//! `synthesize_full`. Output encoding is LINEAR_PCM; the reference server
//! streams one `SynthesizeSpeechResponse` per internally-chunked audio
//! buffer, which this adapter re-chunks to the configured chunk size
//! (default 4096 bytes) before handing it to the turn pipeline.

use async_trait::async_trait;
use futures_core::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::Channel;
use tonic::Request;

use crate::errors::{ProviderErrorKind, TtsError};
use crate::pool::ChannelPool;
use crate::riva_proto::riva_speech::{
    riva_speech_synthesis_client::RivaSpeechSynthesisClient, AudioEncoding,
    SynthesizeSpeechRequest,
};
use crate::types::SynthesizeFullResult;
use domain::audio_duration_ms;

pub const DEFAULT_CHUNK_SIZE: usize = 4096;

pub type AudioChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TtsError>> + Send>>;

#[async_trait]
pub trait TtsProvider: Send + Sync {
    async fn synthesize_streaming(
        &self,
        text: &str,
        language: &str,
        voice: Option<&str>,
        sample_rate: u32,
    ) -> Result<AudioChunkStream, TtsError>;

    async fn synthesize_full(
        &self,
        text: &str,
        language: &str,
        voice: Option<&str>,
        sample_rate: u32,
    ) -> Result<SynthesizeFullResult, TtsError>;
}

pub struct RivaTtsProvider {
    pool: Arc<ChannelPool<Channel>>,
    timeout: Duration,
    chunk_size: usize,
}

impl RivaTtsProvider {
    pub fn new(pool: Arc<ChannelPool<Channel>>, timeout: Duration, chunk_size: usize) -> Self {
        Self { pool, timeout, chunk_size }
    }

    fn build_request(
        &self,
        text: &str,
        language: &str,
        voice: Option<&str>,
        sample_rate: u32,
    ) -> SynthesizeSpeechRequest {
        SynthesizeSpeechRequest {
            text: text.to_string(),
            language_code: language.to_string(),
            encoding: AudioEncoding::LinearPcm as i32,
            sample_rate_hz: sample_rate,
            voice_name: voice.unwrap_or_default().to_string(),
            quality: 0,
        }
    }
}

#[async_trait]
impl TtsProvider for RivaTtsProvider {
    async fn synthesize_streaming(
        &self,
        text: &str,
        language: &str,
        voice: Option<&str>,
        sample_rate: u32,
    ) -> Result<AudioChunkStream, TtsError> {
        let guard = self.pool.acquire().await.map_err(|_| TtsError::PoolExhausted)?;
        let mut client = RivaSpeechSynthesisClient::new((*guard).clone());
        let request = self.build_request(text, language, voice, sample_rate);

        let response = tokio::time::timeout(
            self.timeout,
            client.synthesize_online(Request::new(request)),
        )
        .await
        .map_err(|_| TtsError::Kind(ProviderErrorKind::ProviderTimeout(self.timeout)))?
        .map_err(|status| TtsError::Kind(ProviderErrorKind::ProviderRpcError(status.to_string())))?;

        let mut inbound = response.into_inner();
        let chunk_size = self.chunk_size;
        let stream = async_stream::stream! {
            let _guard = guard;
            let mut pending = Vec::new();
            loop {
                match inbound.message().await {
                    Ok(Some(resp)) => {
                        pending.extend_from_slice(&resp.audio);
                        while pending.len() >= chunk_size {
                            let rest = pending.split_off(chunk_size);
                            yield Ok(std::mem::replace(&mut pending, rest));
                        }
                    }
                    Ok(None) => {
                        if !pending.is_empty() {
                            yield Ok(pending);
                        }
                        break;
                    }
                    Err(status) => {
                        yield Err(TtsError::Kind(ProviderErrorKind::ProviderRpcError(status.to_string())));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn synthesize_full(
        &self,
        text: &str,
        language: &str,
        voice: Option<&str>,
        sample_rate: u32,
    ) -> Result<SynthesizeFullResult, TtsError> {
        let guard = self.pool.acquire().await.map_err(|_| TtsError::PoolExhausted)?;
        let mut client = RivaSpeechSynthesisClient::new((*guard).clone());
        let request = self.build_request(text, language, voice, sample_rate);

        let response = tokio::time::timeout(
            self.timeout,
            client.synthesize_online(Request::new(request)),
        )
        .await
        .map_err(|_| TtsError::Kind(ProviderErrorKind::ProviderTimeout(self.timeout)))?
        .map_err(|status| TtsError::Kind(ProviderErrorKind::ProviderRpcError(status.to_string())))?;

        let mut inbound = response.into_inner();
        let mut audio = Vec::new();
        while let Some(resp) = inbound
            .message()
            .await
            .map_err(|status| TtsError::Kind(ProviderErrorKind::ProviderRpcError(status.to_string())))?
        {
            audio.extend_from_slice(&resp.audio);
        }
        drop(guard);

        let duration_ms = audio_duration_ms(audio.len(), sample_rate);
        Ok(SynthesizeFullResult { audio, duration_ms, sample_rate })
    }
}
