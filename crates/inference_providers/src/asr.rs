//! ASR adapter (spec.md §4.1): `recognize_streaming(audio_chunks) ->
//! sequence of {transcript, is_final, confidence}`. The first request on
//! the wire carries the recognition config; subsequent requests carry only
//! the audio payload.
//!
//! The Riva gRPC client is natively async (tonic streams never block the
//! executor), so unlike the reference provider's synchronous SDK this
//! adapter needs no blocking-iterator bridge; see `crate::bridge` and
//! `crate::mock` for where the bridge is actually exercised.

use async_trait::async_trait;
use futures_core::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt as _;
use tonic::transport::{Channel, Endpoint};

use crate::errors::{AsrError, ProviderErrorKind};
use crate::pool::{ChannelFactory, ChannelPool};
use crate::riva_proto::riva_speech::{
    riva_speech_recognition_client::RivaSpeechRecognitionClient,
    streaming_recognize_request::StreamingRequest, AudioEncoding,
    RecognitionConfig as ProtoRecognitionConfig, StreamingRecognitionConfig,
    StreamingRecognizeRequest,
};
use crate::types::{RecognitionConfig, TranscriptResult};

pub type TranscriptStream =
    Pin<Box<dyn Stream<Item = Result<TranscriptResult, AsrError>> + Send>>;

#[async_trait]
pub trait AsrProvider: Send + Sync {
    /// `audio_chunks` is a lazy sequence of raw PCM byte chunks; the
    /// returned stream yields partial and final transcripts while audio is
    /// still flowing.
    async fn recognize_streaming(
        &self,
        config: RecognitionConfig,
        audio_chunks: Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>,
    ) -> Result<TranscriptStream, AsrError>;
}

pub struct RivaChannelFactory {
    pub uri: String,
    pub keep_alive: crate::pool::PoolKeepAlive,
}

#[async_trait]
impl ChannelFactory<Channel> for RivaChannelFactory {
    async fn connect(&self) -> Result<Channel, ProviderErrorKind> {
        let endpoint = Endpoint::from_shared(self.uri.clone())
            .map_err(|e| ProviderErrorKind::ProviderUnavailable(e.to_string()))?
            .http2_keep_alive_interval(self.keep_alive.ping_interval)
            .keep_alive_timeout(self.keep_alive.ping_timeout)
            .keep_alive_while_idle(self.keep_alive.permit_without_calls);

        endpoint
            .connect()
            .await
            .map_err(|e| ProviderErrorKind::ProviderUnavailable(e.to_string()))
    }
}

pub struct RivaAsrProvider {
    pool: Arc<ChannelPool<Channel>>,
    timeout: Duration,
}

impl RivaAsrProvider {
    pub fn new(pool: Arc<ChannelPool<Channel>>, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl AsrProvider for RivaAsrProvider {
    async fn recognize_streaming(
        &self,
        config: RecognitionConfig,
        mut audio_chunks: Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>,
    ) -> Result<TranscriptStream, AsrError> {
        let guard = self
            .pool
            .acquire()
            .await
            .map_err(|_| AsrError::PoolExhausted)?;
        let mut client = RivaSpeechRecognitionClient::new(guard.deref_channel());

        let first_request = StreamingRecognizeRequest {
            streaming_request: Some(StreamingRequest::StreamingConfig(
                StreamingRecognitionConfig {
                    config: Some(ProtoRecognitionConfig {
                        encoding: AudioEncoding::LinearPcm as i32,
                        sample_rate_hertz: config.sample_rate_hertz,
                        language_code: config.language_code.clone(),
                        max_alternatives: 1,
                        enable_automatic_punctuation: true,
                        verbatim_transcripts: false,
                        audio_channel_count: 1,
                    }),
                    interim_results: config.interim_results,
                },
            )),
        };

        let request_stream = async_stream::stream! {
            yield first_request;
            while let Some(chunk) = audio_chunks.next().await {
                yield StreamingRecognizeRequest {
                    streaming_request: Some(StreamingRequest::AudioContent(chunk)),
                };
            }
        };

        let response = tokio::time::timeout(
            self.timeout,
            client.streaming_recognize(request_stream),
        )
        .await
        .map_err(|_| AsrError::Kind(ProviderErrorKind::ProviderTimeout(self.timeout)))?
        .map_err(|status| AsrError::Kind(ProviderErrorKind::ProviderRpcError(status.to_string())))?;

        let mut inbound = response.into_inner();
        let stream = async_stream::stream! {
            let _guard = guard;
            loop {
                match inbound.message().await {
                    Ok(Some(resp)) => {
                        for result in resp.results {
                            let Some(alt) = result.alternatives.into_iter().next() else { continue };
                            yield Ok(TranscriptResult {
                                transcript: alt.transcript,
                                is_final: result.is_final,
                                confidence: alt.confidence,
                            });
                        }
                    }
                    Ok(None) => break,
                    Err(status) => {
                        yield Err(AsrError::Kind(ProviderErrorKind::ProviderRpcError(status.to_string())));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Extension used only to pull the `Channel` out of a pool guard without
/// cloning the guard itself (tonic clients are cheap to clone from a
/// `Channel`).
trait DerefChannel {
    fn deref_channel(&self) -> Channel;
}

impl DerefChannel for crate::pool::PoolGuard<Channel> {
    fn deref_channel(&self) -> Channel {
        (**self).clone()
    }
}
