//! Turn pipeline (spec.md §4.3, the hardest component): per-turn
//! orchestrator running audio → transcript → LLM tokens → TTS audio, with
//! sentence-boundary pipelining so TTS starts speaking before the LLM has
//! finished generating.

pub mod sentencer;

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use domain::{audio_duration_ms, GatewayError, HistoryEntry, Role, Session, SessionState, Turn};
use futures_core::Stream;
use inference_providers::{
    AsrProvider, ChatMessage, LlmProvider, LlmRequest, RecognitionConfig, TtsProvider,
};
use tokio::sync::mpsc;
use tokio_stream::StreamExt as _;

use crate::metrics::MetricsServiceTrait;
use sentencer::Sentencer;

/// Everything the stream server needs to relay to the client as a turn
/// progresses. The pipeline never talks to the transport directly; it only
/// pushes these onto `events` in emission order, preserving the ordering
/// guarantees of spec.md §4.3.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Status { state: &'static str, stage: Option<&'static str> },
    InterimTranscript { text: String, confidence: Option<f32> },
    FinalTranscript { text: String, confidence: Option<f32> },
    ReplyTextChunk { text: String, is_final: bool },
    AudioChunk(Vec<u8>),
    Error(GatewayError),
}

/// Parameters that vary per request but aren't part of the session itself.
pub struct TurnRequest {
    pub language_code: String,
    pub sample_rate: u32,
    pub audio_chunks: Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>,
}

/// Wrap an audio-chunk stream so its total byte count is visible after it's
/// been fully consumed by the ASR adapter, without the pipeline needing to
/// buffer or fork the stream itself (spec.md §4.5's `asr_audio_duration_seconds`).
fn count_audio_bytes(
    chunks: Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>,
    total: Arc<AtomicUsize>,
) -> Pin<Box<dyn Stream<Item = Vec<u8>> + Send>> {
    use futures_util::StreamExt as _;
    Box::pin(chunks.inspect(move |chunk| {
        total.fetch_add(chunk.len(), Ordering::Relaxed);
    }))
}

pub struct TurnPipelineConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub tts_sample_rate: u32,
    pub tts_voice: Option<String>,
}

pub struct TurnPipeline {
    asr: Arc<dyn AsrProvider>,
    llm: Arc<dyn LlmProvider>,
    tts: Arc<dyn TtsProvider>,
    metrics: Arc<dyn MetricsServiceTrait>,
    prompts: domain::PromptTable,
    config: TurnPipelineConfig,
}

impl TurnPipeline {
    pub fn new(
        asr: Arc<dyn AsrProvider>,
        llm: Arc<dyn LlmProvider>,
        tts: Arc<dyn TtsProvider>,
        metrics: Arc<dyn MetricsServiceTrait>,
        prompts: domain::PromptTable,
        config: TurnPipelineConfig,
    ) -> Self {
        Self { asr, llm, tts, metrics, prompts, config }
    }

    /// Run one turn to completion, mutating `session` in place and sending
    /// [`PipelineEvent`]s to `events` in emission order. Never returns an
    /// `Err` for a recoverable provider failure -- those are reported as
    /// `PipelineEvent::Error` and the session is left `IDLE`; `Err` is
    /// reserved for truly unrecoverable situations the caller must close
    /// the connection over.
    pub async fn run_turn(
        &self,
        session: &mut Session,
        request: TurnRequest,
        events: mpsc::Sender<PipelineEvent>,
    ) {
        session.transition(SessionState::Listening);
        let mut turn = Turn::new();

        let recognition_config = RecognitionConfig {
            language_code: request.language_code.clone(),
            sample_rate_hertz: request.sample_rate,
            interim_results: true,
        };

        let audio_bytes = Arc::new(AtomicUsize::new(0));
        let counted_audio = count_audio_bytes(request.audio_chunks, audio_bytes.clone());

        let asr_started = Instant::now();
        turn.timestamps.asr_started_at = Some(Utc::now());
        let _ = events
            .send(PipelineEvent::Status { state: "processing", stage: Some("asr") })
            .await;
        let mut transcript_stream = match self
            .asr
            .recognize_streaming(recognition_config, counted_audio)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                self.fail_turn(session, &events, "asr", e.into()).await;
                return;
            }
        };

        let mut final_transcript: Option<String> = None;
        while let Some(item) = transcript_stream.next().await {
            match item {
                Ok(result) if result.is_final => {
                    final_transcript = Some(result.transcript.clone());
                    turn.timestamps.final_transcript_at = Some(Utc::now());
                    session.transition(SessionState::Processing);
                    let _ = events
                        .send(PipelineEvent::FinalTranscript {
                            text: result.transcript,
                            confidence: Some(result.confidence),
                        })
                        .await;
                    break;
                }
                Ok(result) => {
                    let _ = events
                        .send(PipelineEvent::InterimTranscript {
                            text: result.transcript,
                            confidence: Some(result.confidence),
                        })
                        .await;
                }
                Err(e) => {
                    self.fail_turn(session, &events, "asr", e.into()).await;
                    return;
                }
            }
        }
        self.metrics.observe_asr_latency_seconds(asr_started.elapsed().as_secs_f64());
        let audio_duration_seconds =
            audio_duration_ms(audio_bytes.load(Ordering::Relaxed), request.sample_rate) / 1000.0;
        self.metrics.observe_asr_audio_duration_seconds(audio_duration_seconds);

        let Some(transcript) = final_transcript else {
            // The ASR stream ended without ever signaling a final result;
            // treat the same as an empty utterance.
            session.transition(SessionState::Processing);
            self.end_turn_silently(session, &events).await;
            return;
        };

        if transcript.trim().is_empty() {
            session.transition(SessionState::Processing);
            self.end_turn_silently(session, &events).await;
            return;
        }

        session.push_history(HistoryEntry { role: Role::User, text: transcript.clone() });
        turn.user_transcript = transcript;

        let final_transcript_at = Instant::now();
        self.run_llm_and_tts_stages(
            session,
            &request.language_code,
            &events,
            Some(final_transcript_at),
            turn,
        )
        .await;
    }

    /// Run a turn seeded directly with already-known text instead of audio
    /// (spec.md §3's `text-input` Audio Frame variant, for text-only
    /// testing/clients that skip the ASR stage entirely). Otherwise
    /// identical to the tail of [`TurnPipeline::run_turn`] from the final
    /// transcript onward.
    pub async fn run_text_turn(
        &self,
        session: &mut Session,
        text: &str,
        language_code: &str,
        events: mpsc::Sender<PipelineEvent>,
    ) {
        session.transition(SessionState::Listening);
        if text.trim().is_empty() {
            session.transition(SessionState::Processing);
            self.end_turn_silently(session, &events).await;
            return;
        }

        let mut turn = Turn::new();
        turn.timestamps.final_transcript_at = Some(Utc::now());
        turn.user_transcript = text.to_string();

        session.transition(SessionState::Processing);
        let _ = events
            .send(PipelineEvent::FinalTranscript { text: text.to_string(), confidence: None })
            .await;
        session.push_history(HistoryEntry { role: Role::User, text: text.to_string() });

        let final_transcript_at = Instant::now();
        self.run_llm_and_tts_stages(
            session,
            language_code,
            &events,
            Some(final_transcript_at),
            turn,
        )
        .await;
    }

    async fn end_turn_silently(&self, session: &mut Session, events: &mpsc::Sender<PipelineEvent>) {
        session.transition(SessionState::Idle);
        let _ = events.send(PipelineEvent::Status { state: "idle", stage: None }).await;
    }

    async fn run_llm_and_tts_stages(
        &self,
        session: &mut Session,
        language_code: &str,
        events: &mpsc::Sender<PipelineEvent>,
        final_transcript_at: Option<Instant>,
        mut turn: Turn,
    ) {
        let system_prompt = self.prompts.select(language_code).to_string();
        let mut messages = vec![ChatMessage { role: "system".to_string(), content: system_prompt }];
        messages.extend(session.history.iter().map(|entry| ChatMessage {
            role: match entry.role {
                Role::User => "user".to_string(),
                Role::Assistant => "assistant".to_string(),
            },
            content: entry.text.clone(),
        }));

        let llm_request = LlmRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        };

        let llm_started = Instant::now();
        turn.timestamps.llm_request_sent_at = Some(Utc::now());
        let _ = events
            .send(PipelineEvent::Status { state: "processing", stage: Some("llm") })
            .await;
        let mut token_stream = match self.llm.generate(llm_request).await {
            Ok(stream) => stream,
            Err(e) => {
                self.fail_turn(session, events, "llm", e.into()).await;
                return;
            }
        };

        let mut sentencer = Sentencer::new();
        let mut assistant_reply = String::new();
        let mut first_token_recorded = false;
        let mut spoke_yet = false;

        loop {
            match token_stream.next().await {
                Some(Ok(token)) => {
                    if !first_token_recorded {
                        first_token_recorded = true;
                        turn.timestamps.llm_first_token_at = Some(Utc::now());
                        self.metrics
                            .observe_llm_ttft_seconds(llm_started.elapsed().as_secs_f64());
                    }
                    turn.timestamps.llm_last_token_at = Some(Utc::now());
                    assistant_reply.push_str(&token);
                    let _ = events
                        .send(PipelineEvent::ReplyTextChunk { text: token.clone(), is_final: false })
                        .await;

                    for sentence in sentencer.push(&token) {
                        if !self
                            .speak_sentence(
                                session,
                                events,
                                &sentence,
                                language_code,
                                &mut spoke_yet,
                                final_transcript_at,
                                &mut turn,
                            )
                            .await
                        {
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    self.fail_turn(session, events, "llm", e.into()).await;
                    return;
                }
                None => break,
            }
        }
        self.metrics.observe_llm_total_seconds(llm_started.elapsed().as_secs_f64());

        if let Some(remainder) = sentencer.finish() {
            if !self
                .speak_sentence(
                    session,
                    events,
                    &remainder,
                    language_code,
                    &mut spoke_yet,
                    final_transcript_at,
                    &mut turn,
                )
                .await
            {
                return;
            }
        }

        turn.assistant_reply = assistant_reply.clone();
        session.push_history(HistoryEntry { role: Role::Assistant, text: assistant_reply });
        let _ = events.send(PipelineEvent::ReplyTextChunk { text: String::new(), is_final: true }).await;

        session.transition(SessionState::Idle);
        let _ = events.send(PipelineEvent::Status { state: "idle", stage: None }).await;
        self.metrics.record_request(language_code, "ok", false);

        turn.timestamps.turn_ended_at = Some(Utc::now());
        tracing::debug!(session_id = %session.id, ?turn.timestamps, "turn completed");
    }

    /// Submit one ready sentence to TTS and forward its audio chunks in
    /// order. Returns `false` if the turn failed and the caller should stop.
    async fn speak_sentence(
        &self,
        session: &mut Session,
        events: &mpsc::Sender<PipelineEvent>,
        sentence: &str,
        language_code: &str,
        spoke_yet: &mut bool,
        final_transcript_at: Option<Instant>,
        turn: &mut Turn,
    ) -> bool {
        if sentence.trim().is_empty() {
            return true;
        }
        self.metrics.observe_tts_text_length_chars(sentence.chars().count() as f64);

        if turn.timestamps.tts_request_sent_at.is_none() {
            turn.timestamps.tts_request_sent_at = Some(Utc::now());
        }
        let tts_started = Instant::now();
        let mut audio_stream = match self
            .tts
            .synthesize_streaming(
                sentence,
                language_code,
                self.config.tts_voice.as_deref(),
                self.config.tts_sample_rate,
            )
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                self.fail_turn(session, events, "tts", e.into()).await;
                return false;
            }
        };

        let mut first_chunk = true;
        while let Some(chunk) = audio_stream.next().await {
            match chunk {
                Ok(audio) => {
                    if first_chunk {
                        first_chunk = false;
                        self.metrics
                            .observe_tts_latency_seconds(tts_started.elapsed().as_secs_f64());
                        if !*spoke_yet {
                            *spoke_yet = true;
                            turn.timestamps.first_audio_chunk_at = Some(Utc::now());
                            if let Some(final_transcript_at) = final_transcript_at {
                                self.metrics.observe_e2e_latency_seconds(
                                    final_transcript_at.elapsed().as_secs_f64(),
                                );
                            }
                            session.transition(SessionState::Speaking);
                        }
                    }
                    let _ = events.send(PipelineEvent::AudioChunk(audio)).await;
                }
                Err(e) => {
                    self.fail_turn(session, events, "tts", e.into()).await;
                    return false;
                }
            }
        }
        true
    }

    async fn fail_turn(
        &self,
        session: &mut Session,
        events: &mpsc::Sender<PipelineEvent>,
        stage: &'static str,
        error: GatewayError,
    ) {
        tracing::error!(session_id = %session.id, stage, error = %error, "turn failed");
        self.metrics.record_error(stage, error.kind());
        let _ = events.send(PipelineEvent::Error(error.clone())).await;
        if error.recoverable() {
            session.recover_to_idle();
        } else {
            session.transition(SessionState::Closed);
        }
    }
}

impl From<inference_providers::AsrError> for GatewayError {
    fn from(err: inference_providers::AsrError) -> Self {
        use inference_providers::{AsrError, ProviderErrorKind};
        match err {
            AsrError::Kind(ProviderErrorKind::ProviderTimeout(_)) => {
                GatewayError::ProviderTimeout { stage: "asr" }
            }
            AsrError::Kind(ProviderErrorKind::ProviderUnavailable(msg)) => {
                GatewayError::ProviderUnavailable(msg)
            }
            AsrError::Kind(ProviderErrorKind::ProviderRpcError(msg)) => {
                GatewayError::ProviderRpcError { stage: "asr", message: msg }
            }
            AsrError::InvalidAudio(msg) => GatewayError::InternalError(msg),
            AsrError::PoolExhausted => {
                GatewayError::ProviderUnavailable("asr pool exhausted".to_string())
            }
        }
    }
}

impl From<inference_providers::LlmError> for GatewayError {
    fn from(err: inference_providers::LlmError) -> Self {
        use inference_providers::{LlmError, ProviderErrorKind};
        match err {
            LlmError::Kind(ProviderErrorKind::ProviderTimeout(_)) => {
                GatewayError::ProviderTimeout { stage: "llm" }
            }
            LlmError::Kind(ProviderErrorKind::ProviderUnavailable(msg)) => {
                GatewayError::ProviderUnavailable(msg)
            }
            LlmError::Kind(ProviderErrorKind::ProviderRpcError(msg)) => {
                GatewayError::ProviderRpcError { stage: "llm", message: msg }
            }
            LlmError::MalformedResponse(msg) => GatewayError::InternalError(msg),
        }
    }
}

impl From<inference_providers::TtsError> for GatewayError {
    fn from(err: inference_providers::TtsError) -> Self {
        use inference_providers::{ProviderErrorKind, TtsError};
        match err {
            TtsError::Kind(ProviderErrorKind::ProviderTimeout(_)) => {
                GatewayError::ProviderTimeout { stage: "tts" }
            }
            TtsError::Kind(ProviderErrorKind::ProviderUnavailable(msg)) => {
                GatewayError::ProviderUnavailable(msg)
            }
            TtsError::Kind(ProviderErrorKind::ProviderRpcError(msg)) => {
                GatewayError::ProviderRpcError { stage: "tts", message: msg }
            }
            TtsError::PoolExhausted => {
                GatewayError::ProviderUnavailable("tts pool exhausted".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::CapturingMetricsService;
    use inference_providers::mock::{MockAsrProvider, MockLlmProvider, MockTtsProvider};

    fn pipeline(reply: &str) -> (TurnPipeline, Arc<CapturingMetricsService>) {
        let metrics = Arc::new(CapturingMetricsService::default());
        let asr = Arc::new(MockAsrProvider::new(vec![("hello there".to_string(), true, 0.95)]));
        let llm = Arc::new(MockLlmProvider::new(reply));
        let tts = Arc::new(MockTtsProvider::new(2, 320));
        let pipeline = TurnPipeline::new(
            asr,
            llm,
            tts,
            metrics.clone(),
            domain::PromptTable::default(),
            TurnPipelineConfig {
                model: "test-model".to_string(),
                max_tokens: 128,
                temperature: 0.7,
                tts_sample_rate: 16000,
                tts_voice: None,
            },
        );
        (pipeline, metrics)
    }

    #[tokio::test]
    async fn happy_path_emits_frames_in_order_and_ends_idle() {
        let (pipeline, metrics) = pipeline("Hi there friend.");
        let mut session = Session::new("en-US", 10);
        session.transition(SessionState::Listening);

        let (tx, mut rx) = mpsc::channel(64);
        let audio = Box::pin(tokio_stream::iter(vec![vec![0u8; 320]]));
        let request = TurnRequest {
            language_code: "en-US".to_string(),
            sample_rate: 16000,
            audio_chunks: audio,
        };
        pipeline.run_turn(&mut session, request, tx).await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        let final_transcript_index = events
            .iter()
            .position(|e| matches!(e, PipelineEvent::FinalTranscript { .. }))
            .unwrap();
        let first_reply_chunk_index = events
            .iter()
            .position(|e| matches!(e, PipelineEvent::ReplyTextChunk { .. }))
            .unwrap();
        assert!(final_transcript_index < first_reply_chunk_index);

        assert!(events.iter().any(|e| matches!(e, PipelineEvent::AudioChunk(_))));
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::Status { state: "idle", .. })
        ));
        assert_eq!(session.state, SessionState::Idle);
        assert_eq!(session.history.len(), 2);
        assert_eq!(metrics.e2e_latencies.lock().unwrap().len(), 1);
        assert_eq!(metrics.asr_latencies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_final_transcript_skips_llm_and_tts() {
        let metrics = Arc::new(CapturingMetricsService::default());
        let metrics_check = metrics.clone();
        let asr = Arc::new(MockAsrProvider::new(vec![("".to_string(), true, 0.0)]));
        let llm = Arc::new(MockLlmProvider::new("should not be used"));
        let tts = Arc::new(MockTtsProvider::new(1, 10));
        let pipeline = TurnPipeline::new(
            asr,
            llm,
            tts,
            metrics,
            domain::PromptTable::default(),
            TurnPipelineConfig {
                model: "test-model".to_string(),
                max_tokens: 128,
                temperature: 0.7,
                tts_sample_rate: 16000,
                tts_voice: None,
            },
        );

        let mut session = Session::new("en-US", 10);
        session.transition(SessionState::Listening);
        let (tx, mut rx) = mpsc::channel(64);
        let audio = Box::pin(tokio_stream::iter(vec![vec![0u8; 320]]));
        let request = TurnRequest {
            language_code: "en-US".to_string(),
            sample_rate: 16000,
            audio_chunks: audio,
        };
        pipeline.run_turn(&mut session, request, tx).await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(!events.iter().any(|e| matches!(e, PipelineEvent::ReplyTextChunk { .. })));
        assert!(!events.iter().any(|e| matches!(e, PipelineEvent::AudioChunk(_))));
        assert_eq!(session.state, SessionState::Idle);
        assert!(session.history.is_empty());
        assert!(metrics_check.e2e_latencies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn text_turn_skips_asr_and_still_speaks() {
        let (pipeline, _metrics) = pipeline("Hello yourself.");
        let mut session = Session::new("en-US", 10);

        let (tx, mut rx) = mpsc::channel(64);
        pipeline.run_text_turn(&mut session, "hello there", "en-US", tx).await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(PipelineEvent::FinalTranscript { .. })));
        assert!(events.iter().any(|e| matches!(e, PipelineEvent::AudioChunk(_))));
        assert_eq!(session.state, SessionState::Idle);
        assert_eq!(session.history.len(), 2);
    }
}
