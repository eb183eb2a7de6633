//! Simulates a single virtual user driving the gateway's `/ws/voice`
//! endpoint (spec.md §4.6, grounded in
//! `original_source/services/voice-gateway/tests/load/worker.py`'s
//! `VoiceWorker`/`WorkerConfig`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::audio_pool::{AudioFile, AudioPool};
use crate::collector::{RequestResult, RequestStatus, ResultsCollector};
use crate::config::LoadTestConfig;
use crate::protocol::ServerFrameView;

pub struct WorkerConfig {
    pub worker_id: u32,
    pub target_url: String,
    pub language_code: String,
    pub sample_rate: u32,
    pub chunk_size: usize,
    pub chunk_delay: Duration,
    pub request_timeout: Duration,
    pub think_time: Duration,
}

impl WorkerConfig {
    pub fn from_load_config(worker_id: u32, config: &LoadTestConfig) -> Self {
        Self {
            worker_id,
            target_url: config.target_url.clone(),
            language_code: config.language_code.clone(),
            sample_rate: config.sample_rate,
            chunk_size: config.chunk_size,
            chunk_delay: config.chunk_delay,
            request_timeout: config.request_timeout,
            think_time: config.think_time,
        }
    }
}

/// Runs one virtual user's request loop until `max_requests` is reached (0
/// = unlimited) or `stop` fires, reporting each completed request to
/// `collector`.
pub async fn run_worker(
    config: WorkerConfig,
    audio_pool: Arc<AudioPool>,
    collector: Arc<ResultsCollector>,
    max_requests: u32,
    mut stop: tokio::sync::watch::Receiver<bool>,
) {
    let mut request_id = 0u32;

    loop {
        if *stop.borrow() {
            break;
        }
        if max_requests > 0 && request_id >= max_requests {
            break;
        }

        let audio = audio_pool.next().clone();
        let result = tokio::select! {
            result = make_request(&config, request_id, &audio) => result,
            _ = stop.changed() => break,
        };
        collector.add_result(result);
        request_id += 1;

        if *stop.borrow() {
            break;
        }
        if !config.think_time.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(config.think_time) => {}
                _ = stop.changed() => break,
            }
        }
    }

    tracing::debug!(worker_id = config.worker_id, requests = request_id, "worker stopped");
}

async fn make_request(
    config: &WorkerConfig,
    request_id: u32,
    audio: &AudioFile,
) -> RequestResult {
    let start = Instant::now();
    let outcome = tokio::time::timeout(config.request_timeout, drive_one_turn(config, audio)).await;

    let end = Instant::now();
    match outcome {
        Ok(Ok(timings)) => RequestResult {
            worker_id: config.worker_id,
            request_id,
            audio_file: audio.name.clone(),
            start,
            end,
            asr_latency: timings.final_transcript.map(|t| t.saturating_duration_since(start)),
            llm_ttft: timings.first_llm_token_since_transcript(),
            llm_total: timings.last_llm_token_since_transcript(),
            tts_latency: timings.tts_since_first_token(),
            e2e_latency: timings.e2e(),
            status: RequestStatus::Success,
            error_message: None,
        },
        Ok(Err(message)) => RequestResult {
            worker_id: config.worker_id,
            request_id,
            audio_file: audio.name.clone(),
            start,
            end,
            asr_latency: None,
            llm_ttft: None,
            llm_total: None,
            tts_latency: None,
            e2e_latency: None,
            status: RequestStatus::Error,
            error_message: Some(message),
        },
        Err(_) => RequestResult {
            worker_id: config.worker_id,
            request_id,
            audio_file: audio.name.clone(),
            start,
            end,
            asr_latency: None,
            llm_ttft: None,
            llm_total: None,
            tts_latency: None,
            e2e_latency: None,
            status: RequestStatus::Timeout,
            error_message: Some(format!("request timed out after {:?}", config.request_timeout)),
        },
    }
}

#[derive(Default)]
struct Timings {
    final_transcript: Option<Instant>,
    first_llm_token: Option<Instant>,
    last_llm_token: Option<Instant>,
    first_audio: Option<Instant>,
}

impl Timings {
    fn first_llm_token_since_transcript(&self) -> Option<Duration> {
        Some(self.first_llm_token?.saturating_duration_since(self.final_transcript?))
    }

    fn last_llm_token_since_transcript(&self) -> Option<Duration> {
        Some(self.last_llm_token?.saturating_duration_since(self.final_transcript?))
    }

    fn tts_since_first_token(&self) -> Option<Duration> {
        Some(self.first_audio?.saturating_duration_since(self.first_llm_token?))
    }

    fn e2e(&self) -> Option<Duration> {
        Some(self.first_audio?.saturating_duration_since(self.final_transcript?))
    }
}

/// Opens one WebSocket connection, streams `audio` as fixed-size chunks at
/// `chunk_delay` spacing, and reads server frames until a terminal
/// `reply-text-chunk{is_final:true}`/`status{idle}` is observed or the
/// socket closes. Returns the captured stage timestamps, or `Err(message)`
/// on a protocol/transport error or an `error` frame from the gateway.
async fn drive_one_turn(
    config: &WorkerConfig,
    audio: &AudioFile,
) -> Result<Timings, String> {
    let url = format!("{}/ws/voice", config.target_url.trim_end_matches('/'));
    let (socket, _) = tokio_tungstenite::connect_async(&url)
        .await
        .map_err(|e| format!("connect failed: {e}"))?;
    let (mut write, mut read) = socket.split();

    let config_frame = serde_json::json!({
        "language_code": config.language_code,
        "sample_rate": config.sample_rate,
    });
    write
        .send(Message::Text(config_frame.to_string().into()))
        .await
        .map_err(|e| format!("failed to send config frame: {e}"))?;

    match read.next().await {
        Some(Ok(Message::Text(text))) => {
            let frame: ServerFrameView = serde_json::from_str(&text)
                .map_err(|e| format!("invalid session_created frame: {e}"))?;
            if !matches!(frame, ServerFrameView::SessionCreated { .. }) {
                return Err("expected session_created frame first".to_string());
            }
        }
        Some(Ok(_)) => return Err("expected text frame for session_created".to_string()),
        Some(Err(e)) => return Err(format!("transport error awaiting session_created: {e}")),
        None => return Err("connection closed before session_created".to_string()),
    }

    let audio_done = stream_audio(&mut write, audio, config.chunk_size, config.chunk_delay);

    let mut timings = Timings::default();
    let read_responses = async {
        while let Some(msg) = read.next().await {
            let msg = msg.map_err(|e| format!("transport error: {e}"))?;
            match msg {
                Message::Text(text) => {
                    let frame: ServerFrameView = match serde_json::from_str(&text) {
                        Ok(f) => f,
                        Err(_) => continue,
                    };
                    match observe_frame(&frame, &mut timings) {
                        FrameOutcome::Continue => {}
                        FrameOutcome::TurnComplete => return Ok(()),
                        FrameOutcome::GatewayError(message) => return Err(message),
                    }
                }
                Message::Binary(_) => {
                    if timings.first_audio.is_none() {
                        timings.first_audio = Some(Instant::now());
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        Ok(())
    };

    let (audio_result, read_result) = tokio::join!(audio_done, read_responses);
    audio_result?;
    read_result?;

    let _ = write.close().await;
    Ok(timings)
}

enum FrameOutcome {
    Continue,
    TurnComplete,
    GatewayError(String),
}

/// Classifies one server frame's effect on the in-flight turn, recording
/// stage timestamps along the way.
fn observe_frame(frame: &ServerFrameView, timings: &mut Timings) -> FrameOutcome {
    match frame {
        ServerFrameView::FinalTranscript { .. } => {
            if timings.final_transcript.is_none() {
                timings.final_transcript = Some(Instant::now());
            }
            FrameOutcome::Continue
        }
        ServerFrameView::ReplyTextChunk { is_final, .. } => {
            let now = Instant::now();
            if timings.first_llm_token.is_none() {
                timings.first_llm_token = Some(now);
            }
            timings.last_llm_token = Some(now);
            if *is_final {
                FrameOutcome::TurnComplete
            } else {
                FrameOutcome::Continue
            }
        }
        ServerFrameView::Status { state, .. } if state == "idle" && timings.final_transcript.is_some() => {
            FrameOutcome::TurnComplete
        }
        ServerFrameView::Error { message } => FrameOutcome::GatewayError(message.clone()),
        _ => FrameOutcome::Continue,
    }
}

async fn stream_audio(
    write: &mut (impl futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    audio: &AudioFile,
    chunk_size: usize,
    chunk_delay: Duration,
) -> Result<(), String> {
    for chunk in audio.chunks(chunk_size) {
        write
            .send(Message::Binary(chunk.to_vec().into()))
            .await
            .map_err(|e| format!("failed to send audio chunk: {e}"))?;
        if !chunk_delay.is_zero() {
            tokio::time::sleep(chunk_delay).await;
        }
    }
    Ok(())
}
