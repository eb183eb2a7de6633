//! The `/ws/voice` stream server (spec.md §4.4, §6): a bidirectional
//! WebSocket endpoint that demuxes client frames, drives the turn pipeline,
//! and muxes server frames back in emission order.
//!
//! The turn pipeline runs on its own task, owning the session exclusively
//! for the duration of one turn; the connection task keeps reading the
//! socket throughout so it can feed audio into the running turn, answer
//! `ping` immediately, and buffer any audio that arrives while the session
//! isn't `LISTENING` (spec.md §4.3: "additional audio arriving in
//! PROCESSING/SPEAKING is buffered (drop-oldest policy with a 2-second
//! bound) and treated as the next turn's prefix").

use std::collections::VecDeque;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use domain::{ClientFrame, ConfigFrame, ControlMessage, GatewayError, ServerEvent, ServerFrame, Session, SessionState};
use services::turn::{PipelineEvent, TurnRequest};

use crate::state::AppState;

const CONFIG_FRAME_TIMEOUT: Duration = Duration::from_secs(10);
const GRACE_DELETION: Duration = Duration::from_secs(300);
const PENDING_AUDIO_SECONDS: u32 = 2;

pub async fn voice_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_voice_socket(socket, state))
}

async fn handle_voice_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    state.metrics.inc_ws_connections();

    let Some(mut session) = negotiate_session(&mut sender, &mut receiver, &state).await else {
        state.metrics.dec_ws_connections();
        return;
    };
    let session_id = session.id;
    state.metrics.inc_active_streams();

    let mut in_flight = InFlightTurn::default();
    let mut pending_audio: VecDeque<u8> = VecDeque::new();
    let pending_audio_bound = state.config.audio_sample_rate as usize * 2 * PENDING_AUDIO_SECONDS as usize;
    let mut pending_control: Option<ControlMessage> = None;

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let Some(incoming) = incoming else { break };
                let msg = match incoming {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::warn!(session_id = %session_id, error = %e, "websocket receive error");
                        break;
                    }
                };
                match msg {
                    Message::Binary(data) => {
                        handle_audio_chunk(
                            data.to_vec(),
                            &mut in_flight,
                            &mut pending_audio,
                            pending_audio_bound,
                            &session,
                            &state,
                        )
                        .await;
                    }
                    Message::Text(text) => {
                        if !handle_text_frame(
                            &text,
                            &mut session,
                            &state,
                            &mut sender,
                            &in_flight,
                            &mut pending_control,
                        )
                        .await
                        {
                            break;
                        }
                    }
                    Message::Ping(data) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Message::Pong(_) => {}
                    Message::Close(_) => {
                        tracing::info!(session_id = %session_id, "client closed voice stream");
                        break;
                    }
                }
            }
            event = recv_or_pending(&mut in_flight.events) => {
                match event {
                    Some(event) => {
                        if forward_pipeline_event(&mut sender, event).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let Some(returned) = in_flight.finish().await else {
                            tracing::error!(session_id = %session_id, "turn task ended without returning a session");
                            break;
                        };
                        session = returned;
                        state.sessions.save(session.clone()).await;

                        if let Some(control) = pending_control.take() {
                            if apply_control_message(control, &mut session, &state, &mut sender).await.is_err() {
                                break;
                            }
                        }

                        if !pending_audio.is_empty() {
                            let buffered: Vec<u8> = pending_audio.drain(..).collect();
                            start_turn(buffered, &mut in_flight, &session, &state).await;
                        }
                    }
                }
            }
        }
    }

    in_flight.abort();
    state.metrics.dec_active_streams();
    state.metrics.dec_ws_connections();

    if let Some(mut closing) = state.sessions.get(session_id).await {
        closing.transition(SessionState::Closed);
        state.sessions.save(closing).await;
    }
    state.sessions.schedule_grace_deletion(session_id, GRACE_DELETION);
}

/// Wait up to [`CONFIG_FRAME_TIMEOUT`] for the first text frame, parse it as
/// a [`ConfigFrame`], create or resume the session, and reply
/// `session_created`. Returns `None` (having already closed the socket) on
/// timeout or a malformed first frame.
async fn negotiate_session(
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
    state: &AppState,
) -> Option<Session> {
    let first = tokio::time::timeout(CONFIG_FRAME_TIMEOUT, receiver.next()).await;
    let config_frame = match first {
        Ok(Some(Ok(Message::Text(text)))) => serde_json::from_str::<ConfigFrame>(&text).ok(),
        _ => None,
    };

    let Some(config_frame) = config_frame else {
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: 4000,
                reason: "Config timeout".into(),
            })))
            .await;
        return None;
    };

    let session = if let Some(existing_id) = config_frame.session_id {
        if let Some(mut existing) = state.sessions.get(existing_id).await {
            state.sessions.cancel_grace_deletion(existing_id);
            existing.set_language(config_frame.language_code.clone());
            existing
        } else {
            Session::new(config_frame.language_code.clone(), DEFAULT_MAX_HISTORY_TURNS)
        }
    } else {
        Session::new(config_frame.language_code.clone(), DEFAULT_MAX_HISTORY_TURNS)
    };

    state.sessions.create(session.clone()).await;

    let reply = ServerFrame::SessionCreated { session_id: session.id, language: session.language.clone() };
    let Ok(json) = serde_json::to_string(&reply) else { return None };
    if sender.send(Message::Text(json.into())).await.is_err() {
        return None;
    }

    Some(session)
}

const DEFAULT_MAX_HISTORY_TURNS: usize = 10;

/// State for the turn currently in flight, if any.
#[derive(Default)]
struct InFlightTurn {
    audio_tx: Option<mpsc::Sender<Vec<u8>>>,
    events: Option<mpsc::Receiver<PipelineEvent>>,
    done: Option<oneshot::Receiver<Session>>,
    handle: Option<JoinHandle<()>>,
}

impl InFlightTurn {
    fn is_active(&self) -> bool {
        self.audio_tx.is_some()
    }

    /// Await the spawned turn task's returned session. Only called once
    /// `events` has yielded `None`, so `done` should resolve immediately.
    async fn finish(&mut self) -> Option<Session> {
        let done = self.done.take()?;
        self.audio_tx = None;
        self.events = None;
        self.handle = None;
        done.await.ok()
    }

    fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.audio_tx = None;
        self.events = None;
        self.done = None;
    }
}

async fn recv_or_pending(rx: &mut Option<mpsc::Receiver<PipelineEvent>>) -> Option<PipelineEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn handle_audio_chunk(
    data: Vec<u8>,
    in_flight: &mut InFlightTurn,
    pending_audio: &mut VecDeque<u8>,
    pending_audio_bound: usize,
    session: &Session,
    state: &AppState,
) {
    if let Some(tx) = &in_flight.audio_tx {
        if tx.try_send(data).is_ok() {
            return;
        }
        // Turn is wrapping up (or backpressured); treat as the next turn's
        // prefix instead of blocking the read loop.
    }

    if in_flight.is_active() {
        buffer_pending_audio(pending_audio, pending_audio_bound, data);
        return;
    }

    start_turn(data, in_flight, session, state).await;
}

fn buffer_pending_audio(pending_audio: &mut VecDeque<u8>, bound: usize, data: Vec<u8>) {
    pending_audio.extend(data);
    while pending_audio.len() > bound {
        pending_audio.pop_front();
    }
}

async fn start_turn(first_chunk: Vec<u8>, in_flight: &mut InFlightTurn, session: &Session, state: &AppState) {
    let (audio_tx, audio_rx) = mpsc::channel::<Vec<u8>>(256);
    let (events_tx, events_rx) = mpsc::channel(256);
    let (done_tx, done_rx) = oneshot::channel();

    if audio_tx.send(first_chunk).await.is_err() {
        return;
    }

    let pipeline = state.pipeline.clone();
    let language_code = session.language.clone();
    let sample_rate = state.config.audio_sample_rate;
    let mut owned_session = session.clone();

    let handle = tokio::spawn(async move {
        let request = TurnRequest {
            language_code,
            sample_rate,
            audio_chunks: Box::pin(ReceiverStream::new(audio_rx)),
        };
        pipeline.run_turn(&mut owned_session, request, events_tx).await;
        let _ = done_tx.send(owned_session);
    });

    in_flight.audio_tx = Some(audio_tx);
    in_flight.events = Some(events_rx);
    in_flight.done = Some(done_rx);
    in_flight.handle = Some(handle);
}

async fn forward_pipeline_event(
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    event: PipelineEvent,
) -> Result<(), ()> {
    match event {
        PipelineEvent::Status { state, stage } => {
            send_frame(sender, &ServerFrame::Status { state, stage }).await
        }
        PipelineEvent::InterimTranscript { text, confidence } => {
            send_frame(sender, &ServerFrame::InterimTranscript { text, confidence }).await
        }
        PipelineEvent::FinalTranscript { text, confidence } => {
            send_frame(sender, &ServerFrame::FinalTranscript { text, confidence }).await
        }
        PipelineEvent::ReplyTextChunk { text, is_final } => {
            send_frame(sender, &ServerFrame::ReplyTextChunk { text, is_final }).await
        }
        PipelineEvent::AudioChunk(audio) => {
            sender.send(Message::Binary(audio.into())).await.map_err(|_| ())
        }
        PipelineEvent::Error(error) => {
            let event_kind = match &error {
                GatewayError::ClientDisconnect => return Ok(()),
                _ => ServerEvent::Error,
            };
            send_frame(sender, &ServerFrame::Event { event: event_kind, message: Some(error.client_message()) }).await?;
            send_frame(sender, &ServerFrame::Error { message: error.client_message() }).await
        }
    }
}

async fn send_frame(
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    frame: &ServerFrame,
) -> Result<(), ()> {
    let json = serde_json::to_string(frame).map_err(|_| ())?;
    sender.send(Message::Text(json.into())).await.map_err(|_| ())
}

/// Handle one incoming text frame: either a control message or a
/// `text-input` substitute for audio (spec.md §3). Returns `false` if the
/// connection should close.
async fn handle_text_frame(
    text: &str,
    session: &mut Session,
    state: &AppState,
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    in_flight: &InFlightTurn,
    pending_control: &mut Option<ControlMessage>,
) -> bool {
    let Ok(frame) = serde_json::from_str::<ClientFrame>(text) else {
        let _ = send_frame(sender, &ServerFrame::Error { message: "Invalid message".to_string() }).await;
        return true;
    };

    match frame {
        ClientFrame::Control(ControlMessage::Ping) => {
            let _ = send_frame(sender, &ServerFrame::Pong).await;
            true
        }
        ClientFrame::Control(control) if in_flight.is_active() => {
            // Session is checked out to the in-flight turn task; apply once
            // it returns (at most one deferred edit -- last one wins).
            *pending_control = Some(control);
            true
        }
        ClientFrame::Control(control) => apply_control_message(control, session, state, sender).await.is_ok(),
        ClientFrame::TextInput { text } => {
            if in_flight.is_active() {
                // Text-input turns, like audio, can only start once the
                // session isn't checked out; silently dropped otherwise,
                // matching the drop-oldest audio-buffering policy.
                return true;
            }
            run_text_turn(text, session, state, sender).await;
            true
        }
    }
}

async fn apply_control_message(
    control: ControlMessage,
    session: &mut Session,
    state: &AppState,
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
) -> Result<(), ()> {
    match control {
        ControlMessage::Ping => send_frame(sender, &ServerFrame::Pong).await,
        ControlMessage::ClearHistory => {
            session.clear_history();
            state.sessions.save(session.clone()).await;
            send_frame(sender, &ServerFrame::HistoryCleared).await
        }
        ControlMessage::ChangeLanguage { language } => {
            if state.config.is_language_supported(&language) {
                session.set_language(language);
                state.sessions.save(session.clone()).await;
                send_frame(
                    sender,
                    &ServerFrame::StateSnapshot {
                        session_id: session.id,
                        language: session.language.clone(),
                        state: session_state_label(session.state),
                        history_len: session.history.len(),
                    },
                )
                .await
            } else {
                send_frame(sender, &ServerFrame::Error { message: "Unsupported language".to_string() }).await
            }
        }
        ControlMessage::GetState => {
            send_frame(
                sender,
                &ServerFrame::StateSnapshot {
                    session_id: session.id,
                    language: session.language.clone(),
                    state: session_state_label(session.state),
                    history_len: session.history.len(),
                },
            )
            .await
        }
    }
}

fn session_state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::Initialized => "initialized",
        SessionState::Listening => "listening",
        SessionState::Processing => "processing",
        SessionState::Speaking => "speaking",
        SessionState::Idle => "idle",
        SessionState::Closed => "closed",
    }
}

/// Run a turn synchronously for `text-input` frames: there's no audio to
/// stream concurrently, so unlike [`start_turn`] this drives the pipeline to
/// completion and forwards its events before the handler reads another
/// frame.
async fn run_text_turn(
    text: String,
    session: &mut Session,
    state: &AppState,
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
) {
    let (events_tx, mut events_rx) = mpsc::channel(256);
    let language_code = session.language.clone();
    let pipeline = state.pipeline.clone();

    let run = pipeline.run_text_turn(session, &text, &language_code, events_tx);
    tokio::pin!(run);
    let mut run_done = false;
    loop {
        tokio::select! {
            _ = &mut run, if !run_done => { run_done = true; }
            event = events_rx.recv() => {
                match event {
                    Some(event) => {
                        if forward_pipeline_event(sender, event).await.is_err() {
                            return;
                        }
                    }
                    None if run_done => break,
                    None => continue,
                }
            }
        }
    }
    state.sessions.save(session.clone()).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_audio_bound_drops_oldest_bytes() {
        let mut buf = VecDeque::new();
        buffer_pending_audio(&mut buf, 4, vec![1, 2, 3]);
        buffer_pending_audio(&mut buf, 4, vec![4, 5]);
        assert_eq!(buf.into_iter().collect::<Vec<_>>(), vec![2, 3, 4, 5]);
    }
}
