//! Buffered SSE parser for the LLM adapter's streaming chat-completion
//! response (spec.md §4.1): newline-delimited `data: <json>` with sentinel
//! `data: [DONE]`; malformed lines are skipped silently.
//!
//! Structurally this is the teacher's `BufferedSSEParser` (a `VecDeque` of
//! pending results drained before polling the underlying byte stream, so no
//! event is lost when several arrive in one network packet), specialized to
//! a single chunk shape instead of being generic over a provider parser
//! trait -- this gateway only ever talks to one LLM backend.

use bytes::Bytes;
use futures_core::Stream;
use serde::Deserialize;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunkDelta {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunkChoice {
    pub delta: Option<ChatCompletionChunkDelta>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    pub choices: Vec<ChatCompletionChunkChoice>,
    #[serde(default)]
    pub usage: Option<ChatCompletionUsage>,
}

/// Streams parsed chunks from a byte stream of SSE data. Lines that are not
/// valid `data: <json>` are skipped rather than erroring the whole stream,
/// matching spec.md §4.1's "malformed lines are skipped silently".
pub struct SseChunkStream<S> {
    inner: S,
    buffer: String,
    pending: VecDeque<ChatCompletionChunk>,
    done: bool,
}

impl<S> SseChunkStream<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: String::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }

    fn drain_lines(&mut self) {
        while let Some(newline_pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline_pos).collect();
            let line = line.trim();
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))
            else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                continue;
            }
            match serde_json::from_str::<ChatCompletionChunk>(data) {
                Ok(chunk) => self.pending.push_back(chunk),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed SSE line");
                }
            }
        }
    }
}

impl<S> Stream for SseChunkStream<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    type Item = ChatCompletionChunk;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(chunk) = this.pending.pop_front() {
            return Poll::Ready(Some(chunk));
        }
        if this.done {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                this.buffer.push_str(&String::from_utf8_lossy(&bytes));
                this.drain_lines();
                match this.pending.pop_front() {
                    Some(chunk) => Poll::Ready(Some(chunk)),
                    None => {
                        cx.waker().wake_by_ref();
                        Poll::Pending
                    }
                }
            }
            Poll::Ready(Some(Err(e))) => {
                tracing::warn!(error = %e, "llm stream transport error, ending stream");
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn chunk_line(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{content}\"}},\"finish_reason\":null}}]}}\n\n"
        )
    }

    #[tokio::test]
    async fn parses_multiple_events_in_one_packet() {
        let packet = format!("{}{}{}", chunk_line("One"), chunk_line(" Two"), "data: [DONE]\n\n");
        let mock = futures_util::stream::iter(vec![Ok::<_, reqwest::Error>(Bytes::from(packet))]);
        let stream = SseChunkStream::new(mock);
        let chunks: Vec<_> = stream.collect().await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0].choices[0].delta.as_ref().unwrap().content.as_deref(),
            Some("One")
        );
    }

    #[tokio::test]
    async fn skips_malformed_lines() {
        let packet = "data: not json\n\ndata: [DONE]\n\n".to_string() + &chunk_line("ok");
        let mock = futures_util::stream::iter(vec![Ok::<_, reqwest::Error>(Bytes::from(packet))]);
        let stream = SseChunkStream::new(mock);
        let chunks: Vec<_> = stream.collect().await;
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn handles_events_split_across_packets() {
        let full = chunk_line("partial");
        let (first, second) = full.split_at(full.len() / 2);
        let mock = futures_util::stream::iter(vec![
            Ok::<_, reqwest::Error>(Bytes::from(first.to_string())),
            Ok(Bytes::from(second.to_string())),
        ]);
        let stream = SseChunkStream::new(mock);
        let chunks: Vec<_> = stream.collect().await;
        assert_eq!(chunks.len(), 1);
    }
}
