use std::collections::VecDeque;
use std::time::Instant;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use super::sse::{classify_line, error_frame, is_done_payload, sse_line_stream, SseLine, DONE_FRAME};
use super::state::{apply_event, StreamState, UpstreamEvent};
use super::StreamAdapter;
use crate::error::TranscodeError;
use crate::observability::log_stream_complete;
use crate::protocol::canonical::{CanonicalChunk, ProviderKind};

/// Converts one upstream SSE stream into canonical chunks, line by line.
///
/// Owns the per-stream [`StreamState`] and the upstream adapter. Lines must be
/// fed in arrival order; chunks come out in the same order.
pub struct StreamTranscoder {
    kind: ProviderKind,
    state: StreamState,
    adapter: StreamAdapter,
    events: Vec<UpstreamEvent>,
    started_at: Instant,
    logged: bool,
}

impl StreamTranscoder {
    /// `model` is the requested model, reported until the upstream names one.
    #[must_use]
    pub fn new(kind: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            state: StreamState::new(model),
            adapter: StreamAdapter::for_kind(kind),
            events: Vec::with_capacity(8),
            started_at: Instant::now(),
            logged: false,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    #[must_use]
    pub fn state(&self) -> &StreamState {
        &self.state
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.closed
    }

    /// Feed one logical line (without its newline).
    ///
    /// Only `data:` lines carry events. Malformed payloads are logged and skipped;
    /// `[DONE]`, `event:`, comments and blank lines produce nothing.
    pub fn push_line(&mut self, line: &str, out: &mut Vec<CanonicalChunk>) {
        let data = match classify_line(line) {
            SseLine::Data(data) => data,
            SseLine::Event(_) | SseLine::Blank | SseLine::Ignored => return,
        };
        if data.is_empty() || is_done_payload(data) {
            return;
        }

        self.events.clear();
        if let Err(e) = self.adapter.translate(data, &self.state, &mut self.events) {
            tracing::warn!(
                upstream = %self.kind,
                error = %e,
                "skipping malformed upstream event"
            );
            return;
        }
        for event in self.events.drain(..) {
            apply_event(&mut self.state, event, out);
        }
        if self.state.closed {
            self.log_complete();
        }
    }

    /// Feed a whole captured body (e.g. a recorded stream).
    pub fn push_body(&mut self, body: &str, out: &mut Vec<CanonicalChunk>) {
        for line in body.lines() {
            self.push_line(line, out);
        }
    }

    /// Record the completion summary once, whether or not the upstream sent a stop.
    pub fn finish(&mut self) {
        self.log_complete();
    }

    fn log_complete(&mut self) {
        if self.logged {
            return;
        }
        self.logged = true;
        log_stream_complete(
            &self.state.model,
            &self.state.usage(),
            self.state.tool_calls.len(),
            self.started_at,
        );
    }
}

// ---------------------------------------------------------------------------
// Stream utilities
// ---------------------------------------------------------------------------

/// Turn an upstream byte stream into canonical chunks.
///
/// A transport error is yielded as the final item after any chunks already produced.
pub fn canonical_chunk_stream<S, E>(
    kind: ProviderKind,
    model: impl Into<String>,
    byte_stream: S,
) -> impl Stream<Item = Result<CanonicalChunk, TranscodeError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    futures_util::stream::unfold(
        (
            Box::pin(sse_line_stream(byte_stream)),
            StreamTranscoder::new(kind, model),
            VecDeque::<CanonicalChunk>::with_capacity(8),
            Vec::<CanonicalChunk>::with_capacity(8),
            false,
        ),
        |(mut lines, mut transcoder, mut pending, mut scratch, mut ended)| async move {
            loop {
                if let Some(chunk) = pending.pop_front() {
                    return Some((Ok(chunk), (lines, transcoder, pending, scratch, ended)));
                }
                if ended {
                    return None;
                }
                match lines.as_mut().next().await {
                    Some(Ok(line)) => {
                        transcoder.push_line(&line, &mut scratch);
                        pending.extend(scratch.drain(..));
                    }
                    Some(Err(e)) => {
                        ended = true;
                        transcoder.finish();
                        return Some((Err(e), (lines, transcoder, pending, scratch, ended)));
                    }
                    None => {
                        ended = true;
                        transcoder.finish();
                    }
                }
            }
        },
    )
}

/// Turn an upstream byte stream into canonical SSE frames.
///
/// Each chunk becomes `data: <json>\n\n`; a clean end appends `data: [DONE]\n\n`.
/// A transport error becomes an error frame and ends the stream without `[DONE]`.
pub fn canonical_sse_stream<S, E>(
    kind: ProviderKind,
    model: impl Into<String>,
    byte_stream: S,
) -> impl Stream<Item = Result<Bytes, TranscodeError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    futures_util::stream::unfold(
        (Box::pin(canonical_chunk_stream(kind, model, byte_stream)), false),
        |(mut chunks, done)| async move {
            if done {
                return None;
            }
            match chunks.as_mut().next().await {
                Some(Ok(chunk)) => {
                    let frame = chunk
                        .to_sse_frame()
                        .map(Bytes::from)
                        .map_err(TranscodeError::from);
                    Some((frame, (chunks, false)))
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "upstream stream terminated abnormally");
                    Some((Ok(Bytes::from(error_frame(&e))), (chunks, true)))
                }
                None => Some((Ok(Bytes::from_static(DONE_FRAME.as_bytes())), (chunks, true))),
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_stream(parts: Vec<&'static str>) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        futures_util::stream::iter(
            parts
                .into_iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_push_line_skips_noise_and_malformed() {
        let mut transcoder = StreamTranscoder::new(ProviderKind::Anthropic, "claude");
        let mut out = Vec::new();
        transcoder.push_line("event: message_start", &mut out);
        transcoder.push_line(": keepalive", &mut out);
        transcoder.push_line("", &mut out);
        transcoder.push_line("data: {not json", &mut out);
        transcoder.push_line("data: [DONE]", &mut out);
        assert!(out.is_empty());

        transcoder.push_line(
            r#"data: {"type":"message_start","message":{"id":"msg_1","model":"claude","usage":{"input_tokens":3}}}"#,
            &mut out,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "msg_1");
    }

    #[test]
    fn test_push_body_closes_on_message_stop() {
        let body = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"m\",\"usage\":{\"input_tokens\":1}}}\n\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"ok\"}}\n\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":1}}\n\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        let mut transcoder = StreamTranscoder::new(ProviderKind::Anthropic, "claude");
        let mut out = Vec::new();
        transcoder.push_body(body, &mut out);
        assert!(transcoder.is_closed());
        assert_eq!(out.last().unwrap().finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_sse_stream_appends_done() {
        let upstream = bytes_stream(vec![
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"m\"}}\n\ndata: {\"type\":\"content_block_delta\",\"index\":0,",
            "\"delta\":{\"type\":\"text_delta\",\"text\":\"hi\"}}\n\n",
        ]);
        let frames: Vec<_> = canonical_sse_stream(ProviderKind::Anthropic, "claude", upstream)
            .collect()
            .await;
        let frames: Vec<String> = frames
            .into_iter()
            .map(|f| String::from_utf8(f.unwrap().to_vec()).unwrap())
            .collect();
        assert_eq!(frames.len(), 3);
        assert!(frames[1].contains("\"content\":\"hi\""));
        assert_eq!(frames[2], DONE_FRAME);
    }

    #[tokio::test]
    async fn test_sse_stream_error_frame_without_done() {
        let upstream = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"message_start\",\"message\":{}}\n")),
            Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof")),
        ]);
        let frames: Vec<_> = canonical_sse_stream(ProviderKind::Anthropic, "claude", upstream)
            .collect()
            .await;
        assert_eq!(frames.len(), 2);
        let last = String::from_utf8(frames[1].as_ref().unwrap().to_vec()).unwrap();
        assert!(last.starts_with("data: {\"error\""));
        assert!(!last.contains("[DONE]"));
    }
}
