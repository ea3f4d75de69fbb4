//! SSE line framing and canonical SSE output helpers.
//!
//! Upstream bodies arrive in arbitrary byte slices; [`LineFramer`] carries the
//! partial tail between reads and yields logical lines.

use std::collections::VecDeque;

use futures_util::Stream;
use memchr::memchr_iter;

use crate::error::TranscodeError;

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

// ---------------------------------------------------------------------------
// LineFramer
// ---------------------------------------------------------------------------

/// Incremental line splitter over raw bytes.
///
/// Lines end at `\n`; a trailing `\r` is stripped. Splitting on the newline byte
/// never cuts a multi-byte UTF-8 sequence, so every complete line decodes whole.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
    read_offset: usize,
}

impl LineFramer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and push every line they complete into `out`.
    pub fn push(&mut self, bytes: &[u8], out: &mut Vec<String>) {
        self.buffer.extend_from_slice(bytes);
        let scan_start = self.buffer.len() - bytes.len();
        let mut line_start = self.read_offset;
        for rel in memchr_iter(b'\n', &self.buffer[scan_start..]) {
            let line_end = scan_start + rel;
            out.push(decode_line(&self.buffer[line_start..line_end]));
            line_start = line_end + 1;
        }
        self.read_offset = line_start;

        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
        } else if self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024)
        {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    /// Flush the carried partial line at clean end of input.
    pub fn finish(&mut self) -> Option<String> {
        let line = self.has_partial().then(|| decode_line(&self.buffer[self.read_offset..]));
        self.discard();
        line
    }

    /// Drop the carried partial line (abnormal termination).
    pub fn discard(&mut self) {
        self.buffer.clear();
        self.read_offset = 0;
    }

    #[must_use]
    pub fn has_partial(&self) -> bool {
        self.read_offset < self.buffer.len()
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    match std::str::from_utf8(raw) {
        Ok(text) => text.to_string(),
        Err(e) => {
            tracing::warn!("upstream line is not valid UTF-8: {e}");
            String::from_utf8_lossy(raw).into_owned()
        }
    }
}

// ---------------------------------------------------------------------------
// Line classification
// ---------------------------------------------------------------------------

/// One logical SSE line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// `data:` payload with one leading space removed.
    Data(&'a str),
    /// `event:` name.
    Event(&'a str),
    /// Event separator.
    Blank,
    /// `:` comment, `id:`, `retry:` and unknown fields.
    Ignored,
}

#[must_use]
pub fn classify_line(line: &str) -> SseLine<'_> {
    if line.is_empty() {
        return SseLine::Blank;
    }
    if let Some(value) = line.strip_prefix("data:") {
        return SseLine::Data(value.strip_prefix(' ').unwrap_or(value));
    }
    if let Some(value) = line.strip_prefix("event:") {
        return SseLine::Event(value.trim());
    }
    SseLine::Ignored
}

#[must_use]
pub fn is_done_payload(data: &str) -> bool {
    data.trim() == "[DONE]"
}

/// `data: {"error":{...}}\n\n` frame for a terminal stream error.
#[must_use]
pub fn error_frame(err: &TranscodeError) -> String {
    format!("data: {}\n\n", err.to_openai_payload())
}

// ---------------------------------------------------------------------------
// Stream utility
// ---------------------------------------------------------------------------

/// Split an upstream byte stream into logical lines.
///
/// A transport error discards the partial line and is yielded as the final item.
/// A clean end flushes the partial line, if any, as one last line.
pub fn sse_line_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<String, TranscodeError>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    use futures_util::StreamExt;

    futures_util::stream::unfold(
        (
            Box::pin(byte_stream),
            LineFramer::new(),
            VecDeque::<String>::with_capacity(8),
            Vec::<String>::with_capacity(8),
            false,
        ),
        |(mut stream, mut framer, mut pending, mut scratch, mut ended)| async move {
            loop {
                if let Some(line) = pending.pop_front() {
                    return Some((Ok(line), (stream, framer, pending, scratch, ended)));
                }
                if ended {
                    return None;
                }
                match stream.as_mut().next().await {
                    Some(Ok(bytes)) => {
                        framer.push(&bytes, &mut scratch);
                        pending.extend(scratch.drain(..));
                    }
                    Some(Err(e)) => {
                        framer.discard();
                        ended = true;
                        let err = TranscodeError::Transport(e.to_string());
                        return Some((Err(err), (stream, framer, pending, scratch, ended)));
                    }
                    None => {
                        ended = true;
                        if let Some(line) = framer.finish() {
                            pending.push_back(line);
                        }
                    }
                }
            }
        },
    )
}
