//! SSE stream transcoding: line framing, upstream adapters and the canonical state machine.

pub mod sse;
pub mod state;
pub mod transcoder;

pub use sse::{sse_line_stream, LineFramer, DONE_FRAME};
pub use state::{apply_event, StreamState, UpstreamEvent};
pub use transcoder::{canonical_chunk_stream, canonical_sse_stream, StreamTranscoder};

use crate::protocol::anthropic::stream::{anthropic_event_into, parse_anthropic_event};
use crate::protocol::canonical::ProviderKind;
use crate::protocol::cloudcode::stream::CloudCodeStreamAdapter;
use crate::protocol::responses::stream::ResponsesStreamAdapter;

/// Per-upstream translator from a `data:` payload to [`UpstreamEvent`]s.
#[derive(Debug)]
pub enum StreamAdapter {
    Anthropic,
    CloudCode(CloudCodeStreamAdapter),
    Responses(ResponsesStreamAdapter),
}

impl StreamAdapter {
    #[must_use]
    pub fn for_kind(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Anthropic => StreamAdapter::Anthropic,
            ProviderKind::CloudCode => StreamAdapter::CloudCode(CloudCodeStreamAdapter::new()),
            ProviderKind::Responses => StreamAdapter::Responses(ResponsesStreamAdapter::new()),
        }
    }

    /// Translate one payload, appending the resulting events to `out`.
    ///
    /// # Errors
    ///
    /// Returns the JSON error for payloads that do not parse.
    pub fn translate(
        &mut self,
        data: &str,
        state: &StreamState,
        out: &mut Vec<UpstreamEvent>,
    ) -> Result<(), serde_json::Error> {
        match self {
            StreamAdapter::Anthropic => {
                let event = parse_anthropic_event(data)?;
                anthropic_event_into(event, out);
                Ok(())
            }
            StreamAdapter::CloudCode(adapter) => adapter.translate(data, state, out),
            StreamAdapter::Responses(adapter) => adapter.translate(data, state, out),
        }
    }
}
