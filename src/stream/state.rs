//! Per-connection stream state and the event transition function.
//!
//! Upstream adapters normalize their native vocabulary onto [`UpstreamEvent`];
//! [`apply_event`] is the only place that mutates [`StreamState`] and the only
//! place canonical chunks are produced.

use crate::protocol::canonical::{
    CanonicalChunk, CanonicalUsage, ChunkDelta, FunctionDelta, ToolCallDelta,
};
use crate::protocol::mapping::map_finish_reason;
use crate::util::{next_chunk_id, unix_now_secs};

/// Kind of a content block as announced by block-start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Text,
    Thinking,
    ToolUse { id: String, name: String },
    Other,
}

/// Payload of a block-delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaKind {
    Text(String),
    Thinking(String),
    ToolInput(String),
    Signature,
    Other,
}

/// Upstream-agnostic stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    StreamStart {
        id: Option<String>,
        model: Option<String>,
        input_tokens: Option<u64>,
    },
    BlockStart {
        index: Option<u32>,
        kind: BlockKind,
    },
    BlockDelta {
        index: Option<u32>,
        delta: DeltaKind,
    },
    BlockStop {
        index: Option<u32>,
    },
    MessageDelta {
        stop_reason: Option<String>,
        input_tokens: Option<u64>,
        output_tokens: Option<u64>,
    },
    MessageStop,
    Ping,
    Error {
        message: String,
    },
}

/// Type of the block currently open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlockType {
    #[default]
    None,
    Text,
    Thinking,
    ToolUse,
}

/// One tool call being reassembled from argument fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallEntry {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Accumulation state for one open upstream stream.
#[derive(Debug, Clone)]
pub struct StreamState {
    pub message_id: String,
    pub model: String,
    pub created: u64,
    pub block_index: u32,
    pub block_type: BlockType,
    /// Append-only; position is the exposed `tool_calls[].index`.
    pub tool_calls: Vec<ToolCallEntry>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub started: bool,
    pub role_emitted: bool,
    pub finished: bool,
    pub closed: bool,
    pub chunks_emitted: usize,
    blocks_seen: bool,
}

impl StreamState {
    /// Fresh state; `model` is the requested model until the upstream reports one.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            message_id: next_chunk_id(),
            model: model.into(),
            created: unix_now_secs(),
            block_index: 0,
            block_type: BlockType::None,
            tool_calls: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
            started: false,
            role_emitted: false,
            finished: false,
            closed: false,
            chunks_emitted: 0,
            blocks_seen: false,
        }
    }

    #[must_use]
    pub fn usage(&self) -> CanonicalUsage {
        CanonicalUsage::from_counts(self.input_tokens, self.output_tokens)
    }

    fn advance_block_index(&mut self, index: Option<u32>) {
        let next = match index {
            Some(index) => index.max(self.block_index),
            None if self.blocks_seen => self.block_index + 1,
            None => 0,
        };
        self.block_index = next;
        self.blocks_seen = true;
    }

    fn emit(
        &mut self,
        mut delta: ChunkDelta,
        finish_reason: Option<String>,
        usage: Option<CanonicalUsage>,
        out: &mut Vec<CanonicalChunk>,
    ) {
        if !self.role_emitted {
            delta.role = Some("assistant".to_string());
            self.role_emitted = true;
        }
        self.chunks_emitted += 1;
        out.push(CanonicalChunk {
            id: self.message_id.clone(),
            model: self.model.clone(),
            created: self.created,
            delta,
            finish_reason,
            usage,
        });
    }

    fn emit_terminal(&mut self, stop_reason: &str, out: &mut Vec<CanonicalChunk>) {
        let finish_reason = map_finish_reason(Some(stop_reason));
        let usage = self.usage();
        self.finished = true;
        self.emit(ChunkDelta::default(), finish_reason, Some(usage), out);
    }
}

/// Apply one event to the state, appending any canonical chunks it produces.
pub fn apply_event(state: &mut StreamState, event: UpstreamEvent, out: &mut Vec<CanonicalChunk>) {
    match event {
        UpstreamEvent::StreamStart {
            id,
            model,
            input_tokens,
        } => {
            if let Some(id) = id.filter(|id| !id.is_empty()) {
                state.message_id = id;
            }
            if let Some(model) = model.filter(|m| !m.is_empty()) {
                state.model = model;
            }
            if let Some(input) = input_tokens {
                state.input_tokens = state.input_tokens.max(input);
            }
            state.started = true;
            if !state.role_emitted {
                state.emit(ChunkDelta::content(""), None, None, out);
            }
        }
        UpstreamEvent::BlockStart { index, kind } => {
            state.advance_block_index(index);
            match kind {
                BlockKind::ToolUse { id, name } => {
                    state.block_type = BlockType::ToolUse;
                    let tool_index = u32::try_from(state.tool_calls.len()).unwrap_or(u32::MAX);
                    state.tool_calls.push(ToolCallEntry {
                        id: id.clone(),
                        name: name.clone(),
                        arguments: String::new(),
                    });
                    let delta = ChunkDelta::tool_call(ToolCallDelta {
                        index: tool_index,
                        id: Some(id),
                        kind: Some("function".to_string()),
                        function: FunctionDelta {
                            name: Some(name),
                            arguments: Some(String::new()),
                        },
                    });
                    state.emit(delta, None, None, out);
                }
                BlockKind::Text => state.block_type = BlockType::Text,
                BlockKind::Thinking => state.block_type = BlockType::Thinking,
                BlockKind::Other => state.block_type = BlockType::None,
            }
        }
        UpstreamEvent::BlockDelta { index, delta } => {
            if let Some(index) = index {
                state.block_index = state.block_index.max(index);
            }
            match delta {
                DeltaKind::Text(text) => {
                    if !text.is_empty() {
                        state.emit(ChunkDelta::content(text), None, None, out);
                    }
                }
                DeltaKind::Thinking(text) => {
                    if !text.is_empty() {
                        state.emit(ChunkDelta::reasoning(text), None, None, out);
                    }
                }
                DeltaKind::ToolInput(fragment) => {
                    if fragment.is_empty() {
                        return;
                    }
                    let Some(last) = state.tool_calls.len().checked_sub(1) else {
                        tracing::warn!("tool input fragment arrived before any tool call; dropping");
                        return;
                    };
                    state.tool_calls[last].arguments.push_str(&fragment);
                    let delta = ChunkDelta::tool_call(ToolCallDelta {
                        index: u32::try_from(last).unwrap_or(u32::MAX),
                        id: None,
                        kind: None,
                        function: FunctionDelta {
                            name: None,
                            arguments: Some(fragment),
                        },
                    });
                    state.emit(delta, None, None, out);
                }
                DeltaKind::Signature | DeltaKind::Other => {}
            }
        }
        UpstreamEvent::BlockStop { .. } => {
            state.block_type = BlockType::None;
        }
        UpstreamEvent::MessageDelta {
            stop_reason,
            input_tokens,
            output_tokens,
        } => {
            if let Some(input) = input_tokens {
                state.input_tokens = state.input_tokens.max(input);
            }
            if let Some(output) = output_tokens {
                state.output_tokens = state.output_tokens.max(output);
            }
            if state.finished {
                return;
            }
            if let Some(reason) = stop_reason {
                state.emit_terminal(&reason, out);
            }
        }
        UpstreamEvent::MessageStop => {
            if !state.finished && state.chunks_emitted > 0 {
                let reason = if state.tool_calls.is_empty() {
                    "end_turn"
                } else {
                    "tool_use"
                };
                state.emit_terminal(reason, out);
            }
            state.closed = true;
        }
        UpstreamEvent::Ping => {}
        UpstreamEvent::Error { message } => {
            tracing::warn!(model = %state.model, "upstream stream reported an error: {message}");
        }
    }
}
