use bytes::Bytes;
use futures_util::StreamExt;
use relay_transcode::protocol::canonical::{CanonicalChunk, ProviderKind};
use relay_transcode::stream::{canonical_chunk_stream, canonical_sse_stream, StreamTranscoder, DONE_FRAME};

const ANTHROPIC_TEXT: &str = concat!(
    "event: message_start\n",
    "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_01\",\"type\":\"message\",\"role\":\"assistant\",\"model\":\"m1\",\"content\":[],\"usage\":{\"input_tokens\":12,\"output_tokens\":1}}}\n\n",
    "event: content_block_start\n",
    "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
    "event: ping\n",
    "data: {\"type\":\"ping\"}\n\n",
    "event: content_block_delta\n",
    "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n",
    "event: content_block_delta\n",
    "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\" there\"}}\n\n",
    "event: content_block_stop\n",
    "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
    "event: message_delta\n",
    "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\",\"stop_sequence\":null},\"usage\":{\"output_tokens\":2}}\n\n",
    "event: message_stop\n",
    "data: {\"type\":\"message_stop\"}\n\n",
);

const ANTHROPIC_TOOL: &str = concat!(
    "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_02\",\"model\":\"m1\",\"usage\":{\"input_tokens\":30}}}\n\n",
    "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"t1\",\"name\":\"get_weather\",\"input\":{}}}\n\n",
    "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"city\\\":\"}}\n\n",
    "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"Seoul\\\"}\"}}\n\n",
    "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
    "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"},\"usage\":{\"output_tokens\":9}}\n\n",
    "data: {\"type\":\"message_stop\"}\n\n",
);

fn transcode(kind: ProviderKind, body: &str) -> (StreamTranscoder, Vec<CanonicalChunk>) {
    let mut transcoder = StreamTranscoder::new(kind, "requested-model");
    let mut chunks = Vec::new();
    transcoder.push_body(body, &mut chunks);
    (transcoder, chunks)
}

fn split_every(body: &'static str, size: usize) -> Vec<Result<Bytes, std::io::Error>> {
    body.as_bytes()
        .chunks(size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect()
}

#[test]
fn test_anthropic_text_scenario() {
    let (transcoder, chunks) = transcode(ProviderKind::Anthropic, ANTHROPIC_TEXT);
    assert_eq!(chunks.len(), 4);

    assert_eq!(chunks[0].delta.role.as_deref(), Some("assistant"));
    assert_eq!(chunks[0].delta.content.as_deref(), Some(""));
    assert_eq!(chunks[1].delta.content.as_deref(), Some("Hi"));
    assert_eq!(chunks[2].delta.content.as_deref(), Some(" there"));

    let terminal = &chunks[3];
    assert_eq!(terminal.finish_reason.as_deref(), Some("stop"));
    let usage = terminal.usage.expect("terminal usage");
    assert_eq!(usage.completion_tokens, 2);
    assert_eq!(usage.prompt_tokens, 12);

    for chunk in &chunks {
        assert_eq!(chunk.id, "msg_01");
        assert_eq!(chunk.model, "m1");
    }
    for chunk in &chunks[..3] {
        assert!(chunk.usage.is_none());
        assert!(chunk.finish_reason.is_none());
    }
    assert!(transcoder.is_closed());
}

#[test]
fn test_anthropic_tool_call_scenario() {
    let (transcoder, chunks) = transcode(ProviderKind::Anthropic, ANTHROPIC_TOOL);
    let state = transcoder.state();
    assert_eq!(state.tool_calls.len(), 1);
    assert_eq!(state.tool_calls[0].id, "t1");
    assert_eq!(state.tool_calls[0].arguments, "{\"city\":\"Seoul\"}");
    let parsed: serde_json::Value =
        serde_json::from_str(&state.tool_calls[0].arguments).expect("arguments are JSON");
    assert_eq!(parsed["city"], "Seoul");

    let announce = chunks[1].delta.tool_calls.as_ref().expect("announce");
    assert_eq!(announce[0].index, 0);
    assert_eq!(announce[0].id.as_deref(), Some("t1"));
    assert_eq!(announce[0].kind.as_deref(), Some("function"));
    assert_eq!(announce[0].function.name.as_deref(), Some("get_weather"));
    assert_eq!(announce[0].function.arguments.as_deref(), Some(""));

    let fragments: String = chunks[2..4]
        .iter()
        .filter_map(|c| c.delta.tool_calls.as_ref())
        .filter_map(|calls| calls[0].function.arguments.clone())
        .collect();
    assert_eq!(fragments, "{\"city\":\"Seoul\"}");
    assert_eq!(chunks.last().unwrap().finish_reason.as_deref(), Some("tool_calls"));
}

#[test]
fn test_usage_is_monotonic_and_only_on_terminal_chunk() {
    let body = concat!(
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"m\",\"usage\":{\"input_tokens\":10,\"output_tokens\":1}}}\n\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"x\"}}\n\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"max_tokens\"},\"usage\":{\"output_tokens\":5}}\n\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"input_tokens\":3,\"output_tokens\":2}}\n\n",
    );
    let (transcoder, chunks) = transcode(ProviderKind::Anthropic, body);
    let with_usage: Vec<_> = chunks.iter().filter(|c| c.usage.is_some()).collect();
    assert_eq!(with_usage.len(), 1);
    assert_eq!(with_usage[0].finish_reason.as_deref(), Some("length"));
    assert_eq!(transcoder.state().input_tokens, 10);
    assert_eq!(transcoder.state().output_tokens, 5);
}

#[test]
fn test_cloudcode_usage_never_decreases() {
    let lines = [
        "data: {\"response\":{\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"a\"}]}}],\"usageMetadata\":{\"promptTokenCount\":4,\"candidatesTokenCount\":1}}}",
        "data: {\"response\":{\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"b\"}]}}],\"usageMetadata\":{\"promptTokenCount\":4,\"candidatesTokenCount\":2}}}",
        "data: {\"response\":{\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"c\"}]}}],\"usageMetadata\":{\"promptTokenCount\":4,\"candidatesTokenCount\":3,\"thoughtsTokenCount\":2}}}",
        "data: {\"response\":{\"candidates\":[{\"content\":{\"parts\":[]},\"finishReason\":\"STOP\"}],\"usageMetadata\":{\"promptTokenCount\":4,\"candidatesTokenCount\":3}}}",
    ];
    let mut transcoder = StreamTranscoder::new(ProviderKind::CloudCode, "gemini-2.5-pro");
    let mut chunks = Vec::new();
    let mut totals = Vec::new();
    for line in lines {
        transcoder.push_line(line, &mut chunks);
        totals.push(transcoder.state().usage().total_tokens);
    }
    assert_eq!(totals, vec![5, 6, 9, 9]);
    assert!(totals.windows(2).all(|w| w[0] <= w[1]));

    let reported: Vec<u64> = chunks
        .iter()
        .filter_map(|c| c.usage.map(|u| u.total_tokens))
        .collect();
    assert!(reported.windows(2).all(|w| w[0] <= w[1]));
    let last = chunks.last().unwrap();
    assert_eq!(last.finish_reason.as_deref(), Some("stop"));
    let usage = last.usage.expect("terminal usage");
    assert_eq!(usage.total_tokens, *totals.iter().max().unwrap());
    assert_eq!((usage.prompt_tokens, usage.completion_tokens), (4, 5));
}

#[test]
fn test_finish_reason_is_deterministic() {
    let first = transcode(ProviderKind::Anthropic, ANTHROPIC_TOOL).1;
    let second = transcode(ProviderKind::Anthropic, ANTHROPIC_TOOL).1;
    assert_eq!(
        first.last().unwrap().finish_reason,
        second.last().unwrap().finish_reason
    );
}

#[tokio::test]
async fn test_byte_splits_do_not_change_output() {
    let (_, whole) = transcode(ProviderKind::Anthropic, ANTHROPIC_TEXT);
    for size in [1, 3, 7, 64] {
        let chunks: Vec<_> = canonical_chunk_stream(
            ProviderKind::Anthropic,
            "requested-model",
            futures_util::stream::iter(split_every(ANTHROPIC_TEXT, size)),
        )
        .collect()
        .await;
        let chunks: Vec<CanonicalChunk> = chunks.into_iter().map(|c| c.expect("chunk")).collect();
        assert_eq!(chunks.len(), whole.len(), "split size {size}");
        for (a, b) in chunks.iter().zip(&whole) {
            assert_eq!(a.delta, b.delta);
            assert_eq!(a.finish_reason, b.finish_reason);
        }
    }
}

#[tokio::test]
async fn test_sse_output_ends_with_done() {
    let frames: Vec<_> = canonical_sse_stream(
        ProviderKind::Anthropic,
        "requested-model",
        futures_util::stream::iter(split_every(ANTHROPIC_TEXT, 17)),
    )
    .collect()
    .await;
    let frames: Vec<String> = frames
        .into_iter()
        .map(|f| String::from_utf8(f.expect("frame").to_vec()).expect("utf8"))
        .collect();
    assert_eq!(frames.len(), 5);
    assert_eq!(frames.last().map(String::as_str), Some(DONE_FRAME));

    let first: serde_json::Value =
        serde_json::from_str(frames[0].strip_prefix("data: ").unwrap().trim()).unwrap();
    assert_eq!(first["object"], "chat.completion.chunk");
    assert_eq!(first["choices"][0]["index"], 0);
    assert_eq!(first["choices"][0]["delta"]["role"], "assistant");
    assert!(first.get("usage").is_none());
}

#[test]
fn test_cloudcode_stream_end_to_end() {
    let body = concat!(
        "data: {\"response\":{\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Let me check\",\"thought\":true}]}}],\"responseId\":\"cc-1\",\"modelVersion\":\"gemini-2.5-pro\"}}\n\n",
        "data: {\"response\":{\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"functionCall\":{\"name\":\"get_weather\",\"args\":{\"city\":\"Seoul\"}}}]},\"finishReason\":\"STOP\"}],\"usageMetadata\":{\"promptTokenCount\":20,\"candidatesTokenCount\":7}}}\n\n",
    );
    let (transcoder, chunks) = transcode(ProviderKind::CloudCode, body);
    assert_eq!(chunks[0].id, "cc-1");
    assert_eq!(chunks[1].delta.reasoning_content.as_deref(), Some("Let me check"));
    assert_eq!(transcoder.state().tool_calls[0].arguments, "{\"city\":\"Seoul\"}");
    let last = chunks.last().unwrap();
    assert_eq!(last.finish_reason.as_deref(), Some("tool_calls"));
    assert_eq!(last.usage.unwrap().total_tokens, 27);
    assert!(transcoder.is_closed());
}

#[test]
fn test_responses_stream_end_to_end() {
    let body = concat!(
        "event: response.created\n",
        "data: {\"type\":\"response.created\",\"response\":{\"id\":\"resp_1\",\"model\":\"gpt-5-codex\",\"status\":\"in_progress\"}}\n\n",
        "event: response.output_item.added\n",
        "data: {\"type\":\"response.output_item.added\",\"output_index\":0,\"item\":{\"type\":\"message\",\"role\":\"assistant\",\"content\":[]}}\n\n",
        "event: response.output_text.delta\n",
        "data: {\"type\":\"response.output_text.delta\",\"output_index\":0,\"content_index\":0,\"delta\":\"done\"}\n\n",
        "event: response.completed\n",
        "data: {\"type\":\"response.completed\",\"response\":{\"id\":\"resp_1\",\"status\":\"completed\",\"usage\":{\"input_tokens\":4,\"output_tokens\":1}}}\n\n",
    );
    let (transcoder, chunks) = transcode(ProviderKind::Responses, body);
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[1].delta.content.as_deref(), Some("done"));
    assert_eq!(chunks[2].finish_reason.as_deref(), Some("stop"));
    assert!(transcoder.is_closed());
}

#[test]
fn test_malformed_line_is_skipped() {
    let body = concat!(
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"m\"}}\n\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\n\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"ok\"}}\n\n",
    );
    let (_, chunks) = transcode(ProviderKind::Anthropic, body);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[1].delta.content.as_deref(), Some("ok"));
}
