use std::time::Instant;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::protocol::canonical::CanonicalUsage;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (TRACE, DEBUG, INFO, ERROR)
///
/// `json` switches to one JSON object per line. Logs go to stderr so that
/// stdout stays a clean SSE stream.
pub fn init_tracing(log_level: &str, json: bool) {
    let level = log_level.to_uppercase();

    if level == "DISABLED" {
        return;
    }

    let tracing_level = match level.as_str() {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(tracing_level))
        .unwrap_or_else(|_| EnvFilter::new("INFO"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);
    // a second init (tests, embedding) keeps the first subscriber
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

/// Log the summary of a closed stream.
pub fn log_stream_complete(model: &str, usage: &CanonicalUsage, tool_calls: usize, start_time: Instant) {
    let elapsed = start_time.elapsed();
    info!(
        model = %model,
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        tool_calls,
        duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        "stream complete"
    );
}

/// Log the summary of a non-streaming call.
pub fn log_request_complete(model: &str, usage: Option<&CanonicalUsage>, start_time: Instant) {
    let usage = usage.copied().unwrap_or_default();
    info!(
        model = %model,
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        duration_ms = u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX),
        "request complete"
    );
}
