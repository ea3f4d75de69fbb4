use std::str::FromStr;

use bytes::Bytes;
use futures_util::StreamExt;
use relay_transcode::config::load_config;
use relay_transcode::error::TranscodeError;
use relay_transcode::observability::init_tracing;
use relay_transcode::protocol::canonical::{CanonicalRequest, ProviderKind};
use relay_transcode::stream::canonical_sse_stream;
use relay_transcode::transport::{UpstreamClient, UpstreamReply};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const USAGE: &str = "usage:
  relay-transcode send <config.yaml> <upstream-name>   < request.json
  relay-transcode replay <provider> [model]            < captured.sse";

/// Log level for `replay`, which has no config file.
const LOG_LEVEL_ENV: &str = "RELAY_TRANSCODE_LOG";
/// Any non-empty value switches logs to JSON lines.
const LOG_JSON_ENV: &str = "RELAY_TRANSCODE_LOG_JSON";

enum Command {
    Send { config_path: String, upstream: String },
    Replay { provider: ProviderKind, model: String },
}

impl Command {
    fn parse(args: &[String]) -> Result<Self, String> {
        match args {
            [cmd, config_path, upstream] if cmd == "send" => Ok(Command::Send {
                config_path: config_path.clone(),
                upstream: upstream.clone(),
            }),
            [cmd, provider, rest @ ..] if cmd == "replay" && rest.len() <= 1 => Ok(Command::Replay {
                provider: ProviderKind::from_str(provider)?,
                model: rest.first().cloned().unwrap_or_else(|| "unknown".to_string()),
            }),
            _ => Err("invalid arguments".to_string()),
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args).unwrap_or_else(|msg| {
        eprintln!("{msg}");
        eprintln!("{USAGE}");
        std::process::exit(2);
    });

    let runtime = build_runtime();
    let result = runtime.block_on(async move {
        match command {
            Command::Send {
                config_path,
                upstream,
            } => run_send(&config_path, &upstream).await,
            Command::Replay { provider, model } => run_replay(provider, model).await,
        }
    });

    if let Err(err) = result {
        eprintln!("{}", err.to_openai_payload());
        std::process::exit(1);
    }
}

fn build_runtime() -> tokio::runtime::Runtime {
    let mut runtime_builder = tokio::runtime::Builder::new_current_thread();
    runtime_builder.enable_io();
    runtime_builder.enable_time();
    runtime_builder.build().unwrap_or_else(|e| {
        eprintln!("Failed to initialize Tokio runtime: {e}");
        std::process::exit(1);
    })
}

fn log_json() -> bool {
    std::env::var(LOG_JSON_ENV).is_ok_and(|v| !v.is_empty())
}

async fn read_stdin() -> Result<Vec<u8>, TranscodeError> {
    let mut buf = Vec::with_capacity(8 * 1024);
    tokio::io::stdin()
        .read_to_end(&mut buf)
        .await
        .map_err(|e| TranscodeError::Internal(format!("failed to read stdin: {e}")))?;
    Ok(buf)
}

async fn write_frames(
    mut frames: impl futures_util::Stream<Item = Result<Bytes, TranscodeError>> + Unpin,
) -> Result<(), TranscodeError> {
    let mut stdout = tokio::io::stdout();
    while let Some(frame) = frames.next().await {
        let frame = frame?;
        stdout
            .write_all(&frame)
            .await
            .map_err(|e| TranscodeError::Internal(format!("failed to write stdout: {e}")))?;
        stdout
            .flush()
            .await
            .map_err(|e| TranscodeError::Internal(format!("failed to flush stdout: {e}")))?;
    }
    Ok(())
}

async fn run_send(config_path: &str, upstream_name: &str) -> Result<(), TranscodeError> {
    let config = load_config(config_path).map_err(|e| TranscodeError::Config(e.to_string()))?;
    init_tracing(&config.log_level, log_json());

    let upstream = config.upstream(upstream_name).ok_or_else(|| {
        TranscodeError::Config(format!("no upstream named '{upstream_name}'"))
    })?;
    let client = UpstreamClient::from_config(upstream)?;

    let input = read_stdin().await?;
    let request: CanonicalRequest = serde_json::from_slice(&input)
        .map_err(|e| TranscodeError::InvalidRequest(format!("invalid canonical request: {e}")))?;
    tracing::info!(
        upstream = %upstream_name,
        provider = %upstream.provider,
        model = %request.model,
        stream = request.stream,
        "relay-transcode send"
    );

    match client.send(&request).await? {
        UpstreamReply::Stream(frames) => write_frames(frames).await,
        UpstreamReply::Complete(chunks) => {
            let mut out = serde_json::to_vec_pretty(&chunks.first())?;
            out.push(b'\n');
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(&out)
                .await
                .map_err(|e| TranscodeError::Internal(format!("failed to write stdout: {e}")))?;
            stdout
                .flush()
                .await
                .map_err(|e| TranscodeError::Internal(format!("failed to flush stdout: {e}")))
        }
    }
}

async fn run_replay(provider: ProviderKind, model: String) -> Result<(), TranscodeError> {
    let level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "WARNING".to_string());
    init_tracing(&level, log_json());

    let input = read_stdin().await?;
    let upstream = futures_util::stream::iter([Ok::<Bytes, std::io::Error>(Bytes::from(input))]);
    let frames = canonical_sse_stream(provider, model, upstream);
    write_frames(Box::pin(frames)).await
}
