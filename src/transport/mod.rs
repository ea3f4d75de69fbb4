//! HTTP transport to one configured upstream.

pub mod credentials;

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

pub use credentials::{fresh_token, AccessToken, CredentialSource, StaticCredentials, StoredCredentials};

use crate::config::UpstreamConfig;
use crate::error::TranscodeError;
use crate::observability::log_request_complete;
use crate::protocol::canonical::{CanonicalChunk, CanonicalRequest};
use crate::protocol::request::{RequestContext, TransformedRequest, UpstreamEndpoint};
use crate::protocol::{decode_response, transform_request};
use crate::stream::canonical_sse_stream;

/// Upper bound on the error body kept in [`TranscodeError::Upstream`].
const MAX_ERROR_BODY_BYTES: usize = 4096;

/// What an upstream call produced.
pub enum UpstreamReply {
    /// Non-streaming result: exactly one chunk.
    Complete(Vec<CanonicalChunk>),
    /// Canonical SSE frames, ending in `data: [DONE]` on a clean finish.
    Stream(BoxStream<'static, Result<Bytes, TranscodeError>>),
}

fn build_reqwest_client(timeout: Duration, proxy_url: Option<&str>) -> Result<reqwest::Client, TranscodeError> {
    let mut builder = reqwest::Client::builder()
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout);

    if let Some(proxy_url) = proxy_url {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|err| TranscodeError::Config(format!("Invalid proxy URL: {err}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|err| TranscodeError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// Client bound to one upstream.
pub struct UpstreamClient {
    name: String,
    endpoint: UpstreamEndpoint,
    client: reqwest::Client,
    credentials: Option<Arc<dyn CredentialSource>>,
}

impl UpstreamClient {
    /// Build a client from an upstream's configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TranscodeError::Config`] for an unusable proxy and
    /// [`TranscodeError::Transport`] when the HTTP client cannot be built.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, TranscodeError> {
        let client = build_reqwest_client(
            Duration::from_secs(config.timeout_secs),
            config.proxy.as_deref(),
        )?;
        Ok(Self {
            name: config.name.clone(),
            endpoint: config.endpoint(),
            client,
            credentials: None,
        })
    }

    /// Use `source` for every request; its token overrides configured keys.
    #[must_use]
    pub fn with_credentials(mut self, source: Arc<dyn CredentialSource>) -> Self {
        self.credentials = Some(source);
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &UpstreamEndpoint {
        &self.endpoint
    }

    /// Build the upstream call without sending it.
    ///
    /// # Errors
    ///
    /// Propagates credential and request-transform failures.
    pub async fn prepare(&self, req: &CanonicalRequest) -> Result<TransformedRequest, TranscodeError> {
        let ctx = match &self.credentials {
            Some(source) => RequestContext::with_token(fresh_token(source.as_ref()).await?),
            None => RequestContext::default(),
        };
        transform_request(req, &self.endpoint, &ctx)
    }

    /// Send a canonical request and translate the reply.
    ///
    /// # Errors
    ///
    /// Returns [`TranscodeError::Auth`] or [`TranscodeError::SchemaConflict`] before
    /// any network call, [`TranscodeError::Transport`] when the call fails, and
    /// [`TranscodeError::Upstream`] for non-2xx statuses.
    pub async fn send(&self, req: &CanonicalRequest) -> Result<UpstreamReply, TranscodeError> {
        let started = Instant::now();
        let transformed = self.prepare(req).await?;
        let body = serde_json::to_vec(&transformed.body)?;
        tracing::debug!(
            upstream = %self.name,
            url = %transformed.config.url,
            stream = req.stream,
            "sending upstream request"
        );

        let response = self
            .client
            .post(&transformed.config.url)
            .headers(transformed.config.headers)
            .body(body)
            .send()
            .await
            .map_err(|e| TranscodeError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_body_message(response.text().await);
            tracing::warn!(
                upstream = %self.name,
                status = status.as_u16(),
                "upstream returned an error status"
            );
            return Err(TranscodeError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        if req.stream {
            let frames = canonical_sse_stream(
                self.endpoint.kind,
                req.model.clone(),
                response.bytes_stream(),
            );
            return Ok(UpstreamReply::Stream(frames.boxed()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TranscodeError::Transport(e.to_string()))?;
        let chunks = decode_response(self.endpoint.kind, &bytes, &req.model)?;
        log_request_complete(
            &req.model,
            chunks.first().and_then(|c| c.usage.as_ref()),
            started,
        );
        Ok(UpstreamReply::Complete(chunks))
    }
}

fn error_body_message<E: std::fmt::Display>(body: Result<String, E>) -> String {
    match body {
        Ok(text) => truncate_error_body(&text),
        Err(e) => {
            tracing::debug!(error = %e, "failed to read upstream error body");
            format!("<failed to read error body: {e}>")
        }
    }
}

fn truncate_error_body(text: &str) -> String {
    if text.len() <= MAX_ERROR_BODY_BYTES {
        return text.to_string();
    }
    let mut end = MAX_ERROR_BODY_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_error_body_on_char_boundary() {
        let text = "é".repeat(MAX_ERROR_BODY_BYTES);
        let out = truncate_error_body(&text);
        assert!(out.len() <= MAX_ERROR_BODY_BYTES);
        assert!(out.chars().all(|c| c == 'é'));
        assert_eq!(truncate_error_body("short"), "short");
    }

    #[test]
    fn test_error_body_read_failure_is_reported() {
        let failed: Result<String, std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        ));
        let message = error_body_message(failed);
        assert!(message.contains("failed to read error body"));
        assert!(message.contains("connection reset"));
        assert_eq!(error_body_message::<std::io::Error>(Ok("bad key".into())), "bad key");
    }
}
