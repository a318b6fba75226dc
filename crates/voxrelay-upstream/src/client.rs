//! Cancellable streaming upstream client.
//!
//! A `reqwest` streaming POST whose body is read via `bytes_stream()` and
//! pushed through a line-buffering SSE decoder, forwarded to the caller over
//! an `mpsc` channel. `tokio::select!` races the byte stream against a
//! `CancellationToken` at every await point, so a turn's upstream fetch stops
//! the moment a newer turn aborts it instead of running to completion.

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use voxrelay_core::{config::UpstreamConfig, VoxRelayError};

use crate::sse::{SseDecoder, SseEvent};

/// Appended to the last user message's content before forwarding upstream.
/// Steers the LLM toward short, filler-free replies suited to a spoken
/// response rather than a written one.
pub const VOICE_HINT: &str =
    "\n\n(Respond in 3-4 sentences at most. Do not start with filler like \"Sure,\" or \"Okay,\" — begin directly with the answer.)";

/// One decoded event from the upstream stream, already separated into its
/// raw wire payload (forwarded verbatim) and, when present, the extracted
/// content delta text (accumulated for caching/smart-hold timing).
#[derive(Debug, Clone)]
pub struct UpstreamChunk {
    pub raw_payload: String,
    pub content: Option<String>,
}

pub struct UpstreamClient {
    http: reqwest::Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Transform an incoming chat-completions request body for the upstream
    /// gateway: strip the vendor extension field, rewrite `model`, force
    /// `stream: true`, and append the voice hint to the last user message's
    /// content.
    pub fn prepare_body(&self, mut body: Value) -> Value {
        if let Some(obj) = body.as_object_mut() {
            obj.remove("elevenlabs_extra_body");
            obj.insert("model".to_string(), json!(self.config.rewritten_model()));
            obj.insert("stream".to_string(), json!(true));

            if let Some(messages) = obj.get_mut("messages").and_then(Value::as_array_mut) {
                if let Some(last_user) = messages
                    .iter_mut()
                    .rev()
                    .find(|m| m.get("role").and_then(Value::as_str) == Some("user"))
                {
                    if let Some(content) = last_user.get_mut("content").and_then(Value::as_str) {
                        let hinted = format!("{content}{VOICE_HINT}");
                        last_user["content"] = json!(hinted);
                    }
                }
            }
        }
        body
    }

    /// Issue the streaming POST and return a channel of decoded chunks. The
    /// background task honors `cancel`: once cancelled, it stops reading the
    /// upstream body and the receiver simply closes (no further items, no
    /// error). Callers distinguish this from a true upstream failure by
    /// checking `cancel.is_cancelled()` themselves, not by inspecting the
    /// channel.
    pub fn stream(
        &self,
        body: Value,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<Result<UpstreamChunk, VoxRelayError>> {
        let (tx, rx) = mpsc::channel(32);
        let http = self.http.clone();
        let url = self.config.url.clone();
        let token = self.config.token.clone();
        let agent = self.config.agent.clone();

        tokio::spawn(async move {
            let send_fut = async {
                let mut req = http.post(&url).json(&body);
                if let Some(token) = &token {
                    req = req.bearer_auth(token);
                }
                req = req.header("x-voxrelay-agent-id", &agent);
                req.send().await
            };

            let resp = tokio::select! {
                _ = cancel.cancelled() => return,
                result = send_fut => result,
            };

            let resp = match resp {
                Ok(resp) => resp,
                Err(e) => {
                    let _ = tx.send(Err(VoxRelayError::UpstreamTransport(e.to_string()))).await;
                    return;
                }
            };

            let status = resp.status();
            if !status.is_success() {
                let message = resp.text().await.unwrap_or_default();
                warn!(status = status.as_u16(), body = %message, "upstream returned a non-2xx response");
                let _ = tx
                    .send(Err(VoxRelayError::UpstreamHttp {
                        status: status.as_u16(),
                        message,
                    }))
                    .await;
                return;
            }

            let mut decoder = SseDecoder::new();
            let mut bytes = resp.bytes_stream();

            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("upstream stream cancelled");
                        return;
                    }
                    next = bytes.next() => next,
                };

                let Some(chunk) = next else { break };
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(Err(VoxRelayError::UpstreamTransport(e.to_string()))).await;
                        return;
                    }
                };

                for event in decoder.feed(&chunk) {
                    if emit(&tx, event).await.is_break() {
                        return;
                    }
                }
            }

            if let Some(event) = decoder.finish() {
                let _ = emit(&tx, event).await;
            }
        });

        rx
    }
}

async fn emit(
    tx: &mpsc::Sender<Result<UpstreamChunk, VoxRelayError>>,
    event: SseEvent,
) -> std::ops::ControlFlow<()> {
    match event {
        SseEvent::Done => std::ops::ControlFlow::Break(()),
        SseEvent::Data(raw) => {
            let content = serde_json::from_str::<Value>(&raw)
                .ok()
                .and_then(|v| {
                    v.get("choices")?
                        .get(0)?
                        .get("delta")?
                        .get("content")?
                        .as_str()
                        .map(str::to_string)
                })
                .filter(|s| !s.is_empty());
            let item = UpstreamChunk { raw_payload: raw, content };
            if tx.send(Ok(item)).await.is_err() {
                std::ops::ControlFlow::Break(())
            } else {
                std::ops::ControlFlow::Continue(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn base_config(url: String) -> UpstreamConfig {
        UpstreamConfig {
            url,
            token: Some("secret".to_string()),
            agent: "main".to_string(),
            model_prefix: Some("voxrelay".to_string()),
        }
    }

    #[test]
    fn prepare_body_strips_rewrites_and_hints() {
        let client = UpstreamClient::new(base_config("http://unused".to_string()));
        let body = json!({
            "user": "u1",
            "model": "gpt-4",
            "elevenlabs_extra_body": { "foo": "bar" },
            "messages": [
                { "role": "system", "content": "be terse" },
                { "role": "user", "content": "what time is it" },
            ],
        });

        let prepared = client.prepare_body(body);
        assert!(prepared.get("elevenlabs_extra_body").is_none());
        assert_eq!(prepared["model"], json!("voxrelay:main"));
        assert_eq!(prepared["stream"], json!(true));
        let last_content = prepared["messages"][1]["content"].as_str().unwrap();
        assert!(last_content.starts_with("what time is it"));
        assert!(last_content.contains("3-4 sentences"));
    }

    #[tokio::test]
    async fn stream_forwards_content_deltas_and_stops_at_done() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Ten\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" past three.\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let config = base_config(format!("{}/v1/chat/completions", server.uri()));
        let client = UpstreamClient::new(config);
        let mut rx = client.stream(json!({"messages": []}), CancellationToken::new());

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.content.as_deref(), Some("Ten"));
        let second = rx.recv().await.unwrap().unwrap();
        assert_eq!(second.content.as_deref(), Some(" past three."));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn stream_surfaces_non_2xx_as_upstream_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let config = base_config(format!("{}/v1/chat/completions", server.uri()));
        let client = UpstreamClient::new(config);
        let mut rx = client.stream(json!({"messages": []}), CancellationToken::new());

        let err = rx.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, VoxRelayError::UpstreamHttp { status: 500, .. }));
    }

    #[tokio::test]
    async fn cancelling_before_send_yields_no_items() {
        let server = MockServer::start().await;
        let config = base_config(format!("{}/v1/chat/completions", server.uri()));
        let client = UpstreamClient::new(config);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut rx = client.stream(json!({"messages": []}), cancel);
        assert!(rx.recv().await.is_none());
    }
}
