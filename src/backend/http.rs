use super::sse::{SseParser, StreamFrame};
use super::{BackendEvent, EventStream, ModelBackend};
use crate::logging::{debug_payload_enabled, emit_debug_payload};
use crate::types::{GenerateRequest, ImagePayload, ProviderConfig};
use crate::util::is_local_endpoint_url;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::VecDeque;

const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Streaming HTTP client over the tagged provider configs. Dropping the
/// returned event stream closes the connection, which is also how an
/// abort reaches this transport.
pub struct HttpBackend {
    http: reqwest::Client,
    provider: ProviderConfig,
}

impl HttpBackend {
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            provider,
        }
    }

    fn request_url(&self) -> String {
        match &self.provider {
            ProviderConfig::Anthropic { .. } => "https://api.anthropic.com/v1/messages".to_string(),
            ProviderConfig::OpenAi { .. } => {
                "https://api.openai.com/v1/chat/completions".to_string()
            }
            ProviderConfig::Local { base_url, .. } => adapt_chat_completions_url(base_url),
        }
    }

    fn build_payload(&self, request: &GenerateRequest) -> Value {
        let prompt = request.prompt_with_context();
        let max_tokens = request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);

        match &self.provider {
            ProviderConfig::Anthropic { model, .. } => {
                let content = anthropic_user_content(&prompt, request.image.as_ref());
                let mut payload = json!({
                    "model": model,
                    "max_tokens": max_tokens,
                    "stream": true,
                    "messages": [{ "role": "user", "content": content }],
                });
                if let Some(system) = &request.system_prompt {
                    payload["system"] = json!(system);
                }
                payload
            }
            ProviderConfig::OpenAi { model, .. } | ProviderConfig::Local { model, .. } => {
                let mut messages = Vec::new();
                if let Some(system) = &request.system_prompt {
                    messages.push(json!({ "role": "system", "content": system }));
                }
                messages.push(json!({
                    "role": "user",
                    "content": openai_user_content(&prompt, request.image.as_ref()),
                }));
                json!({
                    "model": model,
                    "max_tokens": max_tokens,
                    "stream": true,
                    "messages": messages,
                })
            }
        }
    }
}

#[async_trait]
impl ModelBackend for HttpBackend {
    async fn open_stream(&self, request: GenerateRequest) -> Result<EventStream> {
        let request_url = self.request_url();
        let payload = self.build_payload(&request);

        let mut http_request = self
            .http
            .post(&request_url)
            .header("content-type", "application/json")
            .json(&payload);

        if debug_payload_enabled() {
            emit_debug_payload(&request_url, &payload);
        }

        match &self.provider {
            ProviderConfig::Anthropic { api_key, version, .. } => {
                http_request = http_request
                    .header("x-api-key", api_key)
                    .header("anthropic-version", version);
            }
            ProviderConfig::OpenAi { api_key, .. } => {
                http_request = http_request.header("authorization", format!("Bearer {api_key}"));
            }
            ProviderConfig::Local { api_key, .. } => {
                if let Some(api_key) = api_key {
                    http_request =
                        http_request.header("authorization", format!("Bearer {api_key}"));
                }
            }
        }

        let response = http_request
            .send()
            .await
            .map_err(|error| map_transport_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_transport_error(error, &request_url))?;

        let url_for_stream = request_url.clone();
        let bytes = response
            .bytes_stream()
            .map(move |item| item.map_err(|error| map_transport_error(error, &url_for_stream)));

        Ok(event_stream_over(Box::pin(bytes)))
    }

    // Streaming HTTP has no server-side job to kill; cancellation reaches
    // the transport when the engine drops the event stream and the
    // connection closes with it.
    async fn abort(&self) {}
}

type ByteStream =
    std::pin::Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes>> + Send>>;

struct SseStreamState {
    inner: ByteStream,
    parser: SseParser,
    pending: VecDeque<BackendEvent>,
    finished: bool,
}

/// Adapt a transport byte stream into backend events. Token order is the
/// arrival order; the stream always ends with exactly one terminal event.
fn event_stream_over(inner: ByteStream) -> EventStream {
    let state = SseStreamState {
        inner,
        parser: SseParser::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.finished {
                return None;
            }

            match state.inner.next().await {
                Some(Ok(chunk)) => {
                    for frame in state.parser.process(&chunk) {
                        match frame {
                            StreamFrame::Token(text) => {
                                state.pending.push_back(BackendEvent::Token(text));
                            }
                            StreamFrame::Stop => {
                                state.finished = true;
                                state.pending.push_back(BackendEvent::Done {
                                    text: None,
                                    cancelled: false,
                                });
                                break;
                            }
                        }
                    }
                }
                Some(Err(error)) => {
                    state.finished = true;
                    state.pending.push_back(BackendEvent::Error(format!("{error:#}")));
                }
                None => {
                    state.finished = true;
                    state.pending.push_back(BackendEvent::Done {
                        text: None,
                        cancelled: false,
                    });
                }
            }
        }
    }))
}

fn map_transport_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return anyhow!(
            "cannot reach local endpoint '{}': {}. Start your local server or update COLLOQUY_API_URL.",
            request_url,
            error
        );
    }
    if error.is_connect() {
        return anyhow!("cannot reach endpoint '{}': {}", request_url, error);
    }
    if error.is_timeout() {
        return anyhow!("request to '{}' timed out: {}", request_url, error);
    }
    if let Some(status) = error.status() {
        return anyhow!("endpoint '{}' returned HTTP {}: {}", request_url, status, error);
    }
    anyhow!("request to '{}' failed: {}", request_url, error)
}

fn adapt_chat_completions_url(base_url: &str) -> String {
    let normalized = base_url.trim_end_matches('/');
    if normalized.ends_with("/chat/completions") {
        return normalized.to_string();
    }
    if normalized.ends_with("/v1") {
        return format!("{normalized}/chat/completions");
    }
    format!("{normalized}/v1/chat/completions")
}

fn anthropic_user_content(prompt: &str, image: Option<&ImagePayload>) -> Value {
    match image {
        Some(image) => json!([
            {
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": image.media_type,
                    "data": image.base64,
                }
            },
            { "type": "text", "text": prompt }
        ]),
        None => json!(prompt),
    }
}

fn openai_user_content(prompt: &str, image: Option<&ImagePayload>) -> Value {
    match image {
        Some(image) => json!([
            { "type": "text", "text": prompt },
            {
                "type": "image_url",
                "image_url": { "url": format!("data:{};base64,{}", image.media_type, image.base64) }
            }
        ]),
        None => json!(prompt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn test_local_url_adapter_variants() {
        assert_eq!(
            adapt_chat_completions_url("http://localhost:11434"),
            "http://localhost:11434/v1/chat/completions"
        );
        assert_eq!(
            adapt_chat_completions_url("http://localhost:1234/v1/"),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            adapt_chat_completions_url("http://localhost:1234/v1/chat/completions"),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[test]
    fn test_anthropic_payload_carries_system_and_cap() {
        let backend = HttpBackend::new(ProviderConfig::Anthropic {
            api_key: "k".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            version: "2023-06-01".to_string(),
        });
        let payload = backend.build_payload(&GenerateRequest {
            prompt: "hi".to_string(),
            system_prompt: Some("be brief".to_string()),
            max_tokens: Some(256),
            ..Default::default()
        });
        assert_eq!(payload["system"], json!("be brief"));
        assert_eq!(payload["max_tokens"], json!(256));
        assert_eq!(payload["stream"], json!(true));
    }

    #[test]
    fn test_openai_payload_inlines_image_as_data_url() {
        let backend = HttpBackend::new(ProviderConfig::Local {
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            model: "qwen2.5-coder".to_string(),
        });
        let payload = backend.build_payload(&GenerateRequest {
            prompt: "what is in this image?".to_string(),
            image: Some(ImagePayload {
                base64: "Zm9v".to_string(),
                media_type: "image/png".to_string(),
            }),
            ..Default::default()
        });
        let content = payload["messages"][0]["content"][1]["image_url"]["url"]
            .as_str()
            .unwrap();
        assert_eq!(content, "data:image/png;base64,Zm9v");
    }

    #[tokio::test]
    async fn test_event_stream_ends_with_single_terminal_event() {
        let chunks: Vec<Result<bytes::Bytes>> = vec![
            Ok(bytes::Bytes::from(
                "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"hey\"}}\n\n",
            )),
            Ok(bytes::Bytes::from(
                "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
            )),
        ];
        let mut events = event_stream_over(Box::pin(stream::iter(chunks)));

        assert_eq!(
            events.next().await,
            Some(BackendEvent::Token("hey".to_string()))
        );
        assert_eq!(
            events.next().await,
            Some(BackendEvent::Done {
                text: None,
                cancelled: false
            })
        );
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn test_transport_error_becomes_error_event() {
        let chunks: Vec<Result<bytes::Bytes>> = vec![Err(anyhow!("connection reset"))];
        let mut events = event_stream_over(Box::pin(stream::iter(chunks)));
        match events.next().await {
            Some(BackendEvent::Error(message)) => assert!(message.contains("connection reset")),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(events.next().await, None);
    }
}
