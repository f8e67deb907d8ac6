//! OpenAI-compatible chat completions client with SSE token streaming.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::LlmError;
use super::{ChatMessage, ChatOptions, LlmClient, TokenStream};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Largest incomplete SSE block kept while waiting for its separator.
const MAX_SSE_BUFFER_SIZE: usize = 1_000_000;

/// Client for any server speaking the OpenAI `/chat/completions` protocol.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    /// Whole-call deadline for blocking completions; header and idle
    /// deadline for streaming ones.
    request_timeout: Duration,
}

impl OpenAiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, LlmError> {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| LlmError::network_error(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
            model: model.into(),
            request_timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        stream: bool,
    ) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream,
        }
    }

    /// Send a request and return the response if the status is a success.
    async fn send(
        &self,
        request: &CompletionRequest,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, LlmError> {
        let mut builder = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                if e.is_timeout() {
                    return Err(LlmError::network_error(format!("Request timeout: {}", e)));
                } else if e.is_connect() {
                    return Err(LlmError::network_error(format!("Connection failed: {}", e)));
                } else {
                    return Err(LlmError::network_error(format!("Request failed: {}", e)));
                }
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), body));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<String, LlmError> {
        let request = self.build_request(messages, options, false);
        tracing::debug!("Sending completion request: model={}", self.model);

        let response = self.send(&request, Some(self.request_timeout)).await?;
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network_error(format!("Failed to read response: {}", e)))?;

        let parsed: CompletionResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::parse_error(format!("Failed to parse response: {}, body: {}", e, body))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::parse_error("No content in response".to_string()))
    }

    async fn complete_streaming(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<TokenStream, LlmError> {
        let request = self.build_request(messages, options, true);
        tracing::debug!("Sending streaming completion request: model={}", self.model);

        // The body stays open for as long as tokens flow, so only the
        // headers and each gap between chunks are bounded.
        let idle = self.request_timeout;
        let response = tokio::time::timeout(idle, self.send(&request, None))
            .await
            .map_err(|_| {
                LlmError::network_error(format!("Request timeout: no response within {:?}", idle))
            })??;
        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();

            loop {
                let chunk = match tokio::time::timeout(idle, bytes.next()).await {
                    Ok(Some(Ok(c))) => c,
                    Ok(Some(Err(e))) => {
                        yield Err(LlmError::network_error(format!("Stream interrupted: {}", e)));
                        return;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        yield Err(LlmError::network_error(format!(
                            "Stream stalled: no data for {:?}",
                            idle
                        )));
                        return;
                    }
                };
                if buffer.len() + chunk.len() > MAX_SSE_BUFFER_SIZE {
                    yield Err(LlmError::parse_error(
                        "SSE buffer exceeded maximum size".to_string(),
                    ));
                    return;
                }
                buffer.extend_from_slice(&chunk);

                while let Some((block, consumed)) = next_sse_block(&buffer) {
                    let frame = parse_sse_block(&block);
                    buffer.drain(..consumed);
                    match frame {
                        Ok(SseFrame::Token(token)) => yield Ok(token),
                        Ok(SseFrame::Done) => return,
                        Ok(SseFrame::Skip) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}

/// One decoded server-sent event from a streaming completion.
#[derive(Debug, PartialEq, Eq)]
enum SseFrame {
    Token(String),
    Done,
    Skip,
}

/// Split the next complete SSE block (terminated by a blank line) off the buffer.
///
/// Returns the block text and how many bytes it occupied including the separator.
fn next_sse_block(buffer: &[u8]) -> Option<(String, usize)> {
    let lf = find(buffer, b"\n\n").map(|pos| (pos, 2));
    let crlf = find(buffer, b"\r\n\r\n").map(|pos| (pos, 4));
    let (pos, sep) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    let block = String::from_utf8_lossy(&buffer[..pos]).into_owned();
    Some((block, pos + sep))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_sse_block(block: &str) -> Result<SseFrame, LlmError> {
    let data: Vec<&str> = block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .collect();
    if data.is_empty() {
        return Ok(SseFrame::Skip);
    }
    let payload = data.join("\n");
    if payload.trim() == "[DONE]" {
        return Ok(SseFrame::Done);
    }

    let chunk: StreamChunk = serde_json::from_str(&payload).map_err(|e| {
        LlmError::parse_error(format!("Failed to parse stream chunk: {}, data: {}", e, payload))
    })?;
    let token = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|t| !t.is_empty());
    Ok(token.map(SseFrame::Token).unwrap_or(SseFrame::Skip))
}

/// Chat completions request body.
#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const SSE_HEAD: &str = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\r\n";

    /// Answer one connection with `response`, then keep the socket open and silent.
    async fn silent_after(response: Vec<u8>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 64 * 1024];
            let _ = socket.read(&mut request).await;
            socket.write_all(&response).await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        format!("http://{}", addr)
    }

    fn client(base_url: &str) -> OpenAiClient {
        OpenAiClient::new(base_url, "key", "model", Duration::from_millis(200)).unwrap()
    }

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage::new(Role::User, "Summarize this.")]
    }

    #[test]
    fn test_parse_token_frame() {
        let block = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(
            parse_sse_block(block).unwrap(),
            SseFrame::Token("Hello".to_string())
        );
    }

    #[test]
    fn test_parse_done_and_empty_delta() {
        assert_eq!(parse_sse_block("data: [DONE]").unwrap(), SseFrame::Done);
        let role_only = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_block(role_only).unwrap(), SseFrame::Skip);
        assert_eq!(parse_sse_block(": keep-alive").unwrap(), SseFrame::Skip);
    }

    #[test]
    fn test_parse_garbage_is_parse_error() {
        let err = parse_sse_block("data: {not json").unwrap_err();
        assert!(!err.is_service_unavailable());
    }

    #[test]
    fn test_next_sse_block_waits_for_separator() {
        let partial = b"data: {\"choices\":[]}\n";
        assert!(next_sse_block(partial).is_none());

        let full = b"data: one\n\ndata: two\n\n";
        let (block, consumed) = next_sse_block(full).unwrap();
        assert_eq!(block, "data: one");
        assert_eq!(consumed, 11);

        let crlf = b"data: one\r\n\r\nrest";
        let (block, consumed) = next_sse_block(crlf).unwrap();
        assert_eq!(block, "data: one");
        assert_eq!(consumed, 13);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = client("http://localhost:8080/v1/");
        assert_eq!(client.completions_url(), "http://localhost:8080/v1/chat/completions");
        assert_eq!(client.model(), "model");
    }

    #[tokio::test]
    async fn test_stalled_stream_times_out() {
        let mut response = SSE_HEAD.as_bytes().to_vec();
        response.extend_from_slice(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n");
        let base_url = silent_after(response).await;

        let stream = client(&base_url)
            .complete_streaming(&messages(), &ChatOptions::default())
            .await;
        let Ok(mut tokens) = stream else {
            panic!("headers were sent, the stream should open");
        };
        assert_eq!(tokens.next().await.unwrap().unwrap(), "Hi");

        let err = tokio::time::timeout(Duration::from_secs(5), tokens.next())
            .await
            .expect("stalled stream never timed out")
            .unwrap()
            .unwrap_err();
        assert!(err.is_service_unavailable());
        assert!(err.message.contains("stalled"));
        assert!(tokens.next().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_headers_time_out() {
        let base_url = silent_after(Vec::new()).await;

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            client(&base_url).complete_streaming(&messages(), &ChatOptions::default()),
        )
        .await
        .expect("request without headers never timed out");
        let Err(err) = result else {
            panic!("no headers were sent, the call should fail");
        };
        assert!(err.is_service_unavailable());
        assert!(err.message.contains("Request timeout"));
    }

    #[tokio::test]
    async fn test_oversized_sse_block_is_rejected() {
        let mut response = SSE_HEAD.as_bytes().to_vec();
        response.extend_from_slice(b"data: ");
        response.extend(std::iter::repeat(b'x').take(MAX_SSE_BUFFER_SIZE + 16));
        let base_url = silent_after(response).await;

        let Ok(tokens) = client(&base_url)
            .complete_streaming(&messages(), &ChatOptions::default())
            .await
        else {
            panic!("headers were sent, the stream should open");
        };
        let items: Vec<_> = tokens.collect().await;
        assert_eq!(items.len(), 1);
        let err = items[0].as_ref().unwrap_err();
        assert!(!err.is_service_unavailable());
        assert!(err.message.contains("buffer"));
    }
}
