use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use futures_util::StreamExt;
use std::time::Duration;

use super::{
    ChatCompletionRequest, ChatCompletionResponse, CompletionError, CompletionTransport,
    ErrorEnvelope,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible chat completions over HTTPS.
#[derive(Clone)]
pub struct OpenAiTransport {
    http: reqwest::Client,
    base_url: String,
}

impl OpenAiTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CompletionError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CompletionError::Unexpected(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post_chat(
        &self,
        api_key: &str,
        request: &ChatCompletionRequest,
    ) -> Result<reqwest::Response, CompletionError> {
        let response = self
            .http
            .post(self.url("chat/completions"))
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response)
    }
}

async fn error_from_response(response: reqwest::Response) -> CompletionError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => CompletionError::Api {
            status: status.as_u16(),
            code: envelope.error.code_string(),
            message: envelope.error.message,
        },
        Err(_) => {
            let message = if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                body.chars().take(500).collect()
            };
            CompletionError::Api {
                status: status.as_u16(),
                code: None,
                message,
            }
        }
    }
}

#[async_trait]
impl CompletionTransport for OpenAiTransport {
    async fn chat_completion(
        &self,
        api_key: &str,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, CompletionError> {
        let response = self.post_chat(api_key, request).await?;
        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;
        serde_json::from_str(&body)
            .map_err(|e| CompletionError::Unexpected(format!("invalid completion body: {e}")))
    }

    async fn stream_chat_completion(
        &self,
        api_key: &str,
        request: &ChatCompletionRequest,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> Result<(), CompletionError> {
        let request = request.clone().streaming();
        let response = self.post_chat(api_key, &request).await?;

        let mut stream = response.bytes_stream();
        let mut lines = SseLineBuffer::default();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| CompletionError::Network(e.to_string()))?;
            for line in lines.push(&chunk) {
                match parse_stream_line(&line) {
                    StreamLine::Content(text) => on_chunk(&text),
                    StreamLine::Done => return Ok(()),
                    StreamLine::Skip => {}
                }
            }
        }

        // Provider closed without a [DONE] marker.
        if let Some(line) = lines.finish() {
            if let StreamLine::Content(text) = parse_stream_line(&line) {
                on_chunk(&text);
            }
        }
        Ok(())
    }

    async fn list_models(&self, api_key: &str) -> Result<(), CompletionError> {
        let response = self
            .http
            .get(self.url("models"))
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }
}

/// Splits a byte stream into complete lines. Partial lines (including
/// split UTF-8 sequences) wait for the next chunk.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: BytesMut,
}

impl SseLineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line = self.pending.split_to(pos);
            self.pending.advance(1);
            lines.push(
                String::from_utf8_lossy(&line)
                    .trim_end_matches('\r')
                    .to_string(),
            );
        }
        lines
    }

    /// Whatever is left once the stream ends.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = self.pending.split();
        Some(String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLine {
    Content(String),
    Done,
    Skip,
}

/// Interpret one server-sent-event line. Malformed chunks are logged and
/// skipped; they never abort the stream.
pub fn parse_stream_line(line: &str) -> StreamLine {
    let Some(data) = line.strip_prefix("data:") else {
        return StreamLine::Skip;
    };
    let data = data.trim();
    if data.is_empty() {
        return StreamLine::Skip;
    }
    if data == "[DONE]" {
        return StreamLine::Done;
    }

    match serde_json::from_str::<serde_json::Value>(data) {
        Ok(value) => match value["choices"][0]["delta"]["content"].as_str() {
            Some(text) if !text.is_empty() => StreamLine::Content(text.to_string()),
            _ => StreamLine::Skip,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Skipping malformed stream chunk");
            StreamLine::Skip
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stream_line_extracts_delta_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_stream_line(line), StreamLine::Content("Hel".to_string()));
    }

    #[test]
    fn test_parse_stream_line_handles_done_and_noise() {
        assert_eq!(parse_stream_line("data: [DONE]"), StreamLine::Done);
        assert_eq!(parse_stream_line(""), StreamLine::Skip);
        assert_eq!(parse_stream_line(": keep-alive"), StreamLine::Skip);
        assert_eq!(
            parse_stream_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            StreamLine::Skip
        );
    }

    #[test]
    fn test_parse_stream_line_skips_malformed_json() {
        assert_eq!(parse_stream_line("data: {broken"), StreamLine::Skip);
    }

    #[test]
    fn test_line_buffer_joins_lines_split_across_chunks() {
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(b"data: {\"a\"").is_empty());
        let lines = buffer.push(b":1}\r\ndata: [DONE]\n");
        assert_eq!(lines, vec!["data: {\"a\":1}".to_string(), "data: [DONE]".to_string()]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_line_buffer_keeps_split_utf8_intact() {
        let mut buffer = SseLineBuffer::default();
        let text = "é\n".as_bytes();
        assert!(buffer.push(&text[..1]).is_empty());
        assert_eq!(buffer.push(&text[1..]), vec!["é".to_string()]);
    }

    #[test]
    fn test_line_buffer_finish_returns_trailing_line() {
        let mut buffer = SseLineBuffer::default();
        buffer.push(b"data: tail");
        assert_eq!(buffer.finish().as_deref(), Some("data: tail"));
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let transport =
            OpenAiTransport::new("http://localhost:9999/v1/", Duration::from_secs(1)).unwrap();
        assert_eq!(transport.url("models"), "http://localhost:9999/v1/models");
    }
}
