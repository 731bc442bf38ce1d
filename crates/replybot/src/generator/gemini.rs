//! Gemini `generateContent` client.

use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use replybot_protocol::ChatHistory;

use super::error::{GeneratorError, GeneratorResult};
use super::prompt::build_prompt;
use super::ResponseGenerator;
use crate::config::GeneratorConfig;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// First candidate's text, trimmed. Multi-part candidates are joined.
    fn first_text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

/// [`ResponseGenerator`] backed by the Gemini REST API.
#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    client: Client,
    config: GeneratorConfig,
}

impl GeminiGenerator {
    pub fn new(config: GeneratorConfig) -> GeneratorResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    /// Run one completion for `prompt`.
    pub async fn complete(&self, prompt: &str) -> GeneratorResult<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(GeneratorError::MissingApiKey)?;

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        parsed.first_text().ok_or(GeneratorError::EmptyResponse)
    }
}

#[async_trait]
impl ResponseGenerator for GeminiGenerator {
    async fn generate(&self, history: &ChatHistory, incoming: &str) -> String {
        let prompt = build_prompt(history, incoming, self.config.context_messages);
        debug!("Generated prompt {}", prompt);

        match self.complete(&prompt).await {
            Ok(reply) => {
                info!("Gemini generated response: {}", reply);
                reply
            }
            Err(e) => {
                error!("Error generating Gemini response: {}", e);
                self.config.fallback_reply.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replybot_protocol::MessageRecord;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve one HTTP response and hand back the raw request.
    async fn one_shot_server(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text[..split]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if request.len() >= split + 4 + length {
                        break;
                    }
                }
            }
            let reply = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });
        (format!("http://{}", addr), handle)
    }

    fn generator(base_url: String, api_key: Option<&str>) -> GeminiGenerator {
        GeminiGenerator::new(GeneratorConfig {
            api_key: api_key.map(str::to_string),
            base_url,
            timeout_secs: 5,
            ..GeneratorConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_first_text() {
        let parsed: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"  hello "},{"text":"there\n"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.first_text().as_deref(), Some("hello there"));

        let empty: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(empty.first_text().is_none());

        let blocked: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert!(blocked.first_text().is_none());
    }

    #[tokio::test]
    async fn test_generate_success() {
        let (url, server) = one_shot_server(
            "200 OK",
            r#"{"candidates":[{"content":{"parts":[{"text":"hello!"}]}}]}"#,
        )
        .await;
        let g = generator(url, Some("k-123"));
        let history: ChatHistory = vec![MessageRecord::new("T1", "hi", 100)].into();

        assert_eq!(g.generate(&history, "hi").await, "hello!");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1beta/models/gemini-1.5-flash:generateContent"));
        assert!(request.to_ascii_lowercase().contains("x-goog-api-key: k-123"));
        assert!(request.contains("Them: hi\\nMe:"));
    }

    #[tokio::test]
    async fn test_generate_falls_back_on_api_error() {
        let (url, server) = one_shot_server("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let g = generator(url, Some("k"));
        assert_eq!(
            g.generate(&ChatHistory::new(), "hi").await,
            crate::generator::FALLBACK_REPLY
        );
        assert!(server.await.unwrap().contains("Them: hi"));

        let (url, server) = one_shot_server("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let g = generator(url, Some("k"));
        match g.complete("prompt").await.unwrap_err() {
            GeneratorError::Api { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, r#"{"error":"boom"}"#);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_generate_falls_back_without_key() {
        let g = generator("http://127.0.0.1:9".to_string(), None);
        assert!(matches!(
            g.complete("x").await,
            Err(GeneratorError::MissingApiKey)
        ));
        assert_eq!(
            g.generate(&ChatHistory::new(), "hi").await,
            crate::generator::FALLBACK_REPLY
        );
    }

    #[tokio::test]
    async fn test_generate_falls_back_on_empty_candidates() {
        let (url, _server) = one_shot_server("200 OK", r#"{"candidates":[]}"#).await;
        let g = generator(url, Some("k"));
        assert_eq!(
            g.generate(&ChatHistory::new(), "hi").await,
            crate::generator::FALLBACK_REPLY
        );
    }
}
