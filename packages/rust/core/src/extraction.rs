//! Structured-extraction capability backed by an OpenAI-compatible chat
//! completion endpoint in JSON mode.

use async_trait::async_trait;
use careerscout_crawler::{ExtractedFields, StructuredExtractor};
use careerscout_shared::{CareerScoutError, ExtractionConfig, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

/// Characters of page text sent to the model.
const MAX_PAGE_CHARS: usize = 12_000;

const SYSTEM_PROMPT: &str = "You read the visible text of a single job posting page. \
Reply with a JSON object with the keys \"title\", \"location\" and \"employment_type\". \
Use null for any value the page does not state. Do not guess.";

pub struct OpenAiExtractor {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiExtractor {
    pub fn new(config: &ExtractionConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: careerscout_sources::build_client(config.timeout_secs)?,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl StructuredExtractor for OpenAiExtractor {
    async fn extract(&self, page_text: &str) -> Result<ExtractedFields> {
        let page: String = page_text.chars().take(MAX_PAGE_CHARS).collect();
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": page},
            ],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "extraction request failed");
                CareerScoutError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CareerScoutError::Network(format!(
                "extraction request failed ({status}): {error_text}"
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| CareerScoutError::parse(format!("invalid chat response: {e}")))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CareerScoutError::ExtractionAmbiguous("empty model reply".into()))?;

        let fields: ExtractedFields = serde_json::from_str(&content).map_err(|e| {
            CareerScoutError::ExtractionAmbiguous(format!("model reply is not the expected JSON: {e}"))
        })?;
        debug!(title = ?fields.title, "page fields extracted");
        Ok(fields)
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn extractor(server: &MockServer) -> OpenAiExtractor {
        let config = ExtractionConfig {
            enabled: true,
            base_url: server.uri(),
            timeout_secs: 5,
            ..ExtractionConfig::default()
        };
        OpenAiExtractor::new(&config, "sk-test".into()).unwrap()
    }

    fn reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    #[tokio::test]
    async fn parses_json_mode_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"response_format": {"type": "json_object"}})))
            .respond_with(reply(
                r#"{"title": "Backend Engineer", "location": null, "employment_type": "Full-time"}"#,
            ))
            .mount(&server)
            .await;

        let fields = extractor(&server).extract("Backend Engineer ...").await.unwrap();
        assert_eq!(fields.title.as_deref(), Some("Backend Engineer"));
        assert!(fields.location.is_none());
        assert_eq!(fields.employment_type.as_deref(), Some("Full-time"));
    }

    #[tokio::test]
    async fn prose_reply_is_ambiguous() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(reply("I think this is an engineering job."))
            .mount(&server)
            .await;

        let err = extractor(&server).extract("text").await.unwrap_err();
        assert!(matches!(err, CareerScoutError::ExtractionAmbiguous(_)));
    }

    #[tokio::test]
    async fn http_error_is_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = extractor(&server).extract("text").await.unwrap_err();
        assert!(matches!(err, CareerScoutError::Network(_)));
    }
}
