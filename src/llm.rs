use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ModelConfig;
use crate::explain::ExplanationModel;
use crate::vision::{ImagePayload, VisionExtractor};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Chat-completions client used for both screenshot extraction and
/// explanations.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    config: ModelConfig,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(config: ModelConfig, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            api_key: api_key.into(),
        }
    }

    pub fn from_env(config: ModelConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} not found in environment", config.api_key_env))?;
        Ok(Self::new(config, api_key))
    }

    async fn complete(&self, content: Vec<ContentPart>) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![Message {
                role: "user",
                content,
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("model request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("model API error ({status}): {body}");
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("failed to decode model response")?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("model returned no content"))?;
        debug!(chars = text.len(), "model responded");
        Ok(text)
    }
}

pub fn data_url(image: &ImagePayload) -> String {
    format!(
        "data:{};base64,{}",
        image.media_type,
        general_purpose::STANDARD.encode(&image.bytes)
    )
}

#[async_trait]
impl VisionExtractor for OpenAiClient {
    async fn extract(&self, image: &ImagePayload, prompt: &str) -> Result<String> {
        self.complete(vec![
            ContentPart::Text {
                text: prompt.to_string(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: data_url(image),
                },
            },
        ])
        .await
    }
}

#[async_trait]
impl ExplanationModel for OpenAiClient {
    async fn explain(&self, prompt: &str) -> Result<String> {
        self.complete(vec![ContentPart::Text {
            text: prompt.to_string(),
        }])
        .await
    }
}
