use crate::{
    config::ImageProviderConfig,
    domain::{GeneratedImage, ImageGenerator},
    errors::GatewayError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing;

#[derive(Debug, Serialize)]
struct ImageGenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    message: String,
}

/// Calls the OpenAI images endpoint. One attempt per request, no retries.
#[derive(Debug, Clone)]
pub struct OpenAiImageGenerator {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
}

impl OpenAiImageGenerator {
    pub fn new(config: &ImageProviderConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Unreachable(format!("failed to build HTTP client: {}", e)))?;

        if config.api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY not set, image generation will be unavailable");
        }

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            endpoint: format!("{}/v1/images/generations", config.api_base),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GatewayError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GatewayError::EmptyPrompt);
        }
        let api_key = self.api_key.as_deref().ok_or(GatewayError::NotConfigured)?;

        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "Requesting image generation");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&ImageGenerationRequest {
                model: &self.model,
                prompt,
                n: 1,
                size: "1024x1024",
                response_format: "b64_json",
            })
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ProviderErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            tracing::warn!(status = status.as_u16(), %message, "Image provider returned an error");
            return Err(GatewayError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let body: ImageGenerationResponse = response.json().await.map_err(map_transport_error)?;
        let b64_data = body
            .data
            .into_iter()
            .find_map(|image| image.b64_json)
            .filter(|data| !data.is_empty())
            .ok_or(GatewayError::EmptyResponse)?;

        tracing::info!(size = b64_data.len(), "Image generated");
        Ok(GeneratedImage {
            b64_data,
            content_type: "image/png".to_string(),
        })
    }
}

fn map_transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else if err.is_decode() {
        GatewayError::Provider {
            status: 200,
            message: format!("unreadable response: {}", err),
        }
    } else {
        GatewayError::Unreachable(err.to_string())
    }
}
