use crate::models::{ApiResponse, CreatePostRequest, GenerateImageRequest, GeneratedPhoto, Post};
use reqwest::Response;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request to the gallery API failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gallery API responded with {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Gallery API response carried no data")]
    MissingData,
}

/// HTTP client for the gallery API. Failures are returned as-is; nothing is retried.
#[derive(Debug, Clone)]
pub struct GalleryClient {
    client: reqwest::Client,
    base_url: String,
}

impl GalleryClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Loads the whole gallery, newest first.
    pub async fn fetch_posts(&self) -> Result<Vec<Post>, ClientError> {
        let response = self.client.get(self.url("/api/v1/post")).send().await?;
        unwrap_envelope(response).await
    }

    /// Asks the server to add a like and returns the server's updated record.
    pub async fn like_post(&self, id: Uuid) -> Result<Post, ClientError> {
        let response = self
            .client
            .put(self.url(&format!("/api/v1/post/{}/like", id)))
            .send()
            .await?;
        unwrap_envelope(response).await
    }

    /// Returns the generated image as base64.
    pub async fn generate_image(&self, prompt: &str) -> Result<String, ClientError> {
        let response = self
            .client
            .post(self.url("/api/v1/dalle"))
            .json(&GenerateImageRequest {
                prompt: Some(prompt.to_string()),
            })
            .send()
            .await?;
        let generated: GeneratedPhoto = unwrap_envelope(response).await?;
        Ok(generated.photo)
    }

    pub async fn create_post(&self, request: &CreatePostRequest) -> Result<Post, ClientError> {
        let response = self
            .client
            .post(self.url("/api/v1/post"))
            .json(request)
            .send()
            .await?;
        unwrap_envelope(response).await
    }
}

async fn unwrap_envelope<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body)
            .ok()
            .and_then(|envelope| envelope.message)
            .unwrap_or(body);
        return Err(ClientError::Api {
            status: status.as_u16(),
            message,
        });
    }

    let envelope: ApiResponse<T> = response.json().await?;
    envelope.data.ok_or(ClientError::MissingData)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_app, spawn_server, StubImageGenerator};

    async fn client_for(generator: StubImageGenerator) -> GalleryClient {
        let addr = spawn_server(memory_app(generator)).await;
        GalleryClient::new(format!("http://{}", addr)).unwrap()
    }

    #[tokio::test]
    async fn creates_lists_and_likes_posts() {
        let client = client_for(StubImageGenerator::default()).await;
        assert!(client.fetch_posts().await.unwrap().is_empty());

        let post = client
            .create_post(&CreatePostRequest {
                name: Some("A".into()),
                prompt: Some("a cat".into()),
                photo: Some("https://cdn.example/cat.png".into()),
            })
            .await
            .unwrap();
        assert_eq!(post.likes, 0);

        let liked = client.like_post(post.id).await.unwrap();
        assert_eq!(liked.likes, 1);

        let posts = client.fetch_posts().await.unwrap();
        assert_eq!(posts, vec![liked]);
    }

    #[tokio::test]
    async fn server_errors_surface_their_message() {
        let client = client_for(StubImageGenerator::default()).await;
        let err = client.like_post(Uuid::new_v4()).await.unwrap_err();
        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, 404);
                assert!(message.starts_with("Post not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn generate_image_returns_base64() {
        let client = client_for(StubImageGenerator::default()).await;
        let photo = client.generate_image("a cat").await.unwrap();
        assert_eq!(photo, StubImageGenerator::default().b64_png());
    }
}
