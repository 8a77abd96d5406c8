#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use dalle_gallery::{
    config::RateLimitConfig,
    create_router,
    domain::{GeneratedImage, ImageGenerator},
    errors::GatewayError,
    memory::{InMemoryFileStorage, InMemoryPostRepository},
    rate_limit::{InMemoryRateLimitStore, RateLimiter},
    AppState, HttpSettings,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt; // for `app.oneshot()`

pub const PNG_B64: &str = "iVBORw0KGgo=";

/// Scripted stand-in for the image provider.
#[derive(Debug, Clone, Copy)]
pub enum FakeGenerator {
    Png,
    ProviderError,
    Unavailable,
    Panics,
}

#[async_trait]
impl ImageGenerator for FakeGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GatewayError> {
        if prompt.trim().is_empty() {
            return Err(GatewayError::EmptyPrompt);
        }
        match self {
            FakeGenerator::Png => Ok(GeneratedImage {
                b64_data: PNG_B64.to_string(),
                content_type: "image/png".to_string(),
            }),
            FakeGenerator::ProviderError => Err(GatewayError::Provider {
                status: 400,
                message: "Your request was rejected by the safety system".to_string(),
            }),
            FakeGenerator::Unavailable => Err(GatewayError::Timeout),
            FakeGenerator::Panics => panic!("provider client exploded"),
        }
    }
}

pub struct TestApp {
    pub generator: FakeGenerator,
    pub settings: HttpSettings,
    pub rate_limit: RateLimitConfig,
}

impl Default for TestApp {
    fn default() -> Self {
        Self {
            generator: FakeGenerator::Png,
            settings: HttpSettings::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl TestApp {
    pub fn build(self) -> Router {
        let state = Arc::new(AppState {
            post_repo: Arc::new(InMemoryPostRepository::new()),
            file_storage: Arc::new(InMemoryFileStorage::new()),
            image_generator: Arc::new(self.generator),
            public_base_url: String::new(),
        });
        let limiter = RateLimiter::new(Arc::new(InMemoryRateLimitStore::new(&self.rate_limit)));
        create_router(state, limiter, &self.settings)
    }
}

pub fn app() -> Router {
    TestApp::default().build()
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.expect("handle request");
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body")
        .to_vec();
    TestResponse { status, headers, body }
}

pub async fn get(app: &Router, uri: &str) -> TestResponse {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    send(app, request).await
}

pub async fn put(app: &Router, uri: &str) -> TestResponse {
    let request = Request::builder()
        .method(Method::PUT)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    send(app, request).await
}

pub async fn post_json(app: &Router, uri: &str, body: &Value) -> TestResponse {
    post_raw(app, uri, serde_json::to_vec(body).expect("serialize request body")).await
}

pub async fn post_raw(app: &Router, uri: &str, body: Vec<u8>) -> TestResponse {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .expect("build request");
    send(app, request).await
}
