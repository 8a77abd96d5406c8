use crate::{
    config::RateLimitConfig,
    domain::{GeneratedImage, ImageGenerator},
    errors::GatewayError,
    memory::{InMemoryFileStorage, InMemoryPostRepository},
    rate_limit::{InMemoryRateLimitStore, RateLimiter},
    routes::{create_router, HttpSettings},
    state::AppState,
};
use async_trait::async_trait;
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::{net::SocketAddr, sync::Arc};

/// Image gateway that answers without a network.
#[derive(Debug, Clone, Default)]
pub struct StubImageGenerator;

impl StubImageGenerator {
    pub fn b64_png(&self) -> String {
        STANDARD.encode([0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
    }
}

#[async_trait]
impl ImageGenerator for StubImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GatewayError> {
        if prompt.trim().is_empty() {
            return Err(GatewayError::EmptyPrompt);
        }
        Ok(GeneratedImage {
            b64_data: self.b64_png(),
            content_type: "image/png".to_string(),
        })
    }
}

pub fn memory_app(generator: impl ImageGenerator) -> Router {
    let state = Arc::new(AppState {
        post_repo: Arc::new(InMemoryPostRepository::new()),
        file_storage: Arc::new(InMemoryFileStorage::new()),
        image_generator: Arc::new(generator),
        public_base_url: String::new(),
    });
    let limiter = RateLimiter::new(Arc::new(InMemoryRateLimitStore::new(&RateLimitConfig::default())));
    create_router(state, limiter, &HttpSettings::default())
}

/// Serves `app` on an ephemeral local port for the lifetime of the test runtime.
pub async fn spawn_server(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .expect("test server");
    });
    addr
}
