use crate::{
    config::{Config, DEFAULT_BODY_LIMIT_BYTES},
    errors::AppError,
    handlers, // Import handlers module
    rate_limit::{rate_limit, RateLimiter},
    state::AppState,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use std::{any::Any, sync::Arc};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowHeaders, AllowOrigin, Any as AnyOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

/// HTTP-level settings the router needs from the configuration.
#[derive(Clone, Debug)]
pub struct HttpSettings {
    /// `None` allows every origin.
    pub allowed_origins: Option<Vec<String>>,
    pub body_limit_bytes: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            allowed_origins: None,
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
        }
    }
}

impl From<&Config> for HttpSettings {
    fn from(config: &Config) -> Self {
        Self {
            allowed_origins: config.allowed_origins.clone(),
            body_limit_bytes: config.body_limit_bytes,
        }
    }
}

/// Headers added to every response unless a handler already set them.
const SECURITY_HEADERS: [(&str, &str); 8] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "SAMEORIGIN"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("cross-origin-resource-policy", "same-origin"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-permitted-cross-domain-policies", "none"),
];

/// Creates the Axum router and associates routes with handlers.
///
/// Layers run outermost first: security headers, CORS, body limit, request
/// tracing, rate limiting, then routing. Handler errors, panics and unknown
/// routes all leave through `AppError`.
pub fn create_router(state: Arc<AppState>, limiter: RateLimiter, settings: &HttpSettings) -> Router {
    let router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/api/v1/post", get(handlers::list_posts).post(handlers::create_post))
        .route("/api/v1/post/{id}/like", put(handlers::like_post))
        .route("/api/v1/dalle", post(handlers::generate_image))
        .route("/images/{key}", get(handlers::get_image))
        .fallback(handlers::not_found)
        // Middleware Layers
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn_with_state(limiter, rate_limit))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(settings.body_limit_bytes))
        .layer(cors_layer(settings.allowed_origins.as_deref()));

    SECURITY_HEADERS
        .into_iter()
        .fold(router, |router, (name, value)| {
            router.layer(SetResponseHeaderLayer::if_not_present(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            ))
        })
        .with_state(state) // Pass the application state
}

fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let allow_origin = match allowed_origins {
        None => AllowOrigin::any(),
        Some(origins) if origins.iter().any(|origin| origin == "*") => AllowOrigin::any(),
        Some(origins) => AllowOrigin::list(origins.iter().filter_map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|e| tracing::warn!(%origin, error = %e, "Ignoring invalid CORS origin"))
                .ok()
        })),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AnyOrigin)
        .allow_headers(AllowHeaders::mirror_request())
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| err.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());
    AppError::InternalServerError(format!("handler panicked: {}", detail)).into_response()
}
