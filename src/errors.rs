use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error; // Use thiserror for cleaner error definitions
use uuid::Uuid;

use crate::models::ApiResponse;

// --- Domain/Infrastructure Errors ---

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("Post not found with ID: {0}")]
    NotFound(Uuid),

    #[error("Invalid post: {0}")]
    Validation(String),

    #[error("Stored post data is corrupt: {0}")]
    DataCorruption(String),

    #[error("Database backend error: {0}")]
    BackendError(#[from] anyhow::Error), // Wrap Anyhow errors from DB layer
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File upload failed: {0}")]
    UploadFailed(String),

    #[error("File not found with key: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    BackendError(#[from] anyhow::Error),
}

/// Failures talking to the image-generation provider.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    #[error("Image provider is not configured")]
    NotConfigured,

    #[error("Image provider timed out")]
    Timeout,

    #[error("Image provider unreachable: {0}")]
    Unreachable(String),

    #[error("Image provider rejected the request ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Image provider returned no image")]
    EmptyResponse,
}

impl GatewayError {
    /// Whether the provider could not be reached at all, as opposed to answering badly.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            GatewayError::NotConfigured | GatewayError::Timeout | GatewayError::Unreachable(_)
        )
    }
}

// --- Web Layer Error ---

#[derive(Error, Debug)]
pub enum AppError {
    // Input validation / request parsing errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Missing field: {0}")]
    MissingField(String),
    #[error("Invalid post ID format: {0}")]
    InvalidUuid(#[from] uuid::Error),
    #[error("Request body too large")]
    PayloadTooLarge,

    // Domain/Service level errors (mapped from RepoError/StorageError/GatewayError)
    #[error("Post not found with ID: {0}")]
    PostNotFound(Uuid),
    #[error("Image not found: {0}")]
    ImageNotFound(String),
    #[error("Route not found: {0}")]
    RouteNotFound(String),
    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },
    #[error("Image generation failed")]
    Upstream(#[source] GatewayError),
    #[error("Could not access post data")]
    RepositoryError(#[source] RepoError),
    #[error("Could not perform file storage operation")]
    StorageError(#[source] StorageError),

    // Configuration / Startup errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Initialization error: {0}")]
    InitError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic Internal Server Error
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

/// Framework-independent classification of an [`AppError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    PayloadTooLarge,
    RateLimited,
    Upstream,
    UpstreamUnavailable,
    Storage,
    Internal,
}

impl ErrorKind {
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::PayloadTooLarge => 413,
            ErrorKind::RateLimited => 429,
            ErrorKind::Upstream => 502,
            ErrorKind::UpstreamUnavailable => 503,
            ErrorKind::Storage | ErrorKind::Internal => 500,
        }
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidInput(_) | AppError::MissingField(_) | AppError::InvalidUuid(_) => {
                ErrorKind::Validation
            }
            AppError::PayloadTooLarge => ErrorKind::PayloadTooLarge,
            AppError::PostNotFound(_) | AppError::ImageNotFound(_) | AppError::RouteNotFound(_) => {
                ErrorKind::NotFound
            }
            AppError::RateLimited { .. } => ErrorKind::RateLimited,
            AppError::Upstream(e) if e.is_unavailable() => ErrorKind::UpstreamUnavailable,
            AppError::Upstream(_) => ErrorKind::Upstream,
            AppError::RepositoryError(_) | AppError::StorageError(_) => ErrorKind::Storage,
            AppError::ConfigError(_)
            | AppError::InitError(_)
            | AppError::Io(_)
            | AppError::InternalServerError(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Message safe to show to API clients. Server-side causes stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::InvalidInput(msg) => msg.clone(),
            AppError::MissingField(field) => format!("Missing required field: {}", field),
            AppError::InvalidUuid(e) => format!("Invalid ID format: {}", e),
            AppError::PayloadTooLarge => "Request body exceeds the size limit".to_string(),
            AppError::PostNotFound(id) => format!("Post not found with ID: {}", id),
            AppError::ImageNotFound(key) => format!("Image not found: {}", key),
            AppError::RouteNotFound(path) => format!("Route not found: {}", path),
            AppError::RateLimited { .. } => {
                "Too many requests, please try again later.".to_string()
            }
            AppError::Upstream(e) if e.is_unavailable() => {
                "Image generation service is unavailable".to_string()
            }
            AppError::Upstream(_) => "Image generation failed".to_string(),
            AppError::RepositoryError(_) => "Database operation failed".to_string(),
            AppError::StorageError(_) => "File storage operation failed".to_string(),
            AppError::ConfigError(_) => "Server configuration error".to_string(),
            AppError::InitError(_) => "Server initialization error".to_string(),
            AppError::Io(_) | AppError::InternalServerError(_) => {
                "An internal server error occurred".to_string()
            }
        }
    }
}

// --- Conversions from Domain Errors to AppError ---

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(id) => AppError::PostNotFound(id),
            RepoError::Validation(msg) => AppError::InvalidInput(msg),
            e => AppError::RepositoryError(e),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::ImageNotFound(key),
            e => AppError::StorageError(e),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::EmptyPrompt => AppError::InvalidInput("Prompt must not be empty".to_string()),
            e => AppError::Upstream(e),
        }
    }
}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge
        } else {
            AppError::InvalidInput(rejection.body_text())
        }
    }
}

// --- Axum Response Implementation ---

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.public_message();

        if status.is_server_error() {
            tracing::error!(error.detail = ?self, error.status = %status, "Responding with error");
        } else {
            tracing::debug!(error.message = %message, error.status = %status, "Responding with error");
        }

        let mut response =
            (status, Json(ApiResponse::<()>::error(message))).into_response();

        if let AppError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_every_kind_to_its_status() {
        let cases = [
            (AppError::InvalidInput("bad".into()), 400),
            (AppError::MissingField("name".into()), 400),
            (AppError::PayloadTooLarge, 413),
            (AppError::PostNotFound(Uuid::nil()), 404),
            (AppError::RateLimited { retry_after_secs: 10 }, 429),
            (
                AppError::Upstream(GatewayError::Provider { status: 400, message: "nope".into() }),
                502,
            ),
            (AppError::Upstream(GatewayError::Timeout), 503),
            (AppError::Upstream(GatewayError::NotConfigured), 503),
            (AppError::RepositoryError(RepoError::BackendError(anyhow::anyhow!("down"))), 500),
            (AppError::InternalServerError("boom".into()), 500),
        ];

        for (err, expected) in cases {
            assert_eq!(err.status_code().as_u16(), expected, "{err:?}");
        }
    }

    #[test]
    fn repo_errors_convert_to_domain_variants() {
        let id = Uuid::new_v4();
        assert!(matches!(AppError::from(RepoError::NotFound(id)), AppError::PostNotFound(got) if got == id));
        assert!(matches!(
            AppError::from(RepoError::Validation("name".into())),
            AppError::InvalidInput(_)
        ));
        assert_eq!(
            AppError::from(RepoError::DataCorruption("x".into())).kind(),
            ErrorKind::Storage
        );
    }

    #[test]
    fn empty_prompt_is_a_client_error() {
        let err = AppError::from(GatewayError::EmptyPrompt);
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.public_message(), "Prompt must not be empty");
    }

    #[test]
    fn server_errors_hide_internal_detail() {
        let err = AppError::RepositoryError(RepoError::BackendError(anyhow::anyhow!(
            "connection refused to 10.0.0.1"
        )));
        assert!(!err.public_message().contains("10.0.0.1"));
    }

    #[tokio::test]
    async fn rate_limited_response_has_retry_after() {
        let response = AppError::RateLimited { retry_after_secs: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "Too many requests, please try again later.");
    }
}
