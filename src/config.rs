use std::{env, net::SocketAddr, str::FromStr, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
    #[error(transparent)]
    DotEnvError(#[from] dotenvy::Error),
}

/// Where posts and photos are kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    /// DynamoDB table for posts, S3 bucket for photos.
    DynamoDb,
    /// Process-local maps, for development and tests.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dynamodb" | "aws" => Ok(StorageBackend::DynamoDb),
            "memory" | "in-memory" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AwsConfig {
    pub posts_table: String,
    pub photo_bucket_name: String,
    pub aws_region: String,
    // Optional endpoint for LocalStack
    pub endpoint_url: Option<String>,
    pub init_resources: bool,
}

#[derive(Clone, Debug)]
pub struct ImageProviderConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Clone, Debug)] // Clone needed if passed around, Debug for logging
pub struct Config {
    pub bind_address: SocketAddr,
    /// `None` means any origin is allowed.
    pub allowed_origins: Option<Vec<String>>,
    pub public_base_url: String,
    pub body_limit_bytes: usize,
    pub backend: StorageBackend,
    /// Only present for the DynamoDB backend.
    pub aws: Option<AwsConfig>,
    pub image_provider: ImageProviderConfig,
    pub rate_limit: RateLimitConfig,
}

pub const DEFAULT_BODY_LIMIT_BYTES: usize = 50 * 1024 * 1024;

impl Config {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignores errors, relies on env vars otherwise)
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, so tests need not touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_address = match var("BIND_ADDRESS") {
            Some(addr) => SocketAddr::from_str(&addr)
                .map_err(|e| ConfigError::InvalidVar("BIND_ADDRESS".into(), e.to_string()))?,
            None => {
                let port: u16 = parse_or("PORT", var("PORT"), 8080)?;
                SocketAddr::from(([0, 0, 0, 0], port))
            }
        };

        // `*` anywhere in the list means every origin is allowed
        let allowed_origins = var("ALLOWED_ORIGINS")
            .map(|raw| parse_origins(&raw))
            .filter(|o| !o.is_empty() && !o.iter().any(|origin| origin == "*"));

        let backend = match var("STORAGE_BACKEND") {
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::InvalidVar("STORAGE_BACKEND".into(), e))?,
            None => StorageBackend::DynamoDb,
        };

        let aws = match backend {
            StorageBackend::Memory => None,
            StorageBackend::DynamoDb => Some(AwsConfig {
                posts_table: var("POSTS_TABLE").unwrap_or_else(|| "posts".to_string()),
                photo_bucket_name: var("PHOTO_BUCKET_NAME")
                    .ok_or_else(|| ConfigError::MissingVar("PHOTO_BUCKET_NAME".into()))?,
                aws_region: var("AWS_DEFAULT_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                endpoint_url: var("AWS_ENDPOINT_URL"),
                init_resources: parse_or("INIT_RESOURCES", var("INIT_RESOURCES"), false)?,
            }),
        };

        let image_provider = ImageProviderConfig {
            api_key: var("OPENAI_API_KEY"),
            api_base: var("OPENAI_API_BASE")
                .unwrap_or_else(|| "https://api.openai.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            model: var("IMAGE_MODEL").unwrap_or_else(|| "dall-e-2".to_string()),
            timeout: Duration::from_secs(parse_or("IMAGE_TIMEOUT_SECS", var("IMAGE_TIMEOUT_SECS"), 60)?),
        };

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            max_requests: parse_or("RATE_LIMIT_MAX", var("RATE_LIMIT_MAX"), defaults.max_requests)?,
            window: Duration::from_secs(parse_or(
                "RATE_LIMIT_WINDOW_SECS",
                var("RATE_LIMIT_WINDOW_SECS"),
                defaults.window.as_secs(),
            )?),
        };
        if rate_limit.window.is_zero() {
            return Err(ConfigError::InvalidVar("RATE_LIMIT_WINDOW_SECS".into(), "must be positive".into()));
        }

        Ok(Config {
            bind_address,
            allowed_origins,
            public_base_url: var("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_default(),
            body_limit_bytes: parse_or("BODY_LIMIT_BYTES", var("BODY_LIMIT_BYTES"), DEFAULT_BODY_LIMIT_BYTES)?,
            backend,
            aws,
            image_provider,
            rate_limit,
        })
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
