use crate::{
    aws_clients::{create_dynamodb_client, create_s3_client, create_sdk_config},
    config::{AwsConfig, Config, StorageBackend},
    domain::{FileStorage, ImageGenerator, PostRepository},
    errors::AppError,
    gateway::OpenAiImageGenerator,
    memory::{InMemoryFileStorage, InMemoryPostRepository},
    rate_limit::{InMemoryRateLimitStore, RateLimiter},
    repositories::DynamoDbPostRepository,
    state::AppState,
    storage::S3FileStorage,
};
use aws_sdk_dynamodb::{
    types::{AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType, TableStatus},
    Client as DynamoDbClient, error::SdkError as DynamoSdkError,
};
use aws_sdk_s3::{
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client as S3Client, error::SdkError as S3SdkError,
};
use aws_smithy_types::error::operation::BuildError;
use backoff::ExponentialBackoff;
use std::{sync::Arc, time::Duration};
use tracing;

/// How long startup waits for a freshly created table to become ACTIVE.
const TABLE_READY_TIMEOUT: Duration = Duration::from_secs(60);

fn build_error(what: &str, e: BuildError) -> AppError {
    AppError::InitError(format!("Failed to build {}: {}", what, e))
}

/// Creates the DynamoDB table if it doesn't exist.
async fn create_posts_table_if_not_exists(client: &DynamoDbClient, table_name: &str) -> Result<(), AppError> {
    let result = client
        .create_table()
        .table_name(table_name)
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name("post_id")
                .attribute_type(ScalarAttributeType::S)
                .build()
                .map_err(|e| build_error("attribute definition", e))?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name("post_id")
                .key_type(KeyType::Hash)
                .build()
                .map_err(|e| build_error("key schema", e))?,
        )
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await;
    match result {
        Ok(_) => {
            tracing::info!("Startup: Table '{}' created successfully or setup initiated.", table_name);
            Ok(())
        }
        Err(e) => {
            if let DynamoSdkError::ServiceError(service_err) = &e {
                if service_err.err().is_resource_in_use_exception() {
                    tracing::info!("Startup: Table '{}' already exists, no action needed.", table_name);
                    return Ok(());
                }
                tracing::error!("Startup: Service error creating DynamoDB table '{}': {:?}", table_name, service_err);
            } else {
                tracing::error!("Startup: SDK error creating DynamoDB table '{}': {}", table_name, e);
            }
            Err(AppError::InitError(format!("Startup: Failed to create DynamoDB table '{}': {}", table_name, e)))
        }
    }
}

/// Polls DescribeTable with exponential backoff until the table is ACTIVE.
async fn wait_for_table_active(client: &DynamoDbClient, table_name: &str) -> Result<(), AppError> {
    let policy = ExponentialBackoff {
        max_elapsed_time: Some(TABLE_READY_TIMEOUT),
        ..ExponentialBackoff::default()
    };

    backoff::future::retry(policy, || async {
        let output = client
            .describe_table()
            .table_name(table_name)
            .send()
            .await
            .map_err(|e| backoff::Error::transient(format!("DescribeTable failed: {}", e)))?;

        match output.table().and_then(|t| t.table_status()) {
            Some(TableStatus::Active) => Ok(()),
            status => {
                tracing::debug!(table_name, ?status, "Startup: Waiting for table to become ACTIVE");
                Err(backoff::Error::transient(format!("table status is {:?}", status)))
            }
        }
    })
    .await
    .map_err(|reason| {
        AppError::InitError(format!("Startup: Table '{}' did not become ACTIVE: {}", table_name, reason))
    })
}

/// Ensures the S3 bucket exists, creating it with the correct location constraint if needed.
async fn ensure_s3_bucket_exists(client: &S3Client, bucket_name: &str, region_str: &str) -> Result<(), AppError> {
    let mut create_bucket_req_builder = client.create_bucket().bucket(bucket_name);
    if region_str != "us-east-1" {
        create_bucket_req_builder = create_bucket_req_builder.create_bucket_configuration(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region_str))
                .build(),
        );
    }

    match create_bucket_req_builder.send().await {
        Ok(_) => {
            tracing::info!("Startup: S3 bucket '{}' created or already exists.", bucket_name);
            Ok(())
        }
        Err(sdk_err) => {
            if let S3SdkError::ServiceError(service_err) = &sdk_err {
                let err = service_err.err();
                if err.is_bucket_already_owned_by_you() || err.is_bucket_already_exists() {
                    tracing::info!("Startup: S3 bucket '{}' already exists.", bucket_name);
                    return Ok(());
                }
                tracing::error!("Startup: Service error creating S3 bucket '{}': {:?}", bucket_name, service_err);
            } else {
                tracing::error!("Startup: SDK error creating S3 bucket '{}': {}", bucket_name, sdk_err);
            }
            Err(AppError::InitError(format!("Startup: Failed to create S3 bucket '{}': {}", bucket_name, sdk_err)))
        }
    }
}

/// Initializes required AWS resources (DynamoDB table, S3 bucket).
pub async fn init_resources(
    db_client: &DynamoDbClient,
    s3_client: &S3Client,
    config: &AwsConfig,
) -> Result<(), AppError> {
    tracing::info!("Startup: Initializing AWS resources...");
    create_posts_table_if_not_exists(db_client, &config.posts_table).await?;
    wait_for_table_active(db_client, &config.posts_table).await?;
    ensure_s3_bucket_exists(s3_client, &config.photo_bucket_name, &config.aws_region).await?;
    tracing::info!("Startup: AWS resource initialization complete.");
    Ok(())
}

/// Wires repository, photo storage and image gateway for the configured backend.
pub async fn build_state(config: &Config) -> Result<Arc<AppState>, AppError> {
    let (post_repo, file_storage): (Arc<dyn PostRepository>, Arc<dyn FileStorage>) = match config.backend {
        StorageBackend::Memory => {
            tracing::warn!("Startup: Using in-memory storage, posts are lost on restart");
            (Arc::new(InMemoryPostRepository::new()), Arc::new(InMemoryFileStorage::new()))
        }
        StorageBackend::DynamoDb => {
            let aws = config
                .aws
                .as_ref()
                .ok_or_else(|| AppError::ConfigError("DynamoDB backend selected without AWS settings".into()))?;

            tracing::info!("Initializing AWS DynamoDB and S3 clients...");
            let sdk_config = create_sdk_config(aws).await;
            let db_client = create_dynamodb_client(&sdk_config);
            let s3_client = create_s3_client(&sdk_config);

            if aws.init_resources {
                init_resources(&db_client, &s3_client, aws).await?;
            }

            (
                Arc::new(DynamoDbPostRepository::new(db_client, aws.posts_table.clone())),
                Arc::new(S3FileStorage::new(s3_client, aws.photo_bucket_name.clone())),
            )
        }
    };

    let image_generator: Arc<dyn ImageGenerator> = Arc::new(
        OpenAiImageGenerator::new(&config.image_provider)
            .map_err(|e| AppError::InitError(format!("Failed to create image gateway: {}", e)))?,
    );

    Ok(Arc::new(AppState {
        post_repo,
        file_storage,
        image_generator,
        public_base_url: config.public_base_url.clone(),
    }))
}

pub fn build_rate_limiter(config: &Config) -> RateLimiter {
    tracing::info!(
        max_requests = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window.as_secs(),
        "Rate limiting enabled"
    );
    RateLimiter::new(Arc::new(InMemoryRateLimitStore::new(&config.rate_limit)))
}
