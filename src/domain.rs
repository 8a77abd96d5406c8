use crate::errors::{GatewayError, RepoError, StorageError};
use crate::models::{NewPost, Post};
use async_trait::async_trait;
use uuid::Uuid;

/// Trait defining operations for storing and retrieving gallery posts.
/// Implementations are the only writers of post records.
#[async_trait]
pub trait PostRepository: Send + Sync + 'static { // Send+Sync+'static required for Arc<dyn>
    /// Lists every post, newest first. Has no side effects.
    /// WARNING: This can be inefficient on large datasets. Consider pagination.
    async fn list_all(&self) -> Result<Vec<Post>, RepoError>;

    /// Validates the input, assigns a fresh id and stores the post with zero likes.
    async fn create(&self, new_post: NewPost) -> Result<Post, RepoError>;

    /// Retrieves a post by its unique ID.
    /// Returns Ok(None) if the post is not found.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Post>, RepoError>;

    /// Atomically adds one like and returns the updated record.
    /// Fails with `RepoError::NotFound` without touching the collection if the id is unknown.
    async fn increment_likes(&self, id: Uuid) -> Result<Post, RepoError>;
}

/// Trait defining operations for storing and retrieving photo bytes.
#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    /// Uploads file data to the storage backend.
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError>;

    /// Downloads file data together with its stored content type.
    async fn download(&self, key: &str) -> Result<(Vec<u8>, Option<String>), StorageError>;
}

/// An image produced by the generation provider.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub b64_data: String,
    pub content_type: String,
}

/// Adapter in front of the external image-generation provider.
#[async_trait]
pub trait ImageGenerator: Send + Sync + 'static {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GatewayError>;
}
