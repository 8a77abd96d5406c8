use crate::domain::{FileStorage, ImageGenerator, PostRepository};
use std::sync::Arc;

/// AppState holds shared resources for the web server.
#[derive(Clone)]
pub struct AppState {
    pub post_repo: Arc<dyn PostRepository>,
    pub file_storage: Arc<dyn FileStorage>,
    pub image_generator: Arc<dyn ImageGenerator>,
    /// Prefix for photo URLs served from `/images/{key}`.
    pub public_base_url: String,
}
