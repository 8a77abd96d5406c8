use crate::{
    errors::AppError,
    models::{ApiResponse, CreatePostRequest, GenerateImageRequest, GeneratedPhoto, NewPost, Post},
    photo::{self, PhotoSource},
    state::AppState,
};
use axum::{
    extract::{FromRequest, Path, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing;
use uuid::Uuid;

/// `Json` extractor whose rejections go through `AppError`, so bad bodies get the usual envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

fn required(field: &'static str, value: Option<String>) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::MissingField(field.to_string()))
}

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Hello from DALL.E!" }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "OK" }))
}

pub async fn list_posts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<Post>>>, AppError> {
    tracing::debug!("Listing all posts via handler");
    let posts = state.post_repo.list_all().await?;
    tracing::info!("Handler successfully retrieved {} posts", posts.len());
    Ok(Json(ApiResponse::success(posts)))
}

/// Stores a post. Without a `photo`, one is generated from the prompt first.
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = required("name", payload.name)?;
    let prompt = required("prompt", payload.prompt)?;

    let source = match payload.photo.filter(|p| !p.trim().is_empty()) {
        Some(photo) => PhotoSource::parse(&photo)?,
        None => {
            tracing::debug!("No photo supplied, generating one from the prompt");
            let image = state.image_generator.generate(&prompt).await?;
            PhotoSource::try_from(image)?
        }
    };

    let photo = photo::store_photo(state.file_storage.as_ref(), &state.public_base_url, source).await?;
    let post = state
        .post_repo
        .create(NewPost { name, prompt, photo: photo.clone() })
        .await
        .inspect_err(|e| tracing::warn!(%photo, error = %e, "Post not saved, uploaded photo is unreferenced"))?;

    tracing::info!(post_id = %post.id, "Post created successfully via handler");
    Ok((StatusCode::CREATED, Json(ApiResponse::success(post))))
}

pub async fn like_post(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<Json<ApiResponse<Post>>, AppError> {
    let post_id = Uuid::parse_str(&id_str)?;
    let post = state.post_repo.increment_likes(post_id).await?;
    tracing::info!(%post_id, likes = post.likes, "Post liked");
    Ok(Json(ApiResponse::success(post)))
}

pub async fn generate_image(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<GenerateImageRequest>,
) -> Result<Json<ApiResponse<GeneratedPhoto>>, AppError> {
    let prompt = required("prompt", payload.prompt)?;
    let image = state.image_generator.generate(&prompt).await?;
    Ok(Json(ApiResponse::success(GeneratedPhoto { photo: image.b64_data })))
}

/// Handler for GET /images/{key}
pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    tracing::debug!(image_key = %key, "Fetching image file via handler");

    let (data, content_type) = state.file_storage.download(&key).await?;
    let content_type = content_type
        .or_else(|| mime_guess::from_path(&key).first_raw().map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            // Keys are never reused
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable".to_string()),
            // Stored bytes are user supplied; never let them run as a document
            (header::CONTENT_SECURITY_POLICY, "default-src 'none'; sandbox".to_string()),
            (header::CONTENT_DISPOSITION, "inline".to_string()),
        ],
        data,
    )
        .into_response())
}

pub async fn not_found(uri: Uri) -> AppError {
    AppError::RouteNotFound(uri.path().to_string())
}
