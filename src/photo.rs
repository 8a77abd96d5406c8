//! Turning the `photo` field of a create request into a stored image reference.

use crate::{
    domain::{FileStorage, GeneratedImage},
    errors::{AppError, GatewayError},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use uuid::Uuid;

/// Raster formats accepted inline. Anything scriptable (SVG, HTML) is refused.
const INLINE_PHOTO_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/gif", "image/webp"];

/// Where a submitted photo comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum PhotoSource {
    /// Already hosted elsewhere; stored as-is.
    Remote(String),
    /// Image bytes sent in the request (data URL or bare base64).
    Inline { data: Vec<u8>, content_type: String },
}

impl PhotoSource {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AppError::MissingField("photo".to_string()));
        }

        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(PhotoSource::Remote(raw.to_string()));
        }

        if let Some(rest) = raw.strip_prefix("data:") {
            let (meta, payload) = rest
                .split_once(',')
                .ok_or_else(|| AppError::InvalidInput("Malformed data URL in 'photo'".to_string()))?;
            let content_type = meta
                .strip_suffix(";base64")
                .ok_or_else(|| AppError::InvalidInput("Only base64 data URLs are accepted for 'photo'".to_string()))?;
            let content_type = content_type.to_ascii_lowercase();
            if !INLINE_PHOTO_TYPES.contains(&content_type.as_str()) {
                return Err(AppError::InvalidInput(format!("Unsupported photo type '{}'", content_type)));
            }
            return Ok(PhotoSource::Inline {
                data: decode_base64(payload)?,
                content_type,
            });
        }

        let data = decode_base64(raw)?;
        let content_type = sniff_content_type(&data).to_string();
        Ok(PhotoSource::Inline { data, content_type })
    }
}

impl TryFrom<GeneratedImage> for PhotoSource {
    type Error = GatewayError;

    fn try_from(image: GeneratedImage) -> Result<Self, Self::Error> {
        let data = STANDARD
            .decode(image.b64_data.trim())
            .map_err(|e| GatewayError::Provider {
                status: 200,
                message: format!("image payload is not valid base64: {}", e),
            })?;
        if data.is_empty() {
            return Err(GatewayError::EmptyResponse);
        }
        Ok(PhotoSource::Inline {
            data,
            content_type: image.content_type,
        })
    }
}

fn decode_base64(payload: &str) -> Result<Vec<u8>, AppError> {
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let data = STANDARD
        .decode(compact)
        .map_err(|e| AppError::InvalidInput(format!("'photo' is not valid base64: {}", e)))?;
    if data.is_empty() {
        return Err(AppError::InvalidInput("'photo' contains no image data".to_string()));
    }
    Ok(data)
}

fn sniff_content_type(data: &[u8]) -> &'static str {
    match data {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        // The provider answers with PNG
        _ => "image/png",
    }
}

pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|exts| exts.first().copied())
            .unwrap_or("bin"),
    }
}

/// Public reference to a photo uploaded under `key`.
pub fn photo_url(public_base_url: &str, key: &str) -> String {
    format!("{}/images/{}", public_base_url, key)
}

/// Uploads inline photos and returns the reference to persist on the post.
pub async fn store_photo(
    storage: &dyn FileStorage,
    public_base_url: &str,
    source: PhotoSource,
) -> Result<String, AppError> {
    match source {
        PhotoSource::Remote(url) => Ok(url),
        PhotoSource::Inline { data, content_type } => {
            let key = format!("{}.{}", Uuid::new_v4(), extension_for(&content_type));
            tracing::debug!(image_key = %key, %content_type, size = data.len(), "Storing photo");
            storage.upload(&key, data, Some(content_type)).await?;
            Ok(photo_url(public_base_url, &key))
        }
    }
}
