use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A generated image published to the gallery.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Post {
    #[serde(rename = "_id", alias = "id")]
    pub id: Uuid,
    pub name: String,
    pub prompt: String,
    pub photo: String,
    pub likes: u64,
    pub created_at: DateTime<Utc>,
}

/// Repository input for creating a post. `photo` is already a resolved reference.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub name: String,
    pub prompt: String,
    pub photo: String,
}

impl NewPost {
    /// Returns the first required field that is missing or blank.
    pub fn missing_field(&self) -> Option<&'static str> {
        [("name", &self.name), ("prompt", &self.prompt), ("photo", &self.photo)]
            .into_iter()
            .find(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| field)
    }

    pub fn into_post(self, id: Uuid, created_at: DateTime<Utc>) -> Post {
        Post {
            id,
            name: self.name.trim().to_string(),
            prompt: self.prompt.trim().to_string(),
            photo: self.photo,
            likes: 0,
            created_at,
        }
    }
}

// --- Request / response bodies ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreatePostRequest {
    pub name: Option<String>,
    pub prompt: Option<String>,
    /// URL, data URL or bare base64. Generated from `prompt` when absent.
    pub photo: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GenerateImageRequest {
    pub prompt: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeneratedPhoto {
    /// Base64 encoded image as returned by the provider.
    pub photo: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// JSON envelope shared by every API response.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ApiResponse<T> {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: ResponseStatus::Success,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            data: None,
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_serializes_id_as_underscore_id() {
        let post = NewPost {
            name: "A".into(),
            prompt: "a cat".into(),
            photo: "https://img/1.png".into(),
        }
        .into_post(Uuid::nil(), Utc::now());

        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(json["_id"], Uuid::nil().to_string());
        assert_eq!(json["likes"], 0);
        assert!(json.get("id").is_none());

        let back: Post = serde_json::from_value(json).unwrap();
        assert_eq!(back, post);
    }

    #[test]
    fn missing_field_reports_first_blank() {
        let mut input = NewPost {
            name: "  ".into(),
            prompt: "".into(),
            photo: "x".into(),
        };
        assert_eq!(input.missing_field(), Some("name"));
        input.name = "A".into();
        assert_eq!(input.missing_field(), Some("prompt"));
        input.prompt = "a cat".into();
        assert_eq!(input.missing_field(), None);
    }

    #[test]
    fn error_envelope_omits_data() {
        let json = serde_json::to_value(ApiResponse::<()>::error("nope")).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "error", "message": "nope" }));
    }
}
