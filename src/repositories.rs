use crate::{
    domain::PostRepository,
    errors::RepoError,
    models::{NewPost, Post},
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::SdkError,
    types::{AttributeValue, ReturnValue},
    Client as DynamoDbClient,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{self, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DynamoDbPostRepository {
    client: DynamoDbClient,
    table_name: String, // Store the table name
}

impl DynamoDbPostRepository {
    /// Creates a new repository instance configured for a specific table.
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbPostRepository");
        Self { client, table_name }
    }
}

#[async_trait]
impl PostRepository for DynamoDbPostRepository {
    /// Lists all posts using DynamoDB Scan. Handles pagination and sorts newest first.
    async fn list_all(&self) -> Result<Vec<Post>, RepoError> {
        tracing::debug!("DynamoDB: Scanning table '{}' for all posts", self.table_name);
        let mut posts: Vec<Post> = Vec::new();
        let mut last_evaluated_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let mut request_builder = self.client.scan().table_name(&self.table_name);

            // Apply ExclusiveStartKey if paginating from previous response
            if let Some(lek) = last_evaluated_key {
                request_builder = request_builder.set_exclusive_start_key(Some(lek));
            }

            let resp = request_builder
                .send()
                .await
                .context(format!("DynamoDB: Failed to scan table '{}'", self.table_name))
                .map_err(RepoError::BackendError)?;

            for item in resp.items.unwrap_or_default() {
                match item_to_post(&item) {
                    Some(post) => posts.push(post),
                    None => {
                        let item_id = item.get("post_id").and_then(|v| v.as_s().ok());
                        tracing::error!(item.id = ?item_id, table_name = %self.table_name, "DynamoDB: Failed to parse item from scan into Post");
                        // Fail fast if data in the table is corrupt
                        return Err(RepoError::DataCorruption(format!(
                            "DynamoDB: Failed to parse item {:?} during scan of table '{}'",
                            item_id, self.table_name
                        )));
                    }
                }
            }

            last_evaluated_key = resp.last_evaluated_key;
            if last_evaluated_key.is_none() {
                break;
            }
            tracing::debug!("DynamoDB Scan (table: {}): Continuing with LastEvaluatedKey...", self.table_name);
        }

        sort_newest_first(&mut posts);
        tracing::info!("DynamoDB (table: {}): Successfully listed {} posts", self.table_name, posts.len());
        Ok(posts)
    }

    /// Stores a new `Post` using PutItem, refusing to overwrite an existing id.
    async fn create(&self, new_post: NewPost) -> Result<Post, RepoError> {
        if let Some(field) = new_post.missing_field() {
            return Err(RepoError::Validation(format!("'{}' is required", field)));
        }

        let post = new_post.into_post(Uuid::new_v4(), Utc::now());
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(post_to_item(&post)))
            .condition_expression("attribute_not_exists(post_id)")
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to put post (id: {})", self.table_name, post.id))
            .map_err(RepoError::BackendError)?; // Map anyhow::Error -> RepoError

        tracing::debug!(post_id = %post.id, table_name = %self.table_name, "DynamoDB: Post stored");
        Ok(post)
    }

    /// Retrieves a `Post` from DynamoDB using GetItem.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Post>, RepoError> {
        let id_str = id.to_string();
        let resp = self.client
            .get_item()
            .table_name(&self.table_name)
            .key("post_id", AttributeValue::S(id_str.clone()))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get post (id: {})", self.table_name, id_str))
            .map_err(RepoError::BackendError)?;

        match resp.item {
            Some(item) => item_to_post(&item).map(Some).ok_or_else(|| {
                tracing::error!(post_id = %id_str, table_name = %self.table_name, "DynamoDB: Retrieved item but failed to parse into Post");
                RepoError::DataCorruption(format!(
                    "Failed to parse post data retrieved from DynamoDB table '{}' for id {}",
                    self.table_name, id_str
                ))
            }),
            None => Ok(None), // Item not found is not an error
        }
    }

    /// Increments `likes` with an UpdateItem `ADD`, so concurrent likes never lose updates.
    async fn increment_likes(&self, id: Uuid) -> Result<Post, RepoError> {
        let id_str = id.to_string();
        tracing::debug!(post_id = %id_str, table_name = %self.table_name, "DynamoDB: Incrementing likes");

        let result = self.client
            .update_item()
            .table_name(&self.table_name)
            .key("post_id", AttributeValue::S(id_str.clone()))
            .update_expression("ADD likes :one")
            .condition_expression("attribute_exists(post_id)")
            .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
            .return_values(ReturnValue::AllNew)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(SdkError::ServiceError(service_err))
                if service_err.err().is_conditional_check_failed_exception() =>
            {
                tracing::debug!(post_id = %id_str, "DynamoDB: Like on unknown post");
                return Err(RepoError::NotFound(id));
            }
            Err(e) => {
                return Err(RepoError::BackendError(anyhow::Error::new(e).context(format!(
                    "DynamoDB (table: {}): Failed to increment likes (id: {})",
                    self.table_name, id_str
                ))));
            }
        };

        output
            .attributes
            .as_ref()
            .and_then(item_to_post)
            .ok_or_else(|| {
                RepoError::DataCorruption(format!(
                    "UpdateItem on table '{}' returned unparseable attributes for id {}",
                    self.table_name, id_str
                ))
            })
    }
}

/// Newest first; ties broken by id so the order is stable across calls.
pub(crate) fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

fn post_to_item(post: &Post) -> HashMap<String, AttributeValue> {
    HashMap::from([
        ("post_id".to_string(), AttributeValue::S(post.id.to_string())),
        ("name".to_string(), AttributeValue::S(post.name.clone())),
        ("prompt".to_string(), AttributeValue::S(post.prompt.clone())),
        ("photo".to_string(), AttributeValue::S(post.photo.clone())),
        ("likes".to_string(), AttributeValue::N(post.likes.to_string())),
        ("created_at".to_string(), AttributeValue::S(post.created_at.to_rfc3339())),
    ])
}

// Helper function to convert DynamoDB item map to Post struct
fn item_to_post(item: &HashMap<String, AttributeValue>) -> Option<Post> {
    let id = item
        .get("post_id")?
        .as_s()
        .ok()
        .and_then(|s| Uuid::parse_str(s).ok())?;
    let name = item.get("name")?.as_s().ok()?.to_string();
    let prompt = item.get("prompt")?.as_s().ok()?.to_string();
    let photo = item.get("photo")?.as_s().ok()?.to_string();
    let likes = match item.get("likes") {
        Some(value) => value.as_n().ok()?.parse().ok()?,
        None => 0,
    };
    let created_at = DateTime::parse_from_rfc3339(item.get("created_at")?.as_s().ok()?)
        .ok()?
        .with_timezone(&Utc);

    Some(Post {
        id,
        name,
        prompt,
        photo,
        likes,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_post() -> Post {
        Post {
            id: Uuid::new_v4(),
            name: "A".into(),
            prompt: "a cat".into(),
            photo: "https://cdn/a.png".into(),
            likes: 7,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn item_conversion_preserves_every_field() {
        let post = sample_post();
        assert_eq!(item_to_post(&post_to_item(&post)), Some(post));
    }

    #[test]
    fn item_without_likes_counts_as_zero() {
        let mut item = post_to_item(&sample_post());
        item.remove("likes");
        assert_eq!(item_to_post(&item).unwrap().likes, 0);
    }

    #[test]
    fn corrupt_item_is_rejected() {
        let mut item = post_to_item(&sample_post());
        item.insert("post_id".into(), AttributeValue::S("not-a-uuid".into()));
        assert!(item_to_post(&item).is_none());
    }

    #[test]
    fn sorts_newest_first() {
        let older = sample_post();
        let mut newer = sample_post();
        newer.created_at = older.created_at + chrono::Duration::seconds(1);
        let mut posts = vec![older.clone(), newer.clone()];
        sort_newest_first(&mut posts);
        assert_eq!(posts, vec![newer, older]);
    }
}
