//! Process-local backends, selected with `STORAGE_BACKEND=memory`.
//! Data lives as long as the server process.

use crate::{
    domain::{FileStorage, PostRepository},
    errors::{RepoError, StorageError},
    models::{NewPost, Post},
    repositories::sort_newest_first,
};
use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct InMemoryPostRepository {
    posts: Mutex<HashMap<Uuid, Post>>,
}

impl InMemoryPostRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn posts(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Post>>, RepoError> {
        self.posts
            .lock()
            .map_err(|_| RepoError::BackendError(anyhow::anyhow!("in-memory post store lock poisoned")))
    }
}

#[async_trait]
impl PostRepository for InMemoryPostRepository {
    async fn list_all(&self) -> Result<Vec<Post>, RepoError> {
        let mut posts: Vec<Post> = self.posts()?.values().cloned().collect();
        sort_newest_first(&mut posts);
        Ok(posts)
    }

    async fn create(&self, new_post: NewPost) -> Result<Post, RepoError> {
        if let Some(field) = new_post.missing_field() {
            return Err(RepoError::Validation(format!("'{}' is required", field)));
        }

        let mut posts = self.posts()?;
        let mut id = Uuid::new_v4();
        while posts.contains_key(&id) {
            id = Uuid::new_v4();
        }
        let post = new_post.into_post(id, Utc::now());
        posts.insert(id, post.clone());
        tracing::debug!(post_id = %id, "Memory: Post stored");
        Ok(post)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Post>, RepoError> {
        Ok(self.posts()?.get(&id).cloned())
    }

    async fn increment_likes(&self, id: Uuid) -> Result<Post, RepoError> {
        // Read and write happen under one guard, the in-memory equivalent of an atomic ADD.
        let mut posts = self.posts()?;
        let post = posts.get_mut(&id).ok_or(RepoError::NotFound(id))?;
        post.likes += 1;
        Ok(post.clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryFileStorage {
    files: Mutex<HashMap<String, (Vec<u8>, Option<String>)>>,
}

impl InMemoryFileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> Result<MutexGuard<'_, HashMap<String, (Vec<u8>, Option<String>)>>, StorageError> {
        self.files
            .lock()
            .map_err(|_| StorageError::BackendError(anyhow::anyhow!("in-memory file store lock poisoned")))
    }
}

#[async_trait]
impl FileStorage for InMemoryFileStorage {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError> {
        if data.is_empty() {
            return Err(StorageError::UploadFailed(format!("refusing to store empty file '{}'", key)));
        }
        self.files()?.insert(key.to_string(), (data, content_type));
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<(Vec<u8>, Option<String>), StorageError> {
        self.files()?
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn new_post(name: &str) -> NewPost {
        NewPost {
            name: name.into(),
            prompt: "a cat".into(),
            photo: "https://cdn/cat.png".into(),
        }
    }

    #[tokio::test]
    async fn create_assigns_unique_ids_and_zero_likes() {
        let repo = InMemoryPostRepository::new();
        let a = repo.create(new_post("A")).await.unwrap();
        let b = repo.create(new_post("B")).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.likes, 0);
        assert_eq!(b.likes, 0);
    }

    #[tokio::test]
    async fn create_rejects_blank_fields() {
        let repo = InMemoryPostRepository::new();
        let err = repo.create(new_post("  ")).await.unwrap_err();
        assert!(matches!(err, RepoError::Validation(msg) if msg.contains("name")));
        assert!(repo.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn likes_strictly_increase() {
        let repo = InMemoryPostRepository::new();
        let post = repo.create(new_post("A")).await.unwrap();
        let mut last = post.likes;
        for _ in 0..5 {
            let updated = repo.increment_likes(post.id).await.unwrap();
            assert!(updated.likes > last);
            last = updated.likes;
        }
        assert_eq!(last, 5);
    }

    #[tokio::test]
    async fn concurrent_likes_are_not_lost() {
        let repo = Arc::new(InMemoryPostRepository::new());
        let post = repo.create(new_post("A")).await.unwrap();

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.increment_likes(post.id).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(repo.get_by_id(post.id).await.unwrap().unwrap().likes, 64);
    }

    #[tokio::test]
    async fn like_on_unknown_id_leaves_collection_unchanged() {
        let repo = InMemoryPostRepository::new();
        repo.create(new_post("A")).await.unwrap();
        let before = repo.list_all().await.unwrap();

        let missing = Uuid::new_v4();
        let err = repo.increment_likes(missing).await.unwrap_err();
        assert!(matches!(err, RepoError::NotFound(id) if id == missing));
        assert_eq!(repo.list_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn list_all_is_idempotent_and_newest_first() {
        let repo = InMemoryPostRepository::new();
        let first = repo.create(new_post("first")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = repo.create(new_post("second")).await.unwrap();

        let listed = repo.list_all().await.unwrap();
        assert_eq!(listed.iter().map(|p| p.id).collect::<Vec<_>>(), vec![second.id, first.id]);
        assert_eq!(repo.list_all().await.unwrap(), listed);
    }

    #[tokio::test]
    async fn file_storage_round_trips_content_type() {
        let storage = InMemoryFileStorage::new();
        storage.upload("a.png", vec![1, 2, 3], Some("image/png".into())).await.unwrap();
        let (data, content_type) = storage.download("a.png").await.unwrap();
        assert_eq!(data, vec![1, 2, 3]);
        assert_eq!(content_type.as_deref(), Some("image/png"));
        assert!(matches!(storage.download("b.png").await, Err(StorageError::NotFound(_))));
    }
}
