use super::{
    api::{ClientError, GalleryClient},
    debounce::Debouncer,
};
use crate::models::Post;
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use uuid::Uuid;

/// Posts whose name or prompt contains `query`, ignoring case. A blank query matches everything.
pub fn filter_posts<'a>(posts: &'a [Post], query: &str) -> Vec<&'a Post> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return posts.iter().collect();
    }
    posts
        .iter()
        .filter(|post| {
            post.name.to_lowercase().contains(&needle) || post.prompt.to_lowercase().contains(&needle)
        })
        .collect()
}

/// Posts loaded once per page view.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    posts: Vec<Post>,
}

impl Gallery {
    pub fn new(posts: Vec<Post>) -> Self {
        Self { posts }
    }

    pub async fn load(client: &GalleryClient) -> Result<Self, ClientError> {
        Ok(Self::new(client.fetch_posts().await?))
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn search(&self, query: &str) -> Vec<&Post> {
        filter_posts(&self.posts, query)
    }

    /// Likes on the server, then updates local state from the confirmed record.
    /// On failure local state is untouched.
    pub async fn like(&mut self, client: &GalleryClient, id: Uuid) -> Result<Post, ClientError> {
        let updated = client.like_post(id).await?;
        self.apply_like(updated.clone());
        Ok(updated)
    }

    /// Replaces the local copy of a post with the server's version. Returns false if unknown.
    pub fn apply_like(&mut self, updated: Post) -> bool {
        match self.posts.iter_mut().find(|post| post.id == updated.id) {
            Some(post) => {
                *post = updated;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
    pub query: String,
    pub posts: Vec<Post>,
}

/// Search box state: every keystroke goes through [`DebouncedSearch::input`], and the
/// filtered posts are published on the watch channel once typing pauses.
#[derive(Debug)]
pub struct DebouncedSearch {
    posts: Arc<Vec<Post>>,
    debouncer: Debouncer,
    results: watch::Sender<Option<SearchResults>>,
}

impl DebouncedSearch {
    pub fn new(posts: Vec<Post>, delay: Duration) -> (Self, watch::Receiver<Option<SearchResults>>) {
        let (results, receiver) = watch::channel(None);
        let search = Self {
            posts: Arc::new(posts),
            debouncer: Debouncer::new(delay),
            results,
        };
        (search, receiver)
    }

    pub fn input(&mut self, query: &str) {
        let posts = self.posts.clone();
        let results = self.results.clone();
        let query = query.to_string();
        self.debouncer.schedule(async move {
            let matched = filter_posts(&posts, &query).into_iter().cloned().collect();
            // Nobody listening any more is fine.
            let _ = results.send(Some(SearchResults { query, posts: matched }));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreatePostRequest, NewPost};
    use crate::test_support::{memory_app, spawn_server, StubImageGenerator};
    use chrono::Utc;

    fn post(name: &str, prompt: &str) -> Post {
        NewPost {
            name: name.into(),
            prompt: prompt.into(),
            photo: "https://cdn.example/p.png".into(),
        }
        .into_post(Uuid::new_v4(), Utc::now())
    }

    fn sample() -> Vec<Post> {
        vec![
            post("Alice", "A Cat in space"),
            post("Bob", "a dog on a skateboard"),
            post("Catherine", "sunset over mountains"),
        ]
    }

    #[test]
    fn matches_name_or_prompt_case_insensitively() {
        let posts = sample();
        let names: Vec<_> = filter_posts(&posts, "CAT").iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Catherine"]);

        let names: Vec<_> = filter_posts(&posts, "skate").iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Bob"]);

        assert!(filter_posts(&posts, "zebra").is_empty());
    }

    #[test]
    fn blank_query_returns_everything() {
        let posts = sample();
        assert_eq!(filter_posts(&posts, "   ").len(), 3);
    }

    #[test]
    fn apply_like_replaces_only_the_matching_post() {
        let mut gallery = Gallery::new(sample());
        let mut liked = gallery.posts()[1].clone();
        liked.likes = 4;

        assert!(gallery.apply_like(liked.clone()));
        assert_eq!(gallery.posts()[1], liked);
        assert_eq!(gallery.posts()[0].likes, 0);

        assert!(!gallery.apply_like(post("Ghost", "not loaded")));
        assert_eq!(gallery.posts().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_search_publishes_last_query_only() {
        let (mut search, mut results) = DebouncedSearch::new(sample(), Duration::from_millis(500));

        search.input("c");
        search.input("ca");
        search.input("cat");

        results.changed().await.unwrap();
        let published = results.borrow_and_update().clone().unwrap();
        assert_eq!(published.query, "cat");
        assert_eq!(published.posts.len(), 2);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!results.has_changed().unwrap());
    }

    #[tokio::test]
    async fn like_updates_local_state_only_after_server_confirms() {
        let addr = spawn_server(memory_app(StubImageGenerator)).await;
        let client = GalleryClient::new(format!("http://{}", addr)).unwrap();
        let created = client
            .create_post(&CreatePostRequest {
                name: Some("A".into()),
                prompt: Some("a cat".into()),
                photo: Some("https://cdn.example/cat.png".into()),
            })
            .await
            .unwrap();

        let mut gallery = Gallery::load(&client).await.unwrap();
        assert_eq!(gallery.posts().len(), 1);

        let liked = gallery.like(&client, created.id).await.unwrap();
        assert_eq!(liked.likes, 1);
        assert_eq!(gallery.posts()[0].likes, 1);

        assert!(gallery.like(&client, Uuid::new_v4()).await.is_err());
        assert_eq!(gallery.posts()[0].likes, 1);
    }
}
