//! In-memory post store. Posting and moderation announce themselves through the
//! dispatcher, exactly as a database-backed store would.

use chrono::Utc;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::PostStore;
use crate::dispatch::Dispatcher;
use crate::errors::{ChattyError, Result};
use crate::event::{EventData, ModerationFlag, Post};
use crate::logutil::preview;

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    posts: BTreeMap<u64, Post>,
}

pub struct MemoryPostStore {
    dispatcher: Option<Dispatcher>,
    inner: Mutex<Inner>,
}

impl MemoryPostStore {
    /// Store whose writes are announced on `dispatcher`.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Some(dispatcher),
            inner: Mutex::new(Inner {
                next_id: 1,
                posts: BTreeMap::new(),
            }),
        }
    }

    /// Read-only use (e.g. seeding an index offline); writes emit no events.
    pub fn detached() -> Self {
        Self {
            dispatcher: None,
            inner: Mutex::new(Inner {
                next_id: 1,
                posts: BTreeMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("post store mutex poisoned")
    }

    // Called with the store lock held so event order follows post order.
    fn announce(&self, data: EventData) {
        if let Some(dispatcher) = &self.dispatcher {
            if let Err(e) = dispatcher.send_event(data) {
                warn!("post store: event not sent: {}", e);
            }
        }
    }

    /// Create a post. `parent_id` 0 starts a new thread.
    /// Emits a `NewPost` event carrying the parent's author.
    pub fn post_comment(&self, author: &str, parent_id: u64, body: &str) -> Result<u64> {
        if author.trim().is_empty() {
            return Err(ChattyError::Argument("author is required".to_string()));
        }
        if body.trim().is_empty() {
            return Err(ChattyError::Argument("post body is empty".to_string()));
        }

        let mut inner = self.lock();
        let (thread_id, parent_author) = if parent_id == 0 {
            (None, String::new())
        } else {
            let parent = inner
                .posts
                .get(&parent_id)
                .ok_or(ChattyError::InvalidParent(parent_id))?;
            (Some(parent.thread_id), parent.author.clone())
        };

        let id = inner.next_id;
        inner.next_id = id
            .checked_add(1)
            .ok_or_else(|| ChattyError::InvalidPost("post id space exhausted".to_string()))?;
        let post = Post {
            id,
            thread_id: thread_id.unwrap_or(id),
            parent_id,
            author: author.to_string(),
            category: ModerationFlag::OnTopic,
            date: Utc::now(),
            body: body.to_string(),
        };
        debug!(
            "post store: new post {} by {} in thread {}: {}",
            id,
            author,
            post.thread_id,
            preview(body)
        );
        inner.posts.insert(id, post.clone());

        self.announce(EventData::NewPost {
            post_id: id,
            post,
            parent_author,
        });
        Ok(id)
    }

    /// Moderator action. Emits a `CategoryChange` event.
    pub fn set_post_category(&self, post_id: u64, category: ModerationFlag) -> Result<()> {
        let mut inner = self.lock();
        let post = inner
            .posts
            .get_mut(&post_id)
            .ok_or_else(|| ChattyError::InvalidPost(format!("post {} does not exist", post_id)))?;
        post.category = category;
        debug!("post store: post {} is now {}", post_id, category);
        self.announce(EventData::CategoryChange { post_id, category });
        Ok(())
    }

    pub fn get_post(&self, post_id: u64) -> Option<Post> {
        self.lock().posts.get(&post_id).cloned()
    }

    /// Bulk load without emitting events. Later ids continue after the highest
    /// loaded id. The batch is checked up front; a rejected batch leaves the
    /// store untouched.
    pub fn load_posts(&self, posts: Vec<Post>) -> Result<usize> {
        let mut next_id = 1;
        for post in &posts {
            if post.id == 0 {
                return Err(ChattyError::InvalidPost("post id 0".to_string()));
            }
            let after = post.id.checked_add(1).ok_or_else(|| {
                ChattyError::InvalidPost(format!("post id {} is out of range", post.id))
            })?;
            next_id = next_id.max(after);
        }

        let loaded = posts.len();
        let mut inner = self.lock();
        inner.next_id = inner.next_id.max(next_id);
        inner.posts.extend(posts.into_iter().map(|p| (p.id, p)));
        Ok(loaded)
    }

    /// Load a JSON array of posts (camelCase fields, see [`Post`]).
    pub async fn load_json_file(&self, path: &str) -> Result<usize> {
        let content = tokio::fs::read_to_string(path).await?;
        let posts: Vec<Post> = serde_json::from_str(&content)?;
        self.load_posts(posts)
    }

    pub fn len(&self) -> usize {
        self.lock().posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().posts.is_empty()
    }
}

impl PostStore for MemoryPostStore {
    fn newest_post_id(&self) -> Result<u64> {
        Ok(self.lock().next_id - 1)
    }

    fn post_range(&self, start_id: u64, count: usize, reverse: bool) -> Result<Vec<Post>> {
        if start_id == 0 {
            return Ok(Vec::new());
        }
        let inner = self.lock();
        let posts = if reverse {
            inner
                .posts
                .range(..=start_id)
                .rev()
                .take(count)
                .map(|(_, p)| p.clone())
                .collect()
        } else {
            inner
                .posts
                .range(start_id..)
                .take(count)
                .map(|(_, p)| p.clone())
                .collect()
        };
        Ok(posts)
    }
}
