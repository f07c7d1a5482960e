//! # Search Index
//!
//! Incremental, memory-bounded full-text and attribute index over the newest
//! posts. It is fed by the dispatcher (it implements [`EventSubscriber`]) and
//! seeded at startup from a [`PostStore`].
//!
//! ## Components
//!
//! - [`stemmer`] - token to stem
//! - [`markup`] - HTML tag stripping ahead of tokenizing
//! - [`index`] - the four inverted indexes plus the post map
//!
//! ## Eviction
//!
//! When the index reaches `max_posts` posts, the newest `prune_posts` survive and
//! everything is rebuilt from them into a fresh [`IndexSnapshot`], which then
//! replaces the old one in a single write. Queries see either generation, never
//! a half-built one.
//!
//! ## Queries
//!
//! Each criterion becomes a candidate id set; sets are intersected smallest
//! first, ordered by id, filtered for posts that are currently nuked, then
//! paged with offset/limit.

pub mod index;
pub mod markup;
pub mod stemmer;

use log::{debug, info, trace, warn};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use crate::config::SearchConfig;
use crate::dispatch::EventSubscriber;
use crate::errors::{ChattyError, Result};
use crate::event::{Event, EventData, ModerationFlag, Post};
use crate::logutil::preview;
use crate::metrics;
use crate::store::PostStore;

pub use index::{IndexSnapshot, IndexedPost};

pub const DEFAULT_LIMIT: usize = 35;
pub const MAX_LIMIT: usize = 500;

/// Search criteria. Unset criteria are ignored; at least one must be set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub terms: Option<String>,
    pub author: Option<String>,
    pub parent_author: Option<String>,
    pub category: Option<ModerationFlag>,
    pub offset: usize,
    pub limit: usize,
    pub oldest_first: bool,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            terms: None,
            author: None,
            parent_author: None,
            category: None,
            offset: 0,
            limit: DEFAULT_LIMIT,
            oldest_first: false,
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl SearchQuery {
    pub fn terms(terms: &str) -> Self {
        Self {
            terms: non_empty(terms),
            ..Self::default()
        }
    }

    pub fn author(author: &str) -> Self {
        Self {
            author: non_empty(author),
            ..Self::default()
        }
    }

    pub fn parent_author(parent_author: &str) -> Self {
        Self {
            parent_author: non_empty(parent_author),
            ..Self::default()
        }
    }

    pub fn category(category: ModerationFlag) -> Self {
        Self {
            category: Some(category),
            ..Self::default()
        }
    }

    pub fn with_terms(mut self, terms: &str) -> Self {
        self.terms = non_empty(terms);
        self
    }

    pub fn with_author(mut self, author: &str) -> Self {
        self.author = non_empty(author);
        self
    }

    pub fn with_parent_author(mut self, parent_author: &str) -> Self {
        self.parent_author = non_empty(parent_author);
        self
    }

    pub fn with_category(mut self, category: ModerationFlag) -> Self {
        self.category = Some(category);
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn oldest_first(mut self, oldest_first: bool) -> Self {
        self.oldest_first = oldest_first;
        self
    }

    pub fn has_criteria(&self) -> bool {
        self.terms.is_some()
            || self.author.is_some()
            || self.parent_author.is_some()
            || self.category.is_some()
    }

    /// Caller-side checks done before a query reaches the index.
    pub fn validate(&self) -> Result<()> {
        if !self.has_criteria() {
            return Err(ChattyError::Argument(
                "At least one of [terms, author, parentAuthor, category] must be specified."
                    .to_string(),
            ));
        }
        if self.category == Some(ModerationFlag::Nuked) {
            return Err(ChattyError::Argument(
                "category cannot be \"nuked\".".to_string(),
            ));
        }
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(ChattyError::Argument(format!(
                "limit must be between 1 and {}",
                MAX_LIMIT
            )));
        }
        Ok(())
    }
}

pub struct SearchIndex {
    config: SearchConfig,
    snapshot: RwLock<IndexSnapshot>,
    // Serializes writers (live events, backfill); readers only take `snapshot`.
    ingest: Mutex<()>,
}

impl SearchIndex {
    pub fn new(config: SearchConfig) -> Result<Self> {
        config.validate().map_err(ChattyError::Config)?;
        Ok(Self {
            config,
            snapshot: RwLock::new(IndexSnapshot::new()),
            ingest: Mutex::new(()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexSnapshot> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexSnapshot> {
        self.snapshot.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed the index with the newest `max_posts` posts from the store.
    /// Run this before the dispatcher starts delivering live events.
    pub fn start(&self, store: &dyn PostStore) -> Result<usize> {
        info!("search index: loading initial posts...");
        let newest = store.newest_post_id()?;
        if newest == 0 {
            info!("search index: ready (no posts)");
            return Ok(0);
        }

        // Read newest-first, then replay oldest-first.
        let posts = store.post_range(newest, self.config.max_posts, true)?;
        let authors: HashMap<u64, &str> = posts
            .iter()
            .map(|p| (p.id, p.author.as_str()))
            .collect();

        let _guard = self.ingest.lock().unwrap_or_else(PoisonError::into_inner);
        for post in posts.iter().rev() {
            let parent_author = authors
                .get(&post.parent_id)
                .map(|a| a.to_string())
                .unwrap_or_default();
            self.ingest_post(post.clone(), parent_author);
        }
        let indexed = self.len();
        info!("search index: ready ({} posts indexed)", indexed);
        Ok(indexed)
    }

    /// Apply one dispatcher event. Never fails the caller; bad posts are logged
    /// and skipped.
    pub fn on_new_event(&self, event: &Event) {
        let _guard = self.ingest.lock().unwrap_or_else(PoisonError::into_inner);
        match &event.data {
            EventData::NewPost {
                post_id,
                post,
                parent_author,
            } => {
                if *post_id != post.id {
                    warn!(
                        "search index: event #{} names post {} but carries post {}",
                        event.event_id, post_id, post.id
                    );
                }
                self.ingest_post(post.clone(), parent_author.clone());
            }
            EventData::CategoryChange { post_id, category } => {
                if !self.write().set_category(*post_id, *category) {
                    trace!(
                        "search index: category change for unindexed post {} ignored",
                        post_id
                    );
                }
            }
            EventData::ServerMessage { .. } => {}
        }
    }

    // Caller holds `ingest`.
    fn ingest_post(&self, post: Post, parent_author: String) {
        let post_id = post.id;
        let body = preview(&post.body);
        let count = {
            let mut snapshot = self.write();
            if let Err(e) = snapshot.insert(post, parent_author) {
                metrics::inc_posts_skipped();
                warn!("search index: skipping post {}: {} ({})", post_id, e, body);
                return;
            }
            snapshot.len()
        };
        if count >= self.config.max_posts {
            self.reindex();
        }
    }

    // Caller holds `ingest`, so the snapshot cannot change under us between the
    // read and the swap.
    fn reindex(&self) {
        info!("search index: starting reindex...");
        let started = Instant::now();
        let fresh = {
            let current = self.read();
            let survivors = current.newest_ids(self.config.prune_posts);
            let kept: HashSet<u64> = survivors.iter().copied().collect();
            let mut fresh = IndexSnapshot::new();
            for id in survivors.iter().rev() {
                let Some(entry) = current.get(*id) else { continue };
                // Parents outside the surviving window are unknown.
                let parent_author = if kept.contains(&entry.post.parent_id) {
                    current
                        .get(entry.post.parent_id)
                        .map(|p| p.post.author.clone())
                        .unwrap_or_default()
                } else {
                    String::new()
                };
                if let Err(e) = fresh.insert(entry.post.clone(), parent_author) {
                    metrics::inc_posts_skipped();
                    warn!("search index: reindex skipped post {}: {}", id, e);
                }
            }
            fresh
        };
        let kept = fresh.len();
        *self.write() = fresh;
        metrics::inc_reindexes();
        info!(
            "search index: reindex finished ({} posts kept in {:?})",
            kept,
            started.elapsed()
        );
    }

    /// Run a query. See the module docs for the evaluation order.
    pub fn search(&self, query: &SearchQuery) -> Vec<Post> {
        metrics::inc_searches();
        let snapshot = self.read();

        let mut candidates: Vec<&HashSet<u64>> = Vec::new();
        if let Some(terms) = &query.terms {
            let stems = stemmer::distinct_stems(terms);
            if stems.is_empty() {
                candidates.push(snapshot.no_ids());
            }
            for stem in &stems {
                candidates.push(snapshot.ids_for_stem(stem));
            }
        }
        if let Some(author) = &query.author {
            candidates.push(snapshot.ids_for_author(author));
        }
        if let Some(parent_author) = &query.parent_author {
            candidates.push(snapshot.ids_for_parent_author(parent_author));
        }
        if let Some(category) = query.category {
            candidates.push(snapshot.ids_for_category(category));
        }
        if candidates.is_empty() {
            return Vec::new();
        }

        candidates.sort_by_key(|set| set.len());
        let (smallest, rest) = candidates.split_at(1);
        let mut ids: Vec<u64> = smallest[0]
            .iter()
            .copied()
            .filter(|id| rest.iter().all(|set| set.contains(id)))
            .collect();

        if query.oldest_first {
            ids.sort_unstable();
        } else {
            ids.sort_unstable_by(|a, b| b.cmp(a));
        }

        let results: Vec<Post> = ids
            .into_iter()
            .filter_map(|id| snapshot.get(id))
            .filter(|entry| entry.post.category != ModerationFlag::Nuked)
            .skip(query.offset)
            .take(query.limit)
            .map(|entry| entry.post.clone())
            .collect();
        debug!(
            "search: terms={:?} author={:?} parent_author={:?} category={:?} -> {} results",
            query.terms.as_deref().map(preview),
            query.author,
            query.parent_author,
            query.category,
            results.len()
        );
        results
    }

    /// Number of posts currently indexed.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }
}

impl EventSubscriber for SearchIndex {
    fn name(&self) -> &str {
        "search-index"
    }

    fn on_event(&self, event: &Event) -> anyhow::Result<()> {
        self.on_new_event(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn new_post_event(id: u64, parent_id: u64, author: &str, parent_author: &str, body: &str) -> Event {
        Event::new(
            id,
            EventData::NewPost {
                post_id: id,
                post: Post {
                    id,
                    thread_id: if parent_id == 0 { id } else { parent_id },
                    parent_id,
                    author: author.to_string(),
                    category: ModerationFlag::OnTopic,
                    date: Utc::now(),
                    body: body.to_string(),
                },
                parent_author: parent_author.to_string(),
            },
        )
    }

    fn index(max: usize, prune: usize) -> SearchIndex {
        SearchIndex::new(SearchConfig {
            max_posts: max,
            prune_posts: prune,
        })
        .unwrap()
    }

    fn ids(posts: &[Post]) -> Vec<u64> {
        posts.iter().map(|p| p.id).collect()
    }

    #[test]
    fn prune_must_be_below_max() {
        let err = SearchIndex::new(SearchConfig {
            max_posts: 10,
            prune_posts: 10,
        })
        .err()
        .expect("config error");
        assert!(matches!(err, ChattyError::Config(_)));
    }

    #[test]
    fn criteria_intersect() {
        let idx = index(100, 50);
        idx.on_new_event(&new_post_event(1, 0, "Alice", "", "hello world"));
        idx.on_new_event(&new_post_event(2, 1, "bob", "Alice", "hello there"));

        assert_eq!(ids(&idx.search(&SearchQuery::terms("hello"))), vec![2, 1]);
        assert_eq!(ids(&idx.search(&SearchQuery::author("alice"))), vec![1]);
        assert_eq!(
            ids(&idx.search(&SearchQuery::terms("hello").with_author("Alice"))),
            vec![1]
        );
        assert_eq!(ids(&idx.search(&SearchQuery::parent_author("ALICE"))), vec![2]);
        assert!(idx.search(&SearchQuery::author("carol")).is_empty());
        // Every term must match.
        assert!(idx.search(&SearchQuery::terms("hello nobody")).is_empty());
    }

    #[test]
    fn paging_and_ordering() {
        let idx = index(100, 50);
        for id in 1..=5 {
            idx.on_new_event(&new_post_event(id, 0, "eve", "", "same words"));
        }
        let q = SearchQuery::author("eve").page(1, 2);
        assert_eq!(ids(&idx.search(&q)), vec![4, 3]);
        assert_eq!(ids(&idx.search(&q.clone().oldest_first(true))), vec![2, 3]);
        assert!(idx.search(&SearchQuery::author("eve").page(10, 5)).is_empty());
    }

    #[test]
    fn nuked_posts_are_filtered_at_query_time() {
        let idx = index(100, 50);
        idx.on_new_event(&new_post_event(1, 0, "frank", "", "secret plans"));
        idx.on_new_event(&Event::new(
            2,
            EventData::CategoryChange {
                post_id: 1,
                category: ModerationFlag::Nuked,
            },
        ));
        assert!(idx.search(&SearchQuery::terms("secret")).is_empty());
        assert!(idx.search(&SearchQuery::category(ModerationFlag::OnTopic)).is_empty());
        // Unknown posts are ignored.
        idx.on_new_event(&Event::new(
            3,
            EventData::CategoryChange {
                post_id: 77,
                category: ModerationFlag::Stupid,
            },
        ));
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn punctuation_only_terms_match_nothing() {
        let idx = index(100, 50);
        idx.on_new_event(&new_post_event(1, 0, "gina", "", "text"));
        assert!(idx.search(&SearchQuery::terms("?!").with_author("gina")).is_empty());
    }

    #[test]
    fn validate_rejects_bad_queries() {
        assert!(SearchQuery::default().validate().is_err());
        assert!(SearchQuery::terms("   ").validate().is_err());
        assert!(SearchQuery::category(ModerationFlag::Nuked).validate().is_err());
        assert!(SearchQuery::terms("x").page(0, 0).validate().is_err());
        assert!(SearchQuery::terms("x").page(0, 501).validate().is_err());
        assert!(SearchQuery::terms("x").validate().is_ok());
    }
}
