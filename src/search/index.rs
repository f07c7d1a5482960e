//! Inverted indexes over the working set of posts.

use std::collections::{HashMap, HashSet};

use super::markup::strip_tags;
use super::stemmer::distinct_stems;
use crate::errors::{ChattyError, Result};
use crate::event::{ModerationFlag, Post};

/// Denormalized copy of a post, owned by the index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedPost {
    pub post: Post,
    /// Lowercasing happens at key time; this keeps the original spelling.
    pub parent_author: String,
}

/// One complete generation of the index. A rebuild produces a fresh snapshot
/// and swaps it in whole.
///
/// Invariant: a post id is in `by_stem[s]` iff `s` is a stem of that post's
/// stripped body, and likewise for the author, parent-author and category maps.
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    posts: HashMap<u64, IndexedPost>,
    by_stem: HashMap<String, HashSet<u64>>,
    by_author: HashMap<String, HashSet<u64>>,
    by_parent_author: HashMap<String, HashSet<u64>>,
    by_category: HashMap<ModerationFlag, HashSet<u64>>,
    // Returned for any key that was never indexed.
    empty: HashSet<u64>,
}

fn body_stems(body: &str) -> Vec<String> {
    distinct_stems(&strip_tags(body))
}

fn remove_from(map: &mut HashMap<String, HashSet<u64>>, key: &str, id: u64) {
    if let Some(set) = map.get_mut(key) {
        set.remove(&id);
        if set.is_empty() {
            map.remove(key);
        }
    }
}

fn remove_category(
    map: &mut HashMap<ModerationFlag, HashSet<u64>>,
    category: ModerationFlag,
    id: u64,
) {
    if let Some(set) = map.get_mut(&category) {
        set.remove(&id);
        if set.is_empty() {
            map.remove(&category);
        }
    }
}

impl IndexSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a post under every distinct body stem, its author, its parent's
    /// author (empty for roots) and its category. Re-inserting an id replaces
    /// the earlier entry.
    pub fn insert(&mut self, post: Post, parent_author: String) -> Result<()> {
        if post.id == 0 {
            return Err(ChattyError::InvalidPost("post id 0".to_string()));
        }
        if self.posts.contains_key(&post.id) {
            self.remove(post.id);
        }
        let id = post.id;

        for stem in body_stems(&post.body) {
            self.by_stem.entry(stem).or_default().insert(id);
        }
        self.by_author
            .entry(post.author.to_lowercase())
            .or_default()
            .insert(id);
        self.by_parent_author
            .entry(parent_author.to_lowercase())
            .or_default()
            .insert(id);
        self.by_category.entry(post.category).or_default().insert(id);

        self.posts.insert(id, IndexedPost { post, parent_author });
        Ok(())
    }

    /// Drop a post and all of its index entries.
    pub fn remove(&mut self, post_id: u64) -> Option<IndexedPost> {
        let entry = self.posts.remove(&post_id)?;
        for stem in body_stems(&entry.post.body) {
            remove_from(&mut self.by_stem, &stem, post_id);
        }
        remove_from(&mut self.by_author, &entry.post.author.to_lowercase(), post_id);
        remove_from(
            &mut self.by_parent_author,
            &entry.parent_author.to_lowercase(),
            post_id,
        );
        remove_category(&mut self.by_category, entry.post.category, post_id);
        Some(entry)
    }

    /// Move an indexed post between category sets. Returns false if the post is
    /// not in this snapshot.
    pub fn set_category(&mut self, post_id: u64, category: ModerationFlag) -> bool {
        let Some(entry) = self.posts.get_mut(&post_id) else {
            return false;
        };
        let old = entry.post.category;
        entry.post.category = category;
        remove_category(&mut self.by_category, old, post_id);
        self.by_category.entry(category).or_default().insert(post_id);
        true
    }

    pub fn get(&self, post_id: u64) -> Option<&IndexedPost> {
        self.posts.get(&post_id)
    }

    pub fn ids_for_stem(&self, stem: &str) -> &HashSet<u64> {
        self.by_stem.get(stem).unwrap_or(&self.empty)
    }

    pub fn ids_for_author(&self, author: &str) -> &HashSet<u64> {
        self.by_author
            .get(&author.to_lowercase())
            .unwrap_or(&self.empty)
    }

    pub fn ids_for_parent_author(&self, parent_author: &str) -> &HashSet<u64> {
        self.by_parent_author
            .get(&parent_author.to_lowercase())
            .unwrap_or(&self.empty)
    }

    pub fn ids_for_category(&self, category: ModerationFlag) -> &HashSet<u64> {
        self.by_category.get(&category).unwrap_or(&self.empty)
    }

    /// An always-empty candidate set.
    pub fn no_ids(&self) -> &HashSet<u64> {
        &self.empty
    }

    /// Up to `count` indexed ids, newest (highest) first.
    pub fn newest_ids(&self, count: usize) -> Vec<u64> {
        let mut ids: Vec<u64> = self.posts.keys().copied().collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.truncate(count);
        ids
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}
