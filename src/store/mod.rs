//! # Post Store
//!
//! The contract the core needs from the authoritative post store, plus an
//! in-memory implementation that also acts as an event producer.
//!
//! The search index only reads through [`PostStore`]: the newest id and
//! contiguous id ranges (nuked posts included). Writes happen in the store and
//! are announced to the rest of the system as dispatcher events.

pub mod memory;

use crate::errors::Result;
use crate::event::Post;

pub use memory::MemoryPostStore;

pub trait PostStore: Send + Sync {
    /// Newest post id, or 0 when there are no posts. The newest post may be nuked.
    fn newest_post_id(&self) -> Result<u64>;

    /// Up to `count` posts starting at `start_id` and walking down (`reverse`) or
    /// up by id. Missing ids are skipped; fewer posts come back near either end.
    fn post_range(&self, start_id: u64, count: usize, reverse: bool) -> Result<Vec<Post>>;
}
