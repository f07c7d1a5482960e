//! # chattyd - Event Distribution and Search Core for a Threaded Discussion Board
//!
//! chattyd is the part of a chatty-style board backend that has real concurrency
//! and memory-bound concerns: the in-process event log with long-poll fan-out,
//! and the incremental search index that follows it.
//!
//! ## Features
//!
//! - **Ordered Events**: Ids issued in call order; each event is fully handled before the next.
//! - **Long-Poll Fan-out**: Waiters resolve exactly once, with the next event or after a timeout.
//! - **Bounded History**: The event log prunes with hysteresis and flags stale client bookmarks.
//! - **Incremental Search**: Stem, author, parent-author and category indexes kept current from the event stream.
//! - **Bounded Index**: Eviction rebuilds a fresh snapshot from the newest posts and swaps it in.
//! - **Async Design**: Built on Tokio; producers never block on subscribers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chattyd::config::Config;
//! use chattyd::dispatch::Dispatcher;
//! use chattyd::search::{SearchIndex, SearchQuery};
//! use chattyd::store::MemoryPostStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("chattyd.toml").await?;
//!
//!     let dispatcher = Dispatcher::new(config.dispatcher.clone())?;
//!     let store = MemoryPostStore::new(dispatcher.clone());
//!     let index = Arc::new(SearchIndex::new(config.search.clone())?);
//!     index.start(&store)?;
//!     dispatcher.subscribe(index.clone());
//!     dispatcher.start()?;
//!
//!     store.post_comment("alice", 0, "hello world")?;
//!     let events = dispatcher.wait_for_event(0).await?;
//!     let hits = index.search(&SearchQuery::terms("hello"));
//!     println!("{} events, {} hits", events.len(), hits.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`dispatch`] - Event log, long-poll waiters and subscriber fan-out
//! - [`search`] - Inverted indexes, stemming and queries
//! - [`store`] - Post store contract and the in-memory store
//! - [`event`] - Event and post data model
//! - [`config`] - Configuration loading and validation
//! - [`errors`] - Error taxonomy and client error codes
//! - [`metrics`] - Process-wide counters
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Post Store     │ ← post_comment / set_post_category
//! └─────────────────┘
//!          │ send_event
//! ┌─────────────────┐
//! │  Dispatcher     │ ← log + waiters, one worker task
//! └─────────────────┘
//!          │ on_event (in id order)
//! ┌─────────────────┐
//! │  Search Index   │ ← snapshot swapped on eviction
//! └─────────────────┘
//! ```

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod event;
pub mod logutil;
pub mod metrics;
pub mod search;
pub mod store;

pub use errors::{ChattyError, Result};
