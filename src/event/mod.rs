//! # Event Model
//!
//! Immutable records of state changes, as they sit in the dispatcher's log and
//! as long-poll clients receive them.
//!
//! Wire shape (JSON):
//!
//! ```text
//! { "eventId": 7, "eventDate": "...", "eventType": "newPost",
//!   "eventData": { "postId": 12, "post": { ... }, "parentAuthor": "alice" } }
//! ```

pub mod post;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use post::{ModerationFlag, Post};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    NewPost,
    CategoryChange,
    ServerMessage,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::NewPost => "newPost",
            EventType::CategoryChange => "categoryChange",
            EventType::ServerMessage => "serverMessage",
        };
        f.write_str(name)
    }
}

/// Payload of an event; the variant determines the event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", content = "eventData", rename_all = "camelCase")]
pub enum EventData {
    #[serde(rename_all = "camelCase")]
    NewPost {
        post_id: u64,
        post: Post,
        /// Author of the parent post; empty for a thread root.
        parent_author: String,
    },
    #[serde(rename_all = "camelCase")]
    CategoryChange {
        post_id: u64,
        category: ModerationFlag,
    },
    ServerMessage { message: String },
}

impl EventData {
    pub fn event_type(&self) -> EventType {
        match self {
            EventData::NewPost { .. } => EventType::NewPost,
            EventData::CategoryChange { .. } => EventType::CategoryChange,
            EventData::ServerMessage { .. } => EventType::ServerMessage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Issued by the dispatcher, starting at 1. Never reused.
    pub event_id: u64,
    pub event_date: DateTime<Utc>,
    #[serde(flatten)]
    pub data: EventData,
}

impl Event {
    pub fn new(event_id: u64, data: EventData) -> Self {
        Self {
            event_id,
            event_date: Utc::now(),
            data,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.data.event_type()
    }
}
