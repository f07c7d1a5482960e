use thiserror::Error;

/// Errors surfaced by the dispatcher, the search index and the post store.
#[derive(Debug, Error)]
pub enum ChattyError {
    /// The client's long-poll bookmark fell out of the retained event window.
    /// The client has to resynchronize from a full fetch.
    #[error("You have requested too many events (last seen #{requested}, oldest retained #{oldest}).")]
    TooManyEvents { requested: u64, oldest: u64 },

    /// Rejected at construction time; the component must not start.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Bad caller-supplied arguments (search criteria, limits).
    #[error("invalid argument: {0}")]
    Argument(String),

    /// The post does not exist or is malformed.
    #[error("invalid post: {0}")]
    InvalidPost(String),

    /// Replying to a parent that does not exist.
    #[error("parent post #{0} does not exist")]
    InvalidParent(u64),

    /// The dispatcher worker has been shut down; nothing more can be sent.
    #[error("dispatcher is not running")]
    DispatcherStopped,

    /// `start` was called twice on the same dispatcher.
    #[error("dispatcher already started")]
    AlreadyStarted,

    /// Wrapper around IO errors (reading post dumps, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapper around JSON (de)serialization errors.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChattyError {
    /// Stable error code reported to HTTP clients.
    pub fn code(&self) -> &'static str {
        match self {
            ChattyError::TooManyEvents { .. } => "ERR_TOO_MANY_EVENTS",
            ChattyError::Argument(_) => "ERR_ARGUMENT",
            ChattyError::InvalidPost(_) => "ERR_INVALID_POST",
            ChattyError::InvalidParent(_) => "ERR_INVALID_PARENT",
            ChattyError::Config(_)
            | ChattyError::DispatcherStopped
            | ChattyError::AlreadyStarted
            | ChattyError::Io(_)
            | ChattyError::Json(_) => "ERR_SERVER",
        }
    }

    /// True when the client must throw away its state and start over.
    pub fn requires_resync(&self) -> bool {
        matches!(self, ChattyError::TooManyEvents { .. })
    }
}

pub type Result<T> = std::result::Result<T, ChattyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_client_contract() {
        let stale = ChattyError::TooManyEvents {
            requested: 500,
            oldest: 9001,
        };
        assert_eq!(stale.code(), "ERR_TOO_MANY_EVENTS");
        assert!(stale.requires_resync());
        assert_eq!(ChattyError::Config("x".into()).code(), "ERR_SERVER");
        assert_eq!(ChattyError::InvalidParent(4).code(), "ERR_INVALID_PARENT");
        assert!(!ChattyError::DispatcherStopped.requires_resync());
    }
}
