//! Error types for the mention pipeline

use thiserror::Error;

/// Errors raised by a [`MentionStore`](crate::repository::MentionStore) write or read
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed (connection, query execution, etc.)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Mention rejected before reaching the database
    #[error("Invalid mention: {0}")]
    InvalidMention(String),
}

impl StoreError {
    /// Whether a retry of the same write has a chance of succeeding
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(sqlx_err) => matches!(
                sqlx_err,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            StoreError::InvalidMention(_) => false,
        }
    }
}

/// Errors returned by the bounded dispatcher
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// Shutdown has begun; the task was not enqueued
    #[error("dispatcher is shutting down, task rejected")]
    ShuttingDown,

    /// Queue at capacity (only from `try_submit`)
    #[error("dispatch queue is full")]
    QueueFull,
}

/// Errors from processing a single story message
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Payload is not a valid story event
    #[error("Failed to decode story event: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors surfaced by an event listener
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Broker unreachable: {0}")]
    Unreachable(String),

    #[error("Handler rejected message: {0}")]
    Handler(#[from] DispatchError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_store_errors() {
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(StoreError::Database(sqlx::Error::PoolClosed).is_transient());
        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_transient());
        assert!(!StoreError::InvalidMention("empty brand".to_string()).is_transient());
    }

    #[test]
    fn test_decode_error_message() {
        let err: ProcessError = serde_json::from_slice::<serde_json::Value>(b"{not json")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("Failed to decode story event"));
    }
}
