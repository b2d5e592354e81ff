//! Error types for shelf-dl
//!
//! Transport and relocation failures are normally captured into a part's
//! `failed` flag by the coordinator and never reach callers. The variants are
//! still modelled here so transports, stores and retry policies share one
//! vocabulary. [`Error::EmptyItemRejected`] is the only failure `enqueue`
//! surfaces synchronously.

use crate::types::ItemId;
use thiserror::Error;

/// Result type alias for shelf-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for shelf-dl
#[derive(Debug, Error)]
pub enum Error {
    /// An item was enqueued without any parts
    #[error("item {id} has no parts to download")]
    EmptyItemRejected {
        /// The rejected item
        id: ItemId,
    },

    /// Transport-level failure (network, file write, unknown transfer id)
    #[error("transfer failed: {reason}")]
    TransferFailed {
        /// What went wrong
        reason: String,
    },

    /// The media server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        /// Response status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Moving a staged file into its final folder failed
    #[error("relocation failed: {reason}")]
    RelocationFailed {
        /// What went wrong
        reason: String,
    },

    /// A part signal arrived for an item that is no longer queued
    #[error("item {id} is no longer queued")]
    OwnerNotFound {
        /// The item the signal referred to
        id: ItemId,
    },

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent")
        key: Option<String>,
    },

    /// Queue persistence failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The coordinator has shut down and no longer accepts commands
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Operation not supported by this transport or collaborator
    #[error("not supported: {0}")]
    NotSupported(String),
}

impl Error {
    /// Shorthand for [`Error::TransferFailed`]
    pub fn transfer(reason: impl Into<String>) -> Self {
        Error::TransferFailed {
            reason: reason.into(),
        }
    }

    /// Status code of an [`Error::HttpStatus`]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Shorthand for [`Error::RelocationFailed`]
    pub fn relocation(reason: impl Into<String>) -> Self {
        Error::RelocationFailed {
            reason: reason.into(),
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// A stored row could not be decoded back into an item
    #[error("corrupt row for item {id}: {reason}")]
    CorruptRow {
        /// Key of the unreadable row
        id: String,
        /// Decoder message
        reason: String,
    },
}
