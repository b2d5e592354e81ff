//! # shelf-dl
//!
//! Background download engine for audiobook and podcast clients.
//!
//! ## Design Philosophy
//!
//! shelf-dl is designed to be:
//! - **Bounded** - A global slot limit caps concurrent part transfers across all items
//! - **Durable** - The queue survives restarts and is re-queued on startup
//! - **Library-first** - No CLI or UI; hosts plug in transports, storage and a notification host
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! An item (a book or episode) is made of parts. Each part is fetched either
//! by streaming straight into its folder ([`transport::DirectTransport`]) or by
//! handing it to an out-of-process facility and relocating the staged file
//! afterwards ([`transport::ManagedTransport`]).
//!
//! ## Quick Start
//!
//! ```no_run
//! use shelf_dl::db::Database;
//! use shelf_dl::storage::FsStorageMover;
//! use shelf_dl::transport::TransportSet;
//! use shelf_dl::types::{DownloadItem, FolderRef, TransportKind};
//! use shelf_dl::{Collaborators, Config, DownloadCoordinator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let store = Arc::new(Database::new(&config.persistence.database_path).await?);
//!     let transports = TransportSet::http(&config.transport, Arc::new(FsStorageMover))?;
//!
//!     let coordinator =
//!         DownloadCoordinator::start(config, Collaborators::new(transports, store)).await?;
//!
//!     // Subscribe to events
//!     let mut events = coordinator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let book = DownloadItem::new("li_42", "Dune", FolderRef::new("fold_1", "/books/Dune"))
//!         .with_part("https://abs.example/a/1.m4b".parse()?, "1.m4b", TransportKind::Direct)
//!         .with_part("https://abs.example/a/cover.jpg".parse()?, "cover.jpg", TransportKind::Managed);
//!     coordinator.enqueue(book).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Download coordinator (decomposed into focused submodules)
pub mod coordinator;
/// Durable queue persistence
pub mod db;
/// Error types
pub mod error;
/// Foreground process host
pub mod host;
/// Notification content projection
pub mod notification;
/// Post-download library scan
pub mod post_processing;
/// Retry policy for failed parts
pub mod retry;
/// Moving files into item folders
pub mod storage;
/// Part state machine
pub mod tracker;
/// Direct and managed transports
pub mod transport;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, PersistenceConfig, RetryConfig, TransportConfig};
pub use coordinator::{Collaborators, DownloadCoordinator};
pub use db::{Database, MemoryQueueStore, QueueStore};
pub use error::{DatabaseError, Error, Result};
pub use host::{BackgroundHost, NoOpHost};
pub use post_processing::{LibraryScanner, NoOpLibraryScanner, ScanResult};
pub use retry::{BackoffRetry, NoRetry, RetryPolicy};
pub use types::{
    CompletionPayload, DownloadItem, DownloadItemPart, Event, FolderRef, ItemId, Notification,
    PartKey, PartState, QueueSnapshot, SessionCounters, SessionSummary, TransportKind,
};
