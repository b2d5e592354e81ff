//! Core types for shelf-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Stable identifier of a library item (book or podcast episode)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Create a new ItemId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of one part: owning item plus the part's index inside it
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartKey {
    /// Owning item
    pub item_id: ItemId,
    /// Position of the part within the item
    pub index: usize,
}

impl PartKey {
    /// Create a new PartKey
    pub fn new(item_id: ItemId, index: usize) -> Self {
        Self { item_id, index }
    }
}

impl std::fmt::Display for PartKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.item_id, self.index)
    }
}

/// Which transfer strategy moves a part's bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Bytes are streamed straight into the final file
    Direct,
    /// An OS-level facility downloads into staging; the file is relocated afterwards
    Managed,
}

impl TransportKind {
    /// Whether the progress watcher polls this transport for status
    pub fn is_polled(&self) -> bool {
        matches!(self, TransportKind::Managed)
    }

    /// Whether a completed transfer still has to be moved into place
    pub fn requires_relocation(&self) -> bool {
        matches!(self, TransportKind::Managed)
    }
}

/// State of a single part
///
/// ```text
/// Pending -> Downloading -> Completed            (direct, terminal)
///                        -> Completed -> Moving -> Moved | Failed   (managed)
///                        -> Failed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartState {
    /// Waiting for a free slot
    Pending,
    /// Transfer in flight
    Downloading,
    /// Bytes are on disk (terminal for direct transfers)
    Completed,
    /// Staged file is being relocated into its folder
    Moving,
    /// Relocation finished
    Moved,
    /// Transfer or relocation failed
    Failed,
}

/// Reference to the user-visible folder an item downloads into
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRef {
    /// Library folder identifier reported back in completion payloads
    pub id: String,
    /// On-device location of the folder
    pub path: PathBuf,
}

impl FolderRef {
    /// Create a new FolderRef
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }
}

/// One physical file transfer belonging to a [`DownloadItem`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadItemPart {
    /// Owning item
    pub item_id: ItemId,
    /// Position within the item; parts start in index order
    pub index: usize,
    /// Resolved source URL
    pub source_url: Url,
    /// File name in the destination folder
    pub filename: String,
    /// Folder the finished file lands in
    pub destination_dir: PathBuf,
    /// Transfer strategy
    pub transport: TransportKind,
    /// Transport-specific transfer id, set while a transfer is live
    #[serde(default)]
    pub transfer_id: Option<String>,
    /// Progress 0..=100, never decreasing while downloading
    #[serde(default)]
    pub progress_percent: u8,
    /// Bytes received so far
    #[serde(default)]
    pub bytes_downloaded: u64,
    /// Expected size when the transport knows it
    #[serde(default)]
    pub total_bytes: Option<u64>,
    /// Current state
    #[serde(default = "pending")]
    pub state: PartState,
    /// Set together with [`PartState::Failed`]
    #[serde(default)]
    pub failed: bool,
    /// Number of retries already spent on this part
    #[serde(default)]
    pub attempts: u32,
    /// Final on-device path once the file is in place
    #[serde(default)]
    pub final_path: Option<PathBuf>,
}

fn pending() -> PartState {
    PartState::Pending
}

impl DownloadItemPart {
    /// Address of this part
    pub fn key(&self) -> PartKey {
        PartKey::new(self.item_id.clone(), self.index)
    }

    /// Where the file is expected to end up
    pub fn destination_path(&self) -> PathBuf {
        self.destination_dir.join(&self.filename)
    }
}

/// One user-requested download unit (a book or an episode)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadItem {
    /// Stable unique id
    pub id: ItemId,
    /// Display title
    pub title: String,
    /// Target folder
    pub folder: FolderRef,
    /// Ordered parts (audio tracks, cover image)
    pub parts: Vec<DownloadItemPart>,
}

impl DownloadItem {
    /// Create an item with no parts yet
    pub fn new(id: impl Into<ItemId>, title: impl Into<String>, folder: FolderRef) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            folder,
            parts: Vec::new(),
        }
    }

    /// Append a part that downloads into the item's folder
    pub fn with_part(
        mut self,
        source_url: Url,
        filename: impl Into<String>,
        transport: TransportKind,
    ) -> Self {
        let index = self.parts.len();
        self.parts.push(DownloadItemPart {
            item_id: self.id.clone(),
            index,
            source_url,
            filename: filename.into(),
            destination_dir: self.folder.path.clone(),
            transport,
            transfer_id: None,
            progress_percent: 0,
            bytes_downloaded: 0,
            total_bytes: None,
            state: PartState::Pending,
            failed: false,
            attempts: 0,
            final_path: None,
        });
        self
    }

    /// True once every part has reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.parts.iter().all(DownloadItemPart::is_terminal)
    }

    /// Number of parts that ended in failure
    pub fn failed_parts(&self) -> usize {
        self.parts.iter().filter(|p| p.failed).count()
    }
}

/// Payload emitted once per finished item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionPayload {
    /// Finished item
    pub item_id: ItemId,
    /// Library folder id the files landed in
    pub folder_id: String,
    /// Item title
    pub title: String,
    /// Parts that failed (0 = full success)
    pub failed_parts: usize,
    /// Result of the library scan, if the scanner produced one
    pub scan_result: Option<serde_json::Value>,
}

impl CompletionPayload {
    /// Whether every part of the item succeeded
    pub fn succeeded(&self) -> bool {
        self.failed_parts == 0
    }
}

/// Text and percentage for the foreground notification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Human readable line
    pub content: String,
    /// Overall progress 0..=100
    pub percent: u8,
}

/// Per-session completion tally, reset after each summary
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    /// Items that finished with no failed parts
    pub completed: u32,
    /// Items that finished with at least one failed part
    pub failed: u32,
    /// Title of the most recently finished item
    pub last_completed_title: Option<String>,
}

impl SessionCounters {
    /// Whether anything finished since the last reset
    pub fn is_empty(&self) -> bool {
        self.completed == 0 && self.failed == 0
    }
}

/// Final summary emitted when the queue drains
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionSummary {
    /// Exactly one item finished this session
    Single {
        /// Its title
        title: String,
        /// Whether it finished without failed parts
        success: bool,
    },
    /// Several items finished this session
    Multiple {
        /// Items without failures
        completed: u32,
        /// Items with at least one failed part
        failed: u32,
    },
}

/// Point-in-time view of the coordinator
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Queued items in FIFO order
    pub items: Vec<DownloadItem>,
    /// Parts currently holding a slot
    pub active_parts: Vec<PartKey>,
    /// Session tally
    pub counters: SessionCounters,
}

/// Event emitted by the download engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Item accepted into the queue
    ItemQueued {
        /// The queued item
        item: DownloadItem,
    },

    /// A part changed state or progress
    PartUpdate {
        /// Current part data
        part: DownloadItemPart,
    },

    /// An item finished (successfully or with failed parts)
    ItemComplete(CompletionPayload),

    /// An item was cancelled and removed
    Cancelled {
        /// The removed item
        item_id: ItemId,
    },

    /// Foreground notification content changed
    Notification(Notification),

    /// The queue drained; aggregate result for this session
    Summary(SessionSummary),

    /// The coordinator stopped
    Shutdown,
}
