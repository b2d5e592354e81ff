//! Shared fakes for coordinator tests.
//!
//! [`FakeTransport`] records every start and abort and lets a test drive each
//! part by hand: direct parts through their [`PartReporter`], managed parts
//! through the status the next poll returns.

use crate::config::Config;
use crate::coordinator::{Collaborators, DownloadCoordinator};
use crate::db::MemoryQueueStore;
use crate::error::{Error, Result};
use crate::host::BackgroundHost;
use crate::post_processing::{LibraryScanner, ScanResult};
use crate::storage::StorageMover;
use crate::transport::{
    DownloadFacility, FacilityId, FacilityRequest, FacilityState, FacilityStatus, PartReporter,
    PartRequest, PollStatus, TransferHandle, Transport, TransportSet,
};
use crate::types::{
    DownloadItem, DownloadItemPart, Event, FolderRef, ItemId, Notification, PartKey, QueueSnapshot,
    TransportKind,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Semaphore, broadcast};
use tokio_util::sync::CancellationToken;
use url::Url;

/// How long any wait in a test may take before it fails
pub(crate) const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct FakeState {
    started: Vec<PartKey>,
    aborted: Vec<PartKey>,
    reporters: HashMap<PartKey, PartReporter>,
    urls: HashMap<PartKey, Url>,
    handles: HashMap<String, PartKey>,
    statuses: HashMap<PartKey, PollStatus>,
    polls: HashMap<PartKey, usize>,
    failing_starts: Vec<PartKey>,
    failing_relocations: Vec<PartKey>,
}

/// Scripted [`Transport`]
pub(crate) struct FakeTransport {
    kind: TransportKind,
    state: Mutex<FakeState>,
    next_id: AtomicI64,
    relocation_gate: Option<Arc<Semaphore>>,
}

impl FakeTransport {
    pub(crate) fn new(kind: TransportKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            state: Mutex::new(FakeState::default()),
            next_id: AtomicI64::new(1),
            relocation_gate: None,
        })
    }

    /// Managed transport whose relocations wait for [`release_relocations`](Self::release_relocations)
    pub(crate) fn with_held_relocations() -> Arc<Self> {
        Arc::new(Self {
            kind: TransportKind::Managed,
            state: Mutex::new(FakeState::default()),
            next_id: AtomicI64::new(1),
            relocation_gate: Some(Arc::new(Semaphore::new(0))),
        })
    }

    pub(crate) fn release_relocations(&self, count: usize) {
        if let Some(gate) = &self.relocation_gate {
            gate.add_permits(count);
        }
    }

    pub(crate) fn started(&self) -> Vec<PartKey> {
        self.state.lock().unwrap().started.clone()
    }

    pub(crate) fn aborted(&self) -> Vec<PartKey> {
        self.state.lock().unwrap().aborted.clone()
    }

    pub(crate) fn polls(&self, key: &PartKey) -> usize {
        self.state.lock().unwrap().polls.get(key).copied().unwrap_or(0)
    }

    pub(crate) fn fail_start(&self, key: &PartKey) {
        self.state.lock().unwrap().failing_starts.push(key.clone());
    }

    pub(crate) fn fail_relocation(&self, key: &PartKey) {
        self.state.lock().unwrap().failing_relocations.push(key.clone());
    }

    /// Report progress for a started part
    pub(crate) fn progress(&self, key: &PartKey, bytes: u64, total: u64) {
        let mut state = self.state.lock().unwrap();
        match self.kind {
            TransportKind::Direct => {
                let percent = crate::tracker::percent_of(bytes, Some(total));
                state.reporters[key].progress(bytes, Some(total), percent);
            }
            TransportKind::Managed => {
                state.statuses.insert(
                    key.clone(),
                    PollStatus::Progress {
                        bytes_so_far: bytes,
                        total_bytes: Some(total),
                    },
                );
            }
        }
    }

    /// Finish the transfer of a started part
    pub(crate) fn complete(&self, key: &PartKey) {
        let mut state = self.state.lock().unwrap();
        match self.kind {
            TransportKind::Direct => state.reporters[key].completed(100),
            TransportKind::Managed => {
                state
                    .statuses
                    .insert(key.clone(), PollStatus::Completed { bytes: 100 });
            }
        }
    }

    /// Fail the transfer of a started part
    pub(crate) fn fail(&self, key: &PartKey, reason: &str) {
        let mut state = self.state.lock().unwrap();
        match self.kind {
            TransportKind::Direct => state.reporters[key].failed(Error::transfer(reason)),
            TransportKind::Managed => {
                state.statuses.insert(
                    key.clone(),
                    PollStatus::Failed {
                        reason: reason.to_string(),
                        http_status: None,
                    },
                );
            }
        }
    }

    /// Fail a started part the way a non-success server answer does
    pub(crate) fn fail_http(&self, key: &PartKey, status: u16) {
        let mut state = self.state.lock().unwrap();
        let url = state.urls[key].to_string();
        match self.kind {
            TransportKind::Direct => {
                state.reporters[key].failed(Error::HttpStatus { status, url });
            }
            TransportKind::Managed => {
                state.statuses.insert(
                    key.clone(),
                    PollStatus::Failed {
                        reason: format!("HTTP {} for {}", status, url),
                        http_status: Some(status),
                    },
                );
            }
        }
    }

    fn key_for(&self, handle: &TransferHandle) -> Option<PartKey> {
        self.state
            .lock()
            .unwrap()
            .handles
            .get(&handle.transfer_id())
            .cloned()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn start(&self, request: &PartRequest, reporter: PartReporter) -> Result<TransferHandle> {
        let mut state = self.state.lock().unwrap();
        state.started.push(request.key.clone());
        if state.failing_starts.contains(&request.key) {
            return Err(Error::transfer("refused by fake"));
        }

        let handle = match self.kind {
            TransportKind::Direct => TransferHandle::Stream {
                token: CancellationToken::new(),
                path: request.destination_path(),
            },
            TransportKind::Managed => {
                TransferHandle::Facility(FacilityId(self.next_id.fetch_add(1, Ordering::Relaxed)))
            }
        };
        state.handles.insert(handle.transfer_id(), request.key.clone());
        state.reporters.insert(request.key.clone(), reporter);
        state
            .urls
            .insert(request.key.clone(), request.source_url.clone());
        state.statuses.insert(
            request.key.clone(),
            PollStatus::Progress {
                bytes_so_far: 0,
                total_bytes: Some(100),
            },
        );
        Ok(handle)
    }

    async fn poll(&self, handle: &TransferHandle) -> Result<PollStatus> {
        if self.kind == TransportKind::Direct {
            return Err(Error::NotSupported("direct fake is not polled".into()));
        }
        let key = self
            .key_for(handle)
            .ok_or_else(|| Error::transfer("unknown transfer id"))?;
        let mut state = self.state.lock().unwrap();
        *state.polls.entry(key.clone()).or_default() += 1;
        state
            .statuses
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::transfer("unknown transfer id"))
    }

    async fn relocate(&self, request: &PartRequest, _handle: &TransferHandle) -> Result<PathBuf> {
        if let Some(gate) = &self.relocation_gate {
            gate.acquire()
                .await
                .map_err(|_| Error::relocation("gate closed"))?
                .forget();
        }
        let failing = self
            .state
            .lock()
            .unwrap()
            .failing_relocations
            .contains(&request.key);
        if failing {
            return Err(Error::relocation("storage refused the move"));
        }
        Ok(request.destination_path())
    }

    async fn abort(&self, handle: &TransferHandle) -> Result<()> {
        if let Some(key) = self.key_for(handle) {
            self.state.lock().unwrap().aborted.push(key);
        }
        Ok(())
    }
}

/// [`DownloadFacility`] whose transfers finish when the test says so
#[derive(Default)]
pub(crate) struct FakeFacility {
    next_id: AtomicI64,
    transfers: Mutex<HashMap<FacilityId, FacilityStatus>>,
    removed: Mutex<Vec<FacilityId>>,
}

impl FakeFacility {
    pub(crate) fn ids(&self) -> Vec<FacilityId> {
        let mut ids: Vec<_> = self.transfers.lock().unwrap().keys().copied().collect();
        ids.sort();
        ids
    }

    pub(crate) fn finish(&self, id: FacilityId) {
        if let Some(status) = self.transfers.lock().unwrap().get_mut(&id) {
            status.state = FacilityState::Successful;
            status.bytes_so_far = 100;
        }
    }

    pub(crate) fn removed(&self) -> Vec<FacilityId> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownloadFacility for FakeFacility {
    async fn enqueue(&self, request: FacilityRequest) -> Result<FacilityId> {
        let id = FacilityId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.transfers.lock().unwrap().insert(
            id,
            FacilityStatus {
                state: FacilityState::Running,
                total_bytes: Some(100),
                bytes_so_far: 0,
                local_path: PathBuf::from("/staging").join(&request.file_name),
            },
        );
        Ok(id)
    }

    async fn query(&self, id: FacilityId) -> Result<Option<FacilityStatus>> {
        Ok(self.transfers.lock().unwrap().get(&id).cloned())
    }

    async fn remove(&self, id: FacilityId) -> Result<()> {
        self.transfers.lock().unwrap().remove(&id);
        self.removed.lock().unwrap().push(id);
        Ok(())
    }
}

/// [`StorageMover`] that appends `.mp3` to every moved file, like a storage
/// layer that picks the extension from the MIME type
#[derive(Default)]
pub(crate) struct MimeSuffixStorage {
    renames: Mutex<Vec<String>>,
}

impl MimeSuffixStorage {
    pub(crate) fn renames(&self) -> Vec<String> {
        self.renames.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageMover for MimeSuffixStorage {
    async fn move_file(&self, _source: &Path, dest_folder: &Path, dest_name: &str) -> Result<PathBuf> {
        Ok(dest_folder.join(format!("{}.mp3", dest_name)))
    }

    async fn rename(&self, path: &Path, new_name: &str) -> Result<PathBuf> {
        self.renames.lock().unwrap().push(new_name.to_string());
        Ok(path.with_file_name(new_name))
    }
}

/// [`BackgroundHost`] that records what the coordinator asked for
#[derive(Default)]
pub(crate) struct RecordingHost {
    pub(crate) starts: AtomicUsize,
    pub(crate) stops: AtomicUsize,
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingHost {
    pub(crate) fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }
}

impl BackgroundHost for RecordingHost {
    fn start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn update_notification(&self, notification: &Notification) {
        self.notifications.lock().unwrap().push(notification.clone());
    }
}

/// [`LibraryScanner`] that records scanned ids and returns a small payload
#[derive(Default)]
pub(crate) struct RecordingScanner {
    scanned: Mutex<Vec<ItemId>>,
    gate: Option<Arc<Semaphore>>,
}

impl RecordingScanner {
    /// Scanner whose scans wait for [`release_scans`](Self::release_scans)
    pub(crate) fn held() -> Arc<Self> {
        Arc::new(Self {
            scanned: Mutex::new(Vec::new()),
            gate: Some(Arc::new(Semaphore::new(0))),
        })
    }

    pub(crate) fn release_scans(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    pub(crate) fn scanned(&self) -> Vec<ItemId> {
        self.scanned.lock().unwrap().clone()
    }
}

#[async_trait]
impl LibraryScanner for RecordingScanner {
    async fn scan(&self, item: &DownloadItem) -> ScanResult {
        self.scanned.lock().unwrap().push(item.id.clone());
        if let Some(gate) = &self.gate {
            gate.acquire().await.ok()?.forget();
        }
        Some(serde_json::json!({ "libraryItemId": item.id.as_str() }))
    }
}

/// Item `id` with one part per entry of `kinds`, named `0.mp3`, `1.mp3`, ...
pub(crate) fn item(id: &str, kinds: &[TransportKind]) -> DownloadItem {
    let folder = FolderRef::new(format!("fold_{}", id), format!("/books/{}", id));
    let mut item = DownloadItem::new(id, format!("Title {}", id), folder);
    for (index, kind) in kinds.iter().enumerate() {
        let url = Url::parse(&format!("https://abs.example/{}/{}", id, index)).unwrap();
        item = item.with_part(url, format!("{}.mp3", index), *kind);
    }
    item
}

pub(crate) fn key(id: &str, index: usize) -> PartKey {
    PartKey::new(ItemId::from(id), index)
}

pub(crate) fn test_config(max_concurrent: usize) -> Config {
    Config {
        max_concurrent,
        tick_interval: Duration::from_millis(10),
        summary_display_delay: Duration::from_millis(50),
        ..Config::default()
    }
}

/// A running coordinator wired to fakes
pub(crate) struct Harness {
    pub(crate) coordinator: DownloadCoordinator,
    pub(crate) direct: Arc<FakeTransport>,
    pub(crate) managed: Arc<FakeTransport>,
    pub(crate) store: Arc<MemoryQueueStore>,
    pub(crate) host: Arc<RecordingHost>,
    pub(crate) scanner: Arc<RecordingScanner>,
    pub(crate) events: broadcast::Receiver<Event>,
}

impl Harness {
    pub(crate) async fn start(max_concurrent: usize) -> Self {
        Self::build(max_concurrent, FakeTransport::new(TransportKind::Managed), |c| c).await
    }

    pub(crate) async fn build(
        max_concurrent: usize,
        managed: Arc<FakeTransport>,
        customize: impl FnOnce(Collaborators) -> Collaborators,
    ) -> Self {
        Self::build_with_store(max_concurrent, managed, Arc::new(MemoryQueueStore::new()), customize)
            .await
    }

    pub(crate) async fn build_with_store(
        max_concurrent: usize,
        managed: Arc<FakeTransport>,
        store: Arc<MemoryQueueStore>,
        customize: impl FnOnce(Collaborators) -> Collaborators,
    ) -> Self {
        let direct = FakeTransport::new(TransportKind::Direct);
        let host = Arc::new(RecordingHost::default());
        let scanner = Arc::new(RecordingScanner::default());

        let transports = TransportSet::new(direct.clone(), managed.clone());
        let collaborators = customize(
            Collaborators::new(transports, store.clone())
                .with_host(host.clone())
                .with_scanner(scanner.clone()),
        );

        let coordinator = DownloadCoordinator::start(test_config(max_concurrent), collaborators)
            .await
            .unwrap();
        let events = coordinator.subscribe();

        Self {
            coordinator,
            direct,
            managed,
            store,
            host,
            scanner,
            events,
        }
    }

    /// Poll snapshots until `predicate` holds
    pub(crate) async fn wait_for_snapshot(
        &self,
        predicate: impl Fn(&QueueSnapshot) -> bool,
    ) -> QueueSnapshot {
        tokio::time::timeout(WAIT, async {
            loop {
                let snapshot = self.coordinator.snapshot().await.unwrap();
                if predicate(&snapshot) {
                    return snapshot;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for snapshot")
    }

    /// Wait until the coordinator holds a handle for `key`, so polls and aborts reach it
    pub(crate) async fn wait_for_handle(&self, key: &PartKey) {
        self.wait_for_snapshot(|snapshot| {
            part_of(snapshot, key).is_some_and(|part| part.transfer_id.is_some())
        })
        .await;
    }

    /// Next event matching `predicate`, skipping everything else
    pub(crate) async fn next_event(&mut self, predicate: impl Fn(&Event) -> bool) -> Event {
        tokio::time::timeout(WAIT, async {
            loop {
                match self.events.recv().await {
                    Ok(event) if predicate(&event) => return event,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    /// Every event currently buffered, without waiting
    pub(crate) fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Wait until `transport` has recorded at least `count` starts
pub(crate) async fn wait_for_starts(transport: &FakeTransport, count: usize) -> Vec<PartKey> {
    wait_until(|| transport.started().len() >= count).await;
    transport.started()
}

/// The part `key` in a snapshot, if still queued
pub(crate) fn part_of<'a>(snapshot: &'a QueueSnapshot, key: &PartKey) -> Option<&'a DownloadItemPart> {
    snapshot
        .items
        .iter()
        .find(|item| item.id == key.item_id)
        .and_then(|item| item.parts.get(key.index))
}

/// Poll `condition` until it holds or [`WAIT`] elapses
pub(crate) async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}
