//! Test configuration helpers: temp-dir backed configs and coordinators

use shelf_dl::config::{PersistenceConfig, TransportConfig};
use shelf_dl::storage::{FsStorageMover, StorageMover};
use shelf_dl::transport::TransportSet;
use shelf_dl::{Collaborators, Config, Database, DownloadCoordinator};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Directory layout of one test run
pub struct TestDirs {
    /// Keeps the directories alive for the duration of the test
    pub temp: TempDir,
    /// Folder items download into
    pub library: PathBuf,
}

impl TestDirs {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let library = temp.path().join("library");
        Self { temp, library }
    }

    /// Folder for one item inside the library
    pub fn item_folder(&self, name: &str) -> PathBuf {
        self.library.join(name)
    }
}

/// Config with fast ticks, staging and database under `dirs`
pub fn create_test_config(dirs: &TestDirs) -> Config {
    Config {
        max_concurrent: 2,
        tick_interval: Duration::from_millis(20),
        summary_display_delay: Duration::from_millis(100),
        transport: TransportConfig {
            staging_dir: dirs.temp.path().join("staging"),
            connect_timeout: Duration::from_secs(5),
            ..TransportConfig::default()
        },
        persistence: PersistenceConfig {
            database_path: dirs.temp.path().join("queue.db"),
        },
        ..Config::default()
    }
}

/// Coordinator over the built-in HTTP transports and a SQLite queue
pub async fn create_test_coordinator(
    config: Config,
    storage: Arc<dyn StorageMover>,
) -> (DownloadCoordinator, Arc<Database>) {
    let store = Arc::new(
        Database::new(&config.persistence.database_path)
            .await
            .expect("Failed to open queue database"),
    );
    let transports =
        TransportSet::http(&config.transport, storage).expect("Failed to build HTTP transports");

    let coordinator =
        DownloadCoordinator::start(config, Collaborators::new(transports, store.clone()))
            .await
            .expect("Failed to start coordinator");
    (coordinator, store)
}

/// Same as [`create_test_coordinator`] with the plain file-system mover
pub async fn create_fs_coordinator(config: Config) -> (DownloadCoordinator, Arc<Database>) {
    create_test_coordinator(config, Arc::new(FsStorageMover)).await
}
