
use super::test_helpers::*;
use crate::db::QueueStore;
use crate::types::{Event, PartState, SessionSummary, TransportKind};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use TransportKind::{Direct, Managed};

/// Let the actor and watcher run for a few ticks
async fn settle() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}
