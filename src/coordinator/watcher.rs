//! Progress watcher: the single recurring task behind polled transports.
//!
//! Each tick asks the actor for a [`TickPlan`]. The actor refills slots and
//! either returns the parts to poll or tells the watcher to exit because the
//! queue has drained. Polls run concurrently outside the actor and their
//! results go back as one batch, so a slow facility never blocks commands.

use super::{Command, PollOutcome, PollTarget, TickPlan};
use futures::future::join_all;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

pub(crate) fn spawn(commands: mpsc::WeakUnboundedSender<Command>, tick_interval: Duration) {
    tokio::spawn(async move {
        tracing::debug!(interval_ms = tick_interval.as_millis() as u64, "Progress watcher started");

        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            let Some(plan) = request_plan(&commands).await else {
                break;
            };
            let targets = match plan {
                TickPlan::Idle => break,
                TickPlan::Poll(targets) => targets,
            };
            if targets.is_empty() {
                continue;
            }

            let results = join_all(targets.into_iter().map(poll)).await;

            let Some(sender) = commands.upgrade() else {
                break;
            };
            if sender.send(Command::Polled { results }).is_err() {
                break;
            }
        }

        tracing::debug!("Progress watcher stopped");
    });
}

async fn request_plan(commands: &mpsc::WeakUnboundedSender<Command>) -> Option<TickPlan> {
    let (reply, rx) = oneshot::channel();
    commands.upgrade()?.send(Command::Tick { reply }).ok()?;
    rx.await.ok()
}

async fn poll(target: PollTarget) -> PollOutcome {
    let result = target.transport.poll(&target.handle).await;
    PollOutcome {
        key: target.key,
        attempt: target.attempt,
        result,
    }
}
