//! Remote state poller
//!
//! Fans a known set of tracked items out to N workers. For each item a
//! worker starts a poll loop on its own thread and races it against the
//! per-item timeout and the shared cancel signal:
//!
//! ```text
//!             ┌─────────────── poll loop thread ───────────────┐
//!             │ query ─▶ terminal? ─yes─▶ send outcome          │
//!             │   ▲          │no                               │
//!             │   └── sleep interval (wakes on stop / cancel) ◀┘
//!             └────────────────────────────────────────────────┘
//! worker: select! { outcome | after(timeout) | cancel }
//! ```
//!
//! On timeout or cancel the worker closes the loop's private stop token and
//! moves on; the loop exits within one interval and its result is dropped.

use crate::cancel::CancelToken;
use crate::error::{ItemError, RemoteError, WorkerError};
use crate::pool::WorkerPool;
use crate::remote::{ItemState, RemoteItem, RemoteService, UploadKind};
use crossbeam_channel::{after, bounded, select, unbounded, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pause between two state queries of the same item
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A remotely registered object whose state is observed by this client
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedItem {
    pub kind: UploadKind,
    pub project_id: String,
    /// Empty when registration never succeeded
    pub item_id: String,
    /// Local name, for reporting
    pub filename: String,
    pub state: ItemState,
    pub error: Option<ItemError>,
}

impl TrackedItem {
    pub fn new(kind: UploadKind, project_id: &str, item_id: &str, filename: &str) -> Self {
        Self {
            kind,
            project_id: project_id.to_string(),
            item_id: item_id.to_string(),
            filename: filename.to_string(),
            state: ItemState::Pending,
            error: None,
        }
    }

    /// Item that failed before it could be polled
    pub fn failed(kind: UploadKind, project_id: &str, filename: &str, error: ItemError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(kind, project_id, "", filename)
        }
    }

    /// Move to `next` unless already terminal. States never revert.
    pub fn advance(&mut self, next: ItemState) -> bool {
        if self.state.is_terminal() || next == self.state {
            return false;
        }
        self.state = next;
        true
    }

    pub fn is_ready(&self) -> bool {
        self.state == ItemState::Ready && self.error.is_none()
    }
}

/// What the poll loop observed
enum PollOutcome {
    Terminal(RemoteItem),
    Failed(RemoteError),
    Stopped,
}

/// Polls tracked items until each is terminal, times out or is cancelled
#[derive(Clone)]
pub struct StateChecker {
    remote: Arc<dyn RemoteService>,
    timeout: Duration,
    interval: Duration,
}

impl StateChecker {
    pub fn new(remote: Arc<dyn RemoteService>, timeout: Duration) -> Self {
        Self {
            remote,
            timeout,
            interval: POLL_INTERVAL,
        }
    }

    /// Override the pause between queries
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Start `workers` pollers (zero = one per core) over a fixed set of items
    pub fn run(
        &self,
        items: Vec<TrackedItem>,
        workers: usize,
        cancel: &CancelToken,
    ) -> Result<WorkerPool<TrackedItem>, WorkerError> {
        let (tx, rx) = unbounded();
        for item in items {
            // receiver is alive, send cannot fail
            let _ = tx.send(item);
        }
        drop(tx);
        self.run_stream(rx, workers, cancel)
    }

    /// Like [`run`](Self::run) but items arrive from an upstream stage
    pub fn run_stream(
        &self,
        items: Receiver<TrackedItem>,
        workers: usize,
        cancel: &CancelToken,
    ) -> Result<WorkerPool<TrackedItem>, WorkerError> {
        let checker = self.clone();
        let token = cancel.clone();
        WorkerPool::spawn("poll", workers, items, cancel, move |id, item: TrackedItem| {
            let item = checker.check(item, &token);
            debug!(
                worker = id,
                item = %item.item_id,
                state = %item.state,
                error = ?item.error,
                "Item finalized"
            );
            item
        })
    }

    /// Poll one item to its final state
    pub fn check(&self, mut item: TrackedItem, cancel: &CancelToken) -> TrackedItem {
        // may already carry a registration error
        if item.error.is_some() {
            return item;
        }
        if cancel.is_cancelled() {
            item.error = Some(ItemError::Cancelled);
            return item;
        }

        let stop = CancelToken::new();
        let (tx, rx) = bounded(1);
        let spawned = thread::Builder::new()
            .name(format!("poll-{}", item.item_id))
            .spawn({
                let remote = Arc::clone(&self.remote);
                let interval = self.interval;
                let cancel = cancel.clone();
                let stop = stop.clone();
                let (kind, pid, iid) = (item.kind, item.project_id.clone(), item.item_id.clone());
                move || {
                    let outcome = poll_loop(&*remote, kind, &pid, &iid, interval, &cancel, &stop);
                    let _ = tx.send(outcome);
                }
            });

        if let Err(e) = spawned {
            warn!(item = %item.item_id, "Failed to spawn poll loop: {}", e);
            item.error = Some(ItemError::Transport(e.to_string()));
            return item;
        }

        select! {
            recv(rx) -> msg => match msg {
                Ok(PollOutcome::Terminal(remote)) => apply_terminal(&mut item, remote),
                Ok(PollOutcome::Failed(e)) => item.error = Some(ItemError::Transport(e.to_string())),
                Ok(PollOutcome::Stopped) => item.error = Some(ItemError::Cancelled),
                Err(_) => item.error = Some(ItemError::Transport("poll loop exited".into())),
            },
            recv(after(self.timeout)) -> _ => {
                stop.cancel();
                info!(item = %item.item_id, timeout = ?self.timeout, "Client timeout");
                item.advance(ItemState::TimedOut);
                item.error = Some(ItemError::Timeout);
            }
            recv(cancel.done()) -> _ => {
                stop.cancel();
                item.error = Some(ItemError::Cancelled);
            }
        }

        item
    }
}

fn apply_terminal(item: &mut TrackedItem, remote: RemoteItem) {
    item.advance(remote.state);
    if remote.state == ItemState::Invalid {
        let msg = remote.errors.join(";");
        item.error = Some(ItemError::Invalid(if msg.is_empty() {
            ItemError::INVALID_DEFAULT.to_string()
        } else {
            msg
        }));
    }
}

/// Query until terminal; one query in flight at a time
fn poll_loop(
    remote: &dyn RemoteService,
    kind: UploadKind,
    project_id: &str,
    item_id: &str,
    interval: Duration,
    cancel: &CancelToken,
    stop: &CancelToken,
) -> PollOutcome {
    loop {
        if cancel.is_cancelled() || stop.is_cancelled() {
            return PollOutcome::Stopped;
        }

        match remote.item_state(kind, project_id, item_id) {
            Err(e) => return PollOutcome::Failed(e),
            Ok(r) if r.state.is_terminal() => return PollOutcome::Terminal(r),
            Ok(_) => {}
        }

        select! {
            recv(cancel.done()) -> _ => return PollOutcome::Stopped,
            recv(stop.done()) -> _ => return PollOutcome::Stopped,
            recv(after(interval)) -> _ => {}
        }
    }
}
