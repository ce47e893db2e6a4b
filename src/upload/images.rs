//! Image import pipeline
//!
//! ```text
//!  walk_files ──paths──▶ digest pool ──DigestResult──▶ register pool
//!                                                          │ TrackedItem
//!                                                          ▼
//!                       consumer ◀──finalized items── poller pool
//! ```
//!
//! Every stage closes its output only after all of its workers return, so
//! the consumer loop ends exactly once the last item has been finalized or
//! the shared cancel token has been closed.

use super::register::Registrar;
use crate::cancel::CancelToken;
use crate::digest::{DigestResult, ImageDigester};
use crate::error::{ItemError, WalkError, WorkerError};
use crate::poller::{StateChecker, TrackedItem};
use crate::pool::WorkerPool;
use crate::walker::walk_files;
use regex::Regex;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Outcome counts of an image import
#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    pub total: usize,
    pub ready: usize,
    pub invalid: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    /// Local, registration or transport failures
    pub failed: usize,
    /// Workers per stage
    pub workers: usize,
    pub walk_error: Option<WalkError>,
    pub elapsed: Duration,
    /// Items that did not end ready
    pub rejected: Vec<TrackedItem>,
}

impl ImportSummary {
    pub fn record(&mut self, item: &TrackedItem) {
        self.total += 1;
        if item.is_ready() {
            self.ready += 1;
            return;
        }
        match &item.error {
            Some(ItemError::Cancelled) => self.cancelled += 1,
            Some(ItemError::Timeout) => self.timed_out += 1,
            Some(ItemError::Invalid(_)) => self.invalid += 1,
            _ => self.failed += 1,
        }
        self.rejected.push(item.clone());
    }

    /// Every discovered image ended ready
    pub fn is_success(&self) -> bool {
        self.walk_error.is_none() && self.ready == self.total
    }
}

/// Run the pipeline over `dir`, calling `on_item` for every finalized item
pub fn import_images<F>(
    registrar: &Registrar,
    checker: &StateChecker,
    dir: &Path,
    skip: Option<Regex>,
    workers: usize,
    cancel: &CancelToken,
    mut on_item: F,
) -> Result<ImportSummary, WorkerError>
where
    F: FnMut(&TrackedItem),
{
    let start = Instant::now();

    let walk = walk_files(dir, skip, cancel);
    let digests = ImageDigester::new().run(walk.paths.clone(), workers, cancel)?;

    let reg = registrar.clone();
    let token = cancel.clone();
    let registered = WorkerPool::spawn(
        "register",
        workers,
        digests.results().clone(),
        cancel,
        move |id, digest: DigestResult| {
            let item = reg.register_image(digest, &token);
            debug!(worker = id, item = %item.item_id, file = %item.filename, "Register stage done");
            item
        },
    )?;

    let polled = checker.run_stream(registered.results().clone(), workers, cancel)?;

    let mut summary = ImportSummary {
        workers: polled.workers(),
        ..ImportSummary::default()
    };
    for item in polled.results().iter() {
        summary.record(&item);
        on_item(&item);
    }

    digests.join()?;
    registered.join()?;
    polled.join()?;
    summary.walk_error = walk.wait().err();
    summary.elapsed = start.elapsed();

    info!(
        total = summary.total,
        ready = summary.ready,
        invalid = summary.invalid,
        timed_out = summary.timed_out,
        cancelled = summary.cancelled,
        failed = summary.failed,
        "Image import finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{ItemState, UploadKind};

    fn item(error: Option<ItemError>, state: ItemState) -> TrackedItem {
        let mut it = TrackedItem::new(UploadKind::Image, "p", "i", "a.jpg");
        it.advance(state);
        it.error = error;
        it
    }

    #[test]
    fn test_summary_counts() {
        let mut s = ImportSummary::default();
        s.record(&item(None, ItemState::Ready));
        s.record(&item(Some(ItemError::Invalid("corrupt".into())), ItemState::Invalid));
        s.record(&item(Some(ItemError::Timeout), ItemState::TimedOut));
        s.record(&item(Some(ItemError::Cancelled), ItemState::Pending));
        s.record(&item(Some(ItemError::Registration("x".into())), ItemState::Pending));

        assert_eq!(s.total, 5);
        assert_eq!(
            (s.ready, s.invalid, s.timed_out, s.cancelled, s.failed),
            (1, 1, 1, 1, 1)
        );
        assert_eq!(s.rejected.len(), 4);
        assert!(!s.is_success());
    }

    #[test]
    fn test_empty_summary_is_success() {
        assert!(ImportSummary::default().is_success());
    }
}
