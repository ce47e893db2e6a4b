//! Bounded fan-out/fan-in worker pool
//!
//! ```text
//!  input (crossbeam Receiver<I>)
//!        │
//!  ┌─────┼──────────────┬──────────────┐
//!  ▼     ▼              ▼              ▼
//! Worker 0          Worker 1   ...  Worker N-1     each: recv ⟶ work ⟶ send
//!  │                    │              │
//!  └────────────┬───────┴──────────────┘
//!               ▼
//!  results (bounded Receiver<O>, disconnects after the last worker exits)
//! ```
//!
//! Every worker owns a clone of the result `Sender` and the pool keeps none,
//! so the result stream closes exactly once: when the last worker returns.
//! Dropped results on cancellation therefore never stall the consumer.

use crate::cancel::CancelToken;
use crate::error::WorkerError;
use crossbeam_channel::{bounded, select, Receiver};
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

/// Resolve a requested worker count; zero means one per CPU core
pub fn effective_workers(requested: usize) -> usize {
    if requested == 0 {
        num_cpus::get()
    } else {
        requested
    }
}

/// A running pool of worker threads and the stream of their results
pub struct WorkerPool<O> {
    results: Receiver<O>,
    handles: Vec<JoinHandle<()>>,
}

impl<O: Send + 'static> WorkerPool<O> {
    /// Start `workers` threads (see [`effective_workers`]) that map items
    /// from `input` through `work` until `input` is drained or `cancel`
    /// is closed.
    pub fn spawn<I, F>(
        name: &str,
        workers: usize,
        input: Receiver<I>,
        cancel: &CancelToken,
        work: F,
    ) -> Result<Self, WorkerError>
    where
        I: Send + 'static,
        F: Fn(usize, I) -> O + Send + Sync + Clone + 'static,
    {
        let workers = effective_workers(workers);
        let (tx, results) = bounded::<O>(workers);
        let mut handles = Vec::with_capacity(workers);

        for id in 0..workers {
            let input = input.clone();
            let tx = tx.clone();
            let cancel = cancel.clone();
            let work = work.clone();

            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, id))
                .spawn(move || {
                    trace!(worker = id, "Worker starting");
                    loop {
                        let item = select! {
                            recv(input) -> msg => match msg {
                                Ok(item) => item,
                                Err(_) => break,
                            },
                            recv(cancel.done()) -> _ => break,
                        };
                        if cancel.is_cancelled() {
                            break;
                        }

                        let out = work(id, item);

                        select! {
                            send(tx, out) -> res => {
                                if res.is_err() {
                                    break;
                                }
                            }
                            recv(cancel.done()) -> _ => break,
                        }
                    }
                    trace!(worker = id, "Worker exiting");
                })
                .map_err(|e| WorkerError::SpawnFailed {
                    id,
                    reason: e.to_string(),
                })?;

            handles.push(handle);
        }

        debug!(pool = name, workers, "Worker pool started");

        Ok(Self { results, handles })
    }
}

impl<O> WorkerPool<O> {
    /// Number of workers actually started
    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// The fan-in result stream
    pub fn results(&self) -> &Receiver<O> {
        &self.results
    }

    /// Wait for every worker to return
    pub fn join(self) -> Result<(), WorkerError> {
        let mut first_err = None;
        for (id, handle) in self.handles.into_iter().enumerate() {
            if handle.join().is_err() && first_err.is_none() {
                first_err = Some(WorkerError::Panicked { id });
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
