//! Upload orchestration
//!
//! An `Uploader` drives one import command through
//!
//! ```text
//! Init ─▶ PreconditionChecked ─▶ BucketSelected ─▶ Registered ─▶ Transferred ─▶ Polled ─▶ Done
//!   │              │                    │               │              │             │
//!   └──────────────┴────────────────────┴───────────────┴──────────────┴─────────────┴──▶ Failed
//! ```
//!
//! Images go through the same first two steps and then run the
//! walk/digest/register/poll pipeline in [`images`], where registration
//! and transfer happen per item.
//!
//! `UploadCanceller` is the interrupt hook: it closes the session's cancel
//! token and cancels the active transfer (stopping a direct listener). It is
//! safe to call from any thread, any number of times, before or during `run`.

pub mod bucket;
pub mod check;
pub mod direct;
pub mod images;
pub mod register;
pub mod transfer;

pub use direct::DirectServer;
pub use images::{import_images, ImportSummary};
pub use register::Registrar;
pub use transfer::{CloudTransfer, Transfer};

use crate::cancel::CancelToken;
use crate::config::UploadConfig;
use crate::content::checksum_file;
use crate::error::{CheckError, TransferError, UploadError};
use crate::poller::{StateChecker, TrackedItem, POLL_INTERVAL};
use crate::remote::{RemoteService, UploadKind};
use check::{CheckFn, DIRECT_METHOD, META_FILENAMES, MODEL_FILENAME};
use parking_lot::Mutex;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Progress of one import command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Init,
    PreconditionChecked,
    BucketSelected,
    Registered,
    Transferred,
    Polled,
    Done,
    Failed,
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadStage::Init => "init",
            UploadStage::PreconditionChecked => "precondition-checked",
            UploadStage::BucketSelected => "bucket-selected",
            UploadStage::Registered => "registered",
            UploadStage::Transferred => "transferred",
            UploadStage::Polled => "polled",
            UploadStage::Done => "done",
            UploadStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Destination resolved for a running import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub method: String,
    /// Empty for direct upload
    pub bucket: String,
    pub project_id: String,
    pub source: PathBuf,
    pub timeout: Duration,
}

type ActiveTransfer = Arc<Mutex<Option<Arc<dyn Transfer>>>>;

/// Cancellation hook for a running `Uploader`
#[derive(Clone)]
pub struct UploadCanceller {
    cancel: CancelToken,
    transfer: ActiveTransfer,
}

impl UploadCanceller {
    /// Abort the import. Returns true for the call that closed the token.
    pub fn cancel(&self) -> bool {
        let first = self.cancel.cancel();
        let active = self.transfer.lock().clone();
        if let Some(t) = active {
            t.cancel();
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Runs one import command against a remote service
pub struct Uploader {
    remote: Arc<dyn RemoteService>,
    config: UploadConfig,
    cancel: CancelToken,
    transfer: ActiveTransfer,
    stage: Mutex<UploadStage>,
    session: Mutex<Option<UploadSession>>,
    poll_interval: Duration,
    transfer_override: Option<Arc<dyn Transfer>>,
}

impl Uploader {
    pub fn new(remote: Arc<dyn RemoteService>, config: UploadConfig) -> Self {
        Self {
            remote,
            config,
            cancel: CancelToken::new(),
            transfer: Arc::default(),
            stage: Mutex::new(UploadStage::Init),
            session: Mutex::new(None),
            poll_interval: POLL_INTERVAL,
            transfer_override: None,
        }
    }

    /// Override the pause between state queries
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Use `transfer` instead of the one implied by the method
    pub fn with_transfer(mut self, transfer: Arc<dyn Transfer>) -> Self {
        self.transfer_override = Some(transfer);
        self
    }

    pub fn canceller(&self) -> UploadCanceller {
        UploadCanceller {
            cancel: self.cancel.clone(),
            transfer: Arc::clone(&self.transfer),
        }
    }

    pub fn cancel(&self) -> bool {
        self.canceller().cancel()
    }

    pub fn stage(&self) -> UploadStage {
        *self.stage.lock()
    }

    /// Destination chosen once the bucket is selected
    pub fn session(&self) -> Option<UploadSession> {
        self.session.lock().clone()
    }

    /// Import the configured meta or model file and wait for the server to
    /// accept it. Image directories go through [`run_images`](Self::run_images).
    pub fn run(&self) -> Result<TrackedItem, UploadError> {
        let result = self.run_file();
        self.release();
        self.finish(result)
    }

    /// Import every image under the configured directory. Per-item failures
    /// are counted in the summary; only setup failures are errors.
    pub fn run_images<F>(&self, on_item: F) -> Result<ImportSummary, UploadError>
    where
        F: FnMut(&TrackedItem),
    {
        let result = self.run_pipeline(on_item);
        self.release();
        let result = self.finish(result)?;
        if self.cancel.is_cancelled() {
            self.advance(UploadStage::Failed);
        }
        Ok(result)
    }

    fn run_file(&self) -> Result<TrackedItem, UploadError> {
        let cfg = &self.config;
        self.ensure_active()?;
        self.preconditions()?;
        self.advance(UploadStage::PreconditionChecked);

        let registrar = self.select_destination()?;
        self.ensure_active()?;

        let path = &cfg.source;
        let sum = checksum_file(path).map_err(|source| TransferError::Read {
            path: path.clone(),
            source,
        })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let reg = crate::remote::Registration {
            checksum: Some(sum.hex),
            ..registrar.registration(&filename, sum.bytes)
        };

        let ticket = registrar.register(path, reg)?;
        info!(item = %ticket.item_id, "{} {:?} registered", cfg.kind, filename);
        self.advance(UploadStage::Registered);
        self.ensure_active()?;

        registrar.send(&ticket, path, &self.cancel)?;
        self.advance(UploadStage::Transferred);

        let item = TrackedItem::new(cfg.kind, &cfg.project_id, &ticket.item_id, &filename);
        let item = self.checker().check(item, &self.cancel);
        self.advance(UploadStage::Polled);

        outcome(item)
    }

    fn run_pipeline<F>(&self, on_item: F) -> Result<ImportSummary, UploadError>
    where
        F: FnMut(&TrackedItem),
    {
        let cfg = &self.config;
        self.ensure_active()?;
        self.preconditions()?;
        self.advance(UploadStage::PreconditionChecked);

        let registrar = self.select_destination()?;
        self.ensure_active()?;

        let summary = import_images(
            &registrar,
            &self.checker(),
            &cfg.source,
            cfg.skip.clone(),
            cfg.workers,
            &self.cancel,
            on_item,
        )?;
        self.advance(UploadStage::Polled);
        Ok(summary)
    }

    fn preconditions(&self) -> Result<(), CheckError> {
        let cfg = &self.config;
        let remote = &*self.remote;

        let mut checks: Vec<CheckFn<'_>> = vec![
            check::api_server(remote),
            check::project(remote, cfg.kind, &cfg.project_id),
        ];
        match cfg.kind {
            UploadKind::Image => checks.push(check::dir_exists(&cfg.source)),
            UploadKind::Meta => {
                checks.push(check::file_exists(&cfg.source));
                checks.push(check::filename_allowed(&cfg.source, &META_FILENAMES));
            }
            UploadKind::Model => {
                checks.push(check::file_exists(&cfg.source));
                checks.push(check::filename_matches(&cfg.source, &MODEL_FILENAME));
            }
        }
        checks.push(check::upload_method(
            remote,
            cfg.kind,
            cfg.method.as_deref(),
            cfg.direct,
        ));

        check::check(&check::warn_log, checks)
    }

    fn select_destination(&self) -> Result<Registrar, UploadError> {
        let cfg = &self.config;
        let method = bucket::suggest_method(&*self.remote, cfg.kind, cfg.method.as_deref())?;
        self.ensure_active()?;

        let transfer: Arc<dyn Transfer> = match &self.transfer_override {
            Some(t) => Arc::clone(t),
            None if method == DIRECT_METHOD => self.start_direct()?,
            None => Arc::new(CloudTransfer::new()?),
        };
        self.set_transfer(Arc::clone(&transfer));
        self.ensure_active()?;

        let bucket = bucket::suggest_bucket(&*self.remote, cfg.kind, &method, cfg.bucket.as_deref())?;
        info!(method = %method, bucket = %bucket, "Upload destination selected");

        *self.session.lock() = Some(UploadSession {
            method: method.clone(),
            bucket: bucket.clone(),
            project_id: cfg.project_id.clone(),
            source: cfg.source.clone(),
            timeout: cfg.timeout,
        });
        self.advance(UploadStage::BucketSelected);

        Ok(Registrar::new(
            Arc::clone(&self.remote),
            transfer,
            cfg.kind,
            &cfg.project_id,
            &method,
            &bucket,
        ))
    }

    /// Start the ad-hoc listener and make sure the server can reach it
    fn start_direct(&self) -> Result<Arc<dyn Transfer>, UploadError> {
        let server = DirectServer::start(self.config.direct)?;
        let addr = server.addr();
        let server: Arc<dyn Transfer> = Arc::new(server);
        // registered first so a cancel during the visibility check stops it
        self.set_transfer(Arc::clone(&server));
        self.ensure_active()?;
        self.check_visibility(addr)?;
        Ok(server)
    }

    fn check_visibility(&self, addr: SocketAddr) -> Result<(), CheckError> {
        let visible = self
            .remote
            .check_visibility(&addr.ip().to_string(), addr.port())
            .map_err(|e| CheckError::Remote(e.to_string()))?;
        if !visible {
            warn!("The server cannot reach this client at {}", addr);
            warn!("Use --ip/--port to choose an address reachable from the server");
            return Err(CheckError::ClientInvisible(addr.to_string()));
        }
        Ok(())
    }

    fn checker(&self) -> StateChecker {
        StateChecker::new(Arc::clone(&self.remote), self.config.timeout).with_interval(self.poll_interval)
    }

    fn set_transfer(&self, transfer: Arc<dyn Transfer>) {
        *self.transfer.lock() = Some(transfer);
    }

    /// Cancel and drop the active transfer
    fn release(&self) {
        let active = self.transfer.lock().take();
        if let Some(t) = active {
            t.cancel();
        }
    }

    fn ensure_active(&self) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        Ok(())
    }

    fn advance(&self, next: UploadStage) {
        let mut stage = self.stage.lock();
        debug!(from = %*stage, to = %next, "Upload stage");
        *stage = next;
    }

    fn finish<T>(&self, result: Result<T, UploadError>) -> Result<T, UploadError> {
        let result = match result {
            Err(UploadError::Transfer(TransferError::Cancelled)) => Err(UploadError::Cancelled),
            Err(_) if self.cancel.is_cancelled() => Err(UploadError::Cancelled),
            other => other,
        };
        match &result {
            Ok(_) => self.advance(UploadStage::Done),
            Err(e) => {
                debug!(stage = %self.stage(), "Upload failed: {}", e);
                self.advance(UploadStage::Failed);
            }
        }
        result
    }
}

/// Map a polled item to the command outcome
fn outcome(item: TrackedItem) -> Result<TrackedItem, UploadError> {
    if item.is_ready() {
        return Ok(item);
    }
    match &item.error {
        Some(e) if e.is_cancelled() => Err(UploadError::Cancelled),
        Some(e) => Err(UploadError::Rejected {
            state: item.state.to_string(),
            message: e.to_string(),
        }),
        None => Err(UploadError::Rejected {
            state: item.state.to_string(),
            message: "not accepted".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectAddr;
    use crate::error::{ItemError, RemoteResult};
    use crate::remote::{
        ImagePage, ItemState, Project, Registration, RemoteItem, ServerMode, UploadTicket,
    };
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Remote that counts reachability checks
    #[derive(Default)]
    struct VisibilityCounter {
        checks: AtomicUsize,
    }

    impl RemoteService for VisibilityCounter {
        fn server_mode(&self) -> RemoteResult<ServerMode> {
            Ok(ServerMode::Normal)
        }
        fn project(&self, _: &str) -> RemoteResult<Option<Project>> {
            Ok(None)
        }
        fn item_state(&self, _: UploadKind, _: &str, _: &str) -> RemoteResult<RemoteItem> {
            Ok(RemoteItem::pending())
        }
        fn supported_clouds(&self, _: UploadKind) -> RemoteResult<Vec<String>> {
            Ok(vec![])
        }
        fn bucket_list(&self, _: UploadKind, _: &str) -> RemoteResult<Vec<String>> {
            Ok(vec![])
        }
        fn suggested_bucket(&self, _: UploadKind, _: &str) -> RemoteResult<String> {
            Ok(String::new())
        }
        fn register_upload(&self, _: &Registration) -> RemoteResult<UploadTicket> {
            Err(crate::error::RemoteError::Transport("unused".into()))
        }
        fn check_visibility(&self, _: &str, _: u16) -> RemoteResult<bool> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
        fn project_images(&self, _: &str, _: usize, _: Option<&str>) -> RemoteResult<ImagePage> {
            Ok(ImagePage::default())
        }
    }

    fn direct_config() -> UploadConfig {
        UploadConfig {
            kind: UploadKind::Meta,
            project_id: "pid".into(),
            source: PathBuf::from("camera.txt"),
            method: Some(DIRECT_METHOD.into()),
            bucket: None,
            direct: Some(DirectAddr {
                ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: 0,
            }),
            timeout: Duration::from_secs(5),
            skip: None,
            workers: 1,
            verbose: false,
        }
    }

    #[test]
    fn test_start_direct_checks_visibility() {
        let remote = Arc::new(VisibilityCounter::default());
        let uploader = Uploader::new(remote.clone(), direct_config());

        assert!(uploader.start_direct().is_ok());
        assert_eq!(remote.checks.load(Ordering::SeqCst), 1);
        uploader.release();
    }

    #[test]
    fn test_cancelled_direct_start_skips_visibility_check() {
        let remote = Arc::new(VisibilityCounter::default());
        let uploader = Uploader::new(remote.clone(), direct_config());
        uploader.cancel();

        assert!(matches!(uploader.start_direct(), Err(UploadError::Cancelled)));
        assert_eq!(remote.checks.load(Ordering::SeqCst), 0);
        // listener stays registered so release() shuts it down
        assert!(uploader.transfer.lock().is_some());
        uploader.release();
        assert!(uploader.transfer.lock().is_none());
    }

    #[test]
    fn test_outcome_mapping() {
        let mut ready = TrackedItem::new(UploadKind::Meta, "p", "i", "pose.txt");
        ready.advance(ItemState::Ready);
        assert!(outcome(ready).is_ok());

        let mut invalid = TrackedItem::new(UploadKind::Meta, "p", "i", "pose.txt");
        invalid.advance(ItemState::Invalid);
        invalid.error = Some(ItemError::Invalid("bad pose".into()));
        match outcome(invalid) {
            Err(UploadError::Rejected { state, message }) => {
                assert_eq!(state, ItemState::Invalid.to_string());
                assert_eq!(message, "bad pose");
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }

        let mut aborted = TrackedItem::new(UploadKind::Meta, "p", "i", "pose.txt");
        aborted.error = Some(ItemError::Cancelled);
        assert!(matches!(outcome(aborted), Err(UploadError::Cancelled)));
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(UploadStage::BucketSelected.to_string(), "bucket-selected");
    }
}
