//! Registration and byte transfer for one item

use super::transfer::Transfer;
use crate::cancel::CancelToken;
use crate::digest::DigestResult;
use crate::error::{ItemError, TransferError, UploadError};
use crate::poller::TrackedItem;
use crate::remote::{Registration, RemoteService, UploadKind, UploadTicket};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registers items under a resolved method and bucket, then moves their
/// bytes through the session's transfer
#[derive(Clone)]
pub struct Registrar {
    remote: Arc<dyn RemoteService>,
    transfer: Arc<dyn Transfer>,
    kind: UploadKind,
    project_id: String,
    method: String,
    bucket: String,
}

impl Registrar {
    pub fn new(
        remote: Arc<dyn RemoteService>,
        transfer: Arc<dyn Transfer>,
        kind: UploadKind,
        project_id: &str,
        method: &str,
        bucket: &str,
    ) -> Self {
        Self {
            remote,
            transfer,
            kind,
            project_id: project_id.to_string(),
            method: method.to_string(),
            bucket: bucket.to_string(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Registration skeleton carrying the session's destination
    pub fn registration(&self, filename: &str, filesize: u64) -> Registration {
        Registration {
            project_id: self.project_id.clone(),
            kind: Some(self.kind),
            filename: filename.to_string(),
            method: self.method.clone(),
            bucket: self.bucket.clone(),
            filesize,
            ..Registration::default()
        }
    }

    /// Stage `path` with the transfer and register it
    pub fn register(&self, path: &Path, mut reg: Registration) -> Result<UploadTicket, UploadError> {
        reg.source_url = self.transfer.stage(path)?;
        let ticket = self
            .remote
            .register_upload(&reg)
            .map_err(UploadError::Register)?;
        debug!(item = %ticket.item_id, filename = %reg.filename, "Registered");
        Ok(ticket)
    }

    /// Move the bytes of a registered item
    pub fn send(&self, ticket: &UploadTicket, path: &Path, cancel: &CancelToken) -> Result<(), UploadError> {
        self.transfer.send(ticket, path, cancel)?;
        Ok(())
    }

    /// Register and transfer one digested image. Failures are recorded on
    /// the returned item instead of aborting the batch.
    pub fn register_image(&self, digest: DigestResult, cancel: &CancelToken) -> TrackedItem {
        let fail = |error| TrackedItem::failed(self.kind, &self.project_id, &digest.filename, error);

        if let Some(e) = &digest.error {
            return fail(ItemError::Registration(e.to_string()));
        }
        if cancel.is_cancelled() {
            return fail(ItemError::Cancelled);
        }

        let reg = Registration {
            checksum: Some(digest.checksum.clone()),
            width: Some(digest.width),
            height: Some(digest.height),
            ..self.registration(&digest.filename, digest.filesize)
        };

        let sent = self.register(&digest.path, reg).and_then(|ticket| {
            self.send(&ticket, &digest.path, cancel)?;
            Ok(ticket)
        });

        match sent {
            Ok(ticket) => TrackedItem::new(self.kind, &self.project_id, &ticket.item_id, &digest.filename),
            Err(UploadError::Transfer(TransferError::Cancelled)) => fail(ItemError::Cancelled),
            Err(e) => {
                warn!(path = %digest.path.display(), "Upload failed: {}", e);
                let reason = match e {
                    UploadError::Register(e) => e.to_string(),
                    UploadError::Transfer(e) => e.to_string(),
                    e => e.to_string(),
                };
                fail(ItemError::Registration(reason))
            }
        }
    }
}
