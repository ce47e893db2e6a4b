//! Byte transfer to the chosen destination
//!
//! A `Transfer` is used in two steps around registration: `stage` runs
//! before the item is registered (and may yield a URL the server should
//! pull from), `send` runs after and moves the bytes.

use crate::cancel::CancelToken;
use crate::error::{RemoteError, TransferError};
use crate::remote::UploadTicket;
use crossbeam_channel::{bounded, select};
use reqwest::blocking::Client;
use std::fs::File;
use std::path::Path;
use std::thread;
use tracing::debug;

/// Moves one file to where the server expects it
pub trait Transfer: Send + Sync {
    /// Prepare `path`; returns the URL the server should fetch from, if any
    fn stage(&self, path: &Path) -> Result<Option<String>, TransferError>;

    /// Transfer `path` for a registered item
    fn send(&self, ticket: &UploadTicket, path: &Path, cancel: &CancelToken)
        -> Result<(), TransferError>;

    /// Abort in-flight work and release resources. Safe to call repeatedly.
    fn cancel(&self) {}
}

/// Upload by HTTP PUT to the pre-signed URL issued at registration
#[derive(Clone)]
pub struct CloudTransfer {
    client: Client,
}

impl CloudTransfer {
    pub fn new() -> Result<Self, TransferError> {
        // no request timeout: uploads of large images may take long
        let client = Client::builder()
            .timeout(None)
            .build()
            .map_err(|e| TransferError::Remote(e.into()))?;
        Ok(Self { client })
    }
}

impl Transfer for CloudTransfer {
    fn stage(&self, _path: &Path) -> Result<Option<String>, TransferError> {
        Ok(None)
    }

    fn send(
        &self,
        ticket: &UploadTicket,
        path: &Path,
        cancel: &CancelToken,
    ) -> Result<(), TransferError> {
        let url = ticket
            .upload_url
            .clone()
            .ok_or_else(|| TransferError::MissingDestination(ticket.item_id.clone()))?;
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let file = File::open(path).map_err(|source| TransferError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let len = file
            .metadata()
            .map_err(|source| TransferError::Read {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        // the blocking PUT cannot be interrupted; race it against cancel
        // and abandon it if the user aborts
        let (tx, rx) = bounded(1);
        let client = self.client.clone();
        thread::Builder::new()
            .name("cloud-put".into())
            .spawn(move || {
                let res = client
                    .put(&url)
                    .header(reqwest::header::CONTENT_LENGTH, len)
                    .body(file)
                    .send();
                let _ = tx.send(res);
            })
            .map_err(|e| TransferError::Remote(RemoteError::Transport(e.to_string())))?;

        let res = select! {
            recv(rx) -> msg => msg.map_err(|_| {
                TransferError::Remote(RemoteError::Transport("upload thread exited".into()))
            })?,
            recv(cancel.done()) -> _ => return Err(TransferError::Cancelled),
        };

        let res = res.map_err(|e| TransferError::Remote(e.into()))?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().unwrap_or_default();
            return Err(TransferError::Remote(RemoteError::Status { status, body }));
        }

        debug!(item = %ticket.item_id, bytes = len, "Uploaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_requires_upload_url() {
        let transfer = CloudTransfer::new().unwrap();
        let ticket = UploadTicket {
            item_id: "i1".into(),
            upload_url: None,
        };
        let err = transfer
            .send(&ticket, Path::new("/nonexistent"), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, TransferError::MissingDestination(id) if id == "i1"));
    }

    #[test]
    fn test_cloud_missing_file() {
        let transfer = CloudTransfer::new().unwrap();
        let ticket = UploadTicket {
            item_id: "i1".into(),
            upload_url: Some("http://127.0.0.1:9/upload".into()),
        };
        let err = transfer
            .send(&ticket, Path::new("/nonexistent/file.jpg"), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, TransferError::Read { .. }));
    }
}
