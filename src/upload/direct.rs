//! Ad-hoc HTTP listener for direct upload
//!
//! With the `direct` method the server pulls files from this client
//! instead of a cloud bucket. Each staged file is published under a random
//! token; nothing else on disk is reachable. The listener runs axum on a
//! single-threaded tokio runtime owned by a dedicated thread, so the rest of
//! the client stays synchronous.

use super::transfer::Transfer;
use crate::cancel::CancelToken;
use crate::config::DirectAddr;
use crate::error::TransferError;
use crate::remote::UploadTicket;
use axum::extract::{Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, UdpSocket};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Listener port when none is given
pub const DEFAULT_PORT: u16 = 8082;

type Staged = Arc<RwLock<HashMap<String, PathBuf>>>;

/// Serves staged files until cancelled
pub struct DirectServer {
    /// Address handed to the server
    addr: SocketAddr,
    staged: Staged,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DirectServer {
    /// Bind and start serving. Without an explicit address the outbound
    /// interface address and [`DEFAULT_PORT`] are used; port 0 picks a free
    /// port.
    pub fn start(addr: Option<DirectAddr>) -> Result<Self, TransferError> {
        let (ip, port) = match addr {
            Some(a) => (a.ip, a.port),
            None => (local_ip()?, DEFAULT_PORT),
        };
        let unspecified = match ip {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let bind = SocketAddr::new(unspecified, port);

        let listener = TcpListener::bind(bind)
            .map_err(|e| TransferError::Listener(format!("bind {}: {}", bind, e)))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| TransferError::Listener(e.to_string()))?;
        let port = listener
            .local_addr()
            .map_err(|e| TransferError::Listener(e.to_string()))?
            .port();
        let addr = SocketAddr::new(ip, port);

        let staged: Staged = Arc::default();
        let router = Router::new()
            .route("/files/:token", get(serve_file))
            .with_state(Arc::clone(&staged));
        let (tx, rx) = oneshot::channel::<()>();

        let handle = thread::Builder::new()
            .name("direct-upload".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("Failed to create listener runtime: {}", e);
                        return;
                    }
                };
                runtime.block_on(async move {
                    let listener = match tokio::net::TcpListener::from_std(listener) {
                        Ok(l) => l,
                        Err(e) => {
                            error!("Failed to register listener: {}", e);
                            return;
                        }
                    };
                    let served = axum::serve(listener, router)
                        .with_graceful_shutdown(async move {
                            let _ = rx.await;
                        })
                        .await;
                    if let Err(e) = served {
                        error!("Direct upload listener failed: {}", e);
                    }
                });
                debug!("Direct upload listener stopped");
            })
            .map_err(|e| TransferError::Listener(e.to_string()))?;

        info!(addr = %addr, "Direct upload listener started");

        Ok(Self {
            addr,
            staged,
            shutdown: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Address the server should connect to
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of files currently published
    pub fn staged(&self) -> usize {
        self.staged.read().len()
    }

    /// Stop accepting connections and wait for the listener thread
    pub fn shutdown(&self) {
        self.signal_stop();
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                warn!("Direct upload listener panicked");
            }
        }
    }

    fn signal_stop(&self) {
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(());
            self.staged.write().clear();
        }
    }
}

impl Transfer for DirectServer {
    fn stage(&self, path: &Path) -> Result<Option<String>, TransferError> {
        if self.shutdown.lock().is_none() {
            return Err(TransferError::Cancelled);
        }
        if !path.is_file() {
            return Err(TransferError::Read {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        let token = Uuid::new_v4().simple().to_string();
        self.staged.write().insert(token.clone(), path.to_path_buf());
        Ok(Some(format!("http://{}/files/{}", self.addr, token)))
    }

    fn send(
        &self,
        _ticket: &UploadTicket,
        _path: &Path,
        cancel: &CancelToken,
    ) -> Result<(), TransferError> {
        // the server pulls the staged file on its own schedule
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        Ok(())
    }

    fn cancel(&self) {
        self.signal_stop();
    }
}

impl Drop for DirectServer {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

async fn serve_file(State(staged): State<Staged>, UrlPath(token): UrlPath<String>) -> Response {
    let path = staged.read().get(&token).cloned();
    let Some(path) = path else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!(path = %path.display(), bytes = bytes.len(), "Served staged file");
            ([(header::CONTENT_TYPE, "application/octet-stream")], bytes).into_response()
        }
        Err(e) => {
            warn!(path = %path.display(), "Failed to read staged file: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Address of the interface used for outbound traffic. Connecting a UDP
/// socket sends nothing.
pub fn local_ip() -> Result<IpAddr, TransferError> {
    let detect = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("8.8.8.8:80")?;
        Ok(socket.local_addr()?.ip())
    };
    detect().map_err(|e| TransferError::Listener(format!("cannot determine local IP: {}", e)))
}
