//! alti-cli - Image Project Import Client
//!
//! A command-line client for remote image-processing projects: it audits
//! local image collections and imports images, meta files and models,
//! then follows every imported item until the server accepts or rejects it.
//!
//! # Features
//!
//! - **Parallel Digest**: A bounded pool of worker threads computes size,
//!   pixel dimensions, SHA-1 and file type for every file under a tree.
//!
//! - **Per-item Polling**: Registered items are polled until terminal, each
//!   with its own client-side timeout so one slow item never blocks a batch.
//!
//! - **Cancellation**: One shared token reaches every blocking wait; Ctrl+C
//!   stops walkers, workers, pollers and transfers without deadlock.
//!
//! - **Upload Methods**: Cloud uploads to pre-signed URLs, or a local
//!   ad-hoc listener the server pulls from ("direct").
//!
//! - **Export**: Page through a project's images into a CSV and download
//!   the ones the server has accepted.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  paths   ┌──────────────┐ DigestResult ┌──────────────┐
//! │ Walker       │ ───────▶ │ Digest pool  │ ───────────▶ │ check report │
//! │ (walkdir)    │          │ (N workers)  │              └──────────────┘
//! └──────────────┘          └──────┬───────┘
//!                                  │ import image
//!                                  ▼
//! ┌──────────────┐          ┌──────────────┐ TrackedItem  ┌──────────────┐
//! │ Uploader     │ ───────▶ │ Register pool│ ───────────▶ │ Poller pool  │
//! │ checks,      │          │ + transfer   │              │ (N workers)  │
//! │ bucket       │          └──────────────┘              └──────┬───────┘
//! └──────────────┘                                               │
//!        ▲                                                       ▼
//!        │ cancel                                         import summary
//!   Ctrl+C handler
//! ```
//!
//! # Example
//!
//! ```bash
//! # Audit a directory
//! alti-cli check image -d ./photos -t
//!
//! # Import every image into a project
//! alti-cli import image -p <PID> -d ./photos
//!
//! # Import a meta file
//! alti-cli import meta -p <PID> -f ./camera.txt
//!
//! # Export the image list and download ready images
//! alti-cli export image -p <PID> -d ./downloads
//! ```

pub mod cancel;
pub mod config;
pub mod content;
pub mod digest;
pub mod error;
pub mod export;
pub mod poller;
pub mod pool;
pub mod progress;
pub mod remote;
pub mod report;
pub mod upload;
pub mod walker;

pub use cancel::CancelToken;
pub use config::{CheckConfig, CliArgs, RemoteConfig, UploadConfig};
pub use digest::{DigestResult, ImageDigester};
pub use error::{CliError, Result};
pub use export::{ExportSummary, ImageExporter};
pub use poller::{StateChecker, TrackedItem};
pub use pool::WorkerPool;
pub use remote::{HttpRemote, RemoteService};
pub use upload::{UploadCanceller, UploadStage, Uploader};
