//! Remote service boundary
//!
//! Everything the client needs from the API server goes through the
//! `RemoteService` trait. `HttpRemote` is the production implementation;
//! tests drive pools and uploads with in-process fakes.

pub mod http;
pub mod types;

pub use http::HttpRemote;
pub use types::{
    ImagePage, ItemState, PageInfo, Project, ProjectImage, Registration, RemoteItem, ServerMode,
    UploadKind, UploadTicket,
};

use crate::error::RemoteResult;

/// Remote API consumed by checks, uploads and the state poller
pub trait RemoteService: Send + Sync {
    /// Current operating mode of the API server
    fn server_mode(&self) -> RemoteResult<ServerMode>;

    /// Look up a project by id; `None` if it does not exist
    fn project(&self, project_id: &str) -> RemoteResult<Option<Project>>;

    /// Current server-side state of one registered item
    fn item_state(&self, kind: UploadKind, project_id: &str, item_id: &str)
        -> RemoteResult<RemoteItem>;

    /// Cloud storage providers accepted for `kind` (e.g. "s3", "oss")
    fn supported_clouds(&self, kind: UploadKind) -> RemoteResult<Vec<String>>;

    /// Buckets available for (`kind`, `cloud`)
    fn bucket_list(&self, kind: UploadKind, cloud: &str) -> RemoteResult<Vec<String>>;

    /// Server's preferred bucket for (`kind`, `cloud`)
    fn suggested_bucket(&self, kind: UploadKind, cloud: &str) -> RemoteResult<String>;

    /// Register an upload intent and receive the item id
    fn register_upload(&self, registration: &Registration) -> RemoteResult<UploadTicket>;

    /// Ask the server whether it can reach `ip:port`
    fn check_visibility(&self, ip: &str, port: u16) -> RemoteResult<bool>;

    /// Up to `first` images of a project, starting after the `after` cursor
    fn project_images(&self, project_id: &str, first: usize, after: Option<&str>)
        -> RemoteResult<ImagePage>;
}
