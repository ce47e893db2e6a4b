//! Value types exchanged with the remote service

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating mode reported by the API server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    Normal,
    ReadOnly,
    Offline,
}

impl ServerMode {
    /// Unknown strings are treated as offline
    pub fn parse(s: &str) -> Self {
        match s {
            "Normal" => ServerMode::Normal,
            "ReadOnly" => ServerMode::ReadOnly,
            _ => ServerMode::Offline,
        }
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerMode::Normal => "Normal",
            ServerMode::ReadOnly => "ReadOnly",
            ServerMode::Offline => "Offline",
        };
        f.write_str(s)
    }
}

/// What is being uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    Image,
    Meta,
    Model,
}

impl UploadKind {
    pub const ALL: [UploadKind; 3] = [UploadKind::Image, UploadKind::Meta, UploadKind::Model];

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadKind::Image => "image",
            UploadKind::Meta => "meta",
            UploadKind::Model => "model",
        }
    }
}

impl fmt::Display for UploadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a tracked item
///
/// `Pending → {Ready | Invalid | TimedOut}`. `TimedOut` is assigned by the
/// client only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    Pending,
    Ready,
    Invalid,
    TimedOut,
}

impl ItemState {
    /// Map a server state string; anything not terminal is still pending
    pub fn parse(s: &str) -> Self {
        match s {
            "Ready" => ItemState::Ready,
            "Invalid" => ItemState::Invalid,
            _ => ItemState::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ItemState::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Pending => "Pending",
            ItemState::Ready => "Ready",
            ItemState::Invalid => "Invalid",
            ItemState::TimedOut => "TimedOut",
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Project summary
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Imported projects carry a model instead of raw images
    pub is_imported: bool,
}

/// One state report for an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    pub state: ItemState,
    pub errors: Vec<String>,
}

impl RemoteItem {
    pub fn pending() -> Self {
        Self {
            state: ItemState::Pending,
            errors: Vec::new(),
        }
    }

    pub fn ready() -> Self {
        Self {
            state: ItemState::Ready,
            errors: Vec::new(),
        }
    }

    pub fn invalid(message: &str) -> Self {
        Self {
            state: ItemState::Invalid,
            errors: vec![message.to_string()],
        }
    }
}

/// Upload intent sent to the server
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub project_id: String,
    pub kind: Option<UploadKind>,
    pub filename: String,
    pub method: String,
    pub bucket: String,
    pub filesize: u64,
    pub checksum: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Where the server pulls the file from (direct upload)
    pub source_url: Option<String>,
}

/// Server response to a registration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTicket {
    pub item_id: String,
    /// Pre-signed destination for cloud uploads
    pub upload_url: Option<String>,
}

/// One image stored in a project
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectImage {
    /// Filename the image was uploaded with
    pub name: String,
    /// Hashed name the server stores it under
    pub filename: String,
    /// Raw server state, e.g. "Ready"
    pub state: String,
    /// Download location
    #[serde(default)]
    pub url: String,
}

impl ProjectImage {
    pub fn is_ready(&self) -> bool {
        ItemState::parse(&self.state) == ItemState::Ready
    }
}

/// Cursor position after a page
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// One page of a project's images
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImagePage {
    pub images: Vec<ProjectImage>,
    pub page_info: PageInfo,
    /// Number of images in the whole project
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_state_parse() {
        assert_eq!(ItemState::parse("Ready"), ItemState::Ready);
        assert_eq!(ItemState::parse("Invalid"), ItemState::Invalid);
        assert_eq!(ItemState::parse("Uploaded"), ItemState::Pending);
        assert!(ItemState::TimedOut.is_terminal());
        assert!(!ItemState::Pending.is_terminal());
    }

    #[test]
    fn test_server_mode_parse() {
        assert_eq!(ServerMode::parse("Normal"), ServerMode::Normal);
        assert_eq!(ServerMode::parse("ReadOnly"), ServerMode::ReadOnly);
        assert_eq!(ServerMode::parse(""), ServerMode::Offline);
    }

    #[test]
    fn test_registration_serializes_camel_case() {
        let reg = Registration {
            project_id: "p1".into(),
            kind: Some(UploadKind::Meta),
            filename: "camera.txt".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&reg).unwrap();
        assert_eq!(json["projectId"], "p1");
        assert_eq!(json["kind"], "meta");
        assert!(json["sourceUrl"].is_null());
    }

    #[test]
    fn test_project_image_ready() {
        let img: ProjectImage = serde_json::from_str(
            r#"{"name":"a.jpg","filename":"3f2a.jpg","state":"Ready","url":"http://x/a"}"#,
        )
        .unwrap();
        assert!(img.is_ready());

        let pending: ProjectImage =
            serde_json::from_str(r#"{"name":"b.jpg","filename":"9c1d.jpg","state":"Uploaded"}"#).unwrap();
        assert!(!pending.is_ready());
        assert_eq!(pending.url, "");
    }
}
