//! Precondition checks run before any upload work begins
//!
//! Each check is a closure taking a logging callback. `check` runs them in
//! order and stops at the first failure; the callback only explains the
//! failure to the user, the returned `CheckError` is what callers act on.

use crate::config::DirectAddr;
use crate::error::CheckError;
use crate::remote::{RemoteService, ServerMode, UploadKind};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::warn;

/// Method name for the ad-hoc listener upload
pub const DIRECT_METHOD: &str = "direct";

/// Meta files accepted by the server
pub const META_FILENAMES: [&str; 3] = ["camera.txt", "pose.txt", "group.txt"];

/// Model archives must be zip files
pub static MODEL_FILENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[^/\\]+\.zip$").expect("Invalid model filename regex"));

/// Logging callback handed to every check
pub type LogFn = dyn Fn(&str) + Send + Sync;

/// A single precondition
pub type CheckFn<'a> = Box<dyn FnOnce(&LogFn) -> Result<(), CheckError> + 'a>;

/// Forward check messages to the log
pub fn warn_log(msg: &str) {
    warn!("{}", msg);
}

/// Discard check messages
pub fn quiet_log(_: &str) {}

/// Run checks in order, stopping at the first failure
pub fn check(logger: &LogFn, checks: Vec<CheckFn<'_>>) -> Result<(), CheckError> {
    for c in checks {
        c(logger)?;
    }
    Ok(())
}

/// The server must be in normal mode to accept uploads
pub fn api_server(remote: &dyn RemoteService) -> CheckFn<'_> {
    Box::new(move |log: &LogFn| {
        let mode = remote
            .server_mode()
            .map_err(|e| CheckError::Remote(e.to_string()))?;
        match mode {
            ServerMode::Normal => Ok(()),
            ServerMode::ReadOnly => {
                log(&format!("API server is in {:?} mode.", mode.to_string()));
                log("Nothing could be uploaded at the moment!");
                Err(CheckError::ReadOnly)
            }
            ServerMode::Offline => {
                log(&format!("API server is in {:?} mode.", mode.to_string()));
                Err(CheckError::Offline)
            }
        }
    })
}

/// The server must be reachable, read-only is fine
pub fn api_server_lite(remote: &dyn RemoteService) -> CheckFn<'_> {
    Box::new(move |_: &LogFn| match remote.server_mode() {
        Ok(ServerMode::Normal) | Ok(ServerMode::ReadOnly) => Ok(()),
        _ => Err(CheckError::Offline),
    })
}

/// The project must exist and suit `kind`:
/// meta needs a non-imported project, model an imported one.
pub fn project<'a>(remote: &'a dyn RemoteService, kind: UploadKind, pid: &'a str) -> CheckFn<'a> {
    Box::new(move |log: &LogFn| {
        let project = remote.project(pid).map_err(|e| {
            log(&format!("Project could not be found! Error: {}", e));
            CheckError::Remote(e.to_string())
        })?;
        let Some(project) = project else {
            log(&format!("Project {:?} could not be found!", pid));
            return Err(CheckError::ProjectNotFound);
        };
        let compatible = match kind {
            UploadKind::Image => true,
            UploadKind::Meta => !project.is_imported,
            UploadKind::Model => project.is_imported,
        };
        if !compatible {
            log(&format!("{:?} project could not be found!", kind.as_str()));
            return Err(CheckError::ProjectNotFound);
        }
        Ok(())
    })
}

/// The file must exist
pub fn file_exists(path: &Path) -> CheckFn<'_> {
    Box::new(move |log: &LogFn| {
        if !path.is_file() {
            log(&format!("Could not find file: {:?}", path.display().to_string()));
            return Err(CheckError::FileNotFound(path.display().to_string()));
        }
        Ok(())
    })
}

/// The path must be a directory
pub fn dir_exists(path: &Path) -> CheckFn<'_> {
    Box::new(move |log: &LogFn| {
        if !path.is_dir() {
            log(&format!("Not a directory: {:?}", path.display().to_string()));
            return Err(CheckError::NotDirectory(path.display().to_string()));
        }
        Ok(())
    })
}

/// The base filename must be one of `allowed`
pub fn filename_allowed<'a>(path: &'a Path, allowed: &'a [&'a str]) -> CheckFn<'a> {
    Box::new(move |log: &LogFn| {
        let name = base_name(path);
        if !allowed.contains(&name.as_str()) {
            log(&format!("Filename: {:?} is invalid", name));
            log(&format!("Filename must be one of: [{}]", allowed.join(", ")));
            return Err(CheckError::MetaFilenameInvalid(name));
        }
        Ok(())
    })
}

/// The base filename must match `re`
pub fn filename_matches<'a>(path: &'a Path, re: &'a Regex) -> CheckFn<'a> {
    Box::new(move |log: &LogFn| {
        let name = base_name(path);
        if !re.is_match(&name) {
            log(&format!("Invalid file name: {:?}", name));
            return Err(CheckError::ModelFilenameInvalid(name));
        }
        Ok(())
    })
}

/// A requested method must be `direct` or a cloud the server supports
/// for `kind`. No method means the server will suggest one.
pub fn upload_method<'a>(
    remote: &'a dyn RemoteService,
    kind: UploadKind,
    method: Option<&'a str>,
    direct: Option<DirectAddr>,
) -> CheckFn<'a> {
    Box::new(move |log: &LogFn| {
        let Some(method) = method else {
            return Ok(());
        };
        if method == DIRECT_METHOD {
            return Ok(());
        }
        if direct.is_some() {
            log("--ip/--port only apply to direct upload");
        }
        let supported = remote
            .supported_clouds(kind)
            .map_err(|e| CheckError::Remote(e.to_string()))?;
        if best_match(&supported, method).is_some() {
            return Ok(());
        }

        log(&format!("Upload method: {:?} is not supported!", method));
        match supported.len() {
            0 => log("No supported method is found! You could only use 'direct' upload!"),
            1 => log(&format!("Only {:?} upload is supported!", supported[0])),
            _ => log(&format!("Supported upload methods are: {:?}!", supported)),
        }
        Err(CheckError::UploadMethodInvalid(method.to_string()))
    })
}

/// Case-insensitive match: exact first, then a unique prefix
pub fn best_match<'a>(candidates: &'a [String], query: &str) -> Option<&'a str> {
    let query = query.to_lowercase();
    if let Some(exact) = candidates.iter().find(|c| c.to_lowercase() == query) {
        return Some(exact);
    }
    let mut prefixed = candidates
        .iter()
        .filter(|c| !query.is_empty() && c.to_lowercase().starts_with(&query));
    match (prefixed.next(), prefixed.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
