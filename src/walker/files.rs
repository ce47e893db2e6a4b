//! Recursive file enumeration with a skip pattern and cooperative cancel

use crate::cancel::CancelToken;
use crate::error::WalkError;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Capacity of the path channel between the walker and its consumers
const PATH_QUEUE_SIZE: usize = 1024;

/// Handles returned by [`walk_files`]
pub struct FileWalk {
    /// Absolute paths of files found, in traversal order
    pub paths: Receiver<PathBuf>,

    /// Receives exactly one value once the walk has stopped.
    /// Cancellation is reported as `Ok(())`.
    pub completion: Receiver<Result<(), WalkError>>,
}

impl FileWalk {
    /// Wait for the walk outcome. Call after draining `paths`.
    pub fn wait(&self) -> Result<(), WalkError> {
        self.completion.recv().unwrap_or(Ok(()))
    }
}

/// Walk `root` recursively, skipping any path whose string matches `skip`.
pub fn walk_files(root: &Path, skip: Option<Regex>, cancel: &CancelToken) -> FileWalk {
    let (path_tx, paths) = bounded(PATH_QUEUE_SIZE);
    let (done_tx, completion) = bounded(1);
    let root = root.to_path_buf();
    let cancel = cancel.clone();

    let spawned = thread::Builder::new()
        .name("walker".into())
        .spawn({
            let done_tx = done_tx.clone();
            move || {
                let outcome = walk(&root, skip.as_ref(), &cancel, &path_tx);
                drop(path_tx);
                let _ = done_tx.send(outcome);
            }
        });

    if let Err(e) = spawned {
        let _ = done_tx.send(Err(WalkError::ReadDirFailed {
            path: String::new(),
            reason: format!("failed to spawn walker thread: {}", e),
        }));
    }

    FileWalk { paths, completion }
}

fn walk(
    root: &Path,
    skip: Option<&Regex>,
    cancel: &CancelToken,
    tx: &Sender<PathBuf>,
) -> Result<(), WalkError> {
    let root = std::fs::canonicalize(root).map_err(|e| WalkError::InvalidRoot {
        path: root.display().to_string(),
        reason: e.to_string(),
    })?;

    debug!(root = %root.display(), "Walking");

    for entry in WalkDir::new(&root).follow_links(false) {
        if cancel.is_cancelled() {
            debug!("Walk cancelled");
            return Ok(());
        }

        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| root.display().to_string());
            warn!(path = %path, "Walk failed: {}", e);
            WalkError::ReadDirFailed {
                path,
                reason: e.to_string(),
            }
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.into_path();
        if let Some(re) = skip {
            if re.is_match(&path.to_string_lossy()) {
                continue;
            }
        }

        select! {
            send(tx, path) -> res => {
                if res.is_err() {
                    return Ok(());
                }
            }
            recv(cancel.done()) -> _ => return Ok(()),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_walk_recursive_with_skip() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("a.jpg"));
        touch(&dir.path().join("sub/b.jpg"));
        touch(&dir.path().join("sub/deep/c.jpg"));
        touch(&dir.path().join(".thumbs/d.jpg"));

        let cancel = CancelToken::new();
        let skip = Regex::new(r"\.thumbs").unwrap();
        let walk = walk_files(dir.path(), Some(skip), &cancel);

        let mut names: Vec<String> = walk
            .paths
            .iter()
            .map(|p| {
                assert!(p.is_absolute());
                p.file_name().unwrap().to_string_lossy().into_owned()
            })
            .collect();
        names.sort();

        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg"]);
        assert_eq!(walk.wait(), Ok(()));
    }

    #[test]
    fn test_missing_root_reports_error_once() {
        let dir = tempdir().unwrap();
        let cancel = CancelToken::new();
        let walk = walk_files(&dir.path().join("missing"), None, &cancel);

        assert_eq!(walk.paths.iter().count(), 0);
        assert!(matches!(walk.wait(), Err(WalkError::InvalidRoot { .. })));
        // the completion channel is closed after its single value
        assert!(walk.completion.recv().is_err());
    }

    #[test]
    fn test_cancel_stops_walk_without_error() {
        let dir = tempdir().unwrap();
        for i in 0..(PATH_QUEUE_SIZE + 200) {
            touch(&dir.path().join(format!("f{}.jpg", i)));
        }

        let cancel = CancelToken::new();
        let walk = walk_files(dir.path(), None, &cancel);

        assert!(walk.paths.recv().is_ok());
        cancel.cancel();

        let rest = walk.paths.iter().count();
        assert!(rest < PATH_QUEUE_SIZE + 200);
        assert_eq!(walk.wait(), Ok(()));
    }
}
