//! Per-file digest computation and the digest worker pool
//!
//! Each worker pulls a path from the walker, then:
//! 1. stats the file for its size
//! 2. decodes the image header for its pixel dimensions
//! 3. streams the bytes through SHA-1 (keeping the header for type sniffing)
//!
//! A failure at any step produces a `DigestResult` carrying the error with
//! zeroed numeric fields. Failures never stop the pool.

use crate::cancel::CancelToken;
use crate::content::checksum::checksum_file;
use crate::content::filetype::file_type_label;
use crate::content::{ImageCrateDecoder, ImageDecoder};
use crate::error::{FileError, WorkerError};
use crate::pool::WorkerPool;
use crossbeam_channel::Receiver;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Metadata computed for one local file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DigestResult {
    pub path: PathBuf,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub filesize: u64,
    /// SHA-1, lowercase hex
    pub checksum: String,
    /// width × height / 1e9
    pub gigapixels: f64,
    pub filetype: String,
    pub error: Option<FileError>,
}

impl DigestResult {
    /// Record for a file that could not be digested
    pub fn failed(path: &Path, error: FileError) -> Self {
        Self {
            path: path.to_path_buf(),
            filename: filename_of(path),
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    pub fn megapixels(&self) -> f64 {
        self.gigapixels * 1000.0
    }
}

/// Convert bytes to megabytes (base 1024)
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

fn filename_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Computes `DigestResult`s, alone or as a worker pool
#[derive(Clone)]
pub struct ImageDigester {
    decoder: Arc<dyn ImageDecoder>,
}

impl ImageDigester {
    pub fn new() -> Self {
        Self::with_decoder(Arc::new(ImageCrateDecoder))
    }

    pub fn with_decoder(decoder: Arc<dyn ImageDecoder>) -> Self {
        Self { decoder }
    }

    /// Digest one file
    pub fn digest(&self, path: &Path) -> DigestResult {
        let display = path.display().to_string();

        let filesize = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                return DigestResult::failed(
                    path,
                    FileError::Filesize {
                        path: display,
                        reason: e.to_string(),
                    },
                )
            }
        };

        let (width, height) = match self.decoder.dimensions(path) {
            Ok(dim) => dim,
            Err(reason) => {
                return DigestResult::failed(path, FileError::Dimension { path: display, reason })
            }
        };

        let sum = match checksum_file(path) {
            Ok(sum) => sum,
            Err(e) => {
                return DigestResult::failed(
                    path,
                    FileError::Checksum {
                        path: display,
                        reason: e.to_string(),
                    },
                )
            }
        };

        DigestResult {
            path: path.to_path_buf(),
            filename: filename_of(path),
            width,
            height,
            filesize,
            checksum: sum.hex,
            gigapixels: f64::from(width) * f64::from(height) / 1e9,
            filetype: file_type_label(&sum.header, path),
            error: None,
        }
    }

    /// Start `workers` digest workers (zero = one per core) over `paths`.
    ///
    /// The returned pool's result stream closes after every worker returns;
    /// `WorkerPool::workers` reports the effective parallelism.
    pub fn run(
        &self,
        paths: Receiver<PathBuf>,
        workers: usize,
        cancel: &CancelToken,
    ) -> Result<WorkerPool<DigestResult>, WorkerError> {
        let digester = self.clone();
        WorkerPool::spawn("digest", workers, paths, cancel, move |id, path: PathBuf| {
            let result = digester.digest(&path);
            debug!(worker = id, path = %path.display(), valid = result.is_valid(), "Digested");
            result
        })
    }
}

impl Default for ImageDigester {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::checksum::checksum_bytes;
    use tempfile::tempdir;

    #[test]
    fn test_digest_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        image::RgbImage::new(40, 25).save(&path).unwrap();

        let r = ImageDigester::new().digest(&path);
        assert!(r.is_valid());
        assert_eq!(r.filename, "a.png");
        assert_eq!((r.width, r.height), (40, 25));
        assert_eq!(r.filesize, std::fs::metadata(&path).unwrap().len());
        assert_eq!(r.checksum, checksum_bytes(&std::fs::read(&path).unwrap()));
        assert!((r.gigapixels - 1000.0 / 1e9).abs() < f64::EPSILON);
        assert_eq!(r.filetype, "image/png");
    }

    #[test]
    fn test_digest_failure_zeroes_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.jpg");
        std::fs::write(&path, b"garbage").unwrap();

        let r = ImageDigester::new().digest(&path);
        assert!(matches!(r.error, Some(FileError::Dimension { .. })));
        assert_eq!((r.width, r.height, r.filesize), (0, 0, 0));
        assert!(r.checksum.is_empty());
        assert_eq!(r.filename, "bad.jpg");
    }

    #[test]
    fn test_digest_missing_file() {
        let dir = tempdir().unwrap();
        let r = ImageDigester::new().digest(&dir.path().join("gone.png"));
        assert!(matches!(r.error, Some(FileError::Filesize { .. })));
    }

    #[test]
    fn test_bytes_to_mb() {
        assert_eq!(bytes_to_mb(1024 * 1024), 1.0);
        assert_eq!(bytes_to_mb(0), 0.0);
    }
}
