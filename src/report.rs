//! Aggregation of `check image` results

use crate::digest::DigestResult;
use std::collections::HashMap;
use std::path::PathBuf;

/// Totals over a digest result stream. Results arrive in any order; only
/// the displayed lists are sorted.
#[derive(Debug, Default)]
pub struct CheckReport {
    valid: Vec<DigestResult>,
    invalid: Vec<DigestResult>,
    pub total_bytes: u64,
    pub total_gigapixels: f64,
    /// Effective digest parallelism
    pub workers: usize,
}

impl CheckReport {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    pub fn record(&mut self, result: DigestResult) {
        if result.is_valid() {
            self.total_bytes += result.filesize;
            self.total_gigapixels += result.gigapixels;
            self.valid.push(result);
        } else {
            self.invalid.push(result);
        }
    }

    /// Files seen, valid or not
    pub fn total(&self) -> usize {
        self.valid.len() + self.invalid.len()
    }

    pub fn invalid_count(&self) -> usize {
        self.invalid.len()
    }

    /// Valid images sorted by path
    pub fn images(&self) -> Vec<&DigestResult> {
        let mut v: Vec<_> = self.valid.iter().collect();
        v.sort_by(|a, b| a.path.cmp(&b.path));
        v
    }

    /// Failed files sorted by path
    pub fn invalid(&self) -> Vec<&DigestResult> {
        let mut v: Vec<_> = self.invalid.iter().collect();
        v.sort_by(|a, b| a.path.cmp(&b.path));
        v
    }

    /// Groups of two or more valid images sharing a checksum, each group
    /// sorted by path and the groups by their first path
    pub fn duplicates(&self) -> Vec<(String, Vec<PathBuf>)> {
        let mut by_sum: HashMap<&str, Vec<PathBuf>> = HashMap::new();
        for r in &self.valid {
            by_sum.entry(&r.checksum).or_default().push(r.path.clone());
        }

        let mut groups: Vec<_> = by_sum
            .into_iter()
            .filter(|(_, paths)| paths.len() > 1)
            .map(|(sum, mut paths)| {
                paths.sort();
                (sum.to_string(), paths)
            })
            .collect();
        groups.sort_by(|a, b| a.1[0].cmp(&b.1[0]));
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FileError;
    use std::path::Path;

    fn image(path: &str, sum: &str, size: u64) -> DigestResult {
        DigestResult {
            path: PathBuf::from(path),
            filename: Path::new(path).file_name().unwrap().to_string_lossy().into(),
            width: 1000,
            height: 1000,
            filesize: size,
            checksum: sum.into(),
            gigapixels: 0.001,
            filetype: "image/jpeg".into(),
            error: None,
        }
    }

    #[test]
    fn test_totals_skip_invalid() {
        let mut report = CheckReport::new(2);
        report.record(image("/a/1.jpg", "aa", 100));
        report.record(image("/a/2.jpg", "bb", 50));
        report.record(DigestResult::failed(
            Path::new("/a/bad.jpg"),
            FileError::Dimension {
                path: "/a/bad.jpg".into(),
                reason: "unsupported".into(),
            },
        ));

        assert_eq!(report.total(), 3);
        assert_eq!(report.images().len(), 2);
        assert_eq!(report.invalid().len(), 1);
        assert_eq!(report.total_bytes, 150);
        assert!((report.total_gigapixels - 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_duplicates_grouped_by_checksum() {
        let mut report = CheckReport::new(1);
        report.record(image("/b/x.jpg", "same", 1));
        report.record(image("/a/y.jpg", "same", 1));
        report.record(image("/a/z.jpg", "other", 1));

        let dups = report.duplicates();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].0, "same");
        assert_eq!(dups[0].1, vec![PathBuf::from("/a/y.jpg"), PathBuf::from("/b/x.jpg")]);
    }

    #[test]
    fn test_images_sorted() {
        let mut report = CheckReport::new(1);
        report.record(image("/c.jpg", "1", 1));
        report.record(image("/a.jpg", "2", 1));
        let names: Vec<_> = report.images().iter().map(|r| r.filename.clone()).collect();
        assert_eq!(names, vec!["a.jpg", "c.jpg"]);
    }
}
