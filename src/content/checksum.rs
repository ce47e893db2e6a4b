//! Checksum calculation using SHA-1
//!
//! The file is streamed through the hasher in fixed-size chunks so large
//! images never have to fit in memory. The first chunk is kept for file
//! type sniffing.

use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read buffer size
const CHUNK_SIZE: usize = 64 * 1024;

/// Bytes retained from the start of the file for type detection
pub const HEADER_SIZE: usize = 8 * 1024;

/// Result of hashing one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChecksum {
    /// Lowercase hex digest, 40 characters
    pub hex: String,

    /// Number of bytes hashed
    pub bytes: u64,

    /// Leading bytes of the file (at most `HEADER_SIZE`)
    pub header: Vec<u8>,
}

/// Compute the SHA-1 hex digest of an in-memory buffer
///
/// # Example
///
/// ```
/// use alti_cli::content::checksum::checksum_bytes;
///
/// let hash = checksum_bytes(b"Hello, World!");
/// assert_eq!(hash.len(), 40);
/// ```
pub fn checksum_bytes(content: &[u8]) -> String {
    format!("{:x}", Sha1::digest(content))
}

/// Stream a file through SHA-1
pub fn checksum_file(path: &Path) -> io::Result<FileChecksum> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut header = Vec::new();
    let mut bytes = 0u64;

    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        if header.len() < HEADER_SIZE {
            let take = (HEADER_SIZE - header.len()).min(read);
            header.extend_from_slice(&buf[..take]);
        }
        hasher.update(&buf[..read]);
        bytes += read as u64;
    }

    Ok(FileChecksum {
        hex: format!("{:x}", hasher.finalize()),
        bytes,
        header,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            checksum_bytes(b""),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
        assert_eq!(
            checksum_bytes(b"abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_file_matches_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("large.bin");
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let sum = checksum_file(&path).unwrap();
        assert_eq!(sum.hex, checksum_bytes(&data));
        assert_eq!(sum.bytes, data.len() as u64);
        assert_eq!(sum.header, data[..HEADER_SIZE].to_vec());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        assert!(checksum_file(&dir.path().join("nope")).is_err());
    }
}
