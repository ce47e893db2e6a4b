//! Content analysis for local files
//!
//! This module provides functions for:
//! - Computing SHA-1 checksums over the full file bytes
//! - Detecting file types from magic bytes
//! - Reading image pixel dimensions

pub mod checksum;
pub mod dimensions;
pub mod filetype;

pub use checksum::{checksum_bytes, checksum_file, FileChecksum};
pub use dimensions::{ImageCrateDecoder, ImageDecoder};
pub use filetype::detect_file_type;
