//! Image pixel dimensions
//!
//! Decoding is behind the `ImageDecoder` trait so the digest pool can be
//! driven by a fake decoder in tests.

use std::path::Path;

/// Reads the pixel dimensions of an image file
pub trait ImageDecoder: Send + Sync {
    /// Returns `(width, height)` or a human-readable reason
    fn dimensions(&self, path: &Path) -> Result<(u32, u32), String>;
}

/// Decoder backed by the `image` crate; only the header is parsed
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateDecoder;

impl ImageDecoder for ImageCrateDecoder {
    fn dimensions(&self, path: &Path) -> Result<(u32, u32), String> {
        image::image_dimensions(path).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_png_dimensions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("img.png");
        image::RgbImage::new(7, 5).save(&path).unwrap();

        assert_eq!(ImageCrateDecoder.dimensions(&path), Ok((7, 5)));
    }

    #[test]
    fn test_garbage_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        assert!(ImageCrateDecoder.dimensions(&path).is_err());
    }
}
