//! File type detection using magic bytes
//!
//! Uses the `infer` crate on the leading bytes of a file. When the header is
//! not recognised the lowercase extension is used instead, so renamed or
//! exotic files still get a label in reports.

use std::path::Path;

/// Detect the MIME type of a file from its header bytes
///
/// # Example
///
/// ```
/// use alti_cli::content::filetype::detect_file_type;
///
/// let png_header = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
/// assert_eq!(detect_file_type(png_header), Some("image/png".to_string()));
/// assert_eq!(detect_file_type(&[0x00, 0x01, 0x02, 0x03]), None);
/// ```
pub fn detect_file_type(header: &[u8]) -> Option<String> {
    infer::get(header).map(|kind| kind.mime_type().to_string())
}

/// Label a file by header, falling back to its extension
pub fn file_type_label(header: &[u8], path: &Path) -> String {
    detect_file_type(header).unwrap_or_else(|| {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    })
}
