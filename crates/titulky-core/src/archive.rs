//! Archive detection and subtitle content normalization
//!
//! Downloads from the site are either a bare subtitle file or a ZIP/RAR
//! archive holding a single subtitle member. Signature detection happens
//! here; the actual extraction is delegated to an injected
//! [`ArchiveExtractor`] so hosts can reuse their own archive tooling.

use crate::error::Result;

/// RAR signature prefix, shared by RAR4 and RAR5 archives
const RAR_SIGNATURE: &[u8] = b"Rar!\x1a\x07";

/// ZIP local-file-header signature
const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

/// ZIP end-of-central-directory signature (empty archives)
const ZIP_EMPTY_SIGNATURE: &[u8] = b"PK\x05\x06";

/// Kind of archive recognized in a download body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Rar,
    Zip,
}

impl std::fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveKind::Rar => f.write_str("rar"),
            ArchiveKind::Zip => f.write_str("zip"),
        }
    }
}

/// Check leading bytes for a known archive signature.
pub fn detect_archive(data: &[u8]) -> Option<ArchiveKind> {
    if data.starts_with(RAR_SIGNATURE) {
        Some(ArchiveKind::Rar)
    } else if data.starts_with(ZIP_SIGNATURE) || data.starts_with(ZIP_EMPTY_SIGNATURE) {
        Some(ArchiveKind::Zip)
    } else {
        None
    }
}

/// Extracts the single subtitle file from an archive byte stream.
pub trait ArchiveExtractor: Send + Sync {
    /// Return the subtitle member's bytes, or an empty vector when the
    /// archive holds no usable subtitle file.
    fn extract_subtitle(&self, kind: ArchiveKind, data: &[u8]) -> Result<Vec<u8>>;
}

/// Normalize Windows line endings to Unix ones.
pub fn fix_line_endings(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == b'\r' && data.get(i + 1) == Some(&b'\n') {
            i += 1;
            continue;
        }
        out.push(data[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_rar() {
        assert_eq!(detect_archive(b"Rar!\x1a\x07\x00data"), Some(ArchiveKind::Rar));
        assert_eq!(
            detect_archive(b"Rar!\x1a\x07\x01\x00data"),
            Some(ArchiveKind::Rar)
        );
    }

    #[test]
    fn test_detect_zip() {
        assert_eq!(detect_archive(b"PK\x03\x04rest"), Some(ArchiveKind::Zip));
        assert_eq!(detect_archive(b"PK\x05\x06"), Some(ArchiveKind::Zip));
    }

    #[test]
    fn test_detect_plain_text() {
        assert_eq!(detect_archive(b"1\n00:00:01,000 --> 00:00:02,000\nAhoj\n"), None);
        assert_eq!(detect_archive(b""), None);
        assert_eq!(detect_archive(b"PK"), None);
    }

    #[test]
    fn test_fix_line_endings() {
        assert_eq!(fix_line_endings(b"a\r\nb\r\nc"), b"a\nb\nc");
        assert_eq!(fix_line_endings(b"no changes\n"), b"no changes\n");
        // A lone carriage return is kept as-is.
        assert_eq!(fix_line_endings(b"a\rb"), b"a\rb");
        assert_eq!(fix_line_endings(b""), b"");
    }

    #[test]
    fn test_archive_kind_display() {
        assert_eq!(ArchiveKind::Rar.to_string(), "rar");
        assert_eq!(ArchiveKind::Zip.to_string(), "zip");
    }
}
