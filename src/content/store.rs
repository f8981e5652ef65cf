//! Byte-addressed content store (Phase 1 acquisition).
//!
//! Streams source bytes through BLAKE3, detects the MIME type from magic
//! bytes, and produces the acquisition manifest the rest of the pipeline
//! keys on.

use crate::error::Result;
use crate::io::DocumentReader;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Declared metadata accompanying an acquired document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeclaredMetadata {
    /// Document title as declared by the operator.
    pub title: Option<String>,
    /// Document version as declared by the operator.
    pub version: Option<String>,
}

/// Acquisition manifest: the Phase 1 postcondition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceManifest {
    /// BLAKE3 digest of the raw source bytes (hex).
    pub source_hash: String,
    /// Detected MIME type.
    pub mime: String,
    /// Total byte count of the source.
    pub byte_count: u64,
    /// Source path as given to the pipeline.
    pub path: String,
    /// Declared title, if any.
    pub title: Option<String>,
    /// Declared version, if any.
    pub version: Option<String>,
}

/// Acquires a document: reads bytes, hashes them, detects MIME.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn acquire<P: AsRef<Path>>(
    path: P,
    metadata: &DeclaredMetadata,
) -> Result<(Vec<u8>, SourceManifest)> {
    let reader = DocumentReader::open(&path)?;
    let (bytes, digest) = reader.read_hashed()?;
    let manifest = SourceManifest {
        source_hash: digest.to_hex().to_string(),
        mime: detect_mime(&bytes).to_string(),
        byte_count: bytes.len() as u64,
        path: reader.path().to_string(),
        title: metadata.title.clone(),
        version: metadata.version.clone(),
    };
    Ok((bytes, manifest))
}

/// Detects the MIME type of a document from its magic bytes.
///
/// Recognizes PDF and OOXML (DOCX) containers; falls back to `text/plain`
/// for valid UTF-8 and `application/octet-stream` otherwise.
#[must_use]
pub fn detect_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"%PDF") {
        return "application/pdf";
    }
    // OOXML documents are ZIP containers
    if bytes.starts_with(&[0x50, 0x4B, 0x03, 0x04]) {
        return "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
    }
    if std::str::from_utf8(bytes).is_ok() {
        return "text/plain";
    }
    "application/octet-stream"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_detect_mime_pdf() {
        assert_eq!(detect_mime(b"%PDF-1.7 ..."), "application/pdf");
    }

    #[test]
    fn test_detect_mime_docx() {
        assert_eq!(
            detect_mime(&[0x50, 0x4B, 0x03, 0x04, 0x00]),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
    }

    #[test]
    fn test_detect_mime_text() {
        assert_eq!(detect_mime("plan de desarrollo".as_bytes()), "text/plain");
    }

    #[test]
    fn test_detect_mime_binary() {
        assert_eq!(detect_mime(&[0xff, 0xfe, 0x00]), "application/octet-stream");
    }

    #[test]
    fn test_acquire_manifest() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(b"presupuesto municipal COP 1.200.000.000")
            .unwrap();

        let meta = DeclaredMetadata {
            title: Some("Plan 2024".to_string()),
            version: Some("1.0".to_string()),
        };
        let (bytes, manifest) = acquire(tmp.path(), &meta).unwrap();
        assert_eq!(manifest.byte_count, bytes.len() as u64);
        assert_eq!(manifest.mime, "text/plain");
        assert_eq!(
            manifest.source_hash,
            blake3::hash(b"presupuesto municipal COP 1.200.000.000")
                .to_hex()
                .to_string()
        );
        assert_eq!(manifest.title.as_deref(), Some("Plan 2024"));
    }

    #[test]
    fn test_acquire_is_deterministic() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(b"meta: reducir desnutricion 10%").unwrap();

        let meta = DeclaredMetadata::default();
        let (_, m1) = acquire(tmp.path(), &meta).unwrap();
        let (_, m2) = acquire(tmp.path(), &meta).unwrap();
        assert_eq!(m1, m2);
    }
}
