//! Document reading utilities with memory mapping support.
//!
//! Phase 1 acquisition streams source bytes through a BLAKE3 hasher while
//! reading. Small files are read directly; large files are memory mapped.

// Memory mapping requires unsafe but is well-documented and safe for read-only access
#![allow(unsafe_code)]

use crate::error::{IoError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Threshold for using memory mapping (1MB).
const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Maximum file size to read into memory (1GB).
const MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Document reader with support for memory mapping.
///
/// Automatically chooses the best reading strategy based on file size:
/// - Small files (< 1MB): Read directly into memory
/// - Large files (>= 1MB): Use memory mapping
///
/// # Examples
///
/// ```no_run
/// use cpp_rs::io::DocumentReader;
///
/// let reader = DocumentReader::open("plan_desarrollo.pdf")?;
/// let (bytes, digest) = reader.read_hashed()?;
/// # Ok::<(), cpp_rs::Error>(())
/// ```
pub struct DocumentReader {
    /// File handle.
    file: File,
    /// File size in bytes.
    size: u64,
    /// File path for error messages.
    path: String,
}

impl DocumentReader {
    /// Opens a document for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the file doesn't exist, can't be opened, or
    /// exceeds the 1GB acquisition cap.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy().to_string();

        if !path_ref.exists() {
            return Err(IoError::FileNotFound { path: path_str }.into());
        }

        let file = File::open(path_ref).map_err(|e| IoError::ReadFailed {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

        let metadata = file.metadata().map_err(|e| IoError::ReadFailed {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

        let size = metadata.len();

        if size > MAX_FILE_SIZE {
            return Err(IoError::ReadFailed {
                path: path_str,
                reason: format!("file too large: {size} bytes (max: {MAX_FILE_SIZE} bytes)"),
            }
            .into());
        }

        Ok(Self {
            file,
            size,
            path: path_str,
        })
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Reads the full content and its BLAKE3 digest in one pass.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or mapping fails.
    pub fn read_hashed(&self) -> Result<(Vec<u8>, blake3::Hash)> {
        let bytes = if self.size >= MMAP_THRESHOLD {
            self.read_mmap_bytes()?
        } else {
            self.read_direct_bytes()?
        };
        let digest = blake3::hash(&bytes);
        Ok((bytes, digest))
    }

    /// Reads bytes using memory mapping.
    fn read_mmap_bytes(&self) -> Result<Vec<u8>> {
        // Safety: We're only reading from the file, which is safe
        let mmap = unsafe {
            Mmap::map(&self.file).map_err(|e| IoError::MmapFailed {
                path: self.path.clone(),
                reason: e.to_string(),
            })?
        };
        Ok(mmap.to_vec())
    }

    /// Reads bytes directly.
    fn read_direct_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(usize::try_from(self.size).unwrap_or(0));
        let mut file = &self.file;
        file.read_to_end(&mut bytes).map_err(|e| IoError::ReadFailed {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        Ok(bytes)
    }
}

/// Reads a file's content as a UTF-8 string.
///
/// # Errors
///
/// Returns an error if the file can't be read or is not valid UTF-8.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<String> {
    let path_str = path.as_ref().to_string_lossy().to_string();
    std::fs::read_to_string(&path).map_err(|e| {
        IoError::ReadFailed {
            path: path_str,
            reason: e.to_string(),
        }
        .into()
    })
}

/// Writes content to a file atomically (write to a sibling temp file,
/// then rename into place).
///
/// Phase 9 and the manifest writer use this so a crashed run never leaves
/// a half-written artifact at the target path.
///
/// # Errors
///
/// Returns an error if the temp write or the rename fails.
pub fn write_file_atomic<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let target = path.as_ref();
    let path_str = target.to_string_lossy().to_string();

    let tmp = target.with_extension("tmp");
    std::fs::write(&tmp, content).map_err(|e| IoError::WriteFailed {
        path: tmp.to_string_lossy().to_string(),
        reason: e.to_string(),
    })?;
    std::fs::rename(&tmp, target).map_err(|e| {
        IoError::WriteFailed {
            path: path_str,
            reason: e.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_open_missing_file() {
        let result = DocumentReader::open("/nonexistent/plan.pdf");
        assert!(matches!(
            result,
            Err(crate::Error::Io(IoError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_read_hashed_small_file() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(b"presupuesto municipal 2024").unwrap();

        let reader = DocumentReader::open(tmp.path()).unwrap();
        let (bytes, digest) = reader.read_hashed().unwrap();
        assert_eq!(bytes, b"presupuesto municipal 2024");
        assert_eq!(digest, blake3::hash(b"presupuesto municipal 2024"));
    }

    #[test]
    fn test_read_hashed_deterministic() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(b"meta: reducir desnutricion 10%").unwrap();

        let reader = DocumentReader::open(tmp.path()).unwrap();
        let (_, d1) = reader.read_hashed().unwrap();
        let (_, d2) = reader.read_hashed().unwrap();
        assert_eq!(d1, d2);
    }

    #[test]
    fn test_read_hashed_large_file_uses_mmap() {
        let mut tmp = NamedTempFile::new().unwrap();
        let content = vec![b'x'; (MMAP_THRESHOLD as usize) + 1];
        tmp.write_all(&content).unwrap();

        let reader = DocumentReader::open(tmp.path()).unwrap();
        assert!(reader.size() > MMAP_THRESHOLD);
        let (bytes, digest) = reader.read_hashed().unwrap();
        assert_eq!(bytes.len(), content.len());
        assert_eq!(digest, blake3::hash(&content));
    }

    #[test]
    fn test_write_file_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("manifest.json");
        write_file_atomic(&target, b"{}").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"{}");
        // No temp file left behind
        assert!(!dir.path().join("manifest.tmp").exists());
    }

    #[test]
    fn test_read_file() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all("eje estratégico".as_bytes()).unwrap();
        let content = read_file(tmp.path()).unwrap();
        assert_eq!(content, "eje estratégico");
    }
}
