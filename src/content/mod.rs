//! Content store and content stream.
//!
//! The store handles Phase 1 acquisition: byte-addressed reads, BLAKE3
//! content addressing and MIME detection. The stream holds the Phase 4
//! output: NFC-normalized page text in columnar form with stable byte
//! offsets, plus the token-level provenance map bound in Phase 7.

pub mod columnar;
pub mod store;
pub mod stream;

pub use columnar::{
    read_content_stream, read_provenance_map, write_content_stream, write_provenance_map,
};
pub use store::{SourceManifest, acquire, detect_mime};
pub use stream::{BoundingBox, ContentStream, PageRow, ProvenanceMap, TokenBinding};
