//! Canon Policy Package: the immutable output of the ingestion pipeline.
//!
//! A CPP bundles the policy manifest, chunk graph, content stream,
//! provenance map and integrity index. Phase 9 produces it atomically
//! (write to a temp directory, rename into place); nothing mutates it
//! afterwards. The on-disk layout is:
//!
//! - `manifest.json` - policy manifest, schema version, quality metrics
//! - `content_stream.arrow` - columnar page rows
//! - `provenance_map.arrow` - columnar token bindings
//! - `chunk_graph.json` - chunks with facets and hashes, plus edges
//! - `integrity.json` - per-chunk BLAKE3 hashes and the Merkle root

use crate::content::stream::{ContentStream, ProvenanceMap};
use crate::content::{
    SourceManifest, read_content_stream, read_provenance_map, write_content_stream,
    write_provenance_map,
};
use crate::error::{IngestError, IoError, Result};
use crate::graph::ChunkGraph;
use crate::io::write_file_atomic;
use crate::quality::QualityMetrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Schema version recorded in every CPP.
pub const CPP_SCHEMA_VERSION: &str = "CPP-2025.1";

/// Policy structure detected during ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyManifest {
    /// Strategic axes (Ejes) in document order.
    pub ejes: Vec<String>,
    /// Programas in document order.
    pub programas: Vec<String>,
    /// Proyectos in document order.
    pub proyectos: Vec<String>,
    /// Years mentioned by the plan.
    pub years: Vec<i32>,
    /// Territories mentioned by the plan.
    pub territories: Vec<String>,
}

/// Integrity index: per-chunk hashes plus their Merkle root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityIndex {
    /// Schema version (`CPP-2025.1`).
    pub schema_version: String,
    /// Chunk id to BLAKE3 hex hash.
    pub chunk_hashes: BTreeMap<String, String>,
    /// Merkle root over the sorted hash list.
    pub merkle_root: String,
}

/// The serialized `manifest.json` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CppManifest {
    /// Schema version (`CPP-2025.1`).
    pub schema_version: String,
    /// Phase 1 acquisition record.
    pub source: SourceManifest,
    /// Detected policy structure.
    pub policy: PolicyManifest,
    /// Measured quality metrics.
    pub quality: QualityMetrics,
    /// Free-form key/value extension.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// A Canon Policy Package.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonPolicyPackage {
    /// Manifest payload.
    pub manifest: CppManifest,
    /// The chunk graph.
    pub graph: ChunkGraph,
    /// Columnar content stream.
    pub content_stream: ContentStream,
    /// Token provenance map.
    pub provenance_map: ProvenanceMap,
    /// Integrity index.
    pub integrity: IntegrityIndex,
}

/// Computes the Merkle root of a set of chunk hashes.
///
/// The hex hashes are sorted, decoded, concatenated in that order, and
/// hashed with BLAKE3. Deterministic by construction: the same hash set
/// always yields the same root.
#[must_use]
pub fn merkle_root(hashes: &BTreeMap<String, String>) -> String {
    let mut sorted: Vec<&String> = hashes.values().collect();
    sorted.sort();
    let mut concat = Vec::with_capacity(sorted.len() * blake3::OUT_LEN);
    for hash in sorted {
        match hex::decode(hash) {
            Ok(bytes) => concat.extend_from_slice(&bytes),
            // Undecodable entries hash as raw text so the root still
            // changes when an entry changes.
            Err(_) => concat.extend_from_slice(hash.as_bytes()),
        }
    }
    blake3::hash(&concat).to_hex().to_string()
}

impl CanonPolicyPackage {
    /// Builds the integrity index from a chunk graph.
    #[must_use]
    pub fn integrity_for(graph: &ChunkGraph) -> IntegrityIndex {
        let chunk_hashes: BTreeMap<String, String> = graph
            .chunks()
            .map(|c| (c.id.clone(), c.content_hash.clone()))
            .collect();
        let merkle_root = merkle_root(&chunk_hashes);
        IntegrityIndex {
            schema_version: CPP_SCHEMA_VERSION.to_string(),
            chunk_hashes,
            merkle_root,
        }
    }

    /// Verifies the stored integrity index against the graph.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::IntegrityMismatch`] when the recomputed
    /// Merkle root disagrees with the stored one.
    pub fn verify_integrity(&self) -> Result<()> {
        let recomputed = Self::integrity_for(&self.graph);
        if recomputed.merkle_root != self.integrity.merkle_root {
            return Err(IngestError::IntegrityMismatch {
                stored: self.integrity.merkle_root.clone(),
                recomputed: recomputed.merkle_root,
            }
            .into());
        }
        Ok(())
    }

    /// Writes the package atomically to a directory.
    ///
    /// Artifacts land in `<dir>.tmp` first; the rename happens only after
    /// every file is written, so a crash never leaves a partial CPP at
    /// the target path.
    ///
    /// # Errors
    ///
    /// Returns an error if any artifact fails to serialize or write.
    pub fn write_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let target = dir.as_ref();
        let staging = target.with_extension("tmp");
        if staging.exists() {
            std::fs::remove_dir_all(&staging).map_err(|e| IoError::DirectoryFailed {
                path: staging.to_string_lossy().to_string(),
                reason: e.to_string(),
            })?;
        }
        std::fs::create_dir_all(&staging).map_err(|e| IoError::DirectoryFailed {
            path: staging.to_string_lossy().to_string(),
            reason: e.to_string(),
        })?;

        let manifest_json =
            serde_json::to_vec_pretty(&self.manifest).map_err(|e| IngestError::PackFailed {
                artifact: "manifest.json",
                reason: e.to_string(),
            })?;
        write_file_atomic(staging.join("manifest.json"), &manifest_json)?;

        let graph_json =
            serde_json::to_vec_pretty(&self.graph).map_err(|e| IngestError::PackFailed {
                artifact: "chunk_graph.json",
                reason: e.to_string(),
            })?;
        write_file_atomic(staging.join("chunk_graph.json"), &graph_json)?;

        let integrity_json =
            serde_json::to_vec_pretty(&self.integrity).map_err(|e| IngestError::PackFailed {
                artifact: "integrity.json",
                reason: e.to_string(),
            })?;
        write_file_atomic(staging.join("integrity.json"), &integrity_json)?;

        write_content_stream(staging.join("content_stream.arrow"), &self.content_stream)?;
        write_provenance_map(staging.join("provenance_map.arrow"), &self.provenance_map)?;

        if target.exists() {
            std::fs::remove_dir_all(target).map_err(|e| IoError::DirectoryFailed {
                path: target.to_string_lossy().to_string(),
                reason: e.to_string(),
            })?;
        }
        std::fs::rename(&staging, target).map_err(|e| {
            IoError::WriteFailed {
                path: target.to_string_lossy().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Reads a package from a directory and verifies its Merkle root.
    ///
    /// # Errors
    ///
    /// Returns an error if any artifact is missing, malformed, or the
    /// integrity check fails.
    pub fn read_from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();

        let manifest: CppManifest =
            serde_json::from_str(&crate::io::read_file(dir.join("manifest.json"))?)?;
        let graph: ChunkGraph =
            serde_json::from_str(&crate::io::read_file(dir.join("chunk_graph.json"))?)?;
        let integrity: IntegrityIndex =
            serde_json::from_str(&crate::io::read_file(dir.join("integrity.json"))?)?;
        let content_stream = read_content_stream(dir.join("content_stream.arrow"))?;
        let provenance_map = read_provenance_map(dir.join("provenance_map.arrow"))?;

        let package = Self {
            manifest,
            graph,
            content_stream,
            provenance_map,
            integrity,
        };
        package.verify_integrity()?;
        Ok(package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::stream::PageRow;
    use crate::graph::{Chunk, Resolution, TextSpan};

    fn two_chunk_graph() -> ChunkGraph {
        let mut graph = ChunkGraph::new();
        let a = Chunk::new(
            "macro-0",
            "presupuesto municipal COP 1.200.000.000 año 2024",
            Resolution::Macro,
            TextSpan::new(0, 50),
        );
        let b = Chunk::new(
            "macro-1",
            "meta: reducir desnutrición 10%",
            Resolution::Macro,
            TextSpan::new(50, 83),
        );
        graph.insert_chunk(a).unwrap();
        graph.insert_chunk(b).unwrap();
        graph
    }

    fn sample_package() -> CanonPolicyPackage {
        let graph = two_chunk_graph();
        let integrity = CanonPolicyPackage::integrity_for(&graph);
        CanonPolicyPackage {
            manifest: CppManifest {
                schema_version: CPP_SCHEMA_VERSION.to_string(),
                source: SourceManifest {
                    source_hash: "00".repeat(32),
                    mime: "text/plain".to_string(),
                    byte_count: 83,
                    path: "plan.txt".to_string(),
                    title: None,
                    version: None,
                },
                policy: PolicyManifest::default(),
                quality: QualityMetrics {
                    provenance_completeness: 1.0,
                    structural_consistency: 1.0,
                    kpi_linkage_rate: 1.0,
                    budget_consistency_score: 1.0,
                    boundary_f1: 0.9,
                    chunk_overlap: 0.0,
                },
                metadata: BTreeMap::new(),
            },
            graph,
            content_stream: ContentStream {
                rows: vec![PageRow {
                    page_id: 0,
                    text: "x".repeat(83),
                    byte_start: 0,
                    byte_end: 83,
                }],
            },
            provenance_map: ProvenanceMap::default(),
            integrity,
        }
    }

    #[test]
    fn test_merkle_root_is_hash_of_sorted_concatenation() {
        let graph = two_chunk_graph();
        let hashes: Vec<String> = graph.chunks().map(|c| c.content_hash.clone()).collect();
        assert_eq!(hashes.len(), 2);

        let mut sorted = hashes.clone();
        sorted.sort();
        let mut concat = Vec::new();
        for h in &sorted {
            concat.extend_from_slice(&hex::decode(h).unwrap());
        }
        let expected = blake3::hash(&concat).to_hex().to_string();

        let index = CanonPolicyPackage::integrity_for(&graph);
        assert_eq!(index.merkle_root, expected);
    }

    #[test]
    fn test_merkle_root_deterministic() {
        let a = CanonPolicyPackage::integrity_for(&two_chunk_graph());
        let b = CanonPolicyPackage::integrity_for(&two_chunk_graph());
        assert_eq!(a.merkle_root, b.merkle_root);
    }

    #[test]
    fn test_merkle_root_changes_with_content() {
        let graph_a = two_chunk_graph();
        let mut graph_b = ChunkGraph::new();
        graph_b
            .insert_chunk(Chunk::new(
                "macro-0",
                "texto distinto",
                Resolution::Macro,
                TextSpan::new(0, 14),
            ))
            .unwrap();
        assert_ne!(
            CanonPolicyPackage::integrity_for(&graph_a).merkle_root,
            CanonPolicyPackage::integrity_for(&graph_b).merkle_root
        );
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("cpp");
        let package = sample_package();
        package.write_to_dir(&out).unwrap();

        for artifact in [
            "manifest.json",
            "chunk_graph.json",
            "integrity.json",
            "content_stream.arrow",
            "provenance_map.arrow",
        ] {
            assert!(out.join(artifact).exists(), "missing {artifact}");
        }

        let back = CanonPolicyPackage::read_from_dir(&out).unwrap();
        assert_eq!(back.integrity, package.integrity);
        assert_eq!(back.graph, package.graph);
        assert_eq!(back.content_stream, package.content_stream);
    }

    #[test]
    fn test_tampered_integrity_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("cpp");
        let mut package = sample_package();
        package.integrity.merkle_root = "0".repeat(64);
        package.write_to_dir(&out).unwrap();

        let result = CanonPolicyPackage::read_from_dir(&out);
        assert!(matches!(
            result,
            Err(crate::Error::Ingest(IngestError::IntegrityMismatch { .. }))
        ));
    }

    #[test]
    fn test_no_staging_directory_left() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("cpp");
        sample_package().write_to_dir(&out).unwrap();
        assert!(!dir.path().join("cpp.tmp").exists());
    }

    #[test]
    fn test_rewrite_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("cpp");
        let package = sample_package();
        package.write_to_dir(&out).unwrap();
        package.write_to_dir(&out).unwrap();
        assert!(CanonPolicyPackage::read_from_dir(&out).is_ok());
    }
}
