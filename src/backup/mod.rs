//! Durable snapshots of a behavior graph scope.
//!
//! Two on-disk formats:
//!
//! - **V1** — a plain JSON document `{version: 1, nodes, edges, created_at}`.
//! - **V2** — a framed container: magic bytes `FLBK`, one version byte,
//!   a little-endian u32 header length, a JSON header carrying counts and
//!   the SHA-256 of the compressed body, then the gzip'd V1-shaped body.
//!
//! Format detection sniffs the magic bytes, so V1 files restore through
//! the same entry points. Restore either merges (existing ids skipped) or
//! replaces (store cleared first); `verify` recomputes the body checksum
//! without touching any store.

mod retention;

pub use retention::{apply_retention, RetentionPolicy, RetentionReport};

use crate::cancel::CancellationFlag;
use crate::error::{Error, Result};
use crate::fsio::atomic_write;
use crate::graph::store::GraphStore;
use crate::graph::types::{Behavior, Edge};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info};

/// Magic bytes identifying a framed floop snapshot.
const SNAPSHOT_MAGIC: &[u8; 4] = b"FLBK";

/// Version byte for the framed container.
const SNAPSHOT_V2: u8 = 2;

/// Snapshot body, shared by both formats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotBody {
    pub version: u32,
    pub nodes: Vec<Behavior>,
    pub edges: Vec<Edge>,
    pub created_at: DateTime<Utc>,
}

/// Header of a V2 framed snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub node_count: u64,
    pub edge_count: u64,
    /// Hex SHA-256 of the gzip'd body.
    pub checksum_sha256: String,
    pub compressed: bool,
}

/// Detected snapshot format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotFormat {
    V1Json,
    V2Framed,
}

/// Restore behavior for existing stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreMode {
    /// Skip ids already present.
    Merge,
    /// Clear the store, then insert everything.
    Replace,
}

/// Outcome of a restore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestoreSummary {
    pub nodes_inserted: u64,
    pub nodes_skipped: u64,
    pub edges_inserted: u64,
    pub edges_skipped: u64,
}

/// Outcome of an integrity verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub format: SnapshotFormat,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed_checksum: Option<String>,
    pub node_count: u64,
    pub edge_count: u64,
}

/// Capture a snapshot body from a store.
pub fn snapshot_store(store: &dyn GraphStore) -> Result<SnapshotBody> {
    let nodes = store.query_nodes(&Default::default())?;
    let edges = store.all_edges()?;
    Ok(SnapshotBody {
        version: 2,
        nodes,
        edges,
        created_at: Utc::now(),
    })
}

/// Encode a body as plain V1 JSON.
pub fn encode_v1(body: &SnapshotBody) -> Result<Vec<u8>> {
    let mut body = body.clone();
    body.version = 1;
    Ok(serde_json::to_vec_pretty(&body)?)
}

/// Encode a body as a framed, compressed V2 snapshot.
pub fn encode_v2(body: &SnapshotBody) -> Result<Vec<u8>> {
    let mut body = body.clone();
    body.version = 2;
    let json = serde_json::to_vec(&body)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;

    let checksum = hex::encode(Sha256::digest(&compressed));
    let header = SnapshotHeader {
        node_count: body.nodes.len() as u64,
        edge_count: body.edges.len() as u64,
        checksum_sha256: checksum,
        compressed: true,
    };
    let header_json = serde_json::to_vec(&header)?;

    let mut out = Vec::with_capacity(4 + 1 + 4 + header_json.len() + compressed.len());
    out.extend_from_slice(SNAPSHOT_MAGIC);
    out.push(SNAPSHOT_V2);
    out.extend_from_slice(&(header_json.len() as u32).to_le_bytes());
    out.extend_from_slice(&header_json);
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Sniff the snapshot format from leading bytes.
pub fn detect_format(data: &[u8]) -> Result<SnapshotFormat> {
    if data.len() >= 4 && &data[..4] == SNAPSHOT_MAGIC {
        return Ok(SnapshotFormat::V2Framed);
    }
    if data.first() == Some(&b'{') {
        return Ok(SnapshotFormat::V1Json);
    }
    Err(Error::integrity("unrecognized snapshot format"))
}

/// Split a V2 stream into (header, compressed body).
fn split_v2(data: &[u8]) -> Result<(SnapshotHeader, &[u8])> {
    if data.len() < 9 {
        return Err(Error::integrity(format!(
            "snapshot too small: {} bytes",
            data.len()
        )));
    }
    if &data[..4] != SNAPSHOT_MAGIC {
        return Err(Error::integrity("bad snapshot magic"));
    }
    let version = data[4];
    if version != SNAPSHOT_V2 {
        return Err(Error::integrity(format!(
            "unsupported snapshot version {}",
            version
        )));
    }
    let header_len = u32::from_le_bytes([data[5], data[6], data[7], data[8]]) as usize;
    let body_start = 9 + header_len;
    if data.len() < body_start {
        return Err(Error::integrity("snapshot header truncated"));
    }
    let header: SnapshotHeader = serde_json::from_slice(&data[9..body_start])
        .map_err(|e| Error::integrity(format!("snapshot header unreadable: {}", e)))?;
    Ok((header, &data[body_start..]))
}

/// Decode and checksum-verify a snapshot of either format.
pub fn decode(data: &[u8]) -> Result<SnapshotBody> {
    match detect_format(data)? {
        SnapshotFormat::V1Json => {
            let body: SnapshotBody = serde_json::from_slice(data)
                .map_err(|e| Error::integrity(format!("snapshot body unreadable: {}", e)))?;
            Ok(body)
        }
        SnapshotFormat::V2Framed => {
            let (header, compressed) = split_v2(data)?;
            let computed = hex::encode(Sha256::digest(compressed));
            if computed != header.checksum_sha256 {
                return Err(Error::integrity(format!(
                    "snapshot checksum mismatch: expected {}, computed {}",
                    header.checksum_sha256, computed
                )));
            }

            let mut decoder = GzDecoder::new(compressed);
            let mut json = Vec::new();
            decoder
                .read_to_end(&mut json)
                .map_err(|e| Error::integrity(format!("snapshot body corrupt: {}", e)))?;
            let body: SnapshotBody = serde_json::from_slice(&json)
                .map_err(|e| Error::integrity(format!("snapshot body unreadable: {}", e)))?;
            Ok(body)
        }
    }
}

/// Verify a snapshot without restoring it.
pub fn verify(data: &[u8]) -> Result<VerifyReport> {
    let format = detect_format(data)?;
    match format {
        SnapshotFormat::V1Json => {
            let body: SnapshotBody = serde_json::from_slice(data)
                .map_err(|e| Error::integrity(format!("snapshot body unreadable: {}", e)))?;
            Ok(VerifyReport {
                format,
                ok: true,
                expected_checksum: None,
                computed_checksum: None,
                node_count: body.nodes.len() as u64,
                edge_count: body.edges.len() as u64,
            })
        }
        SnapshotFormat::V2Framed => {
            let (header, compressed) = split_v2(data)?;
            let computed = hex::encode(Sha256::digest(compressed));
            Ok(VerifyReport {
                format,
                ok: computed == header.checksum_sha256,
                expected_checksum: Some(header.checksum_sha256),
                computed_checksum: Some(computed),
                node_count: header.node_count,
                edge_count: header.edge_count,
            })
        }
    }
}

/// Restore a decoded body into a store.
pub fn restore_into(
    store: &dyn GraphStore,
    body: &SnapshotBody,
    mode: RestoreMode,
    cancel: &CancellationFlag,
) -> Result<RestoreSummary> {
    if mode == RestoreMode::Replace {
        store.clear()?;
    }

    let mut summary = RestoreSummary::default();
    for node in &body.nodes {
        cancel.check()?;
        if mode == RestoreMode::Merge && store.get_node(&node.id)?.is_some() {
            summary.nodes_skipped += 1;
            continue;
        }
        store.add_node(node)?;
        summary.nodes_inserted += 1;
    }
    for edge in &body.edges {
        cancel.check()?;
        if edge.validate().is_err() {
            debug!(source = %edge.source, target = %edge.target, "skipping invalid snapshot edge");
            summary.edges_skipped += 1;
            continue;
        }
        store.add_edge(edge)?;
        summary.edges_inserted += 1;
    }

    info!(
        nodes = summary.nodes_inserted,
        edges = summary.edges_inserted,
        skipped = summary.nodes_skipped,
        "snapshot restored"
    );
    Ok(summary)
}

/// Write a snapshot of a store to a file.
pub fn backup_to_file(store: &dyn GraphStore, path: &Path, compress: bool) -> Result<()> {
    let body = snapshot_store(store)?;
    let data = if compress {
        encode_v2(&body)?
    } else {
        encode_v1(&body)?
    };
    atomic_write(path, &data)?;
    info!(path = %path.display(), bytes = data.len(), "snapshot written");
    Ok(())
}

/// Restore a snapshot file into a store, verifying integrity first.
pub fn restore_from_file(
    store: &dyn GraphStore,
    path: &Path,
    mode: RestoreMode,
    cancel: &CancellationFlag,
) -> Result<RestoreSummary> {
    let data = std::fs::read(path)?;
    let body = decode(&data)?;
    restore_into(store, &body, mode, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::memory::MemoryGraphStore;
    use crate::graph::types::{BehaviorKind, EdgeKind};

    fn seeded_store() -> MemoryGraphStore {
        let store = MemoryGraphStore::new();
        let a = Behavior::new(BehaviorKind::Directive, "a", "alpha content").with_id("a");
        let b = Behavior::new(BehaviorKind::Constraint, "b", "beta content").with_id("b");
        store.add_node(&a).unwrap();
        store.add_node(&b).unwrap();
        store
            .add_edge(&Edge::new("a", "b", EdgeKind::SimilarTo).with_weight(0.7))
            .unwrap();
        store
    }

    #[test]
    fn test_v1_round_trip() {
        let store = seeded_store();
        let body = snapshot_store(&store).unwrap();
        let data = encode_v1(&body).unwrap();

        assert_eq!(detect_format(&data).unwrap(), SnapshotFormat::V1Json);
        let decoded = decode(&data).unwrap();
        assert_eq!(decoded.nodes.len(), 2);
        assert_eq!(decoded.edges.len(), 1);
    }

    #[test]
    fn test_v2_round_trip_replace() {
        let store = seeded_store();
        let body = snapshot_store(&store).unwrap();
        let data = encode_v2(&body).unwrap();

        assert_eq!(detect_format(&data).unwrap(), SnapshotFormat::V2Framed);

        let target = MemoryGraphStore::new();
        target
            .add_node(&Behavior::new(BehaviorKind::Preference, "old", "old content").with_id("old"))
            .unwrap();

        let decoded = decode(&data).unwrap();
        let summary =
            restore_into(&target, &decoded, RestoreMode::Replace, &CancellationFlag::new())
                .unwrap();
        assert_eq!(summary.nodes_inserted, 2);
        assert!(target.get_node("old").unwrap().is_none());

        // Structural equality with the source
        let restored = snapshot_store(&target).unwrap();
        assert_eq!(restored.nodes, body.nodes);
        assert_eq!(restored.edges, body.edges);
    }

    #[test]
    fn test_merge_skips_existing() {
        let store = seeded_store();
        let body = snapshot_store(&store).unwrap();

        let target = MemoryGraphStore::new();
        target
            .add_node(&Behavior::new(BehaviorKind::Directive, "a", "existing a").with_id("a"))
            .unwrap();

        let summary =
            restore_into(&target, &body, RestoreMode::Merge, &CancellationFlag::new()).unwrap();
        assert_eq!(summary.nodes_inserted, 1);
        assert_eq!(summary.nodes_skipped, 1);
        // Existing node untouched
        assert_eq!(
            target.get_node("a").unwrap().unwrap().content.canonical,
            "existing a"
        );
    }

    #[test]
    fn test_tampered_body_fails_verify_and_restore() {
        let store = seeded_store();
        let body = snapshot_store(&store).unwrap();
        let mut data = encode_v2(&body).unwrap();

        // Flip one byte in the compressed body (past the header)
        let last = data.len() - 1;
        data[last] ^= 0xff;

        let report = verify(&data).unwrap();
        assert!(!report.ok);
        assert_ne!(report.expected_checksum, report.computed_checksum);

        let target = MemoryGraphStore::new();
        let err = decode(&data).unwrap_err();
        assert!(matches!(err, Error::Integrity(_)));
        assert_eq!(target.count_nodes().unwrap(), 0);
    }

    #[test]
    fn test_v2_header_counts() {
        let store = seeded_store();
        let body = snapshot_store(&store).unwrap();
        let data = encode_v2(&body).unwrap();

        let report = verify(&data).unwrap();
        assert!(report.ok);
        assert_eq!(report.node_count, 2);
        assert_eq!(report.edge_count, 1);
    }

    #[test]
    fn test_unrecognized_format() {
        assert!(detect_format(b"\x00\x01\x02").is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.floop");
        let store = seeded_store();

        backup_to_file(&store, &path, true).unwrap();

        let target = MemoryGraphStore::new();
        let summary =
            restore_from_file(&target, &path, RestoreMode::Replace, &CancellationFlag::new())
                .unwrap();
        assert_eq!(summary.nodes_inserted, 2);
        assert_eq!(summary.edges_inserted, 1);
    }
}
