// src/graph/io_operations.rs
//
// Versioned binary format for metric graph persistence.
//
// File layout:
//   [0..4]      Magic: b"MGF\x01" (Metric Graph Format, version 1)
//   [4..8]      core_data_version: u32 LE (tracks NodeData/EdgeData/Value changes)
//   [8..12]     metadata_length: u32 LE
//   [12..12+N]  JSON metadata (UTF-8, uncompressed): catalog + library version
//   [12+N..]    Gzip-compressed bincode of StableDiGraph<NodeData, EdgeData>

use crate::graph::schema::{Catalog, DirGraph, Graph};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Magic bytes: "MGF\x01"
const MAGIC: [u8; 4] = [0x4D, 0x47, 0x46, 0x01];

/// Bump ONLY when NodeData, EdgeData, or Value changes shape.
/// Metadata is JSON and absorbs changes through serde defaults.
const CURRENT_CORE_DATA_VERSION: u32 = 1;

const HEADER_LEN: usize = 12;

/// Metadata serialized as JSON. Every field defaults so that adding or
/// removing fields never breaks existing files.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct FileMetadata {
    #[serde(default)]
    core_data_version: u32,
    /// Library version string at save time.
    #[serde(default)]
    library_version: String,
    #[serde(default)]
    catalog: Catalog,
    #[serde(default)]
    node_count: usize,
    #[serde(default)]
    edge_count: usize,
}

// ─── Save ────────────────────────────────────────────────────────────────────

pub fn save_to_file(graph: &DirGraph, path: impl AsRef<Path>) -> io::Result<()> {
    // Compress the graph first so a failure never leaves a half-written file
    let mut graph_compressed = Vec::new();
    {
        let gz = GzEncoder::new(&mut graph_compressed, Compression::new(3));
        bincode::serialize_into(gz, &graph.graph).map_err(io::Error::other)?;
    }

    let metadata = FileMetadata {
        core_data_version: CURRENT_CORE_DATA_VERSION,
        library_version: env!("CARGO_PKG_VERSION").to_string(),
        catalog: graph.catalog.clone(),
        node_count: graph.node_count(),
        edge_count: graph.edge_count(),
    };
    let metadata_json = serde_json::to_vec(&metadata).map_err(io::Error::other)?;

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(&MAGIC)?;
    writer.write_all(&CURRENT_CORE_DATA_VERSION.to_le_bytes())?;
    writer.write_all(&(metadata_json.len() as u32).to_le_bytes())?;
    writer.write_all(&metadata_json)?;
    writer.write_all(&graph_compressed)?;

    writer.flush()?;
    Ok(())
}

// ─── Load ────────────────────────────────────────────────────────────────────

pub fn load_file(path: impl AsRef<Path>) -> io::Result<DirGraph> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    load_bytes(&buf)
}

fn load_bytes(buf: &[u8]) -> io::Result<DirGraph> {
    if buf.len() < 4 || buf[..4] != MAGIC {
        return Err(io::Error::other(
            "Unrecognized file format: not a metric graph store.",
        ));
    }
    if buf.len() < HEADER_LEN {
        return Err(io::Error::other("Store file is truncated: header incomplete."));
    }

    let core_version = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let metadata_len = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]) as usize;

    let metadata_end = HEADER_LEN + metadata_len;
    if buf.len() < metadata_end {
        return Err(io::Error::other(format!(
            "Store file is truncated: expected {} bytes of metadata but only {} remain after the header.",
            metadata_len,
            buf.len() - HEADER_LEN
        )));
    }

    let metadata: FileMetadata = serde_json::from_slice(&buf[HEADER_LEN..metadata_end])
        .map_err(|e| io::Error::other(format!("Failed to parse store metadata JSON: {}", e)))?;

    let graph = load_core_data(&buf[metadata_end..], core_version)?;

    DirGraph::from_parts(metadata.catalog, graph)
        .map_err(|e| io::Error::other(format!("Store contents do not match its catalog: {}", e)))
}

/// Decompress and deserialize the core graph data, running migrations if needed.
fn load_core_data(graph_bytes: &[u8], file_core_version: u32) -> io::Result<Graph> {
    if file_core_version > CURRENT_CORE_DATA_VERSION {
        return Err(io::Error::other(format!(
            "Store uses core data version {} but this library only supports up to version {}.",
            file_core_version, CURRENT_CORE_DATA_VERSION,
        )));
    }

    let gz = GzDecoder::new(graph_bytes);
    let graph: Graph = bincode::deserialize_from(gz).map_err(|e| {
        io::Error::other(format!(
            "Failed to deserialize graph data (core version {}). Error: {}",
            file_core_version, e
        ))
    })?;

    if file_core_version < CURRENT_CORE_DATA_VERSION {
        migrate_core_data(graph, file_core_version)
    } else {
        Ok(graph)
    }
}

/// Migration chain from older core data versions. Only version 1 exists, so
/// anything older is a file this library never wrote.
fn migrate_core_data(_graph: Graph, from_version: u32) -> io::Result<Graph> {
    Err(io::Error::other(format!(
        "No migration path from core data version {}.",
        from_version
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::values::{DataType, Value};
    use crate::graph::schema::{PropertyDef, PropertyType};

    fn sample_graph() -> DirGraph {
        let mut g = DirGraph::new();
        g.define_node_table(
            "Metric",
            "id",
            vec![
                PropertyDef::new("id", PropertyType::scalar(DataType::String)),
                PropertyDef::new("tags", PropertyType::list(DataType::String)),
            ],
        )
        .unwrap();
        g.define_node_table(
            "DataSource",
            "table_name",
            vec![PropertyDef::new(
                "table_name",
                PropertyType::scalar(DataType::String),
            )],
        )
        .unwrap();
        g.define_rel_table("FROM_TABLE", "Metric", "DataSource", vec![])
            .unwrap();
        g.add_node(
            "Metric",
            [
                ("id", Value::from("m1")),
                ("tags", Value::from(vec!["finance", "core"])),
            ],
        )
        .unwrap();
        g.add_node("DataSource", [("table_name", Value::from("sales"))])
            .unwrap();
        g.add_edge("FROM_TABLE", "m1", "sales", Vec::<(String, Value)>::new())
            .unwrap();
        g
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.mgf");
        let g = sample_graph();
        save_to_file(&g, &path).unwrap();

        let loaded = load_file(&path).unwrap();
        assert_eq!(loaded.catalog(), g.catalog());
        assert_eq!(loaded.node_count(), 2);
        assert_eq!(loaded.edge_count(), 1);
        let m1 = loaded.find_node("Metric", &Value::from("m1")).unwrap();
        assert_eq!(
            loaded.node(m1).unwrap().get("tags"),
            Value::from(vec!["finance", "core"])
        );
    }

    #[test]
    fn test_rejects_foreign_file() {
        let err = load_bytes(b"RGF\x02garbage").unwrap_err();
        assert!(err.to_string().contains("Unrecognized file format"));
        assert!(load_bytes(b"MG").is_err());
    }

    #[test]
    fn test_rejects_truncated_header_and_metadata() {
        let mut buf = MAGIC.to_vec();
        buf.extend_from_slice(&1u32.to_le_bytes());
        assert!(load_bytes(&buf)
            .unwrap_err()
            .to_string()
            .contains("header incomplete"));

        buf.extend_from_slice(&100u32.to_le_bytes());
        buf.extend_from_slice(b"{}");
        assert!(load_bytes(&buf)
            .unwrap_err()
            .to_string()
            .contains("truncated"));
    }

    #[test]
    fn test_rejects_newer_core_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.mgf");
        save_to_file(&sample_graph(), &path).unwrap();

        let mut buf = std::fs::read(&path).unwrap();
        buf[4..8].copy_from_slice(&(CURRENT_CORE_DATA_VERSION + 1).to_le_bytes());
        let err = load_bytes(&buf).unwrap_err();
        assert!(err.to_string().contains("only supports up to version"));
    }

    #[test]
    fn test_rejects_corrupt_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.mgf");
        save_to_file(&sample_graph(), &path).unwrap();

        let mut buf = std::fs::read(&path).unwrap();
        let metadata_len = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]) as usize;
        let body_start = HEADER_LEN + metadata_len;
        let cut = body_start + (buf.len() - body_start) / 2;
        buf.truncate(cut);
        let err = load_bytes(&buf).unwrap_err();
        assert!(err.to_string().contains("Failed to deserialize graph data"));
    }
}
