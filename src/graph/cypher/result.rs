// src/graph/cypher/result.rs
// Result types for the Cypher query pipeline

use crate::datatypes::values::Value;
use petgraph::graph::{EdgeIndex, NodeIndex};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Bindings: compact ordered map for small variable counts
// ============================================================================

/// Compact ordered map using `Vec<(String, V)>` with linear search.
/// Queries bind a handful of variables, so a scan beats hashing and the
/// insertion order doubles as the `RETURN *` column order.
#[derive(Debug, Clone)]
pub struct Bindings<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for Bindings<V> {
    fn default() -> Self {
        Bindings {
            entries: Vec::new(),
        }
    }
}

impl<V> Bindings<V> {
    pub fn new() -> Self {
        Bindings {
            entries: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Upsert: update if key exists, push if not.
    pub fn insert(&mut self, key: String, val: V) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = val;
        } else {
            self.entries.push((key, val));
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Convert to HashMap for the pattern executor's pre-bindings.
    pub fn to_hashmap(&self) -> HashMap<String, V>
    where
        V: Clone,
    {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

// ============================================================================
// Pipeline Result Types
// ============================================================================

/// A single row in the pipeline result set.
/// Rows carry NodeIndex/EdgeIndex references; properties are resolved
/// on demand from the graph.
#[derive(Debug, Clone, Default)]
pub struct ResultRow {
    pub node_bindings: Bindings<NodeIndex>,
    pub edge_bindings: Bindings<EdgeBinding>,
    /// Projected values from WITH/RETURN/UNWIND/CALL
    pub projected: Bindings<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeBinding {
    pub source: NodeIndex,
    pub target: NodeIndex,
    pub edge_index: EdgeIndex,
}

impl ResultRow {
    pub fn new() -> Self {
        ResultRow::default()
    }

    /// Create a row with only projected values (for aggregation results)
    pub fn from_projected(projected: Bindings<Value>) -> Self {
        ResultRow {
            projected,
            ..ResultRow::default()
        }
    }
}

/// The result set flowing through the pipeline
#[derive(Debug, Default)]
pub struct ResultSet {
    pub rows: Vec<ResultRow>,
    /// Column names in output order (populated by RETURN and CALL)
    pub columns: Vec<String>,
}

impl ResultSet {
    pub fn new() -> Self {
        ResultSet::default()
    }
}

// ============================================================================
// Final Output
// ============================================================================

/// Final query result: column names plus one value vector per row.
#[derive(Debug, Clone, PartialEq)]
pub struct CypherResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl CypherResult {
    pub fn empty() -> Self {
        CypherResult {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Split into standalone rows sharing one column list.
    pub fn into_rows(self) -> Vec<Row> {
        let columns: Arc<[String]> = self.columns.into();
        self.rows
            .into_iter()
            .map(|values| Row {
                columns: Arc::clone(&columns),
                values,
            })
            .collect()
    }
}

/// One result row. Columns are addressable by the alias used in the
/// query's RETURN clause or by ordinal.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Row {
            columns: columns.into(),
            values,
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn value_at(&self, ordinal: usize) -> Option<&Value> {
        self.values.get(ordinal)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The row as a JSON object keyed by column name.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.columns
                .iter()
                .zip(self.values.iter())
                .map(|(c, v)| (c.clone(), v.to_json()))
                .collect(),
        )
    }
}
