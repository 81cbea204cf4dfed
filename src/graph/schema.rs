// src/graph/schema.rs
// Graph storage and catalog: typed node/relationship tables over a petgraph StableDiGraph

use crate::datatypes::values::{DataType, Value, LABEL_KEY};
use crate::error::GraphError;
use crate::graph::value_operations::format_value_compact;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableDiGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub type Graph = StableDiGraph<NodeData, EdgeData>;

// ============================================================================
// Catalog
// ============================================================================

/// Declared type of a property: a base type plus optional list nesting.
/// `shape`, when present, fixes the length of each nesting level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyType {
    pub base: DataType,
    #[serde(default)]
    pub dimension: u32,
    #[serde(default)]
    pub shape: Option<Vec<u64>>,
}

impl PropertyType {
    pub fn scalar(base: DataType) -> Self {
        PropertyType {
            base,
            dimension: 0,
            shape: None,
        }
    }

    pub fn list(base: DataType) -> Self {
        PropertyType {
            base,
            dimension: 1,
            shape: None,
        }
    }

    pub fn array(base: DataType, shape: Vec<u64>) -> Self {
        PropertyType {
            base,
            dimension: shape.len() as u32,
            shape: Some(shape),
        }
    }

    /// Render as a catalog type string: `FLOAT`, `STRING[]`, `FLOAT[3]`, `INT64[][]`.
    pub fn type_string(&self) -> String {
        let mut out = self.base.to_string();
        if self.dimension == 0 {
            return out;
        }
        match &self.shape {
            Some(shape) => {
                for s in shape {
                    out.push_str(&format!("[{}]", s));
                }
            }
            None => {
                for _ in 0..self.dimension {
                    out.push_str("[]");
                }
            }
        }
        out
    }

    pub fn accepts(&self, value: &Value) -> bool {
        self.accepts_at(value, 0)
    }

    fn accepts_at(&self, value: &Value, level: u32) -> bool {
        if level == self.dimension {
            return self.base.accepts(value);
        }
        match value {
            Value::Null => true,
            Value::List(items) => {
                let len_ok = self
                    .shape
                    .as_ref()
                    .and_then(|s| s.get(level as usize))
                    .map_or(true, |&expected| items.len() as u64 == expected);
                len_ok && items.iter().all(|item| self.accepts_at(item, level + 1))
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub data_type: PropertyType,
}

impl PropertyDef {
    pub fn new(name: impl Into<String>, data_type: PropertyType) -> Self {
        PropertyDef {
            name: name.into(),
            data_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTableDef {
    pub name: String,
    pub primary_key: String,
    pub properties: Vec<PropertyDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelTableDef {
    pub name: String,
    pub src: String,
    pub dst: String,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
}

/// Table definitions in creation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub node_tables: Vec<NodeTableDef>,
    #[serde(default)]
    pub rel_tables: Vec<RelTableDef>,
}

impl Catalog {
    pub fn node_table(&self, name: &str) -> Option<&NodeTableDef> {
        self.node_tables.iter().find(|t| t.name == name)
    }

    pub fn rel_table(&self, name: &str) -> Option<&RelTableDef> {
        self.rel_tables.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node_table(name).is_some() || self.rel_table(name).is_some()
    }
}

// ============================================================================
// Node / Edge data
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub label: String,
    pub properties: BTreeMap<String, Value>,
}

impl NodeData {
    /// Property value, Null when unset.
    pub fn get(&self, property: &str) -> Value {
        self.properties.get(property).cloned().unwrap_or(Value::Null)
    }

    /// The node as a map value: every property plus `_label`.
    pub fn to_value(&self) -> Value {
        let mut map = self.properties.clone();
        map.insert(LABEL_KEY.to_string(), Value::String(self.label.clone()));
        Value::Map(map)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    pub label: String,
    pub properties: BTreeMap<String, Value>,
}

impl EdgeData {
    pub fn get(&self, property: &str) -> Value {
        self.properties.get(property).cloned().unwrap_or(Value::Null)
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.properties.clone();
        map.insert(LABEL_KEY.to_string(), Value::String(self.label.clone()));
        Value::Map(map)
    }
}

// ============================================================================
// DirGraph
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DirGraph {
    pub(crate) graph: Graph,
    pub(crate) catalog: Catalog,
    /// label -> nodes in insertion order. Rebuilt on load.
    pub(crate) type_indices: HashMap<String, Vec<NodeIndex>>,
    /// label -> compact primary key -> node. Rebuilt on load.
    pub(crate) id_indices: HashMap<String, HashMap<String, NodeIndex>>,
}

impl DirGraph {
    pub fn new() -> Self {
        DirGraph::default()
    }

    /// Reassemble a graph from persisted parts, validating every node and
    /// edge against the catalog.
    pub fn from_parts(catalog: Catalog, graph: Graph) -> Result<Self, GraphError> {
        let mut dir_graph = DirGraph {
            graph,
            catalog,
            type_indices: HashMap::new(),
            id_indices: HashMap::new(),
        };
        dir_graph.rebuild_indices()?;
        Ok(dir_graph)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, idx: NodeIndex) -> Option<&NodeData> {
        self.graph.node_weight(idx)
    }

    /// Nodes of one table in insertion order.
    pub fn nodes_with_label(&self, label: &str) -> &[NodeIndex] {
        self.type_indices
            .get(label)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn find_node(&self, label: &str, key: &Value) -> Option<NodeIndex> {
        self.id_indices
            .get(label)?
            .get(&format_value_compact(key))
            .copied()
    }

    // ========================================================================
    // Table definitions
    // ========================================================================

    pub fn define_node_table(
        &mut self,
        name: impl Into<String>,
        primary_key: impl Into<String>,
        properties: Vec<PropertyDef>,
    ) -> Result<(), GraphError> {
        let name = name.into();
        let primary_key = primary_key.into();
        if self.catalog.contains(&name) {
            return Err(GraphError::DuplicateTable(name));
        }
        if !properties.iter().any(|p| p.name == primary_key) {
            return Err(GraphError::UnknownProperty {
                table: name,
                property: primary_key,
            });
        }
        self.catalog.node_tables.push(NodeTableDef {
            name,
            primary_key,
            properties,
        });
        Ok(())
    }

    pub fn define_rel_table(
        &mut self,
        name: impl Into<String>,
        src: impl Into<String>,
        dst: impl Into<String>,
        properties: Vec<PropertyDef>,
    ) -> Result<(), GraphError> {
        let name = name.into();
        let src = src.into();
        let dst = dst.into();
        if self.catalog.contains(&name) {
            return Err(GraphError::DuplicateTable(name));
        }
        for endpoint in [&src, &dst] {
            if self.catalog.node_table(endpoint).is_none() {
                return Err(GraphError::UnknownTable(endpoint.clone()));
            }
        }
        self.catalog.rel_tables.push(RelTableDef {
            name,
            src,
            dst,
            properties,
        });
        Ok(())
    }

    // ========================================================================
    // Inserts
    // ========================================================================

    pub fn add_node<K, I>(&mut self, label: &str, properties: I) -> Result<NodeIndex, GraphError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let properties: BTreeMap<String, Value> =
            properties.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let table = self
            .catalog
            .node_table(label)
            .ok_or_else(|| GraphError::UnknownTable(label.to_string()))?;
        check_properties(label, &table.properties, &properties)?;

        let key = match properties.get(&table.primary_key) {
            Some(v) if !v.is_null() => format_value_compact(v),
            _ => {
                return Err(GraphError::MissingPrimaryKey {
                    table: label.to_string(),
                    key: table.primary_key.clone(),
                })
            }
        };
        if self
            .id_indices
            .get(label)
            .is_some_and(|ids| ids.contains_key(&key))
        {
            return Err(GraphError::DuplicatePrimaryKey {
                table: label.to_string(),
                key: display_key(&properties, &table.primary_key),
            });
        }

        let idx = self.graph.add_node(NodeData {
            label: label.to_string(),
            properties,
        });
        self.type_indices
            .entry(label.to_string())
            .or_default()
            .push(idx);
        self.id_indices
            .entry(label.to_string())
            .or_default()
            .insert(key, idx);
        Ok(idx)
    }

    /// Connect two existing nodes, looked up by primary key in the
    /// relationship table's source and destination tables.
    pub fn add_edge<K, I>(
        &mut self,
        label: &str,
        src_key: impl Into<Value>,
        dst_key: impl Into<Value>,
        properties: I,
    ) -> Result<EdgeIndex, GraphError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let properties: BTreeMap<String, Value> =
            properties.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let table = self
            .catalog
            .rel_table(label)
            .ok_or_else(|| GraphError::UnknownTable(label.to_string()))?;
        check_properties(label, &table.properties, &properties)?;

        let src_key = src_key.into();
        let dst_key = dst_key.into();
        let source = self
            .find_node(&table.src, &src_key)
            .ok_or_else(|| GraphError::MissingEndpoint {
                table: table.src.clone(),
                key: src_key.to_string(),
            })?;
        let target = self
            .find_node(&table.dst, &dst_key)
            .ok_or_else(|| GraphError::MissingEndpoint {
                table: table.dst.clone(),
                key: dst_key.to_string(),
            })?;

        Ok(self.graph.add_edge(
            source,
            target,
            EdgeData {
                label: label.to_string(),
                properties,
            },
        ))
    }

    /// Rebuild label and primary key indices from the raw graph.
    pub(crate) fn rebuild_indices(&mut self) -> Result<(), GraphError> {
        self.type_indices.clear();
        self.id_indices.clear();
        for idx in self.graph.node_indices() {
            let node = &self.graph[idx];
            let table = self
                .catalog
                .node_table(&node.label)
                .ok_or_else(|| GraphError::UnknownTable(node.label.clone()))?;
            check_properties(&node.label, &table.properties, &node.properties)?;
            let key = match node.properties.get(&table.primary_key) {
                Some(v) if !v.is_null() => format_value_compact(v),
                _ => {
                    return Err(GraphError::MissingPrimaryKey {
                        table: node.label.clone(),
                        key: table.primary_key.clone(),
                    })
                }
            };
            let ids = self.id_indices.entry(node.label.clone()).or_default();
            if ids.insert(key, idx).is_some() {
                return Err(GraphError::DuplicatePrimaryKey {
                    table: node.label.clone(),
                    key: display_key(&node.properties, &table.primary_key),
                });
            }
            self.type_indices
                .entry(node.label.clone())
                .or_default()
                .push(idx);
        }
        for edge in self.graph.edge_weights() {
            if self.catalog.rel_table(&edge.label).is_none() {
                return Err(GraphError::UnknownTable(edge.label.clone()));
            }
        }
        Ok(())
    }
}

fn check_properties(
    table: &str,
    declared: &[PropertyDef],
    properties: &BTreeMap<String, Value>,
) -> Result<(), GraphError> {
    for (name, value) in properties {
        let def = declared
            .iter()
            .find(|p| &p.name == name)
            .ok_or_else(|| GraphError::UnknownProperty {
                table: table.to_string(),
                property: name.clone(),
            })?;
        if !def.data_type.accepts(value) {
            return Err(GraphError::TypeMismatch {
                table: table.to_string(),
                property: name.clone(),
                expected: def.data_type.type_string(),
                found: value.type_name().to_string(),
            });
        }
    }
    Ok(())
}

fn display_key(properties: &BTreeMap<String, Value>, key: &str) -> String {
    properties
        .get(key)
        .map(|v| v.to_string())
        .unwrap_or_else(|| "NULL".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric_graph() -> DirGraph {
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
            "Dimension",
            "id",
            vec![PropertyDef::new("id", PropertyType::scalar(DataType::String))],
        )
        .unwrap();
        g.define_rel_table("USES_DIMENSION", "Metric", "Dimension", vec![])
            .unwrap();
        g
    }

    #[test]
    fn test_type_string() {
        assert_eq!(PropertyType::scalar(DataType::Float).type_string(), "FLOAT");
        assert_eq!(PropertyType::list(DataType::Float).type_string(), "FLOAT[]");
        assert_eq!(
            PropertyType::array(DataType::Double, vec![3]).type_string(),
            "DOUBLE[3]"
        );
        let nested = PropertyType {
            base: DataType::Int64,
            dimension: 2,
            shape: None,
        };
        assert_eq!(nested.type_string(), "INT64[][]");
    }

    #[test]
    fn test_array_shape_is_enforced() {
        let t = PropertyType::array(DataType::Float, vec![2]);
        assert!(t.accepts(&Value::from(vec![1.0, 2.0])));
        assert!(!t.accepts(&Value::from(vec![1.0])));
    }

    #[test]
    fn test_add_node_and_edge() {
        let mut g = metric_graph();
        g.add_node(
            "Metric",
            [
                ("id", Value::from("m1")),
                ("tags", Value::from(vec!["finance"])),
            ],
        )
        .unwrap();
        g.add_node("Dimension", [("id", Value::from("d1"))]).unwrap();
        g.add_edge("USES_DIMENSION", "m1", "d1", Vec::<(String, Value)>::new())
            .unwrap();
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.nodes_with_label("Metric").len(), 1);
        assert!(g.find_node("Metric", &Value::from("m1")).is_some());
    }

    #[test]
    fn test_duplicate_primary_key_rejected() {
        let mut g = metric_graph();
        g.add_node("Dimension", [("id", Value::from("d1"))]).unwrap();
        let err = g
            .add_node("Dimension", [("id", Value::from("d1"))])
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicatePrimaryKey { .. }));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut g = metric_graph();
        let err = g
            .add_node(
                "Metric",
                [("id", Value::from("m1")), ("tags", Value::from("finance"))],
            )
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::TypeMismatch {
                table: "Metric".into(),
                property: "tags".into(),
                expected: "STRING[]".into(),
                found: "STRING".into(),
            }
        );
    }

    #[test]
    fn test_dangling_edge_rejected() {
        let mut g = metric_graph();
        g.add_node("Metric", [("id", Value::from("m1"))]).unwrap();
        let err = g
            .add_edge("USES_DIMENSION", "m1", "missing", Vec::<(String, Value)>::new())
            .unwrap_err();
        assert!(matches!(err, GraphError::MissingEndpoint { .. }));
    }

    #[test]
    fn test_rel_table_requires_endpoints() {
        let mut g = DirGraph::new();
        let err = g.define_rel_table("R", "A", "B", vec![]).unwrap_err();
        assert_eq!(err, GraphError::UnknownTable("A".into()));
    }

    #[test]
    fn test_node_value_carries_label() {
        let mut g = metric_graph();
        let idx = g.add_node("Metric", [("id", Value::from("m1"))]).unwrap();
        let value = g.node(idx).unwrap().to_value();
        assert_eq!(
            value.as_map().unwrap().get(LABEL_KEY),
            Some(&Value::from("Metric"))
        );
    }
}
