// src/introspection.rs
//
// Schema introspection: turns the store catalog into a description that can
// be embedded in a prompt or returned to a tool caller.
//
// The description is built once when the introspector is created and is
// replaced wholesale by `refresh()`. Readers hold an `Arc` to whichever
// complete description was current when they asked.

use crate::config::IntrospectorConfig;
use crate::error::{Error, IntrospectionError};
use crate::graph::{Connection, GraphStore, Params, PropertyDescriptor};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

// ── Return types ────────────────────────────────────────────────────────────

/// Properties of one node or relationship table, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelSchema {
    pub label: String,
    /// (property name, type string) pairs
    pub properties: Vec<(String, String)>,
}

impl LabelSchema {
    fn to_json(&self) -> serde_json::Value {
        let properties: Vec<serde_json::Value> = self
            .properties
            .iter()
            .map(|(name, ty)| json!([name, ty]))
            .collect();
        json!({ "label": self.label, "properties": properties })
    }
}

/// Immutable snapshot of the store catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaDescription {
    pub node_schemas: Vec<LabelSchema>,
    pub relationship_schemas: Vec<LabelSchema>,
    /// `(:Src)-[:REL]->(:Dst)` strings
    pub relationship_patterns: Vec<String>,
}

impl SchemaDescription {
    pub fn is_empty(&self) -> bool {
        self.node_schemas.is_empty()
            && self.relationship_schemas.is_empty()
            && self.relationship_patterns.is_empty()
    }

    /// Three labeled sections, each the JSON form of its collection.
    pub fn render_text(&self) -> String {
        let nodes: Vec<_> = self.node_schemas.iter().map(LabelSchema::to_json).collect();
        let rels: Vec<_> = self
            .relationship_schemas
            .iter()
            .map(LabelSchema::to_json)
            .collect();
        format!(
            "Node properties:\n{}\nRelationship properties:\n{}\nRelationship patterns:\n{}\n",
            serde_json::Value::Array(nodes),
            serde_json::Value::Array(rels),
            json!(self.relationship_patterns),
        )
    }
}

/// Catalog type string: one `[]` per dimension level, or the declared shape.
pub fn compose_type(desc: &PropertyDescriptor) -> String {
    let mut out = desc.base_type.clone();
    match &desc.shape {
        Some(shape) if desc.dimension > 0 => {
            for s in shape {
                out.push_str(&format!("[{}]", s));
            }
        }
        _ => {
            for _ in 0..desc.dimension {
                out.push_str("[]");
            }
        }
    }
    out
}

// ── Introspector ────────────────────────────────────────────────────────────

pub struct SchemaIntrospector<S> {
    store: Arc<S>,
    config: IntrospectorConfig,
    cache: RwLock<Arc<SchemaDescription>>,
}

impl SchemaIntrospector<Connection> {
    /// Open an on-disk store and build its description.
    pub fn open(path: impl AsRef<Path>, config: IntrospectorConfig) -> Result<Self, Error> {
        let conn = Connection::open(path)?;
        Ok(SchemaIntrospector::new(Arc::new(conn), config)?)
    }
}

impl<S: GraphStore> SchemaIntrospector<S> {
    /// Build the initial description. Fails if any catalog call fails.
    pub fn new(store: Arc<S>, config: IntrospectorConfig) -> Result<Self, IntrospectionError> {
        let introspector = SchemaIntrospector {
            store,
            config,
            cache: RwLock::new(Arc::new(SchemaDescription::default())),
        };
        introspector.refresh()?;
        Ok(introspector)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The last successfully built description.
    pub fn schema(&self) -> Arc<SchemaDescription> {
        let guard = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn schema_text(&self) -> String {
        self.schema().render_text()
    }

    /// Rebuild from the live catalog, then swap. On failure the cached
    /// description is left as it was.
    pub fn refresh(&self) -> Result<Arc<SchemaDescription>, IntrospectionError> {
        let description = Arc::new(self.build()?);
        info!(
            node_tables = description.node_schemas.len(),
            rel_tables = description.relationship_schemas.len(),
            "schema description built"
        );
        let mut guard = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::clone(&description);
        Ok(description)
    }

    /// Backtick-quote labels that collide with catalog keywords.
    pub fn wrap_name(&self, name: &str) -> String {
        if self.config.reserved_labels.iter().any(|r| r == name) {
            format!("`{}`", name)
        } else {
            name.to_string()
        }
    }

    fn build(&self) -> Result<SchemaDescription, IntrospectionError> {
        let mut node_schemas = Vec::new();
        for label in self.store.node_table_names()? {
            let properties = self
                .store
                .node_properties(&label)?
                .iter()
                .map(|p| (p.name.clone(), compose_type(p)))
                .collect();
            node_schemas.push(LabelSchema {
                label: self.wrap_name(&label),
                properties,
            });
        }

        let rel_tables = self.store.rel_tables()?;
        let relationship_patterns = rel_tables
            .iter()
            .map(|rel| {
                format!(
                    "(:{})-[:{}]->(:{})",
                    self.wrap_name(&rel.src),
                    self.wrap_name(&rel.name),
                    self.wrap_name(&rel.dst)
                )
            })
            .collect();

        // The bulk listing carries no relationship properties
        let mut relationship_schemas = Vec::with_capacity(rel_tables.len());
        for rel in &rel_tables {
            let label = self.wrap_name(&rel.name);
            let query = format!("CALL table_info('{}') RETURN *", label);
            let rows = self.store.execute(&query, &Params::new())?;

            let mut properties = Vec::with_capacity(rows.len());
            for row in &rows {
                let name = row.value_at(1).and_then(|v| v.as_str());
                let ty = row.value_at(2).and_then(|v| v.as_str());
                match (name, ty) {
                    (Some(name), Some(ty)) => properties.push((name.to_string(), ty.to_string())),
                    _ => {
                        return Err(IntrospectionError {
                            query,
                            cause: format!(
                                "expected (ordinal, name, type, ...) catalog row, got {} column(s)",
                                row.len()
                            ),
                        })
                    }
                }
            }
            relationship_schemas.push(LabelSchema { label, properties });
        }

        Ok(SchemaDescription {
            node_schemas,
            relationship_schemas,
            relationship_patterns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::values::{DataType, Value};
    use crate::error::QueryError;
    use crate::graph::schema::{DirGraph, PropertyDef, PropertyType};
    use crate::graph::{RelTableDescriptor, Row};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn catalog_graph() -> DirGraph {
        let s = |name: &str| PropertyDef::new(name, PropertyType::scalar(DataType::String));
        let mut g = DirGraph::new();
        g.define_node_table(
            "Metric",
            "id",
            vec![
                s("id"),
                PropertyDef::new("tags", PropertyType::list(DataType::String)),
            ],
        )
        .unwrap();
        g.define_node_table("Dimension", "id", vec![s("id"), s("name")])
            .unwrap();
        g.define_node_table(
            "Column",
            "id",
            vec![
                s("id"),
                PropertyDef::new("embedding", PropertyType::array(DataType::Float, vec![4])),
            ],
        )
        .unwrap();
        g.define_rel_table(
            "USES_DIMENSION",
            "Metric",
            "Dimension",
            vec![PropertyDef::new("weight", PropertyType::scalar(DataType::Int64))],
        )
        .unwrap();
        g.define_rel_table("DESCRIBES", "Column", "Metric", vec![])
            .unwrap();
        g.add_node("Metric", [("id", Value::from("m1"))]).unwrap();
        g
    }

    /// Delegates to a connection. execute() fails while `failing` is set,
    /// node_properties() while `failing_properties` is set.
    struct FlakyStore {
        inner: Connection,
        failing: AtomicBool,
        failing_properties: AtomicBool,
    }

    impl FlakyStore {
        fn new(failing: bool) -> Self {
            FlakyStore {
                inner: Connection::in_memory(catalog_graph()),
                failing: AtomicBool::new(failing),
                failing_properties: AtomicBool::new(false),
            }
        }
    }

    impl GraphStore for FlakyStore {
        fn execute(&self, query: &str, params: &Params) -> Result<Vec<Row>, QueryError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(QueryError::new(query, "connection reset"));
            }
            self.inner.execute(query, params)
        }

        fn explain(&self, query: &str, params: &Params) -> Result<(), QueryError> {
            self.inner.explain(query, params)
        }

        fn node_table_names(&self) -> Result<Vec<String>, QueryError> {
            self.inner.node_table_names()
        }

        fn node_properties(&self, label: &str) -> Result<Vec<PropertyDescriptor>, QueryError> {
            if self.failing_properties.load(Ordering::SeqCst) {
                return Err(QueryError::new(
                    format!("CALL table_info('{}') RETURN *", label),
                    "connection reset",
                ));
            }
            self.inner.node_properties(label)
        }

        fn rel_tables(&self) -> Result<Vec<RelTableDescriptor>, QueryError> {
            self.inner.rel_tables()
        }
    }

    fn introspector() -> SchemaIntrospector<Connection> {
        SchemaIntrospector::new(
            Arc::new(Connection::in_memory(catalog_graph())),
            IntrospectorConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_compose_type() {
        let desc = |dimension, shape| PropertyDescriptor {
            name: "x".into(),
            base_type: "FLOAT".into(),
            dimension,
            shape,
        };
        assert_eq!(compose_type(&desc(0, None)), "FLOAT");
        assert_eq!(compose_type(&desc(1, None)), "FLOAT[]");
        assert_eq!(compose_type(&desc(2, None)), "FLOAT[][]");
        assert_eq!(compose_type(&desc(1, Some(vec![3]))), "FLOAT[3]");
    }

    #[test]
    fn test_node_and_relationship_schemas() {
        let schema = introspector().schema();

        let metric = &schema.node_schemas[0];
        assert_eq!(metric.label, "Metric");
        assert_eq!(
            metric.properties,
            vec![
                ("id".to_string(), "STRING".to_string()),
                ("tags".to_string(), "STRING[]".to_string()),
            ]
        );
        assert_eq!(schema.node_schemas[2].label, "`Column`");
        assert_eq!(schema.node_schemas[2].properties[1].1, "FLOAT[4]");

        assert_eq!(
            schema.relationship_patterns,
            vec![
                "(:Metric)-[:USES_DIMENSION]->(:Dimension)",
                "(:`Column`)-[:DESCRIBES]->(:Metric)",
            ]
        );
        assert_eq!(
            schema.relationship_schemas[0].properties,
            vec![("weight".to_string(), "INT64".to_string())]
        );
        assert!(schema.relationship_schemas[1].properties.is_empty());
    }

    #[test]
    fn test_render_text_sections() {
        let text = introspector().schema_text();
        let nodes = text.find("Node properties:").unwrap();
        let rels = text.find("Relationship properties:").unwrap();
        let patterns = text.find("Relationship patterns:").unwrap();
        assert!(nodes < rels && rels < patterns);
        assert!(text.contains(r#"["tags","STRING[]"]"#));
        assert!(text.contains(r#""(:Metric)-[:USES_DIMENSION]->(:Dimension)""#));
    }

    #[test]
    fn test_schema_is_stable_between_reads() {
        let introspector = introspector();
        let first = introspector.schema();
        let second = introspector.schema();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(introspector.schema_text(), introspector.schema_text());

        let refreshed = introspector.refresh().unwrap();
        assert_eq!(*refreshed, *first);
        assert!(Arc::ptr_eq(&refreshed, &introspector.schema()));
    }

    #[test]
    fn test_failed_refresh_keeps_cached_schema() {
        let store = Arc::new(FlakyStore::new(false));
        let introspector =
            SchemaIntrospector::new(Arc::clone(&store), IntrospectorConfig::default()).unwrap();
        let before = introspector.schema();

        store.failing.store(true, Ordering::SeqCst);
        let err = introspector.refresh().unwrap_err();
        assert_eq!(err.query, "CALL table_info('USES_DIMENSION') RETURN *");
        assert_eq!(err.cause, "connection reset");
        assert!(Arc::ptr_eq(&before, &introspector.schema()));
    }

    #[test]
    fn test_failed_property_listing_keeps_cached_schema() {
        let store = Arc::new(FlakyStore::new(false));
        let introspector =
            SchemaIntrospector::new(Arc::clone(&store), IntrospectorConfig::default()).unwrap();
        let before = introspector.schema();

        store.failing_properties.store(true, Ordering::SeqCst);
        let err = introspector.refresh().unwrap_err();
        assert_eq!(err.query, "CALL table_info('Metric') RETURN *");
        assert!(Arc::ptr_eq(&before, &introspector.schema()));
        assert_eq!(introspector.schema_text(), before.render_text());

        store.failing_properties.store(false, Ordering::SeqCst);
        let after = introspector.refresh().unwrap();
        assert_eq!(*after, *before);
        assert!(!Arc::ptr_eq(&after, &before));
    }

    #[test]
    fn test_construction_fails_on_catalog_error() {
        let store = Arc::new(FlakyStore::new(true));
        assert!(SchemaIntrospector::new(store, IntrospectorConfig::default()).is_err());
    }

    #[test]
    fn test_open_missing_store() {
        let dir = tempfile::tempdir().unwrap();
        let err = SchemaIntrospector::open(dir.path().join("none.mgf"), Default::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[test]
    fn test_custom_reserved_labels() {
        let introspector = SchemaIntrospector::new(
            Arc::new(Connection::in_memory(catalog_graph())),
            IntrospectorConfig {
                reserved_labels: vec!["Metric".into()],
            },
        )
        .unwrap();
        let schema = introspector.schema();
        assert_eq!(schema.node_schemas[0].label, "`Metric`");
        assert_eq!(schema.node_schemas[2].label, "Column");
        assert_eq!(
            schema.relationship_patterns[0],
            "(:`Metric`)-[:USES_DIMENSION]->(:Dimension)"
        );
    }
}
