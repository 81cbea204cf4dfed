// src/graph/mod.rs
//
// Embedded property-graph store: catalog-validated petgraph storage, a
// read-only Cypher subset, and the `GraphStore` boundary the introspector
// and resolver talk through.

use crate::datatypes::values::Value;
use crate::error::{ConnectionError, QueryError};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub mod cypher;
pub mod io_operations;
pub mod pattern_matching;
pub mod schema;
pub mod value_operations;

pub use cypher::{CypherResult, Row};
use schema::{DirGraph, PropertyDef};

/// Named query parameters (`$name` in query text).
pub type Params = HashMap<String, Value>;

// ============================================================================
// Catalog descriptors
// ============================================================================

/// One declared property of a node table, as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyDescriptor {
    pub name: String,
    /// Base type name, e.g. `STRING`, `FLOAT`
    pub base_type: String,
    /// Array nesting depth; 0 for scalars
    pub dimension: u32,
    /// Fixed array shape when the catalog declares one
    pub shape: Option<Vec<u64>>,
}

impl From<&PropertyDef> for PropertyDescriptor {
    fn from(def: &PropertyDef) -> Self {
        PropertyDescriptor {
            name: def.name.clone(),
            base_type: def.data_type.base.to_string(),
            dimension: def.data_type.dimension,
            shape: def.data_type.shape.clone(),
        }
    }
}

/// A relationship table with its endpoint labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelTableDescriptor {
    pub name: String,
    pub src: String,
    pub dst: String,
}

// ============================================================================
// GraphStore
// ============================================================================

/// The only way the introspector and resolver reach a store. One synchronous
/// call per logical step; implementations do no retrying of their own.
pub trait GraphStore {
    /// Run a pattern query with named parameters.
    fn execute(&self, query: &str, params: &Params) -> Result<Vec<Row>, QueryError>;

    /// Parse and check a query against the catalog without returning rows.
    fn explain(&self, query: &str, params: &Params) -> Result<(), QueryError>;

    /// Node table labels in catalog order.
    fn node_table_names(&self) -> Result<Vec<String>, QueryError>;

    /// Declared properties of one node table.
    fn node_properties(&self, label: &str) -> Result<Vec<PropertyDescriptor>, QueryError>;

    /// Relationship tables in catalog order.
    fn rel_tables(&self) -> Result<Vec<RelTableDescriptor>, QueryError>;
}

impl<S: GraphStore + ?Sized> GraphStore for Arc<S> {
    fn execute(&self, query: &str, params: &Params) -> Result<Vec<Row>, QueryError> {
        (**self).execute(query, params)
    }

    fn explain(&self, query: &str, params: &Params) -> Result<(), QueryError> {
        (**self).explain(query, params)
    }

    fn node_table_names(&self) -> Result<Vec<String>, QueryError> {
        (**self).node_table_names()
    }

    fn node_properties(&self, label: &str) -> Result<Vec<PropertyDescriptor>, QueryError> {
        (**self).node_properties(label)
    }

    fn rel_tables(&self) -> Result<Vec<RelTableDescriptor>, QueryError> {
        (**self).rel_tables()
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Read-only handle over a loaded graph. Cloning shares the graph.
#[derive(Debug, Clone)]
pub struct Connection {
    graph: Arc<DirGraph>,
    path: Option<PathBuf>,
}

impl Connection {
    /// Open an on-disk store. Fails fast when the path is absent or the
    /// file is not a readable store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConnectionError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConnectionError {
                path: path.to_path_buf(),
                reason: "path does not exist".to_string(),
            });
        }
        let graph = io_operations::load_file(path).map_err(|e| ConnectionError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!(
            path = %path.display(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "opened graph store"
        );
        Ok(Connection {
            graph: Arc::new(graph),
            path: Some(path.to_path_buf()),
        })
    }

    /// Wrap a graph built in memory.
    pub fn in_memory(graph: DirGraph) -> Self {
        Connection {
            graph: Arc::new(graph),
            path: None,
        }
    }

    pub fn graph(&self) -> &DirGraph {
        &self.graph
    }

    /// Where the store was opened from; None for in-memory graphs.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Persist the graph in the on-disk store format.
    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        io_operations::save_to_file(&self.graph, path)
    }
}

impl GraphStore for Connection {
    fn execute(&self, query: &str, params: &Params) -> Result<Vec<Row>, QueryError> {
        debug!(query, params = ?param_names(params), "executing graph query");
        cypher::execute_query(&self.graph, query, params)
            .map(CypherResult::into_rows)
            .map_err(|cause| QueryError::new(query, cause))
    }

    fn explain(&self, query: &str, params: &Params) -> Result<(), QueryError> {
        debug!(query, params = ?param_names(params), "explaining graph query");
        cypher::explain_query(&self.graph, query, params)
            .map(|_| ())
            .map_err(|cause| QueryError::new(query, cause))
    }

    fn node_table_names(&self) -> Result<Vec<String>, QueryError> {
        Ok(self
            .graph
            .catalog()
            .node_tables
            .iter()
            .map(|t| t.name.clone())
            .collect())
    }

    fn node_properties(&self, label: &str) -> Result<Vec<PropertyDescriptor>, QueryError> {
        match self.graph.catalog().node_table(label) {
            Some(table) => Ok(table.properties.iter().map(PropertyDescriptor::from).collect()),
            None => Err(QueryError::new(
                format!("CALL table_info('{}') RETURN *", label),
                format!("Table {} does not exist.", label),
            )),
        }
    }

    fn rel_tables(&self) -> Result<Vec<RelTableDescriptor>, QueryError> {
        Ok(self
            .graph
            .catalog()
            .rel_tables
            .iter()
            .map(|t| RelTableDescriptor {
                name: t.name.clone(),
                src: t.src.clone(),
                dst: t.dst.clone(),
            })
            .collect())
    }
}

/// Parameter names only; values never reach the logs.
fn param_names(params: &Params) -> Vec<&str> {
    let mut names: Vec<&str> = params.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
}

// ============================================================================
// LockedStore
// ============================================================================

/// Serializes every call into a store whose driver is not reentrant.
#[derive(Debug)]
pub struct LockedStore<S> {
    inner: Mutex<S>,
}

impl<S> LockedStore<S> {
    pub fn new(inner: S) -> Self {
        LockedStore {
            inner: Mutex::new(inner),
        }
    }

    pub fn into_inner(self) -> Result<S, QueryError> {
        self.inner
            .into_inner()
            .map_err(|_| QueryError::new("", "store lock poisoned"))
    }

    fn with_store<T>(
        &self,
        query: &str,
        f: impl FnOnce(&S) -> Result<T, QueryError>,
    ) -> Result<T, QueryError> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| QueryError::new(query, "store lock poisoned"))?;
        f(&guard)
    }
}

impl<S: GraphStore> GraphStore for LockedStore<S> {
    fn execute(&self, query: &str, params: &Params) -> Result<Vec<Row>, QueryError> {
        self.with_store(query, |s| s.execute(query, params))
    }

    fn explain(&self, query: &str, params: &Params) -> Result<(), QueryError> {
        self.with_store(query, |s| s.explain(query, params))
    }

    fn node_table_names(&self) -> Result<Vec<String>, QueryError> {
        self.with_store("CALL show_tables() RETURN *", |s| s.node_table_names())
    }

    fn node_properties(&self, label: &str) -> Result<Vec<PropertyDescriptor>, QueryError> {
        let query = format!("CALL table_info('{}') RETURN *", label);
        self.with_store(&query, |s| s.node_properties(label))
    }

    fn rel_tables(&self) -> Result<Vec<RelTableDescriptor>, QueryError> {
        self.with_store("CALL show_tables() RETURN *", |s| s.rel_tables())
    }
}
