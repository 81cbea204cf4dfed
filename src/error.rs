// src/error.rs
//! Error types for the store, the schema introspector and the metric resolver.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::SettingsError;

/// Message handed back to a caller whose query failed and should be rephrased.
pub const RETRY_HINT: &str = "No matching result was found. Rephrase the request and query again.";

/// The store could not be opened. Fatal, never retried.
#[derive(Debug, Error)]
#[error("cannot open graph store at {}: {reason}", .path.display())]
pub struct ConnectionError {
    pub path: PathBuf,
    pub reason: String,
}

/// A pattern query failed or returned rows of an unexpected shape.
/// Carries the original query text so the caller can adjust and resubmit.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Error executing graph query: {query}: {cause}")]
pub struct QueryError {
    pub query: String,
    pub cause: String,
}

impl QueryError {
    pub fn new(query: impl Into<String>, cause: impl Into<String>) -> Self {
        QueryError {
            query: query.into(),
            cause: cause.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        true
    }

    pub fn retry_hint(&self) -> &'static str {
        RETRY_HINT
    }
}

/// A catalog call failed while building the schema description.
/// The previously cached description stays valid.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("schema introspection failed on `{query}`: {cause}")]
pub struct IntrospectionError {
    pub query: String,
    pub cause: String,
}

impl From<QueryError> for IntrospectionError {
    fn from(e: QueryError) -> Self {
        IntrospectionError {
            query: e.query,
            cause: e.cause,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Depth,
    Metrics,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitKind::Depth => write!(f, "dependency depth"),
            LimitKind::Metrics => write!(f, "expanded metric count"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("dependency cycle detected: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("resolution exceeded the {kind} limit of {limit}")]
    LimitExceeded { kind: LimitKind, limit: usize },
}

impl ResolveError {
    /// Only query failures are worth resubmitting; cycles and limits are
    /// properties of the stored data.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResolveError::Query(_))
    }
}

/// Store construction and catalog validation failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("table `{0}` is not defined")]
    UnknownTable(String),

    #[error("table `{0}` is already defined")]
    DuplicateTable(String),

    #[error("table `{table}` has no property `{property}`")]
    UnknownProperty { table: String, property: String },

    #[error("property `{table}.{property}` expects {expected}, got {found}")]
    TypeMismatch {
        table: String,
        property: String,
        expected: String,
        found: String,
    },

    #[error("node in `{table}` is missing primary key `{key}`")]
    MissingPrimaryKey { table: String, key: String },

    #[error("duplicate primary key {key} in `{table}`")]
    DuplicatePrimaryKey { table: String, key: String },

    #[error("`{table}` endpoint {key} does not exist")]
    MissingEndpoint { table: String, key: String },
}

/// Crate-level error aggregating every failure kind.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Introspection(#[from] IntrospectionError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

pub type Result<T> = std::result::Result<T, Error>;
