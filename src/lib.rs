// src/lib.rs
//! Metric semantic resolution over an embedded property graph.
//!
//! [`SchemaIntrospector`] describes the store catalog for prompts and tool
//! payloads. [`MetricResolver`] turns metric aliases and dimension names into
//! the closed set of metrics, dimensions and data sources a query needs.
//! Both reach the store only through [`GraphStore`].

pub mod config;
pub mod datatypes;
pub mod engine;
pub mod error;
pub mod graph;
pub mod introspection;
pub mod metrics;
pub mod tools;

pub use config::{CyclePolicy, IntrospectorConfig, ResolverConfig, Settings};
pub use datatypes::values::Value;
pub use engine::MetricEngine;
pub use error::{
    ConnectionError, Error, GraphError, IntrospectionError, QueryError, ResolveError, Result,
};
pub use graph::schema::DirGraph;
pub use graph::{Connection, GraphStore, LockedStore, Params, Row};
pub use introspection::{SchemaDescription, SchemaIntrospector};
pub use metrics::{DataSource, Dimension, Metric, MetricResolver, ResolutionResult};
