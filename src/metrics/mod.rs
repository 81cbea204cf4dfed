// src/metrics/mod.rs
//
// Metric records and dependency-aware resolution over the metric graph.

pub mod model;
pub mod resolver;

pub use model::{DataSource, Dimension, KeyedMap, Metric, ResolutionResult};
pub use resolver::{minimal_candidates, Candidate, MetricResolver};
