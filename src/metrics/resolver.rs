// src/metrics/resolver.rs
//
// Metric dependency resolution.
//
//   1. Candidate selection: metrics with a requested alias whose dimensions
//      cover every requested dimension name, with their total dimension count.
//   2. Minimality: keep the candidates with the fewest total dimensions (ties kept).
//   3. Expansion: fetch each kept metric with all of its dimensions and its
//      data source, expanding `dependent_metrics` depth-first. Dependencies
//      are appended before the metric that needs them.
//
// Every query is parameterized; caller-supplied names never reach query text.

use super::model::{DataSource, Dimension, Metric, ResolutionResult};
use crate::config::{CyclePolicy, ResolverConfig};
use crate::datatypes::values::Value;
use crate::error::{LimitKind, QueryError, ResolveError};
use crate::graph::{GraphStore, Params, Row};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const CANDIDATE_QUERY: &str = "MATCH (m:Metric) \
WHERE m.alias IN $aliases \
AND COUNT { MATCH (m)-[:USES_DIMENSION]->(d:Dimension) WHERE d.name IN $dimensions } = $dimension_count \
RETURN m.id AS id, COUNT { MATCH (m)-[:USES_DIMENSION]->(:Dimension) } AS dimension_count";

pub const METRIC_QUERY: &str = "MATCH (m:Metric) WHERE m.id = $metric_id \
OPTIONAL MATCH (m)-[:USES_DIMENSION]->(d:Dimension) \
RETURN m, collect(d) AS dimensions";

pub const DATA_SOURCE_QUERY: &str = "MATCH (m:Metric)-[:FROM_TABLE]->(ds:DataSource) \
WHERE m.id = $metric_id \
RETURN ds";

/// A metric that passed candidate selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    /// Dimension edges over all dimensions, not just the requested ones
    pub dimension_count: i64,
}

/// One metric with everything attached to it.
#[derive(Debug, Clone)]
struct FetchedMetric {
    metric: Metric,
    dimensions: Vec<Dimension>,
    data_source: Option<DataSource>,
}

enum Frame {
    Enter { id: String, depth: usize },
    Exit(Box<FetchedMetric>),
}

/// Keep the candidates whose total dimension count is the minimum.
pub fn minimal_candidates(candidates: &[Candidate]) -> Vec<&Candidate> {
    let Some(min) = candidates.iter().map(|c| c.dimension_count).min() else {
        return Vec::new();
    };
    candidates
        .iter()
        .filter(|c| c.dimension_count == min)
        .collect()
}

fn dedup_names<T: AsRef<str>>(names: &[T]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|n| n.as_ref())
        .filter(|n| seen.insert(*n))
        .map(str::to_string)
        .collect()
}

fn string_list(names: &[String]) -> Value {
    Value::List(names.iter().map(|n| Value::from(n.as_str())).collect())
}

fn column<'a>(row: &'a Row, name: &str, query: &str) -> Result<&'a Value, QueryError> {
    row.get(name)
        .ok_or_else(|| QueryError::new(query, format!("result row has no `{}` column", name)))
}

pub struct MetricResolver<S> {
    store: Arc<S>,
    config: ResolverConfig,
}

impl<S: GraphStore> MetricResolver<S> {
    pub fn new(store: Arc<S>, config: ResolverConfig) -> Self {
        MetricResolver { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve metric aliases and dimension names into the closed set of
    /// metrics, dimensions and data sources needed to answer the request.
    ///
    /// Returns an empty result when no metric covers every requested
    /// dimension. On error nothing collected so far is returned.
    pub fn resolve<A: AsRef<str>, D: AsRef<str>>(
        &self,
        aliases: &[A],
        dimensions: &[D],
    ) -> Result<ResolutionResult, ResolveError> {
        let aliases = dedup_names(aliases);
        let dimensions = dedup_names(dimensions);
        if aliases.is_empty() {
            debug!("no metric aliases requested");
            return Ok(ResolutionResult::default());
        }

        let candidates = self.select_candidates(&aliases, &dimensions)?;
        let roots: Vec<String> = minimal_candidates(&candidates)
            .into_iter()
            .map(|c| c.id.clone())
            .collect();
        debug!(
            candidates = candidates.len(),
            kept = roots.len(),
            "metric candidates selected"
        );

        let result = self.expand(&roots)?;
        info!(
            aliases = ?aliases,
            metrics = result.metrics.len(),
            dimensions = result.dimensions.len(),
            data_sources = result.data_sources.len(),
            "metrics resolved"
        );
        Ok(result)
    }

    /// Step 1: metrics with a requested alias that cover every requested
    /// dimension name.
    pub fn select_candidates(
        &self,
        aliases: &[String],
        dimensions: &[String],
    ) -> Result<Vec<Candidate>, QueryError> {
        let mut params = Params::new();
        params.insert("aliases".to_string(), string_list(aliases));
        params.insert("dimensions".to_string(), string_list(dimensions));
        params.insert(
            "dimension_count".to_string(),
            Value::Int64(dimensions.len() as i64),
        );

        let rows = self.store.execute(CANDIDATE_QUERY, &params)?;
        rows.iter()
            .map(|row| {
                let id = column(row, "id", CANDIDATE_QUERY)?
                    .as_str()
                    .ok_or_else(|| QueryError::new(CANDIDATE_QUERY, "metric id is not a string"))?;
                let dimension_count = column(row, "dimension_count", CANDIDATE_QUERY)?
                    .as_i64()
                    .ok_or_else(|| {
                        QueryError::new(CANDIDATE_QUERY, "dimension_count is not an integer")
                    })?;
                Ok(Candidate {
                    id: id.to_string(),
                    dimension_count,
                })
            })
            .collect()
    }

    /// Step 3: expand metric ids and their dependencies into a result.
    /// Ids that name no metric are skipped.
    pub fn expand<T: AsRef<str>>(&self, ids: &[T]) -> Result<ResolutionResult, ResolveError> {
        let mut result = ResolutionResult::default();
        let mut finished: HashSet<String> = HashSet::new();
        let mut in_progress: HashSet<String> = HashSet::new();
        // Ids currently being expanded, outermost first
        let mut path: Vec<String> = Vec::new();
        let mut fetched = 0usize;

        let mut stack: Vec<Frame> = ids
            .iter()
            .rev()
            .map(|id| Frame::Enter {
                id: id.as_ref().to_string(),
                depth: 0,
            })
            .collect();

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter { id, depth } => {
                    if finished.contains(&id) {
                        continue;
                    }
                    if in_progress.contains(&id) {
                        match self.config.cycle_policy {
                            CyclePolicy::Fail => {
                                let start = path.iter().position(|p| *p == id).unwrap_or(0);
                                let mut cycle = path[start..].to_vec();
                                cycle.push(id);
                                return Err(ResolveError::DependencyCycle { cycle });
                            }
                            CyclePolicy::Skip => {
                                warn!(metric = %id, path = ?path, "skipping dependency cycle");
                                continue;
                            }
                        }
                    }
                    if let Some(limit) = self.config.max_depth {
                        if depth > limit {
                            return Err(ResolveError::LimitExceeded {
                                kind: LimitKind::Depth,
                                limit,
                            });
                        }
                    }

                    let Some(entry) = self.fetch_metric(&id)? else {
                        warn!(metric = %id, "metric id does not resolve to a metric, skipping");
                        finished.insert(id);
                        continue;
                    };
                    fetched += 1;
                    if let Some(limit) = self.config.max_metrics {
                        if fetched > limit {
                            return Err(ResolveError::LimitExceeded {
                                kind: LimitKind::Metrics,
                                limit,
                            });
                        }
                    }

                    in_progress.insert(id.clone());
                    path.push(id);
                    let deps = entry.metric.dependent_metrics.clone();
                    stack.push(Frame::Exit(Box::new(entry)));
                    for dep in deps.into_iter().rev() {
                        stack.push(Frame::Enter {
                            id: dep,
                            depth: depth + 1,
                        });
                    }
                }
                Frame::Exit(entry) => {
                    let FetchedMetric {
                        metric,
                        dimensions,
                        data_source,
                    } = *entry;
                    path.pop();
                    in_progress.remove(&metric.id);
                    finished.insert(metric.id.clone());

                    for d in dimensions {
                        result.dimensions.insert(d.id.clone(), d);
                    }
                    if let Some(ds) = data_source {
                        result.data_sources.insert(ds.table_name.clone(), ds);
                    }
                    result.metrics.push(metric);
                }
            }
        }

        Ok(result)
    }

    fn fetch_metric(&self, id: &str) -> Result<Option<FetchedMetric>, QueryError> {
        let mut params = Params::new();
        params.insert("metric_id".to_string(), Value::from(id));

        let rows = self.store.execute(METRIC_QUERY, &params)?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let metric = Metric::from_value(column(row, "m", METRIC_QUERY)?)
            .map_err(|cause| QueryError::new(METRIC_QUERY, cause))?;
        let dimensions = column(row, "dimensions", METRIC_QUERY)?
            .as_list()
            .ok_or_else(|| QueryError::new(METRIC_QUERY, "dimensions is not a list"))?
            .iter()
            .map(Dimension::from_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|cause| QueryError::new(METRIC_QUERY, cause))?;

        let rows = self.store.execute(DATA_SOURCE_QUERY, &params)?;
        let data_source = rows
            .first()
            .map(|row| {
                DataSource::from_value(column(row, "ds", DATA_SOURCE_QUERY)?)
                    .map_err(|cause| QueryError::new(DATA_SOURCE_QUERY, cause))
            })
            .transpose()?;

        Ok(Some(FetchedMetric {
            metric,
            dimensions,
            data_source,
        }))
    }
}
