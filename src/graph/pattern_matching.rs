// Pattern Matching Module for Cypher-like queries
// Supports patterns like: (m:Metric)-[:USES_DIMENSION]->(d:Dimension:MetricDimension)

use crate::datatypes::values::Value;
use crate::graph::schema::DirGraph;
use crate::graph::value_operations::values_equal;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;

// ============================================================================
// AST Types
// ============================================================================

/// A complete pattern to match against the graph
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub elements: Vec<PatternElement>,
}

/// Either a node or edge pattern
#[derive(Debug, Clone, PartialEq)]
pub enum PatternElement {
    Node(NodePattern),
    Edge(EdgePattern),
}

/// Pattern for matching nodes: (var:Label:OtherLabel {prop: value}).
/// A node matches when its label is any of `labels`; an empty list matches all.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodePattern {
    pub variable: Option<String>,
    pub labels: Vec<String>,
    pub properties: Vec<(String, PropertyMatcher)>,
}

/// Pattern for matching edges: -[var:TYPE|OTHER {prop: value}]->
#[derive(Debug, Clone, PartialEq)]
pub struct EdgePattern {
    pub variable: Option<String>,
    pub rel_types: Vec<String>,
    pub direction: EdgeDirection,
    pub properties: Vec<(String, PropertyMatcher)>,
}

/// Direction of edge traversal
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeDirection {
    Outgoing, // -[]->
    Incoming, // <-[]-
    Both,     // -[]-
}

/// Inline property constraint. Parameters are resolved at match time.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyMatcher {
    Equals(Value),
    Parameter(String),
}

// ============================================================================
// Match Results
// ============================================================================

/// A bound variable (either node or edge)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchBinding {
    Node(NodeIndex),
    Edge {
        source: NodeIndex,
        target: NodeIndex,
        edge: EdgeIndex,
    },
}

/// A single pattern match with variable bindings in pattern order
#[derive(Debug, Clone, Default)]
pub struct PatternMatch {
    pub bindings: Vec<(String, MatchBinding)>,
    used_edges: Vec<EdgeIndex>,
}

impl PatternMatch {
    fn node(&self, var: &str) -> Option<NodeIndex> {
        self.bindings.iter().find_map(|(k, b)| match b {
            MatchBinding::Node(idx) if k == var => Some(*idx),
            _ => None,
        })
    }

    fn bind(&mut self, var: &Option<String>, binding: MatchBinding) {
        if let Some(var) = var {
            if !self.bindings.iter().any(|(k, _)| k == var) {
                self.bindings.push((var.clone(), binding));
            }
        }
    }
}

// ============================================================================
// Executor
// ============================================================================

pub struct PatternExecutor<'a> {
    graph: &'a DirGraph,
    params: &'a HashMap<String, Value>,
    pre_bindings: HashMap<String, NodeIndex>,
}

impl<'a> PatternExecutor<'a> {
    pub fn new(graph: &'a DirGraph, params: &'a HashMap<String, Value>) -> Self {
        PatternExecutor {
            graph,
            params,
            pre_bindings: HashMap::new(),
        }
    }

    /// Constrain variables that are already bound by an outer row.
    pub fn with_bindings(
        graph: &'a DirGraph,
        params: &'a HashMap<String, Value>,
        pre_bindings: HashMap<String, NodeIndex>,
    ) -> Self {
        PatternExecutor {
            graph,
            params,
            pre_bindings,
        }
    }

    /// Execute the pattern and return all matches
    pub fn execute(&self, pattern: &Pattern) -> Result<Vec<PatternMatch>, String> {
        let first_node = match pattern.elements.first() {
            Some(PatternElement::Node(np)) => np,
            Some(PatternElement::Edge(_)) => {
                return Err("Pattern must start with a node".to_string())
            }
            None => return Ok(Vec::new()),
        };

        let mut partials: Vec<(PatternMatch, NodeIndex)> = Vec::new();
        for idx in self.find_matching_nodes(first_node)? {
            let mut pm = PatternMatch::default();
            pm.bind(&first_node.variable, MatchBinding::Node(idx));
            partials.push((pm, idx));
        }

        let mut i = 1;
        while i < pattern.elements.len() {
            let edge_pattern = match &pattern.elements[i] {
                PatternElement::Edge(ep) => ep,
                PatternElement::Node(_) => return Err("Expected edge pattern".to_string()),
            };
            let node_pattern = match pattern.elements.get(i + 1) {
                Some(PatternElement::Node(np)) => np,
                _ => return Err("Edge pattern must be followed by node pattern".to_string()),
            };

            let mut next = Vec::new();
            for (current, source) in &partials {
                for (target, edge) in self.expand_from_node(*source, edge_pattern)? {
                    if current.used_edges.contains(&edge) {
                        continue;
                    }
                    if !self.node_matches(target, node_pattern)? {
                        continue;
                    }
                    // A variable seen earlier in the same pattern must bind to the same node
                    if let Some(var) = &node_pattern.variable {
                        if current.node(var).is_some_and(|bound| bound != target) {
                            continue;
                        }
                    }
                    let mut m = current.clone();
                    m.used_edges.push(edge);
                    let (src, dst) = match self.graph.graph.edge_endpoints(edge) {
                        Some(ends) => ends,
                        None => continue,
                    };
                    m.bind(
                        &edge_pattern.variable,
                        MatchBinding::Edge {
                            source: src,
                            target: dst,
                            edge,
                        },
                    );
                    m.bind(&node_pattern.variable, MatchBinding::Node(target));
                    next.push((m, target));
                }
            }
            partials = next;
            i += 2;
        }

        Ok(partials.into_iter().map(|(m, _)| m).collect())
    }

    /// Find all nodes matching a node pattern
    fn find_matching_nodes(&self, pattern: &NodePattern) -> Result<Vec<NodeIndex>, String> {
        if let Some(&bound) = pattern
            .variable
            .as_ref()
            .and_then(|v| self.pre_bindings.get(v))
        {
            return Ok(if self.node_matches(bound, pattern)? {
                vec![bound]
            } else {
                Vec::new()
            });
        }

        let candidates: Vec<NodeIndex> = if pattern.labels.is_empty() {
            self.graph.graph.node_indices().collect()
        } else {
            pattern
                .labels
                .iter()
                .flat_map(|label| self.graph.nodes_with_label(label).iter().copied())
                .collect()
        };

        let mut matched = Vec::with_capacity(candidates.len());
        for idx in candidates {
            if self.node_properties_match(idx, &pattern.properties)? {
                matched.push(idx);
            }
        }
        Ok(matched)
    }

    fn node_matches(&self, idx: NodeIndex, pattern: &NodePattern) -> Result<bool, String> {
        if let Some(&bound) = pattern
            .variable
            .as_ref()
            .and_then(|v| self.pre_bindings.get(v))
        {
            if bound != idx {
                return Ok(false);
            }
        }
        let node = match self.graph.node(idx) {
            Some(node) => node,
            None => return Ok(false),
        };
        if !pattern.labels.is_empty() && !pattern.labels.iter().any(|l| *l == node.label) {
            return Ok(false);
        }
        self.node_properties_match(idx, &pattern.properties)
    }

    fn node_properties_match(
        &self,
        idx: NodeIndex,
        props: &[(String, PropertyMatcher)],
    ) -> Result<bool, String> {
        let node = match self.graph.node(idx) {
            Some(node) => node,
            None => return Ok(false),
        };
        for (key, matcher) in props {
            if !self.value_matches(&node.get(key), matcher)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn value_matches(&self, value: &Value, matcher: &PropertyMatcher) -> Result<bool, String> {
        let expected = match matcher {
            PropertyMatcher::Equals(v) => v,
            PropertyMatcher::Parameter(name) => self
                .params
                .get(name)
                .ok_or_else(|| format!("Missing parameter: ${}", name))?,
        };
        Ok(!value.is_null() && values_equal(value, expected))
    }

    /// Edges leaving `source` that satisfy the edge pattern, with the node on the far side.
    fn expand_from_node(
        &self,
        source: NodeIndex,
        edge_pattern: &EdgePattern,
    ) -> Result<Vec<(NodeIndex, EdgeIndex)>, String> {
        let directions: &[Direction] = match edge_pattern.direction {
            EdgeDirection::Outgoing => &[Direction::Outgoing],
            EdgeDirection::Incoming => &[Direction::Incoming],
            EdgeDirection::Both => &[Direction::Outgoing, Direction::Incoming],
        };

        let mut results = Vec::new();
        for &direction in directions {
            // petgraph yields newest edges first; reverse to keep insertion order
            let mut edges: Vec<_> = self.graph.graph.edges_directed(source, direction).collect();
            edges.reverse();
            for edge in edges {
                let data = edge.weight();
                if !edge_pattern.rel_types.is_empty()
                    && !edge_pattern.rel_types.iter().any(|t| *t == data.label)
                {
                    continue;
                }
                let mut props_ok = true;
                for (key, matcher) in &edge_pattern.properties {
                    if !self.value_matches(&data.get(key), matcher)? {
                        props_ok = false;
                        break;
                    }
                }
                if !props_ok {
                    continue;
                }
                let target = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                results.push((target, edge.id()));
            }
        }
        Ok(results)
    }
}

// ============================================================================
// Tests
// ============================================================================
