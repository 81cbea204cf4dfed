// src/graph/cypher/mod.rs
// Cypher query subset for the embedded metric graph store
//
// Architecture:
//   Query String -> Tokenizer -> Parser -> AST -> Executor -> Result
//
// Patterns are parsed by the Cypher parser into pattern_matching types and
// matched by the PatternExecutor; everything else runs in the clause pipeline.

pub mod ast;
pub mod executor;
pub mod parser;
pub mod result;
pub mod tokenizer;

pub use executor::CypherExecutor;
pub use parser::parse_cypher;
pub use result::{CypherResult, Row};

use crate::datatypes::values::Value;
use crate::graph::pattern_matching::{Pattern, PatternElement};
use crate::graph::schema::DirGraph;
use std::collections::HashMap;

use ast::*;

/// Parse and execute a query against the graph.
pub fn execute_query(
    graph: &DirGraph,
    query: &str,
    params: &HashMap<String, Value>,
) -> Result<CypherResult, String> {
    let parsed = parse_cypher(query)?;
    CypherExecutor::with_params(graph, params).execute(&parsed)
}

/// Parse a query and check it against the catalog without running it.
/// Returns one plan line per clause.
pub fn explain_query(
    graph: &DirGraph,
    query: &str,
    params: &HashMap<String, Value>,
) -> Result<Vec<String>, String> {
    let parsed = parse_cypher(query)?;
    let catalog = graph.catalog();

    let mut labels = Vec::new();
    let mut rel_types = Vec::new();
    let mut parameters = Vec::new();
    for clause in &parsed.clauses {
        collect_clause_names(clause, &mut labels, &mut rel_types, &mut parameters);
    }

    for label in &labels {
        if catalog.node_table(label).is_none() {
            return Err(format!("Table {} does not exist.", label));
        }
    }
    for rel in &rel_types {
        if catalog.rel_table(rel).is_none() {
            return Err(format!("Table {} does not exist.", rel));
        }
    }
    for name in &parameters {
        if !params.contains_key(name) {
            return Err(format!("Missing parameter: ${}", name));
        }
    }

    let mut lines = Vec::with_capacity(parsed.clauses.len());
    for (i, clause) in parsed.clauses.iter().enumerate() {
        let desc = match clause {
            Clause::Match(m) => format!("NodeScan (MATCH) {}", describe_patterns(&m.patterns)),
            Clause::OptionalMatch(m) => format!(
                "OptionalExpand (OPTIONAL MATCH) {}",
                describe_patterns(&m.patterns)
            ),
            Clause::Where(_) => "Filter (WHERE)".to_string(),
            Clause::Return(r) if r.star => "Projection (RETURN *)".to_string(),
            Clause::Return(r) => format!("Projection (RETURN) {} item(s)", r.items.len()),
            Clause::With(w) => format!("Projection (WITH) {} item(s)", w.items.len()),
            Clause::OrderBy(_) => "Sort (ORDER BY)".to_string(),
            Clause::Skip(_) => "Skip (SKIP)".to_string(),
            Clause::Limit(_) => "Limit (LIMIT)".to_string(),
            Clause::Unwind(u) => format!("Unwind (UNWIND) AS {}", u.alias),
            Clause::Call(c) => format!("Procedure (CALL) {}", c.procedure),
        };
        lines.push(format!("{}. {}", i + 1, desc));
    }
    Ok(lines)
}

fn describe_patterns(patterns: &[Pattern]) -> String {
    let mut labels = Vec::new();
    for pattern in patterns {
        for element in &pattern.elements {
            if let PatternElement::Node(np) = element {
                for label in &np.labels {
                    if !labels.contains(label) {
                        labels.push(label.clone());
                    }
                }
            }
        }
    }
    if labels.is_empty() {
        "(all nodes)".to_string()
    } else {
        format!(":{}", labels.join(", :"))
    }
}

// ============================================================================
// Name collection for explain
// ============================================================================

fn collect_pattern_names(
    patterns: &[Pattern],
    labels: &mut Vec<String>,
    rel_types: &mut Vec<String>,
    parameters: &mut Vec<String>,
) {
    use crate::graph::pattern_matching::PropertyMatcher;
    for pattern in patterns {
        for element in &pattern.elements {
            let (names, props, sink) = match element {
                PatternElement::Node(np) => (&np.labels, &np.properties, &mut *labels),
                PatternElement::Edge(ep) => (&ep.rel_types, &ep.properties, &mut *rel_types),
            };
            sink.extend(names.iter().cloned());
            for (_, matcher) in props {
                if let PropertyMatcher::Parameter(name) = matcher {
                    parameters.push(name.clone());
                }
            }
        }
    }
}

fn collect_clause_names(
    clause: &Clause,
    labels: &mut Vec<String>,
    rel_types: &mut Vec<String>,
    parameters: &mut Vec<String>,
) {
    let mut exprs: Vec<&Expression> = Vec::new();
    let mut preds: Vec<&Predicate> = Vec::new();
    match clause {
        Clause::Match(m) | Clause::OptionalMatch(m) => {
            collect_pattern_names(&m.patterns, labels, rel_types, parameters)
        }
        Clause::Where(w) => preds.push(&w.predicate),
        Clause::Return(r) => exprs.extend(r.items.iter().map(|i| &i.expression)),
        Clause::With(w) => {
            exprs.extend(w.items.iter().map(|i| &i.expression));
            if let Some(wc) = &w.where_clause {
                preds.push(&wc.predicate);
            }
        }
        Clause::OrderBy(o) => exprs.extend(o.items.iter().map(|i| &i.expression)),
        Clause::Skip(s) => exprs.push(&s.count),
        Clause::Limit(l) => exprs.push(&l.count),
        Clause::Unwind(u) => exprs.push(&u.expression),
        Clause::Call(c) => exprs.extend(c.args.iter()),
    }

    // Walk expressions and predicates with an explicit stack
    while !exprs.is_empty() || !preds.is_empty() {
        if let Some(pred) = preds.pop() {
            match pred {
                Predicate::Comparison { left, right, .. } => {
                    exprs.push(left);
                    exprs.push(right);
                }
                Predicate::And(l, r) | Predicate::Or(l, r) => {
                    preds.push(l);
                    preds.push(r);
                }
                Predicate::Not(inner) => preds.push(inner),
                Predicate::IsNull(e) | Predicate::IsNotNull(e) => exprs.push(e),
                Predicate::In { expr, list } => {
                    exprs.push(expr);
                    exprs.push(list);
                }
                Predicate::StartsWith { expr, pattern }
                | Predicate::EndsWith { expr, pattern }
                | Predicate::Contains { expr, pattern } => {
                    exprs.push(expr);
                    exprs.push(pattern);
                }
            }
            continue;
        }
        let Some(expr) = exprs.pop() else { break };
        match expr {
            Expression::Parameter(name) => parameters.push(name.clone()),
            Expression::FunctionCall { args, .. } => exprs.extend(args.iter()),
            Expression::ListLiteral(items) => exprs.extend(items.iter()),
            Expression::Add(l, r)
            | Expression::Subtract(l, r)
            | Expression::Multiply(l, r)
            | Expression::Divide(l, r) => {
                exprs.push(l);
                exprs.push(r);
            }
            Expression::Negate(inner) => exprs.push(inner),
            Expression::Case {
                operand,
                when_clauses,
                else_expr,
            } => {
                if let Some(op) = operand {
                    exprs.push(op);
                }
                for (cond, result) in when_clauses {
                    match cond {
                        CaseCondition::Expression(e) => exprs.push(e),
                        CaseCondition::Predicate(p) => preds.push(p),
                    }
                    exprs.push(result);
                }
                if let Some(e) = else_expr {
                    exprs.push(e);
                }
            }
            Expression::CountSubquery(sub) => {
                collect_pattern_names(&sub.patterns, labels, rel_types, parameters);
                if let Some(p) = &sub.where_clause {
                    preds.push(p);
                }
            }
            Expression::PropertyAccess { .. }
            | Expression::Variable(_)
            | Expression::Literal(_)
            | Expression::Star => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::values::DataType;
    use crate::graph::schema::{PropertyDef, PropertyType};

    fn small_graph() -> DirGraph {
        let mut g = DirGraph::new();
        let id = || vec![PropertyDef::new("id", PropertyType::scalar(DataType::String))];
        g.define_node_table("Metric", "id", id()).unwrap();
        g.define_node_table("DataSource", "id", id()).unwrap();
        g.define_rel_table("FROM_TABLE", "Metric", "DataSource", vec![])
            .unwrap();
        g.add_node("Metric", [("id", Value::from("m1"))]).unwrap();
        g
    }

    #[test]
    fn test_execute_query_roundtrip() {
        let g = small_graph();
        let result = execute_query(&g, "MATCH (m:Metric) RETURN m.id AS id", &HashMap::new())
            .unwrap();
        assert_eq!(result.rows, vec![vec![Value::from("m1")]]);
    }

    #[test]
    fn test_explain_checks_tables_and_parameters() {
        let g = small_graph();
        let mut params = HashMap::new();
        params.insert("metric_id".to_string(), Value::from("m1"));

        let plan = explain_query(
            &g,
            "MATCH (m:Metric)-[:FROM_TABLE]->(ds:DataSource) WHERE m.id = $metric_id RETURN ds",
            &params,
        )
        .unwrap();
        assert_eq!(plan.len(), 3);
        assert!(plan[0].contains(":Metric, :DataSource"));

        let err = explain_query(&g, "MATCH (x:Missing) RETURN x", &params).unwrap_err();
        assert_eq!(err, "Table Missing does not exist.");

        let err = explain_query(
            &g,
            "MATCH (m:Metric) WHERE COUNT { MATCH (m)-[:FROM_TABLE]->(:DataSource) } = $n RETURN m",
            &params,
        )
        .unwrap_err();
        assert_eq!(err, "Missing parameter: $n");
    }
}
