// src/tools.rs
//
// Helpers for exposing the metric graph to a tool-calling client: the
// metadata query tool, its advertised description, and query cleanup.

use crate::error::QueryError;
use crate::graph::{GraphStore, Params};
use crate::introspection::SchemaDescription;
use serde_json::json;
use tracing::debug;

pub const METADATA_TOOL_NAME: &str = "metric_metadata_query";

/// Clean up query text written by a client: literal `\n` escapes become
/// newlines, surrounding whitespace and a trailing `;` are removed.
pub fn normalize_cypher(text: &str) -> String {
    let text = text.replace("\\n", "\n");
    let trimmed = text.trim();
    trimmed
        .strip_suffix(';')
        .unwrap_or(trimmed)
        .trim_end()
        .to_string()
}

/// Run a client-written metadata query. Only `MATCH` queries are accepted.
/// Rows come back as JSON objects keyed by column alias.
pub fn metadata_query<S: GraphStore + ?Sized>(
    store: &S,
    text: &str,
) -> Result<Vec<serde_json::Value>, QueryError> {
    let query = normalize_cypher(text);
    let is_match = query
        .get(..5)
        .is_some_and(|head| head.eq_ignore_ascii_case("MATCH"));
    if !is_match {
        return Err(QueryError::new(query, "Write a MATCH query."));
    }

    let rows = store.execute(&query, &Params::new())?;
    debug!(rows = rows.len(), "metadata query answered");
    Ok(rows.iter().map(|row| row.to_json()).collect())
}

/// Description advertised for the metadata query tool.
pub fn tool_description(schema: &SchemaDescription) -> String {
    format!(
        "### Metric metadata\n\
         Use this tool to query the metric graph for the metrics (Metric) a \
         request needs, together with their dimensions and data sources.\n\
         Return rows shaped like:\n\
         [{{\"m\": {{\"_label\": \"Metric\"}}, \"d\": {{\"_label\": \"Dimension\"}}, \"ds\": {{\"_label\": \"DataSource\"}}}}, ...]\n\
         Notes:\n\
         - Fetch every related Dimension and DataSource; do not filter them.\n\
         - A Dimension with required = true must appear as a condition in the generated query.\n\
         \n\
         {}",
        schema.render_text()
    )
}

/// JSON schema of the tool's single argument.
pub fn tool_input_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "cypher": {"type": "string", "description": "Cypher query"}
        },
        "required": ["cypher"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::values::{DataType, Value};
    use crate::graph::schema::{DirGraph, PropertyDef, PropertyType};
    use crate::graph::Connection;
    use crate::introspection::LabelSchema;

    fn store() -> Connection {
        let mut g = DirGraph::new();
        g.define_node_table(
            "Metric",
            "id",
            vec![
                PropertyDef::new("id", PropertyType::scalar(DataType::String)),
                PropertyDef::new("alias", PropertyType::scalar(DataType::String)),
            ],
        )
        .unwrap();
        g.add_node(
            "Metric",
            [("id", Value::from("m1")), ("alias", Value::from("Revenue"))],
        )
        .unwrap();
        Connection::in_memory(g)
    }

    #[test]
    fn test_normalize_cypher() {
        assert_eq!(
            normalize_cypher("  MATCH (m:Metric)\\nRETURN m;  "),
            "MATCH (m:Metric)\nRETURN m"
        );
        assert_eq!(normalize_cypher("MATCH (n) RETURN n"), "MATCH (n) RETURN n");
        assert_eq!(normalize_cypher("RETURN 1 ;\n"), "RETURN 1");
    }

    #[test]
    fn test_metadata_query_returns_json_rows() {
        let rows = metadata_query(
            &store(),
            "match (m:Metric) WHERE m.alias = 'Revenue'\\nRETURN m.id AS id, m;",
        )
        .unwrap();
        assert_eq!(
            rows,
            vec![json!({"id": "m1", "m": {"_label": "Metric", "id": "m1", "alias": "Revenue"}})]
        );
    }

    #[test]
    fn test_metadata_query_rejects_non_match() {
        let err = metadata_query(&store(), "CALL show_tables() RETURN *").unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.cause, "Write a MATCH query.");
        assert!(metadata_query(&store(), "MAT").is_err());
    }

    #[test]
    fn test_metadata_query_surfaces_query_errors() {
        let err = metadata_query(&store(), "MATCH (x:Metric RETURN x;").unwrap_err();
        assert_eq!(err.query, "MATCH (x:Metric RETURN x");
    }

    #[test]
    fn test_tool_description_embeds_schema() {
        let schema = SchemaDescription {
            node_schemas: vec![LabelSchema {
                label: "Metric".into(),
                properties: vec![("id".into(), "STRING".into())],
            }],
            relationship_schemas: vec![],
            relationship_patterns: vec!["(:Metric)-[:FROM_TABLE]->(:DataSource)".into()],
        };
        let text = tool_description(&schema);
        assert!(text.starts_with("### Metric metadata"));
        assert!(text.contains("required = true"));
        assert!(text.contains("(:Metric)-[:FROM_TABLE]->(:DataSource)"));
        assert_eq!(tool_input_schema()["required"], json!(["cypher"]));
    }
}
