// tests/resolution.rs
use metric_graph::datatypes::DataType;
use metric_graph::graph::schema::{PropertyDef, PropertyType};
use metric_graph::{
    Connection, CyclePolicy, DirGraph, IntrospectorConfig, LockedStore, MetricResolver,
    ResolveError, ResolverConfig, SchemaIntrospector, Value,
};
use std::sync::Arc;

fn empty_store() -> DirGraph {
    let s = || PropertyType::scalar(DataType::String);
    let mut g = DirGraph::new();
    g.define_node_table(
        "Metric",
        "id",
        vec![
            PropertyDef::new("id", s()),
            PropertyDef::new("alias", s()),
            PropertyDef::new("dependent_metrics", PropertyType::list(DataType::String)),
            PropertyDef::new("tags", PropertyType::list(DataType::String)),
        ],
    )
    .unwrap();
    g.define_node_table(
        "Dimension",
        "id",
        vec![
            PropertyDef::new("id", s()),
            PropertyDef::new("name", s()),
            PropertyDef::new("required", PropertyType::scalar(DataType::Bool)),
        ],
    )
    .unwrap();
    g.define_node_table(
        "DataSource",
        "table_name",
        vec![
            PropertyDef::new("table_name", s()),
            PropertyDef::new("description", s()),
        ],
    )
    .unwrap();
    g.define_rel_table("USES_DIMENSION", "Metric", "Dimension", vec![])
        .unwrap();
    g.define_rel_table("FROM_TABLE", "Metric", "DataSource", vec![])
        .unwrap();

    for (id, name, required) in [
        ("dim_region", "Region", true),
        ("dim_month", "Month", false),
        ("dim_branch", "BranchType", false),
        ("dim_product", "Product", false),
    ] {
        g.add_node(
            "Dimension",
            [
                ("id", Value::from(id)),
                ("name", Value::from(name)),
                ("required", Value::from(required)),
            ],
        )
        .unwrap();
    }
    for (table, description) in [
        ("fact_revenue", "monthly revenue by branch"),
        ("fact_cost", "cost ledger"),
    ] {
        g.add_node(
            "DataSource",
            [
                ("table_name", Value::from(table)),
                ("description", Value::from(description)),
            ],
        )
        .unwrap();
    }
    g
}

fn metric(g: &mut DirGraph, id: &str, alias: &str, deps: &[&str], dims: &[&str], table: &str) {
    g.add_node(
        "Metric",
        [
            ("id", Value::from(id)),
            ("alias", Value::from(alias)),
            ("dependent_metrics", Value::from(deps.to_vec())),
        ],
    )
    .unwrap();
    for dim in dims {
        g.add_edge("USES_DIMENSION", id, *dim, Vec::<(String, Value)>::new())
            .unwrap();
    }
    g.add_edge("FROM_TABLE", id, table, Vec::<(String, Value)>::new())
        .unwrap();
}

fn resolver_for(g: DirGraph) -> MetricResolver<Connection> {
    MetricResolver::new(Arc::new(Connection::in_memory(g)), ResolverConfig::default())
}

#[test]
fn test_scenario_narrowest_metric_wins() {
    let mut g = empty_store();
    metric(
        &mut g,
        "revenue_by_branch",
        "Revenue",
        &[],
        &["dim_region", "dim_month", "dim_branch"],
        "fact_revenue",
    );
    metric(
        &mut g,
        "revenue",
        "Revenue",
        &[],
        &["dim_region", "dim_month"],
        "fact_revenue",
    );

    let result = resolver_for(g).resolve(&["Revenue"], &["Region", "Month"]).unwrap();
    assert_eq!(result.metric_ids(), vec!["revenue"]);
    assert_eq!(
        result.dimensions.keys().collect::<Vec<_>>(),
        vec!["dim_region", "dim_month"]
    );
    assert!(result.dimensions.get("dim_region").unwrap().required);
}

#[test]
fn test_scenario_dependent_metric_is_merged() {
    let mut g = empty_store();
    metric(&mut g, "cost_base", "CostBase", &[], &["dim_region", "dim_product"], "fact_cost");
    metric(&mut g, "revenue", "Revenue", &["cost_base"], &["dim_region"], "fact_revenue");

    let result = resolver_for(g).resolve(&["Revenue"], &["Region"]).unwrap();
    assert_eq!(result.metric_ids(), vec!["cost_base", "revenue"]);
    assert!(result.dimensions.contains_key("dim_product"));
    assert_eq!(
        result.data_sources.keys().collect::<Vec<_>>(),
        vec!["fact_cost", "fact_revenue"]
    );

    let payload = result.to_payload();
    assert_eq!(payload["m"][1]["dependent_metrics"][0], "cost_base");
    assert_eq!(payload["ds"][0]["description"], "cost ledger");
    assert_eq!(payload["d"][0]["_label"], "Dimension");
}

#[test]
fn test_scenario_introspection_patterns_and_list_types() {
    let introspector = SchemaIntrospector::new(
        Arc::new(Connection::in_memory(empty_store())),
        IntrospectorConfig::default(),
    )
    .unwrap();
    let schema = introspector.schema();

    assert!(schema
        .relationship_patterns
        .contains(&"(:Metric)-[:USES_DIMENSION]->(:Dimension)".to_string()));
    let metric = schema
        .node_schemas
        .iter()
        .find(|s| s.label == "Metric")
        .unwrap();
    assert!(metric
        .properties
        .contains(&("tags".to_string(), "STRING[]".to_string())));
    assert!(metric
        .properties
        .contains(&("id".to_string(), "STRING".to_string())));

    // Reading twice without a refresh gives identical output
    assert_eq!(introspector.schema_text(), introspector.schema_text());
}

#[test]
fn test_no_exact_coverage_yields_empty_result() {
    let mut g = empty_store();
    metric(&mut g, "revenue", "Revenue", &[], &["dim_region"], "fact_revenue");

    let result = resolver_for(g)
        .resolve(&["Revenue"], &["Region", "Product"])
        .unwrap();
    assert!(result.metrics.is_empty());
    assert!(result.dimensions.is_empty());
    assert!(result.data_sources.is_empty());
}

#[test]
fn test_kept_metrics_never_exceed_minimum() {
    let mut g = empty_store();
    metric(&mut g, "r4", "Revenue", &[], &["dim_region", "dim_month", "dim_branch", "dim_product"], "fact_revenue");
    metric(&mut g, "r3", "Revenue", &[], &["dim_region", "dim_month", "dim_branch"], "fact_revenue");
    metric(&mut g, "r2a", "Revenue", &[], &["dim_region", "dim_month"], "fact_revenue");
    metric(&mut g, "r2b", "Revenue", &[], &["dim_month", "dim_region"], "fact_cost");
    let resolver = resolver_for(g);

    let result = resolver.resolve(&["Revenue"], &["Month"]).unwrap();
    assert_eq!(result.metric_ids(), vec!["r2a", "r2b"]);

    let result = resolver.resolve(&["Revenue"], &["Branchtype"]).unwrap();
    assert!(result.is_empty());

    let result = resolver.resolve(&["Revenue"], &["BranchType"]).unwrap();
    assert_eq!(result.metric_ids(), vec!["r3"]);
}

#[test]
fn test_shared_table_is_listed_once() {
    let mut g = empty_store();
    metric(&mut g, "gross", "Gross", &[], &["dim_month"], "fact_revenue");
    metric(&mut g, "net", "Net", &[], &["dim_month"], "fact_revenue");

    let result = resolver_for(g).resolve(&["Gross", "Net"], &["Month"]).unwrap();
    assert_eq!(result.metric_ids(), vec!["gross", "net"]);
    assert_eq!(result.data_sources.len(), 1);
    assert_eq!(
        result.data_sources.get("fact_revenue").unwrap().properties["description"],
        Value::from("monthly revenue by branch")
    );
}

#[test]
fn test_mutual_dependency_terminates() {
    let mut g = empty_store();
    metric(&mut g, "A", "A", &["B"], &["dim_region"], "fact_revenue");
    metric(&mut g, "B", "B", &["A"], &["dim_region"], "fact_cost");
    let store = Arc::new(Connection::in_memory(g));

    let failing = MetricResolver::new(Arc::clone(&store), ResolverConfig::default());
    match failing.resolve(&["A"], &["Region"]) {
        Err(ResolveError::DependencyCycle { cycle }) => assert_eq!(cycle, vec!["A", "B", "A"]),
        other => panic!("expected a dependency cycle, got {other:?}"),
    }

    let skipping = MetricResolver::new(
        store,
        ResolverConfig {
            cycle_policy: CyclePolicy::Skip,
            ..ResolverConfig::default()
        },
    );
    let result = skipping.resolve(&["A", "B"], &["Region"]).unwrap();
    assert_eq!(result.metric_ids(), vec!["B", "A"]);
}

#[test]
fn test_three_way_cycle_skips_back_edges() {
    let mut g = empty_store();
    metric(&mut g, "A", "A", &["B"], &["dim_region"], "fact_revenue");
    metric(&mut g, "B", "B", &["C", "A"], &["dim_region"], "fact_revenue");
    metric(&mut g, "C", "C", &["A", "B"], &["dim_region"], "fact_cost");
    let resolver = MetricResolver::new(
        Arc::new(Connection::in_memory(g)),
        ResolverConfig {
            cycle_policy: CyclePolicy::Skip,
            ..ResolverConfig::default()
        },
    );

    let result = resolver.resolve(&["A"], &["Region"]).unwrap();
    assert_eq!(result.metric_ids(), vec!["C", "B", "A"]);
    assert_eq!(result.data_sources.len(), 2);
}

#[test]
fn test_resolve_against_saved_store() {
    let mut g = empty_store();
    metric(&mut g, "cost_base", "CostBase", &[], &["dim_region"], "fact_cost");
    metric(&mut g, "revenue", "Revenue", &["cost_base"], &["dim_region", "dim_month"], "fact_revenue");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.mgf");
    Connection::in_memory(g).save(&path).unwrap();

    let conn = Arc::new(Connection::open(&path).unwrap());
    let result = MetricResolver::new(conn, ResolverConfig::default())
        .resolve(&["Revenue"], &["Month"])
        .unwrap();
    assert_eq!(result.metric_ids(), vec!["cost_base", "revenue"]);

    let introspector = SchemaIntrospector::open(&path, IntrospectorConfig::default()).unwrap();
    assert_eq!(introspector.schema().relationship_patterns.len(), 2);
}

#[test]
fn test_concurrent_resolutions_share_one_store() {
    let mut g = empty_store();
    metric(&mut g, "revenue", "Revenue", &[], &["dim_region", "dim_month"], "fact_revenue");
    let store = Arc::new(LockedStore::new(Connection::in_memory(g)));
    let resolver = Arc::new(MetricResolver::new(store, ResolverConfig::default()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            std::thread::spawn(move || resolver.resolve(&["Revenue"], &["Region"]).unwrap())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().metric_ids(), vec!["revenue"]);
    }
}
