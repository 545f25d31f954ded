use sqlineage::{
    dialect::Dialect,
    lineage::{TransformationSubtype, parse_sql_lineage},
    store::{MemoryStore, NodeType, SqliteStore, StoreError, ingest_lineage_result},
    traversal::{
        Direction, ImpactAnalyzer, LookupFailure, NO_DOWNSTREAM_MESSAGE, NO_UPSTREAM_MESSAGE,
        TraversalError,
    },
};

const NAMESPACE: &str = "warehouse";

fn ingest_all(store: &MemoryStore, sqls: &[&str]) {
    for sql in sqls {
        let result = parse_sql_lineage(sql, Dialect::Redshift, None);
        assert!(result.is_ok(), "{}: {:?}", sql, result.parse_errors);
        ingest_lineage_result(store, &result, NAMESPACE, None).unwrap();
    }
}

fn chain_store() -> MemoryStore {
    let store = MemoryStore::new();
    ingest_all(
        &store,
        &[
            "INSERT INTO stage.orders SELECT amount FROM raw.orders",
            "INSERT INTO mart.orders SELECT SUM(amount) AS amount FROM stage.orders",
            "INSERT INTO report.orders SELECT amount FROM mart.orders",
        ],
    );
    store
}

#[test]
fn test_lookup_reports_missing_dataset() {
    let store = MemoryStore::new();
    let analyzer = ImpactAnalyzer::new(&store);
    let err = analyzer
        .find_column_by_name(NAMESPACE, "sales.orders", "amount")
        .unwrap_err();
    assert!(matches!(
        err,
        TraversalError::NotFound(LookupFailure::DatasetNotFound { .. })
    ));
    assert_eq!(
        err.to_string(),
        "Dataset 'sales.orders' not found in namespace 'warehouse'"
    );
}

#[test]
fn test_lookup_reports_missing_column() {
    let store = chain_store();
    let analyzer = ImpactAnalyzer::new(&store);
    let err = analyzer
        .find_column_by_name(NAMESPACE, "raw.orders", "discount")
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Column 'discount' not found in table 'raw.orders'"
    );
    // Namespaces are part of the identity
    assert!(
        analyzer
            .find_column_by_name("other", "raw.orders", "amount")
            .is_err()
    );
}

#[test]
fn test_unknown_root_is_a_store_error() {
    let store = MemoryStore::new();
    let result = ImpactAnalyzer::new(&store).downstream("missing", 10);
    assert!(matches!(
        result,
        Err(TraversalError::Store(StoreError::NodeNotFound(_)))
    ));
}

#[test]
fn test_downstream_reports_minimum_depth() {
    let store = MemoryStore::new();
    ingest_all(
        &store,
        &[
            "INSERT INTO b SELECT x FROM a",
            "INSERT INTO c SELECT x FROM b",
            "INSERT INTO c SELECT x FROM a",
        ],
    );
    let analyzer = ImpactAnalyzer::new(&store);
    let root = analyzer.find_column_by_name(NAMESPACE, "a", "x").unwrap();
    let c = analyzer.find_column_by_name(NAMESPACE, "c", "x").unwrap();

    let impact = analyzer.downstream(&root.id, 10).unwrap();
    assert_eq!(impact.analysis_type, Direction::Downstream);
    assert_eq!(impact.total_count, 2);
    assert_eq!(impact.max_depth_reached, 1);
    assert!(impact.message.is_none());
    let reached_c: Vec<_> = impact
        .affected_nodes
        .iter()
        .filter(|node| node.id == c.id)
        .collect();
    assert_eq!(reached_c.len(), 1);
    assert_eq!(reached_c[0].depth, 1);
}

#[test]
fn test_depth_is_bounded_and_monotonic() {
    let store = chain_store();
    let analyzer = ImpactAnalyzer::new(&store);
    let root = analyzer
        .find_column_by_name(NAMESPACE, "raw.orders", "amount")
        .unwrap();

    let full = analyzer.downstream(&root.id, 10).unwrap();
    assert_eq!(full.total_count, 3);
    assert_eq!(full.max_depth_reached, 3);
    let depths: Vec<usize> = full.affected_nodes.iter().map(|n| n.depth).collect();
    assert_eq!(depths, vec![1, 2, 3]);
    assert!(full.affected_nodes.iter().all(|n| n.node_type == NodeType::Column));
    assert!(full.affected_nodes.iter().all(|n| n.name == "amount"));

    let bounded = analyzer.downstream(&root.id, 2).unwrap();
    assert_eq!(bounded.total_count, 2);
    assert_eq!(bounded.max_depth_reached, 2);

    let none = analyzer.downstream(&root.id, 0).unwrap();
    assert!(none.affected_nodes.is_empty());
    assert_eq!(none.total_count, 0);
    assert_eq!(none.max_depth_reached, 0);
    assert_eq!(none.message.as_deref(), Some(NO_DOWNSTREAM_MESSAGE));
}

#[test]
fn test_upstream_follows_incoming_edges() {
    let store = chain_store();
    let analyzer = ImpactAnalyzer::new(&store);
    let report = analyzer
        .find_column_by_name(NAMESPACE, "report.orders", "amount")
        .unwrap();
    let mart = analyzer
        .find_column_by_name(NAMESPACE, "mart.orders", "amount")
        .unwrap();

    let lineage = analyzer.upstream(&report.id, 10).unwrap();
    assert_eq!(lineage.analysis_type, Direction::Upstream);
    assert_eq!(lineage.total_count, 3);
    assert_eq!(lineage.affected_nodes[0].id, mart.id);
    assert_eq!(
        lineage.affected_nodes[0].transformation_subtype,
        TransformationSubtype::Identity
    );
    // stage.orders.amount is reached through the aggregating edge
    assert_eq!(
        lineage.affected_nodes[1].transformation_subtype,
        TransformationSubtype::Aggregation
    );

    let raw = analyzer
        .find_column_by_name(NAMESPACE, "raw.orders", "amount")
        .unwrap();
    let root_source = analyzer.upstream(&raw.id, 10).unwrap();
    assert!(root_source.affected_nodes.is_empty());
    assert_eq!(root_source.message.as_deref(), Some(NO_UPSTREAM_MESSAGE));
}

#[test]
fn test_traversal_on_sqlite_store() {
    let store = SqliteStore::open_in_memory().unwrap();
    for sql in [
        "INSERT INTO stage.orders SELECT amount FROM raw.orders",
        "INSERT INTO mart.orders SELECT amount FROM stage.orders",
    ] {
        let result = parse_sql_lineage(sql, Dialect::Redshift, None);
        ingest_lineage_result(&store, &result, NAMESPACE, None).unwrap();
    }
    let analyzer = ImpactAnalyzer::new(&store);
    let root = analyzer
        .find_column_by_name(NAMESPACE, "raw.orders", "amount")
        .unwrap();
    let impact = analyzer.downstream(&root.id, 10).unwrap();
    assert_eq!(impact.root_node.id, root.id);
    let depths: Vec<usize> = impact.affected_nodes.iter().map(|n| n.depth).collect();
    assert_eq!(depths, vec![1, 2]);
}

#[test]
fn test_impact_serialization() {
    let store = chain_store();
    let analyzer = ImpactAnalyzer::new(&store);
    let root = analyzer
        .find_column_by_name(NAMESPACE, "raw.orders", "amount")
        .unwrap();
    let json = serde_json::to_value(analyzer.downstream(&root.id, 1).unwrap()).unwrap();
    assert_eq!(json["analysis_type"], "downstream");
    assert_eq!(json["total_count"], 1);
    assert_eq!(json["affected_nodes"][0]["depth"], 1);
    assert!(json.get("message").is_none());
}
