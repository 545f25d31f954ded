use sqlineage::{
    dialect::Dialect,
    lineage::{TransformationSubtype, TransformationType, parse_sql_lineage},
    openlineage::{EventType, JOB_NAMESPACE, RunEvent, build_run_event, validate_event},
    store::{LineageStore, MemoryStore, NodeKey, ingest_openlineage_event},
    traversal::ImpactAnalyzer,
};

fn column_lineage_event() -> RunEvent {
    serde_json::from_value(serde_json::json!({
        "eventType": "COMPLETE",
        "eventTime": "2024-05-01T10:00:00.000Z",
        "producer": "https://example.com/producer",
        "schemaURL": "https://openlineage.io/spec/1-0-5/OpenLineage.json",
        "run": { "runId": "0190a5c4-1111-7000-8000-000000000001" },
        "job": { "namespace": "etl", "name": "daily_totals" },
        "inputs": [{ "namespace": "warehouse", "name": "sales.orders" }],
        "outputs": [{
            "namespace": "warehouse",
            "name": "mart.customer_totals",
            "facets": {
                "schema": { "fields": [{ "name": "total", "type": "decimal" }] },
                "columnLineage": {
                    "_producer": "https://example.com/producer",
                    "fields": {
                        "customer_id": {
                            "inputFields": [{
                                "namespace": "warehouse",
                                "name": "sales.orders",
                                "field": "customer_id",
                                "transformations": [{ "type": "DIRECT", "subtype": "IDENTITY" }]
                            }]
                        },
                        "total": {
                            "inputFields": [{
                                "namespace": "warehouse",
                                "name": "sales.orders",
                                "field": "amount",
                                "transformations": [{
                                    "type": "DIRECT",
                                    "subtype": "AGGREGATION",
                                    "description": "SUM(amount)"
                                }]
                            }]
                        }
                    }
                }
            }
        }]
    }))
    .expect("Cannot parse event")
}

#[test]
fn test_validation_collects_all_problems() {
    let event: RunEvent = serde_json::from_value(serde_json::json!({
        "eventType": "FINISHED",
        "run": {},
        "job": { "namespace": "etl" }
    }))
    .unwrap();
    let err = validate_event(&event).unwrap_err();
    assert_eq!(err.problems.len(), 5);
    assert!(err.problems.iter().any(|p| p.contains("FINISHED")));
    for field in ["eventTime", "producer", "run.runId", "job.name"] {
        assert!(
            err.problems
                .iter()
                .any(|p| p == &format!("Missing required field: {}", field)),
            "{}",
            field
        );
    }

    let store = MemoryStore::new();
    assert!(ingest_openlineage_event(&store, &event).is_err());
    assert_eq!(store.node_count().unwrap(), 0);
}

#[test]
fn test_valid_event_header() {
    let header = validate_event(&column_lineage_event()).unwrap();
    assert_eq!(header.event_type, EventType::Complete);
    assert_eq!(header.job_namespace, "etl");
    assert_eq!(header.job_name, "daily_totals");
}

#[test]
fn test_event_without_column_lineage_is_a_no_op() {
    let mut event = column_lineage_event();
    event.outputs[0].facets.column_lineage = None;
    assert!(!event.has_column_lineage());

    let store = MemoryStore::new();
    let counts = ingest_openlineage_event(&store, &event).unwrap();
    assert_eq!(counts.datasets_created, 0);
    assert_eq!(counts.columns_created, 0);
    assert_eq!(counts.edges_created, 0);
    // Only the job node
    assert_eq!(store.node_count().unwrap(), 1);
    assert_eq!(store.edge_count().unwrap(), 0);
}

#[test]
fn test_event_ingestion() {
    let event = column_lineage_event();
    assert!(event.has_column_lineage());
    let store = MemoryStore::new();

    let counts = ingest_openlineage_event(&store, &event).unwrap();
    assert_eq!(counts.run_id, "0190a5c4-1111-7000-8000-000000000001");
    assert_eq!(counts.event_type, "COMPLETE");
    assert_eq!(counts.datasets_created, 2);
    assert_eq!(counts.columns_created, 4);
    assert_eq!(counts.edges_created, 2);
    assert_eq!(counts.duplicates_skipped, 0);

    let again = ingest_openlineage_event(&store, &event).unwrap();
    assert_eq!(again.datasets_created, 0);
    assert_eq!(again.columns_created, 0);
    assert_eq!(again.edges_created, 0);
    assert_eq!(again.duplicates_skipped, 2);
    assert_eq!(store.edge_count().unwrap(), 2);

    let job = store
        .find_node(&NodeKey::job("etl", "daily_totals"))
        .unwrap()
        .unwrap();
    let analyzer = ImpactAnalyzer::new(&store);
    let amount = analyzer
        .find_column_by_name("warehouse", "sales.orders", "amount")
        .unwrap();
    let edges = store.outgoing_edges(&amount.id).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].transformation_type, TransformationType::Direct);
    assert_eq!(
        edges[0].transformation_subtype,
        TransformationSubtype::Aggregation
    );
    assert_eq!(edges[0].description.as_deref(), Some("SUM(amount)"));
    assert_eq!(edges[0].job_id.as_deref(), Some(job.id.as_str()));
    assert!(edges[0].sql_hash.is_none());

    let impact = analyzer.downstream(&amount.id, 10).unwrap();
    assert_eq!(impact.total_count, 1);
    assert_eq!(impact.affected_nodes[0].name, "total");
}

#[test]
fn test_field_level_transformation_type_overrides() {
    let mut event = column_lineage_event();
    let facet = event.outputs[0].facets.column_lineage.as_mut().unwrap();
    let total = facet.fields.get_mut("total").unwrap();
    total.transformation_type = Some("INDIRECT".to_owned());
    total.input_fields[0].transformations[0].subtype = Some("SOMETHING_NEW".to_owned());

    let store = MemoryStore::new();
    ingest_openlineage_event(&store, &event).unwrap();
    let amount = ImpactAnalyzer::new(&store)
        .find_column_by_name("warehouse", "sales.orders", "amount")
        .unwrap();
    let edges = store.outgoing_edges(&amount.id).unwrap();
    assert_eq!(edges[0].transformation_type, TransformationType::Indirect);
    assert_eq!(
        edges[0].transformation_subtype,
        TransformationSubtype::Transformation
    );
}

#[test]
fn test_built_event_round_trip() {
    let result = parse_sql_lineage(
        "INSERT INTO mart.customer_totals SELECT customer_id, SUM(amount) AS total \
         FROM sales.orders GROUP BY customer_id",
        Dialect::Redshift,
        None,
    );
    let event = build_run_event("daily_totals", "warehouse", &result);
    let header = validate_event(&event).unwrap();
    assert_eq!(header.event_type, EventType::Complete);
    assert_eq!(header.job_namespace, JOB_NAMESPACE);
    assert_eq!(event.inputs.len(), 1);
    assert_eq!(event.outputs[0].name, "mart.customer_totals");

    // Survives a JSON round trip with the camelCase wire names
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["eventType"], "COMPLETE");
    assert!(json["outputs"][0]["facets"]["columnLineage"]["fields"]["total"].is_object());
    let event: RunEvent = serde_json::from_value(json).unwrap();

    let store = MemoryStore::new();
    let counts = ingest_openlineage_event(&store, &event).unwrap();
    assert_eq!(counts.edges_created, 2);
    let amount = ImpactAnalyzer::new(&store)
        .find_column_by_name("warehouse", "sales.orders", "amount")
        .unwrap();
    let edges = store.outgoing_edges(&amount.id).unwrap();
    assert_eq!(
        edges[0].transformation_subtype,
        TransformationSubtype::Aggregation
    );
}

#[test]
fn test_built_event_without_target_has_no_facet() {
    let result = parse_sql_lineage("SELECT id FROM users", Dialect::Redshift, None);
    let event = build_run_event("adhoc", "warehouse", &result);
    assert!(event.outputs.is_empty());
    assert!(!event.has_column_lineage());
}
