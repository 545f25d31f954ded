use sqlineage::{
    dialect::Dialect,
    extractor::{BatchExtractor, QueryHistorySource, QueryRecord, RunStatus, StaticQuerySource},
    store::{LineageStore, MemoryStore},
    traversal::ImpactAnalyzer,
};

fn record(query_id: &str, sql: &str) -> QueryRecord {
    QueryRecord {
        query_id: query_id.to_owned(),
        sql: sql.to_owned(),
        namespace: "warehouse".to_owned(),
        dialect: Dialect::Redshift,
    }
}

fn history() -> StaticQuerySource {
    StaticQuerySource::new(
        "query_log",
        vec![
            record(
                "q-insert",
                "INSERT INTO mart.customer_totals SELECT customer_id, SUM(amount) AS total \
                 FROM sales.orders GROUP BY customer_id",
            ),
            record("q-show", "SHOW TABLES"),
            record("q-catalog", "SELECT relname FROM pg_catalog.pg_class"),
            record("q-broken", "SELECT FROM WHERE"),
            record(
                "q-view",
                "CREATE VIEW mart.big_orders AS SELECT id, amount FROM sales.orders WHERE amount > 100",
            ),
        ],
    )
}

struct FailingSource;

impl QueryHistorySource for FailingSource {
    fn name(&self) -> &str {
        "unreachable_warehouse"
    }

    fn fetch(&self) -> anyhow::Result<Vec<QueryRecord>> {
        anyhow::bail!("connection refused")
    }
}

#[test]
fn test_batch_extraction() {
    for parallel in [false, true] {
        println!("Testing batch extraction (parallel: {})", parallel);
        let store = MemoryStore::new();
        let run = BatchExtractor::new(&store).parallel(parallel).run(&history());

        assert_eq!(run.source, "query_log");
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.completed_at.is_some());
        assert_eq!(run.queries_extracted, 5);
        assert_eq!(run.queries_skipped, 2);
        // Statements that fail to parse are logged, not counted as errors
        assert_eq!(run.queries_processed, 3);
        assert_eq!(run.edges_created, 4);
        assert!(run.errors.is_empty());
        assert_eq!(store.edge_count().unwrap(), 4);

        let analyzer = ImpactAnalyzer::new(&store);
        let amount = analyzer
            .find_column_by_name("warehouse", "sales.orders", "amount")
            .unwrap();
        let impact = analyzer.downstream(&amount.id, 10).unwrap();
        let mut names: Vec<&str> = impact.affected_nodes.iter().map(|n| n.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["amount", "total"]);
    }
}

#[test]
fn test_processed_queries_are_skipped() {
    let store = MemoryStore::new();
    let first = BatchExtractor::new(&store).run(&history());
    assert_eq!(first.edges_created, 4);

    let second = BatchExtractor::new(&store).run(&history());
    assert_eq!(second.status, RunStatus::Completed);
    // 2 utility statements and the 2 statements with stored edges
    assert_eq!(second.queries_skipped, 4);
    assert_eq!(second.queries_processed, 1);
    assert_eq!(second.edges_created, 0);
    assert_ne!(first.run_id, second.run_id);

    let forced = BatchExtractor::new(&store)
        .skip_processed(false)
        .run(&history());
    assert_eq!(forced.queries_skipped, 2);
    assert_eq!(forced.queries_processed, 3);
    assert_eq!(forced.edges_created, 0);
    assert_eq!(store.edge_count().unwrap(), 4);
}

#[test]
fn test_storage_errors_are_collected() {
    let mut bad = record("q-no-namespace", "INSERT INTO t SELECT a FROM u");
    bad.namespace = String::new();
    let source = StaticQuerySource::new(
        "query_log",
        vec![bad, record("q-good", "INSERT INTO t SELECT a FROM u")],
    );
    let store = MemoryStore::new();
    let run = BatchExtractor::new(&store).parallel(false).run(&source);
    assert_eq!(run.status, RunStatus::CompletedWithErrors);
    assert_eq!(run.errors.len(), 1);
    assert!(run.errors[0].starts_with("Query q-no-nam: "));
    assert_eq!(run.queries_processed, 1);
    assert_eq!(run.edges_created, 1);
}

#[test]
fn test_failing_source_fails_the_run() {
    let store = MemoryStore::new();
    let run = BatchExtractor::new(&store).run(&FailingSource);
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.queries_extracted, 0);
    assert_eq!(
        run.errors,
        vec!["unreachable_warehouse: connection refused".to_owned()]
    );
    assert!(run.completed_at.is_some());
}

#[test]
fn test_source_from_files() {
    let dir = std::env::temp_dir().join(format!("sqlineage-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("load.sql");
    std::fs::write(&path, "INSERT INTO t SELECT a FROM u").unwrap();

    let source = StaticQuerySource::from_files(&[&path], "warehouse", Dialect::Postgres).unwrap();
    assert_eq!(source.name(), "files");
    let records = source.fetch().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].query_id, path.display().to_string());
    assert_eq!(records[0].dialect, Dialect::Postgres);

    assert!(
        StaticQuerySource::from_files(&[dir.join("missing.sql")], "warehouse", Dialect::Postgres)
            .is_err()
    );
    std::fs::remove_dir_all(&dir).ok();
}
