use std::collections::HashSet;

use indexmap::IndexMap;
use sqlineage::{
    dialect::Dialect,
    lineage::{
        Catalog, LineageParser, TransformationSubtype, TransformationType,
        extract_column_dependencies, parse_sql_lineage, sql_hash,
    },
    test_utils::{
        LINEAGE_TESTS_FILE, TestColumnLineage, TestLineageData, TestReferencedColumn,
    },
};

#[test]
fn test_lineage() {
    let lineage_data_file =
        std::fs::read_to_string(LINEAGE_TESTS_FILE).expect("Cannot open lineage test cases");
    let test_lineage_data: TestLineageData =
        toml::from_str(&lineage_data_file).expect("Cannot parse test cases defined in toml");

    for test in test_lineage_data.tests {
        println!("Testing lineage `{}` for SQL: {}", &test.name, &test.sql);
        let catalog = test.catalog();
        let result = parse_sql_lineage(&test.sql, test.dialect, catalog.as_ref());

        assert_eq!(result.source_tables, test.source_tables, "{}", test.name);
        assert_eq!(result.target_table, test.target_table, "{}", test.name);
        assert_eq!(
            !result.parse_errors.is_empty(),
            test.has_errors,
            "{}: {:?}",
            test.name,
            result.parse_errors
        );

        let column_lineages: Vec<TestColumnLineage> = result
            .column_lineages
            .iter()
            .map(TestColumnLineage::from)
            .collect();
        assert_eq!(column_lineages, test.column_lineages, "{}", test.name);

        if let Some(expected_referenced) = &test.referenced_columns {
            let referenced: HashSet<TestReferencedColumn> = result
                .referenced_columns
                .iter()
                .map(TestReferencedColumn::from)
                .collect();
            assert_eq!(
                referenced,
                expected_referenced.iter().cloned().collect(),
                "{}",
                test.name
            );
        }
    }
}

#[test]
fn test_source_column_fields() {
    let result = LineageParser::new(Dialect::Redshift)
        .with_namespace("warehouse")
        .parse("SELECT id, UPPER(name) AS name_upper FROM users");

    let id = &result.column_lineages[0];
    assert_eq!(id.transformation_description.as_deref(), Some("Expression: id"));
    let id_source = &id.source_columns[0];
    assert_eq!(id_source.namespace, "warehouse");
    assert_eq!(id_source.transformation_type, TransformationType::Direct);
    assert_eq!(id_source.description, "Direct column reference");

    let upper = &result.column_lineages[1];
    assert_eq!(
        upper.transformation_description.as_deref(),
        Some("Expression: UPPER(name)")
    );
    let upper_source = &upper.source_columns[0];
    assert_eq!(
        upper_source.transformation_subtype,
        TransformationSubtype::Transformation
    );
    assert_eq!(upper_source.description, "Transformed: UPPER(name)");
}

#[test]
fn test_wildcard_description() {
    let result = parse_sql_lineage("SELECT * FROM t", Dialect::Redshift, None);
    assert!(result.is_ok());
    let source = &result.column_lineages[0].source_columns[0];
    assert_eq!(
        source.description,
        "SELECT * - schema required for full resolution"
    );
}

#[test]
fn test_parse_error_message() {
    let result = parse_sql_lineage("SELECT FROM WHERE", Dialect::Redshift, None);
    assert_eq!(result.parse_errors.len(), 1);
    assert!(result.parse_errors[0].starts_with("Parse error: "));
    assert_eq!(result.sql_hash, sql_hash("SELECT FROM WHERE"));
}

#[test]
fn test_multiple_statements_message() {
    let result = parse_sql_lineage("SELECT a FROM t; SELECT b FROM u", Dialect::Redshift, None);
    assert_eq!(
        result.parse_errors,
        vec!["Found 2 statements: only the first one was analyzed.".to_owned()]
    );
}

#[test]
fn test_schema_resolution_failure_message() {
    let catalog = Catalog::from_mapping(IndexMap::from([
        ("a".to_owned(), IndexMap::from([("id".to_owned(), "int".to_owned())])),
        ("b".to_owned(), IndexMap::from([("id".to_owned(), "int".to_owned())])),
    ]));
    let result = parse_sql_lineage(
        "SELECT id FROM a JOIN b ON a.id = b.id",
        Dialect::Redshift,
        Some(&catalog),
    );
    assert!(!result.parse_errors.is_empty());
    assert!(
        result
            .parse_errors
            .iter()
            .all(|err| err.starts_with("Schema-aware resolution failed: "))
    );
    assert_eq!(result.column_lineages[0].source_columns[0].table, "unknown");
}

#[test]
fn test_sql_hash_is_stable() {
    let sql = "SELECT id FROM users";
    let first = parse_sql_lineage(sql, Dialect::Redshift, None);
    let second = parse_sql_lineage("SELECT  id\nFROM users ", Dialect::Postgres, None);
    assert_eq!(first.sql_hash, second.sql_hash);
    assert_eq!(first.sql_hash, sql_hash(sql));
    assert_ne!(first.sql_hash, sql_hash("SELECT name FROM users"));
}

#[test]
fn test_column_dependencies() {
    let sql = "SELECT customer_id, SUM(amount) AS Total FROM orders GROUP BY customer_id";
    let dependencies = extract_column_dependencies(sql, "total", Dialect::Redshift, None);
    assert!(dependencies.error.is_none());
    assert_eq!(dependencies.target_column, "total");
    assert_eq!(dependencies.sql_hash, sql_hash(sql));
    assert_eq!(dependencies.source_columns.len(), 1);
    assert_eq!(dependencies.source_columns[0].table, "orders");
    assert_eq!(dependencies.source_columns[0].column, "amount");
    assert_eq!(
        dependencies.source_columns[0].transformation_subtype,
        TransformationSubtype::Aggregation
    );
    assert_eq!(
        dependencies.transformation_description.as_deref(),
        Some("Expression: SUM(amount)")
    );
}

#[test]
fn test_column_dependencies_missing_column() {
    let dependencies =
        extract_column_dependencies("SELECT a FROM t", "b", Dialect::Redshift, None);
    assert_eq!(
        dependencies.error.as_deref(),
        Some("Column 'b' not found in SELECT clause")
    );
    assert!(dependencies.source_columns.is_empty());
}

#[test]
fn test_column_dependencies_without_select() {
    let dependencies = extract_column_dependencies(
        "DELETE FROM t WHERE a = 1",
        "a",
        Dialect::Redshift,
        None,
    );
    assert_eq!(dependencies.error.as_deref(), Some("No SELECT clause found"));
}

#[test]
fn test_parse_many_keeps_order() {
    let sqls = [
        "SELECT a FROM t1",
        "SELECT b FROM t2",
        "SELECT FROM",
        "SELECT c FROM t3",
    ];
    let parser = LineageParser::new(Dialect::Redshift);
    let sequential = parser.parse_many(&sqls, false);
    let parallel = parser.parse_many(&sqls, true);
    assert_eq!(sequential, parallel);
    let tables: Vec<Vec<String>> = parallel.iter().map(|r| r.source_tables.clone()).collect();
    assert_eq!(
        tables,
        vec![
            vec!["t1".to_owned()],
            vec!["t2".to_owned()],
            vec![],
            vec!["t3".to_owned()]
        ]
    );
    assert!(!parallel[2].is_ok());
}

#[test]
fn test_result_serialization() {
    let result = parse_sql_lineage("SELECT SUM(a) AS s FROM t", Dialect::Redshift, None);
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["dialect"], "redshift");
    assert_eq!(json["source_tables"][0], "t");
    let source = &json["column_lineages"][0]["source_columns"][0];
    assert_eq!(source["transformation_type"], "DIRECT");
    assert_eq!(source["transformation_subtype"], "AGGREGATION");
}
