use sqlineage::{
    dialect::Dialect,
    parser::parse_sql,
    test_utils::{PARSING_TESTS_FILE, TestParsingData},
};

fn test_sql(sql: &str, dialect: Dialect) {
    let ast = parse_sql(sql, dialect);
    if let Err(err) = &ast {
        println!("{}", err)
    }
    assert!(ast.is_ok());
}

#[test]
fn test_should_parse() {
    let parsing_test_file =
        std::fs::read_to_string(PARSING_TESTS_FILE).expect("Cannot open parsing test cases");
    let test_parsing_data: TestParsingData =
        toml::from_str(&parsing_test_file).expect("Cannot parse test cases defined in toml");

    for test in test_parsing_data.tests {
        let sql = &test.sql;
        println!("Testing parsing for SQL ({}): {}", test.dialect, sql);
        test_sql(sql, test.dialect);
        test_sql(&sql.to_uppercase(), test.dialect);
        test_sql(&sql.to_lowercase(), test.dialect);
    }
}

#[test]
fn test_should_not_parse() {
    let sqls = [
        "SELECT FROM t",
        "SELECT a FROM t WHERE",
        "SELECT (a FROM t",
        "SELECT a, FROM",
        "INSERT INTO",
        "SELECT a FROM t JOIN u",
        "SELECT CASE WHEN a THEN b FROM t",
        "SELECT 'unterminated FROM t",
        "SELECT a FROM t SELECT b FROM u",
        "CREATE MATERIALIZED TABLE t AS SELECT 1",
        "SELECT a FROM t ORDER BY a NULLS",
    ];
    for sql in sqls {
        println!("Testing parsing error for SQL: {}", sql);
        assert!(parse_sql(sql, Dialect::Redshift).is_err())
    }
}

#[test]
fn test_dialect_gated_syntax() {
    let cases = [
        ("SELECT a::int FROM t", Dialect::Postgres, Dialect::Mysql),
        ("SELECT TOP 5 a FROM t", Dialect::Snowflake, Dialect::Bigquery),
        ("SELECT `a` FROM t", Dialect::Hive, Dialect::Postgres),
        ("SELECT a FROM t # comment", Dialect::Mysql, Dialect::Redshift),
        (
            "SELECT a FROM t WHERE a ILIKE 'x%'",
            Dialect::Spark,
            Dialect::Presto,
        ),
    ];
    for (sql, accepting, rejecting) in cases {
        println!("Testing dialect gating for SQL: {}", sql);
        assert!(parse_sql(sql, accepting).is_ok());
        assert!(parse_sql(sql, rejecting).is_err());
    }
}

#[test]
fn test_statement_count() {
    let ast = parse_sql(";;SELECT a FROM t;; SELECT b FROM u;", Dialect::Redshift).unwrap();
    assert_eq!(ast.statements.len(), 2);

    let ast = parse_sql("", Dialect::Redshift).unwrap();
    assert!(ast.statements.is_empty());
}
