use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use sqlineage::{
    dialect::Dialect,
    lineage::{Catalog, parse_sql_lineage},
    test_utils::{LINEAGE_TESTS_FILE, TestLineageData},
};

fn lineage_tests(cases: &[(String, Dialect, Option<Catalog>)]) {
    for (sql, dialect, catalog) in cases {
        let _ = parse_sql_lineage(sql, *dialect, catalog.as_ref());
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    let lineage_data_file =
        std::fs::read_to_string(LINEAGE_TESTS_FILE).expect("Cannot open lineage test cases");
    let test_lineage_data: TestLineageData =
        toml::from_str(&lineage_data_file).expect("Cannot parse test cases defined in toml");

    let cases = test_lineage_data
        .tests
        .iter()
        .map(|test| (test.sql.clone(), test.dialect, test.catalog()))
        .collect::<Vec<_>>();

    c.bench_function("bench lineage tests", |b| {
        b.iter(|| lineage_tests(black_box(&cases)))
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(1000);
    targets = criterion_benchmark
);
criterion_main!(benches);
