//! Batch extraction: parse a query history and store its lineage.
use std::path::Path;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

use crate::ast::TokenType;
use crate::dialect::Dialect;
use crate::lineage::{Catalog, LineageParser, SqlLineageResult, sql_hash};
use crate::scanner::Scanner;
use crate::store::{LineageStore, check_sql_processed, ingest_lineage_result};

/// Leading keywords of statements that never carry lineage.
const UTILITY_KEYWORDS: [&str; 22] = [
    "SHOW",
    "DESCRIBE",
    "SET",
    "RESET",
    "BEGIN",
    "COMMIT",
    "ROLLBACK",
    "VACUUM",
    "ANALYZE",
    "GRANT",
    "REVOKE",
    "EXPLAIN",
    "LOCK",
    "UNLOCK",
    "FETCH",
    "CLOSE",
    "DECLARE",
    "DEALLOCATE",
    "PREPARE",
    "EXECUTE",
    "COPY",
    "UNLOAD",
];

const USER_STATEMENT_KEYWORDS: [&str; 3] = ["ALTER", "CREATE", "DROP"];

const SYSTEM_SCHEMAS: [&str; 2] = ["pg_catalog", "information_schema"];

/// Whether `sql` is an administrative statement or only touches system catalogs.
/// SQL that cannot be tokenized is not a utility statement; the lineage parser reports it.
pub fn is_utility_statement(sql: &str, dialect: Dialect) -> bool {
    let mut scanner = Scanner::new(sql, dialect);
    if scanner.scan().is_err() {
        return false;
    }
    let mut tokens = scanner
        .tokens()
        .iter()
        .filter(|token| !matches!(token.kind, TokenType::Semicolon | TokenType::Eof));
    let Some(first) = tokens.next() else {
        return false;
    };

    let first_word = first.lexeme.to_uppercase();
    if UTILITY_KEYWORDS.contains(&first_word.as_str()) {
        return true;
    }
    let second_word = tokens
        .clone()
        .next()
        .map(|token| token.lexeme.to_uppercase())
        .unwrap_or_default();
    if USER_STATEMENT_KEYWORDS.contains(&first_word.as_str()) && second_word == "USER" {
        return true;
    }
    if first_word == "CURSOR" || second_word == "CURSOR" {
        return true;
    }

    std::iter::once(first).chain(tokens).any(|token| match &token.kind {
        TokenType::Identifier(name) | TokenType::QuotedIdentifier(name) => SYSTEM_SCHEMAS
            .iter()
            .any(|schema| schema.eq_ignore_ascii_case(name)),
        _ => false,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query_id: String,
    pub sql: String,
    pub namespace: String,
    #[serde(default)]
    pub dialect: Dialect,
}

/// Supplier of raw SQL text, e.g. a warehouse query log.
pub trait QueryHistorySource {
    fn name(&self) -> &str;

    fn fetch(&self) -> anyhow::Result<Vec<QueryRecord>>;
}

/// Query history held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticQuerySource {
    name: String,
    records: Vec<QueryRecord>,
}

impl StaticQuerySource {
    pub fn new(name: &str, records: Vec<QueryRecord>) -> Self {
        Self {
            name: name.to_owned(),
            records,
        }
    }

    /// One record per file, identified by its path.
    pub fn from_files<P: AsRef<Path>>(
        paths: &[P],
        namespace: &str,
        dialect: Dialect,
    ) -> anyhow::Result<Self> {
        let records = paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                let sql = std::fs::read_to_string(path).map_err(|err| {
                    anyhow::anyhow!("Could not read sql file {}: {}", path.display(), err)
                })?;
                Ok(QueryRecord {
                    query_id: path.display().to_string(),
                    sql,
                    namespace: namespace.to_owned(),
                    dialect,
                })
            })
            .collect::<anyhow::Result<Vec<QueryRecord>>>()?;
        Ok(Self::new("files", records))
    }
}

impl QueryHistorySource for StaticQuerySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> anyhow::Result<Vec<QueryRecord>> {
        Ok(self.records.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRun {
    pub run_id: String,
    pub source: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub queries_extracted: usize,
    pub queries_processed: usize,
    pub queries_skipped: usize,
    pub edges_created: usize,
    pub errors: Vec<String>,
}

impl ExtractionRun {
    fn start(source: &str) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            source: source.to_owned(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            queries_extracted: 0,
            queries_processed: 0,
            queries_skipped: 0,
            edges_created: 0,
            errors: vec![],
        }
    }

    fn finish(mut self, status: RunStatus) -> Self {
        self.status = status;
        self.completed_at = Some(Utc::now());
        self
    }
}

fn short_id(query_id: &str) -> String {
    query_id.chars().take(8).collect()
}

/// Parses every query of a history source and ingests the results.
pub struct BatchExtractor<'a, S: LineageStore + ?Sized> {
    store: &'a S,
    catalog: Option<&'a Catalog>,
    skip_processed: bool,
    parallel: bool,
}

impl<'a, S: LineageStore + ?Sized> BatchExtractor<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            catalog: None,
            skip_processed: true,
            parallel: true,
        }
    }

    pub fn with_catalog(mut self, catalog: &'a Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Skip statements whose hash already has stored edges.
    pub fn skip_processed(mut self, skip_processed: bool) -> Self {
        self.skip_processed = skip_processed;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    fn parse(&self, record: &QueryRecord) -> SqlLineageResult {
        let parser = LineageParser::new(record.dialect).with_namespace(&record.namespace);
        match self.catalog {
            Some(catalog) => parser.with_catalog(catalog).parse(&record.sql),
            None => parser.parse(&record.sql),
        }
    }

    /// Runs one extraction. Failures of single queries are collected in `errors`,
    /// only a failing source fails the whole run.
    pub fn run(&self, source: &dyn QueryHistorySource) -> ExtractionRun {
        let mut run = ExtractionRun::start(source.name());
        log::info!("Starting lineage extraction {} from {}", run.run_id, source.name());

        let records = match source.fetch() {
            Ok(records) => records,
            Err(err) => {
                log::error!("Extraction from {} failed: {}", source.name(), err);
                run.errors.push(format!("{}: {}", source.name(), err));
                return run.finish(RunStatus::Failed);
            }
        };
        run.queries_extracted = records.len();

        let mut pending = vec![];
        for record in &records {
            if is_utility_statement(&record.sql, record.dialect) {
                log::warn!("Skipping utility statement {}", short_id(&record.query_id));
                run.queries_skipped += 1;
                continue;
            }
            if self.skip_processed {
                match check_sql_processed(self.store, &sql_hash(&record.sql)) {
                    Ok(status) if status.processed => {
                        log::debug!(
                            "Skipping already processed query {}",
                            short_id(&record.query_id)
                        );
                        run.queries_skipped += 1;
                        continue;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        run.errors
                            .push(format!("Query {}: {}", short_id(&record.query_id), err));
                        continue;
                    }
                }
            }
            pending.push(record);
        }

        let results: Vec<SqlLineageResult> = if self.parallel {
            pending.par_iter().map(|record| self.parse(record)).collect()
        } else {
            pending.iter().map(|record| self.parse(record)).collect()
        };

        for (record, result) in pending.iter().zip(results) {
            for err in &result.parse_errors {
                log::warn!("Query {}: {}", short_id(&record.query_id), err);
            }
            match ingest_lineage_result(self.store, &result, &record.namespace, None) {
                Ok(counts) => {
                    run.queries_processed += 1;
                    run.edges_created += counts.edges_created;
                }
                Err(err) => {
                    log::warn!("Failed to store query {}: {}", short_id(&record.query_id), err);
                    run.errors
                        .push(format!("Query {}: {}", short_id(&record.query_id), err));
                }
            }
        }

        let status = if run.errors.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithErrors
        };
        let run = run.finish(status);
        log::info!(
            "Extraction {} {}: {} extracted, {} processed, {} skipped, {} edges created",
            run.run_id,
            run.status,
            run.queries_extracted,
            run.queries_processed,
            run.queries_skipped,
            run.edges_created
        );
        run
    }
}

#[cfg(test)]
mod tests {
    use super::is_utility_statement;
    use crate::dialect::Dialect;

    #[test]
    fn test_utility_statements() {
        for sql in [
            "SHOW TABLES",
            "  vacuum orders",
            "SET search_path TO analytics",
            "begin;",
            "CREATE USER etl PASSWORD 'x'",
            "ALTER USER etl SET timeout TO 10",
            "SELECT * FROM pg_catalog.pg_tables",
            "SELECT table_name FROM INFORMATION_SCHEMA.columns",
            "DECLARE c CURSOR FOR SELECT 1",
        ] {
            assert!(is_utility_statement(sql, Dialect::Redshift), "{}", sql);
        }
    }

    #[test]
    fn test_lineage_statements_are_kept() {
        for sql in [
            "SELECT a FROM t",
            "INSERT INTO t SELECT a FROM s",
            "CREATE TABLE t AS SELECT a FROM s",
            "SELECT 'SHOW' AS x FROM t",
            "SELECT information_schema_copy FROM t",
        ] {
            assert!(!is_utility_statement(sql, Dialect::Redshift), "{}", sql);
        }
    }
}
