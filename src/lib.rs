//! # sqlineage
//!
//! A library for extracting column-level lineage from SQL statements and keeping it in a
//! queryable lineage graph.
//!
//! # Features
//!
//! - Parse SQL in several dialects (redshift, athena, postgres, presto, mysql, bigquery,
//!   snowflake, spark, hive) into an AST.
//! - Extract, for every output column, the source columns it is computed from, classified as
//!   DIRECT (identity, transformation, aggregation) or INDIRECT (join, group by, filter, sort,
//!   window, conditional).
//! - Trace columns through CTEs, derived tables, set operations and scalar subqueries.
//! - Optionally bind unqualified columns and expand `*` with schema information.
//! - Store lineage as dataset, column and job nodes connected by deduplicated edges, in memory
//!   or in SQLite.
//! - Ingest OpenLineage column-lineage events.
//! - Walk the graph downstream (impact) or upstream (root cause).
//!
//! # Example
//!
//! ```rust,no_run
//! use sqlineage::{
//!     dialect::Dialect,
//!     lineage::{Catalog, LineageParser},
//!     store::{MemoryStore, ingest_lineage_result},
//!     traversal::ImpactAnalyzer,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     env_logger::init();
//!
//!     let sql = r#"
//!         insert into analytics.customer_totals
//!         select c.id, upper(c.name) as name, sum(o.amount) as total
//!         from crm.customers c join sales.orders o on o.customer_id = c.id
//!         group by c.id, c.name
//!     "#;
//!
//!     let catalog = Catalog::default();
//!     let result = LineageParser::new(Dialect::Redshift)
//!         .with_namespace("warehouse")
//!         .with_catalog(&catalog)
//!         .parse(sql);
//!     println!("Lineage: {:?}", result.column_lineages);
//!
//!     let store = MemoryStore::new();
//!     let counts = ingest_lineage_result(&store, &result, "warehouse", None)?;
//!     println!("Ingested: {:?}", counts);
//!
//!     let analyzer = ImpactAnalyzer::new(&store);
//!     let amount = analyzer.find_column_by_name("warehouse", "sales.orders", "amount")?;
//!     let impact = analyzer.downstream(&amount.id, 10)?;
//!     println!("Impact: {:?}", impact.affected_nodes);
//!     Ok(())
//! }
//! ```
pub mod ast;
pub mod config;
pub mod dialect;
pub mod extractor;
pub mod lineage;
pub mod openlineage;
pub mod parser;
pub mod scanner;
pub mod store;
#[doc(hidden)]
pub mod test_utils;
pub mod traversal;
