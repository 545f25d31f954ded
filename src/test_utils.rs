use std::{collections::HashSet, fmt::Display};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::dialect::Dialect;
use crate::lineage::{
    Catalog, ColumnLineage, ReferencedColumn, SourceColumn, TransformationSubtype,
};

pub const PARSING_TESTS_FILE: &str = "tests/parsing_tests.toml";
pub const LINEAGE_TESTS_FILE: &str = "tests/lineage_tests.toml";

#[derive(Deserialize, Debug, Clone)]
pub struct TestParsing {
    pub sql: String,
    #[serde(default)]
    pub dialect: Dialect,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestParsingData {
    pub tests: Vec<TestParsing>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestSource {
    pub table: String,
    pub column: String,
    pub subtype: TransformationSubtype,
}

impl From<&SourceColumn> for TestSource {
    fn from(source: &SourceColumn) -> Self {
        Self {
            table: source.table.clone(),
            column: source.column.clone(),
            subtype: source.transformation_subtype,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestColumnLineage {
    pub column: String,
    pub sources: Vec<TestSource>,
}

impl PartialEq for TestColumnLineage {
    fn eq(&self, other: &Self) -> bool {
        self.column == other.column
            && self.sources.iter().collect::<HashSet<_>>() == other.sources.iter().collect()
    }
}

impl From<&ColumnLineage> for TestColumnLineage {
    fn from(lineage: &ColumnLineage) -> Self {
        Self {
            column: lineage.column.clone(),
            sources: lineage.source_columns.iter().map(TestSource::from).collect(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestReferencedColumn {
    pub table: String,
    pub column: String,
    pub subtypes: Vec<TransformationSubtype>,
}

impl From<&ReferencedColumn> for TestReferencedColumn {
    fn from(referenced: &ReferencedColumn) -> Self {
        Self {
            table: referenced.table.clone(),
            column: referenced.column.clone(),
            subtypes: referenced.subtypes.clone(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestLineage {
    pub name: String,
    pub sql: String,
    #[serde(default)]
    pub dialect: Dialect,
    /// `table -> (column -> type)`, enables schema-aware resolution when present.
    #[serde(default)]
    pub schema: Option<IndexMap<String, IndexMap<String, String>>>,
    pub source_tables: Vec<String>,
    #[serde(default)]
    pub target_table: Option<String>,
    pub column_lineages: Vec<TestColumnLineage>,
    /// Only checked when present.
    #[serde(default)]
    pub referenced_columns: Option<Vec<TestReferencedColumn>>,
    #[serde(default)]
    pub has_errors: bool,
}

impl TestLineage {
    pub fn catalog(&self) -> Option<Catalog> {
        self.schema.clone().map(Catalog::from_mapping)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestLineageData {
    pub tests: Vec<TestLineage>,
}

impl Display for TestLineageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
