use std::collections::HashSet;

use anyhow::anyhow;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub dtype: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaObjectKind {
    Table { columns: Vec<Column> },
    View { columns: Vec<Column> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaObject {
    /// Name as referenced in SQL, e.g. `analytics.orders`.
    pub name: String,
    pub kind: SchemaObjectKind,
}

impl SchemaObject {
    pub fn columns(&self) -> &[Column] {
        match &self.kind {
            SchemaObjectKind::Table { columns } | SchemaObjectKind::View { columns } => columns,
        }
    }
}

/// Table schemas supplied by an external catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub schema_objects: Vec<SchemaObject>,
}

fn base_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

impl Catalog {
    /// Builds a catalog from `table -> (column -> type)`, the shape returned by schema lookups.
    pub fn from_mapping(mapping: IndexMap<String, IndexMap<String, String>>) -> Self {
        let schema_objects = mapping
            .into_iter()
            .map(|(name, columns)| SchemaObject {
                name,
                kind: SchemaObjectKind::Table {
                    columns: columns
                        .into_iter()
                        .map(|(name, dtype)| Column { name, dtype })
                        .collect(),
                },
            })
            .collect();
        Self { schema_objects }
    }

    /// Rejects duplicate table names and duplicate columns within a table.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut names = HashSet::new();
        for schema_object in &self.schema_objects {
            if !names.insert(schema_object.name.to_lowercase()) {
                return Err(anyhow!(
                    "Found duplicate definition of schema object `{}`.",
                    schema_object.name
                ));
            }
            let mut columns = HashSet::new();
            let duplicate_columns: Vec<&str> = schema_object
                .columns()
                .iter()
                .filter(|col| !columns.insert(col.name.to_lowercase()))
                .map(|col| col.name.as_str())
                .collect();
            if !duplicate_columns.is_empty() {
                return Err(anyhow!(
                    "Found duplicate columns in schema object `{}`: `{:?}`.",
                    schema_object.name,
                    duplicate_columns
                ));
            }
        }
        Ok(())
    }

    /// Finds a table by exact (case-insensitive) name, then by unqualified name when
    /// exactly one table matches.
    pub fn get(&self, table: &str) -> Option<&SchemaObject> {
        if let Some(obj) = self
            .schema_objects
            .iter()
            .find(|obj| obj.name.eq_ignore_ascii_case(table))
        {
            return Some(obj);
        }
        let mut candidates = self.schema_objects.iter().filter(|obj| {
            (!table.contains('.') || !obj.name.contains('.'))
                && base_name(&obj.name).eq_ignore_ascii_case(base_name(table))
        });
        match (candidates.next(), candidates.next()) {
            (Some(obj), None) => Some(obj),
            _ => None,
        }
    }

    pub fn columns(&self, table: &str) -> Option<&[Column]> {
        self.get(table).map(SchemaObject::columns)
    }

    pub fn has_column(&self, table: &str, column: &str) -> Option<bool> {
        self.columns(table)
            .map(|columns| columns.iter().any(|col| col.name.eq_ignore_ascii_case(column)))
    }
}

#[cfg(test)]
mod tests {
    use super::Catalog;
    use indexmap::IndexMap;

    fn catalog() -> Catalog {
        let mut mapping = IndexMap::new();
        mapping.insert(
            "sales.orders".to_owned(),
            IndexMap::from([
                ("id".to_owned(), "int".to_owned()),
                ("amount".to_owned(), "decimal(10,2)".to_owned()),
            ]),
        );
        mapping.insert(
            "users".to_owned(),
            IndexMap::from([("id".to_owned(), "int".to_owned())]),
        );
        Catalog::from_mapping(mapping)
    }

    #[test]
    fn test_lookup_by_full_and_base_name() {
        let catalog = catalog();
        assert!(catalog.get("SALES.ORDERS").is_some());
        assert!(catalog.get("orders").is_some());
        assert!(catalog.get("public.users").is_some());
        assert!(catalog.get("other.orders").is_none());
        assert_eq!(catalog.has_column("orders", "AMOUNT"), Some(true));
        assert_eq!(catalog.has_column("orders", "name"), Some(false));
        assert_eq!(catalog.has_column("missing", "name"), None);
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut catalog = catalog();
        assert!(catalog.validate().is_ok());
        let duplicate = catalog.schema_objects[1].clone();
        catalog.schema_objects.push(duplicate);
        assert!(catalog.validate().is_err());
    }
}
