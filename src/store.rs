//! Lineage graph persistence.
//!
//! Nodes are datasets, columns and jobs, identified by `(node_type, namespace, name, parent_id)`.
//! Edges are directed from a source column to the column derived from it. Both backends make
//! the lookup-then-insert sequences of [`LineageStore::upsert_node`] and
//! [`LineageStore::create_edge`] atomic, so concurrent ingestion of the same statement never
//! produces two records for one identity.
pub mod ingest;
pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::lineage::{TransformationSubtype, TransformationType};

pub use ingest::{
    EventIngestionCounts, IngestionCounts, SqlProcessedStatus, check_sql_processed,
    ingest_lineage_result, ingest_openlineage_event,
};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NodeType {
    Dataset,
    Column,
    Job,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EdgeType {
    DerivesFrom,
    TransformsTo,
}

/// Identity of a node. A missing `parent_id` is its own identity, not a wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    pub node_type: NodeType,
    pub namespace: String,
    pub name: String,
    pub parent_id: Option<String>,
}

impl NodeKey {
    pub fn dataset(namespace: &str, name: &str) -> Self {
        Self {
            node_type: NodeType::Dataset,
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            parent_id: None,
        }
    }

    pub fn column(namespace: &str, name: &str, dataset_id: &str) -> Self {
        Self {
            node_type: NodeType::Column,
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            parent_id: Some(dataset_id.to_owned()),
        }
    }

    pub fn job(namespace: &str, name: &str) -> Self {
        Self {
            node_type: NodeType::Job,
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            parent_id: None,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() || self.name.is_empty() {
            return Err(StoreError::InvalidInput(format!(
                "{} node requires a namespace and a name, got `{}` / `{}`",
                self.node_type, self.namespace, self.name
            )));
        }
        if (self.node_type == NodeType::Column) != self.parent_id.is_some() {
            return Err(StoreError::InvalidInput(format!(
                "only column nodes have a parent (node `{}`)",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageNode {
    pub id: String,
    pub node_type: NodeType,
    pub namespace: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub data_type: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LineageNode {
    pub fn key(&self) -> NodeKey {
        NodeKey {
            node_type: self.node_type,
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            parent_id: self.parent_id.clone(),
        }
    }
}

/// Upsert request: the identity plus the attributes replaced on every update.
#[derive(Debug, Clone)]
pub struct NodeUpsert {
    pub key: NodeKey,
    pub data_type: Option<String>,
    pub metadata: serde_json::Value,
}

impl NodeUpsert {
    pub fn new(key: NodeKey) -> Self {
        Self {
            key,
            data_type: None,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_data_type(mut self, data_type: Option<String>) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOutcome {
    pub node_id: String,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageEdge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub edge_type: EdgeType,
    pub transformation_type: TransformationType,
    pub transformation_subtype: TransformationSubtype,
    pub description: Option<String>,
    pub job_id: Option<String>,
    pub sql_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEdge {
    pub source_id: String,
    pub target_id: String,
    pub edge_type: EdgeType,
    pub transformation_type: TransformationType,
    pub transformation_subtype: TransformationSubtype,
    pub description: Option<String>,
    pub job_id: Option<String>,
    pub sql_hash: Option<String>,
}

impl NewEdge {
    pub fn new(source_id: &str, target_id: &str, subtype: TransformationSubtype) -> Self {
        Self {
            source_id: source_id.to_owned(),
            target_id: target_id.to_owned(),
            edge_type: EdgeType::TransformsTo,
            transformation_type: subtype.transformation_type(),
            transformation_subtype: subtype,
            description: None,
            job_id: None,
            sql_hash: None,
        }
    }

    /// Whether `edge` makes this one a duplicate: same endpoints and, when this edge
    /// carries a hash, the same hash.
    pub(crate) fn duplicates(&self, edge: &LineageEdge) -> bool {
        edge.source_id == self.source_id
            && edge.target_id == self.target_id
            && self
                .sql_hash
                .as_ref()
                .is_none_or(|hash| edge.sql_hash.as_ref() == Some(hash))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeOutcome {
    pub edge_id: String,
    pub created: bool,
    pub duplicate: bool,
}

/// Query and mutation surface of a lineage graph backend.
pub trait LineageStore: Send + Sync {
    /// Inserts the node, or replaces the mutable attributes of the node with the same identity.
    fn upsert_node(&self, node: &NodeUpsert) -> Result<NodeOutcome>;

    /// Inserts the edge unless an edge with the same endpoints (and the same `sql_hash`, when
    /// given) exists, in which case the existing id is returned with `duplicate` set.
    fn create_edge(&self, edge: &NewEdge) -> Result<EdgeOutcome>;

    fn get_node(&self, id: &str) -> Result<Option<LineageNode>>;

    fn find_node(&self, key: &NodeKey) -> Result<Option<LineageNode>>;

    fn outgoing_edges(&self, node_id: &str) -> Result<Vec<LineageEdge>>;

    fn incoming_edges(&self, node_id: &str) -> Result<Vec<LineageEdge>>;

    fn count_edges_with_sql_hash(&self, sql_hash: &str) -> Result<usize>;

    fn node_count(&self) -> Result<usize>;

    fn edge_count(&self) -> Result<usize>;
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::{EdgeType, LineageEdge, NewEdge, NodeKey, NodeType};
    use crate::lineage::{TransformationSubtype, TransformationType};
    use std::str::FromStr;

    fn edge(sql_hash: Option<&str>) -> LineageEdge {
        LineageEdge {
            id: "e1".to_owned(),
            source_id: "a".to_owned(),
            target_id: "b".to_owned(),
            edge_type: EdgeType::TransformsTo,
            transformation_type: TransformationType::Direct,
            transformation_subtype: TransformationSubtype::Identity,
            description: None,
            job_id: None,
            sql_hash: sql_hash.map(str::to_owned),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_edge_duplicate_rules() {
        let mut new_edge = NewEdge::new("a", "b", TransformationSubtype::Identity);
        assert!(new_edge.duplicates(&edge(None)));
        assert!(new_edge.duplicates(&edge(Some("h1"))));
        new_edge.sql_hash = Some("h1".to_owned());
        assert!(new_edge.duplicates(&edge(Some("h1"))));
        assert!(!new_edge.duplicates(&edge(Some("h2"))));
        assert!(!new_edge.duplicates(&edge(None)));
    }

    #[test]
    fn test_node_key_validation() {
        assert!(NodeKey::dataset("ns", "orders").validate().is_ok());
        assert!(NodeKey::column("ns", "id", "d1").validate().is_ok());
        assert!(NodeKey::dataset("", "orders").validate().is_err());
        let mut key = NodeKey::dataset("ns", "orders");
        key.parent_id = Some("d1".to_owned());
        assert!(key.validate().is_err());
    }

    #[test]
    fn test_node_type_wire_names() {
        assert_eq!(NodeType::Dataset.as_ref(), "dataset");
        assert_eq!(NodeType::from_str("job").unwrap(), NodeType::Job);
        assert_eq!(EdgeType::TransformsTo.as_ref(), "transforms_to");
        assert_eq!(
            serde_json::to_string(&EdgeType::DerivesFrom).unwrap(),
            "\"derives_from\""
        );
    }
}
