use std::collections::HashMap;

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::RwLock;

use super::{
    EdgeOutcome, LineageEdge, LineageNode, LineageStore, NewEdge, NodeKey, NodeOutcome,
    NodeUpsert, Result, StoreError, new_id,
};

#[derive(Debug, Default)]
struct Graph {
    nodes: IndexMap<String, LineageNode>,
    node_ids: HashMap<NodeKey, String>,
    edges: IndexMap<String, LineageEdge>,
    outgoing: HashMap<String, Vec<String>>,
    incoming: HashMap<String, Vec<String>>,
}

impl Graph {
    fn edges_of(&self, index: &HashMap<String, Vec<String>>, node_id: &str) -> Vec<LineageEdge> {
        index
            .get(node_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.edges.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Lineage graph held in process memory.
///
/// Every mutation takes the write lock for its whole lookup-then-insert sequence, readers
/// never block each other.
#[derive(Debug, Default)]
pub struct MemoryStore {
    graph: RwLock<Graph>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LineageStore for MemoryStore {
    fn upsert_node(&self, node: &NodeUpsert) -> Result<NodeOutcome> {
        node.key.validate()?;
        let mut graph = self.graph.write();
        let now = Utc::now();

        if let Some(id) = graph.node_ids.get(&node.key).cloned() {
            let existing = graph
                .nodes
                .get_mut(&id)
                .ok_or_else(|| StoreError::Corrupt(format!("dangling node id `{}`", id)))?;
            existing.data_type = node.data_type.clone();
            existing.metadata = node.metadata.clone();
            existing.updated_at = now;
            return Ok(NodeOutcome {
                node_id: id,
                created: false,
            });
        }

        if let Some(parent_id) = &node.key.parent_id {
            if !graph.nodes.contains_key(parent_id) {
                return Err(StoreError::NodeNotFound(parent_id.clone()));
            }
        }

        let id = new_id();
        graph.nodes.insert(
            id.clone(),
            LineageNode {
                id: id.clone(),
                node_type: node.key.node_type,
                namespace: node.key.namespace.clone(),
                name: node.key.name.clone(),
                parent_id: node.key.parent_id.clone(),
                data_type: node.data_type.clone(),
                metadata: node.metadata.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        graph.node_ids.insert(node.key.clone(), id.clone());
        Ok(NodeOutcome {
            node_id: id,
            created: true,
        })
    }

    fn create_edge(&self, edge: &NewEdge) -> Result<EdgeOutcome> {
        let mut graph = self.graph.write();
        for node_id in [&edge.source_id, &edge.target_id] {
            if !graph.nodes.contains_key(node_id) {
                return Err(StoreError::NodeNotFound(node_id.clone()));
            }
        }

        let duplicate = graph
            .edges_of(&graph.outgoing, &edge.source_id)
            .into_iter()
            .find(|existing| edge.duplicates(existing));
        if let Some(existing) = duplicate {
            return Ok(EdgeOutcome {
                edge_id: existing.id,
                created: false,
                duplicate: true,
            });
        }

        let id = new_id();
        graph.edges.insert(
            id.clone(),
            LineageEdge {
                id: id.clone(),
                source_id: edge.source_id.clone(),
                target_id: edge.target_id.clone(),
                edge_type: edge.edge_type,
                transformation_type: edge.transformation_type,
                transformation_subtype: edge.transformation_subtype,
                description: edge.description.clone(),
                job_id: edge.job_id.clone(),
                sql_hash: edge.sql_hash.clone(),
                created_at: Utc::now(),
            },
        );
        graph
            .outgoing
            .entry(edge.source_id.clone())
            .or_default()
            .push(id.clone());
        graph
            .incoming
            .entry(edge.target_id.clone())
            .or_default()
            .push(id.clone());
        Ok(EdgeOutcome {
            edge_id: id,
            created: true,
            duplicate: false,
        })
    }

    fn get_node(&self, id: &str) -> Result<Option<LineageNode>> {
        Ok(self.graph.read().nodes.get(id).cloned())
    }

    fn find_node(&self, key: &NodeKey) -> Result<Option<LineageNode>> {
        let graph = self.graph.read();
        Ok(graph
            .node_ids
            .get(key)
            .and_then(|id| graph.nodes.get(id))
            .cloned())
    }

    fn outgoing_edges(&self, node_id: &str) -> Result<Vec<LineageEdge>> {
        let graph = self.graph.read();
        Ok(graph.edges_of(&graph.outgoing, node_id))
    }

    fn incoming_edges(&self, node_id: &str) -> Result<Vec<LineageEdge>> {
        let graph = self.graph.read();
        Ok(graph.edges_of(&graph.incoming, node_id))
    }

    fn count_edges_with_sql_hash(&self, sql_hash: &str) -> Result<usize> {
        Ok(self
            .graph
            .read()
            .edges
            .values()
            .filter(|edge| edge.sql_hash.as_deref() == Some(sql_hash))
            .count())
    }

    fn node_count(&self) -> Result<usize> {
        Ok(self.graph.read().nodes.len())
    }

    fn edge_count(&self) -> Result<usize> {
        Ok(self.graph.read().edges.len())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::lineage::TransformationSubtype;
    use crate::store::{LineageStore, NewEdge, NodeKey, NodeUpsert, StoreError};

    #[test]
    fn test_upsert_replaces_mutable_fields() {
        let store = MemoryStore::new();
        let key = NodeKey::dataset("redshift://analytics", "orders");
        let first = store
            .upsert_node(&NodeUpsert::new(key.clone()).with_data_type(Some("table".to_owned())))
            .unwrap();
        let second = store.upsert_node(&NodeUpsert::new(key.clone())).unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.node_id, second.node_id);
        let node = store.find_node(&key).unwrap().unwrap();
        assert_eq!(node.data_type, None);
        assert_eq!(store.node_count().unwrap(), 1);
    }

    #[test]
    fn test_null_parent_is_distinct_identity() {
        let store = MemoryStore::new();
        let dataset = store
            .upsert_node(&NodeUpsert::new(NodeKey::dataset("ns", "id")))
            .unwrap();
        let column = store
            .upsert_node(&NodeUpsert::new(NodeKey::column("ns", "id", &dataset.node_id)))
            .unwrap();
        assert!(column.created);
        assert_ne!(dataset.node_id, column.node_id);
    }

    #[test]
    fn test_edge_requires_existing_nodes() {
        let store = MemoryStore::new();
        let edge = NewEdge::new("a", "b", TransformationSubtype::Identity);
        assert!(matches!(
            store.create_edge(&edge),
            Err(StoreError::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_concurrent_upserts_create_one_node() {
        let store = MemoryStore::new();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    store
                        .upsert_node(&NodeUpsert::new(NodeKey::dataset("ns", "orders")))
                        .unwrap();
                });
            }
        });
        assert_eq!(store.node_count().unwrap(), 1);
    }
}
