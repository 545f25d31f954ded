//! Impact (downstream) and root-cause (upstream) analysis over the stored lineage graph.
use std::collections::{HashSet, VecDeque};

use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

use crate::lineage::{TransformationSubtype, TransformationType};
use crate::store::{LineageEdge, LineageNode, LineageStore, NodeKey, NodeType, StoreError};

pub const NO_DOWNSTREAM_MESSAGE: &str = "No downstream dependencies found";
pub const NO_UPSTREAM_MESSAGE: &str = "No upstream sources found (this may be a root source)";

/// The step of a by-name column lookup that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum LookupFailure {
    #[error("Dataset '{table}' not found in namespace '{namespace}'")]
    DatasetNotFound { namespace: String, table: String },

    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound {
        column: String,
        table: String,
        dataset_id: String,
    },
}

#[derive(Debug, Error)]
pub enum TraversalError {
    #[error(transparent)]
    NotFound(#[from] LookupFailure),

    #[error("Impact analysis failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Downstream,
    Upstream,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AffectedNode {
    pub id: String,
    pub node_type: NodeType,
    pub namespace: String,
    pub name: String,
    pub parent_id: Option<String>,
    /// Hops from the root, 1 for direct neighbors.
    pub depth: usize,
    /// Transformation of the edge through which the node was first reached.
    pub transformation_type: TransformationType,
    pub transformation_subtype: TransformationSubtype,
}

impl AffectedNode {
    fn new(node: LineageNode, depth: usize, edge: &LineageEdge) -> Self {
        Self {
            id: node.id,
            node_type: node.node_type,
            namespace: node.namespace,
            name: node.name,
            parent_id: node.parent_id,
            depth,
            transformation_type: edge.transformation_type,
            transformation_subtype: edge.transformation_subtype,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactResult {
    pub root_node: LineageNode,
    /// Sorted by depth, ties in discovery order.
    pub affected_nodes: Vec<AffectedNode>,
    pub total_count: usize,
    pub max_depth_reached: usize,
    pub analysis_type: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ImpactResult {
    fn new(
        root_node: LineageNode,
        affected_nodes: Vec<AffectedNode>,
        direction: Direction,
    ) -> Self {
        let message = affected_nodes.is_empty().then(|| {
            match direction {
                Direction::Downstream => NO_DOWNSTREAM_MESSAGE,
                Direction::Upstream => NO_UPSTREAM_MESSAGE,
            }
            .to_owned()
        });
        Self {
            total_count: affected_nodes.len(),
            max_depth_reached: affected_nodes.iter().map(|n| n.depth).max().unwrap_or(0),
            root_node,
            affected_nodes,
            analysis_type: direction,
            message,
        }
    }
}

pub struct ImpactAnalyzer<'s, S: LineageStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: LineageStore + ?Sized> ImpactAnalyzer<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Resolves `table` to a dataset node in `namespace`, then `column` to a column of it.
    pub fn find_column_by_name(
        &self,
        namespace: &str,
        table: &str,
        column: &str,
    ) -> Result<LineageNode, TraversalError> {
        let dataset = self
            .store
            .find_node(&NodeKey::dataset(namespace, table))?
            .ok_or_else(|| LookupFailure::DatasetNotFound {
                namespace: namespace.to_owned(),
                table: table.to_owned(),
            })?;
        let column_node = self
            .store
            .find_node(&NodeKey::column(namespace, column, &dataset.id))?
            .ok_or_else(|| LookupFailure::ColumnNotFound {
                column: column.to_owned(),
                table: table.to_owned(),
                dataset_id: dataset.id.clone(),
            })?;
        Ok(column_node)
    }

    /// Nodes derived from `node_id`, at most `max_depth` hops away.
    pub fn downstream(
        &self,
        node_id: &str,
        max_depth: usize,
    ) -> Result<ImpactResult, TraversalError> {
        self.traverse(node_id, max_depth, Direction::Downstream)
    }

    /// Nodes `node_id` is derived from, at most `max_depth` hops away.
    pub fn upstream(
        &self,
        node_id: &str,
        max_depth: usize,
    ) -> Result<ImpactResult, TraversalError> {
        self.traverse(node_id, max_depth, Direction::Upstream)
    }

    fn traverse(
        &self,
        node_id: &str,
        max_depth: usize,
        direction: Direction,
    ) -> Result<ImpactResult, TraversalError> {
        let root = self
            .store
            .get_node(node_id)?
            .ok_or_else(|| StoreError::NodeNotFound(node_id.to_owned()))?;

        // Breadth-first, so the first visit of a node is at its minimum depth
        let mut visited = HashSet::from([root.id.clone()]);
        let mut queue = VecDeque::from([(root.id.clone(), 0)]);
        let mut affected_nodes = vec![];
        while let Some((id, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let edges = match direction {
                Direction::Downstream => self.store.outgoing_edges(&id)?,
                Direction::Upstream => self.store.incoming_edges(&id)?,
            };
            for edge in edges {
                let next = match direction {
                    Direction::Downstream => edge.target_id.clone(),
                    Direction::Upstream => edge.source_id.clone(),
                };
                if !visited.insert(next.clone()) {
                    continue;
                }
                // Removed by a concurrent writer
                let Some(node) = self.store.get_node(&next)? else {
                    continue;
                };
                affected_nodes.push(AffectedNode::new(node, depth + 1, &edge));
                queue.push_back((next, depth + 1));
            }
        }

        log::debug!(
            "{} of {}: {} nodes within {} hops",
            direction,
            root.name,
            affected_nodes.len(),
            max_depth
        );
        Ok(ImpactResult::new(root, affected_nodes, direction))
    }
}

#[cfg(test)]
mod tests {
    use super::{Direction, ImpactAnalyzer, NO_UPSTREAM_MESSAGE, TraversalError};
    use crate::lineage::TransformationSubtype;
    use crate::store::{LineageStore, MemoryStore, NewEdge, NodeKey, NodeUpsert, StoreError};

    #[test]
    fn test_root_without_edges() {
        let store = MemoryStore::new();
        let dataset = store
            .upsert_node(&NodeUpsert::new(NodeKey::dataset("ns", "t")))
            .unwrap();
        let analyzer = ImpactAnalyzer::new(&store);
        let result = analyzer.upstream(&dataset.node_id, 10).unwrap();
        assert!(result.affected_nodes.is_empty());
        assert_eq!(result.max_depth_reached, 0);
        assert_eq!(result.analysis_type, Direction::Upstream);
        assert_eq!(result.message.as_deref(), Some(NO_UPSTREAM_MESSAGE));
    }

    #[test]
    fn test_unknown_root_is_an_error() {
        let store = MemoryStore::new();
        let analyzer = ImpactAnalyzer::new(&store);
        assert!(matches!(
            analyzer.downstream("missing", 3),
            Err(TraversalError::Store(StoreError::NodeNotFound(_)))
        ));
    }

    #[test]
    fn test_cycle_terminates() {
        let store = MemoryStore::new();
        let dataset = store
            .upsert_node(&NodeUpsert::new(NodeKey::dataset("ns", "t")))
            .unwrap()
            .node_id;
        let ids: Vec<String> = ["a", "b"]
            .iter()
            .map(|name| {
                store
                    .upsert_node(&NodeUpsert::new(NodeKey::column("ns", name, &dataset)))
                    .unwrap()
                    .node_id
            })
            .collect();
        for (source, target) in [(&ids[0], &ids[1]), (&ids[1], &ids[0])] {
            store
                .create_edge(&NewEdge::new(source, target, TransformationSubtype::Identity))
                .unwrap();
        }
        let result = ImpactAnalyzer::new(&store).downstream(&ids[0], 50).unwrap();
        assert_eq!(result.total_count, 1);
        assert_eq!(result.affected_nodes[0].id, ids[1]);
    }
}
