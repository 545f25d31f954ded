use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use super::{
    EdgeOutcome, LineageEdge, LineageNode, LineageStore, NewEdge, NodeKey, NodeOutcome,
    NodeUpsert, Result, StoreError, new_id,
};

/// Identity tuples are enforced by unique indexes, a missing `parent_id` / `sql_hash`
/// being indexed as the empty string.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS lineage_nodes (
    id TEXT PRIMARY KEY,
    node_type TEXT NOT NULL,
    namespace TEXT NOT NULL,
    name TEXT NOT NULL,
    parent_id TEXT REFERENCES lineage_nodes(id) ON DELETE CASCADE,
    data_type TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_lineage_nodes_identity
    ON lineage_nodes(node_type, namespace, name, COALESCE(parent_id, ''));
CREATE INDEX IF NOT EXISTS idx_lineage_nodes_parent ON lineage_nodes(parent_id);

CREATE TABLE IF NOT EXISTS lineage_edges (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES lineage_nodes(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES lineage_nodes(id) ON DELETE CASCADE,
    edge_type TEXT NOT NULL,
    transformation_type TEXT NOT NULL,
    transformation_subtype TEXT NOT NULL,
    description TEXT,
    job_id TEXT,
    sql_hash TEXT,
    created_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_lineage_edges_identity
    ON lineage_edges(source_id, target_id, COALESCE(sql_hash, ''));
CREATE INDEX IF NOT EXISTS idx_lineage_edges_target ON lineage_edges(target_id);
CREATE INDEX IF NOT EXISTS idx_lineage_edges_sql_hash ON lineage_edges(sql_hash);
"#;

const NODE_COLUMNS: &str =
    "id, node_type, namespace, name, parent_id, data_type, metadata, created_at, updated_at";

const EDGE_COLUMNS: &str = "id, source_id, target_id, edge_type, transformation_type, \
     transformation_subtype, description, job_id, sql_hash, created_at";

struct RawNode {
    id: String,
    node_type: String,
    namespace: String,
    name: String,
    parent_id: Option<String>,
    data_type: Option<String>,
    metadata: String,
    created_at: String,
    updated_at: String,
}

impl RawNode {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            node_type: row.get(1)?,
            namespace: row.get(2)?,
            name: row.get(3)?,
            parent_id: row.get(4)?,
            data_type: row.get(5)?,
            metadata: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_node(self) -> Result<LineageNode> {
        Ok(LineageNode {
            node_type: parse_enum(&self.node_type, "node type")?,
            metadata: serde_json::from_str(&self.metadata)?,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
            id: self.id,
            namespace: self.namespace,
            name: self.name,
            parent_id: self.parent_id,
            data_type: self.data_type,
        })
    }
}

struct RawEdge {
    id: String,
    source_id: String,
    target_id: String,
    edge_type: String,
    transformation_type: String,
    transformation_subtype: String,
    description: Option<String>,
    job_id: Option<String>,
    sql_hash: Option<String>,
    created_at: String,
}

impl RawEdge {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source_id: row.get(1)?,
            target_id: row.get(2)?,
            edge_type: row.get(3)?,
            transformation_type: row.get(4)?,
            transformation_subtype: row.get(5)?,
            description: row.get(6)?,
            job_id: row.get(7)?,
            sql_hash: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_edge(self) -> Result<LineageEdge> {
        Ok(LineageEdge {
            edge_type: parse_enum(&self.edge_type, "edge type")?,
            transformation_type: parse_enum(&self.transformation_type, "transformation type")?,
            transformation_subtype: parse_enum(
                &self.transformation_subtype,
                "transformation subtype",
            )?,
            created_at: parse_time(&self.created_at)?,
            id: self.id,
            source_id: self.source_id,
            target_id: self.target_id,
            description: self.description,
            job_id: self.job_id,
            sql_hash: self.sql_hash,
        })
    }
}

fn parse_enum<T: FromStr>(value: &str, what: &str) -> Result<T> {
    T::from_str(value).map_err(|_| StoreError::Corrupt(format!("invalid {} `{}`", what, value)))
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|err| StoreError::Corrupt(format!("invalid timestamp `{}`: {}", value, err)))
}

fn node_exists(conn: &Connection, id: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM lineage_nodes WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?)
}

fn find_node_id(conn: &Connection, key: &NodeKey) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM lineage_nodes \
             WHERE node_type = ?1 AND namespace = ?2 AND name = ?3 \
             AND COALESCE(parent_id, '') = COALESCE(?4, '')",
            params![key.node_type.as_ref(), key.namespace, key.name, key.parent_id],
            |row| row.get(0),
        )
        .optional()?)
}

fn find_duplicate_edge(conn: &Connection, edge: &NewEdge) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM lineage_edges \
             WHERE source_id = ?1 AND target_id = ?2 AND (?3 IS NULL OR sql_hash = ?3) \
             ORDER BY rowid LIMIT 1",
            params![edge.source_id, edge.target_id, edge.sql_hash],
            |row| row.get(0),
        )
        .optional()?)
}

/// Lineage graph persisted in a SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        // Writers from other processes hold the file lock for one short transaction
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn count(&self, sql: &str, params: impl rusqlite::Params) -> Result<usize> {
        let count: i64 = self.conn.lock().query_row(sql, params, |row| row.get(0))?;
        usize::try_from(count).map_err(|_| StoreError::Corrupt(format!("negative count {}", count)))
    }

    fn edges_where(&self, column: &str, node_id: &str) -> Result<Vec<LineageEdge>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM lineage_edges WHERE {} = ?1 ORDER BY rowid",
            EDGE_COLUMNS, column
        ))?;
        let raw_edges = stmt
            .query_map([node_id], RawEdge::from_row)?
            .collect::<rusqlite::Result<Vec<RawEdge>>>()?;
        raw_edges.into_iter().map(RawEdge::into_edge).collect()
    }
}

impl LineageStore for SqliteStore {
    fn upsert_node(&self, node: &NodeUpsert) -> Result<NodeOutcome> {
        node.key.validate()?;
        let metadata = serde_json::to_string(&node.metadata)?;
        let now = Utc::now().to_rfc3339();

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Some(parent_id) = &node.key.parent_id {
            if !node_exists(&tx, parent_id)? {
                return Err(StoreError::NodeNotFound(parent_id.clone()));
            }
        }

        let id = new_id();
        let inserted = tx.execute(
            &format!(
                "INSERT OR IGNORE INTO lineage_nodes ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                NODE_COLUMNS
            ),
            params![
                id,
                node.key.node_type.as_ref(),
                node.key.namespace,
                node.key.name,
                node.key.parent_id,
                node.data_type,
                metadata,
                now,
            ],
        )?;

        let outcome = if inserted == 1 {
            NodeOutcome {
                node_id: id,
                created: true,
            }
        } else {
            let existing = find_node_id(&tx, &node.key)?.ok_or_else(|| {
                StoreError::Corrupt(format!("node `{}` conflicts but cannot be found", node.key.name))
            })?;
            tx.execute(
                "UPDATE lineage_nodes SET data_type = ?1, metadata = ?2, updated_at = ?3 WHERE id = ?4",
                params![node.data_type, metadata, now, existing],
            )?;
            NodeOutcome {
                node_id: existing,
                created: false,
            }
        };
        tx.commit()?;
        Ok(outcome)
    }

    fn create_edge(&self, edge: &NewEdge) -> Result<EdgeOutcome> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for node_id in [&edge.source_id, &edge.target_id] {
            if !node_exists(&tx, node_id)? {
                return Err(StoreError::NodeNotFound(node_id.clone()));
            }
        }

        if let Some(existing) = find_duplicate_edge(&tx, edge)? {
            return Ok(EdgeOutcome {
                edge_id: existing,
                created: false,
                duplicate: true,
            });
        }

        let id = new_id();
        let inserted = tx.execute(
            &format!(
                "INSERT OR IGNORE INTO lineage_edges ({}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                EDGE_COLUMNS
            ),
            params![
                id,
                edge.source_id,
                edge.target_id,
                edge.edge_type.as_ref(),
                edge.transformation_type.as_ref(),
                edge.transformation_subtype.as_ref(),
                edge.description,
                edge.job_id,
                edge.sql_hash,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let outcome = if inserted == 1 {
            EdgeOutcome {
                edge_id: id,
                created: true,
                duplicate: false,
            }
        } else {
            // Lost an insert race against another connection to the same file
            let existing = find_duplicate_edge(&tx, edge)?.ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "edge `{}` -> `{}` conflicts but cannot be found",
                    edge.source_id, edge.target_id
                ))
            })?;
            EdgeOutcome {
                edge_id: existing,
                created: false,
                duplicate: true,
            }
        };
        tx.commit()?;
        Ok(outcome)
    }

    fn get_node(&self, id: &str) -> Result<Option<LineageNode>> {
        let raw = self
            .conn
            .lock()
            .query_row(
                &format!("SELECT {} FROM lineage_nodes WHERE id = ?1", NODE_COLUMNS),
                [id],
                RawNode::from_row,
            )
            .optional()?;
        raw.map(RawNode::into_node).transpose()
    }

    fn find_node(&self, key: &NodeKey) -> Result<Option<LineageNode>> {
        let id = find_node_id(&self.conn.lock(), key)?;
        match id {
            Some(id) => self.get_node(&id),
            None => Ok(None),
        }
    }

    fn outgoing_edges(&self, node_id: &str) -> Result<Vec<LineageEdge>> {
        self.edges_where("source_id", node_id)
    }

    fn incoming_edges(&self, node_id: &str) -> Result<Vec<LineageEdge>> {
        self.edges_where("target_id", node_id)
    }

    fn count_edges_with_sql_hash(&self, sql_hash: &str) -> Result<usize> {
        self.count(
            "SELECT COUNT(*) FROM lineage_edges WHERE sql_hash = ?1",
            [sql_hash],
        )
    }

    fn node_count(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM lineage_nodes", [])
    }

    fn edge_count(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM lineage_edges", [])
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteStore;
    use crate::lineage::TransformationSubtype;
    use crate::store::{LineageStore, NewEdge, NodeKey, NodeType, NodeUpsert};

    fn column(store: &SqliteStore, table: &str, name: &str) -> String {
        let dataset = store
            .upsert_node(&NodeUpsert::new(NodeKey::dataset("ns", table)))
            .unwrap();
        store
            .upsert_node(&NodeUpsert::new(NodeKey::column("ns", name, &dataset.node_id)))
            .unwrap()
            .node_id
    }

    #[test]
    fn test_node_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let outcome = store
            .upsert_node(
                &NodeUpsert::new(NodeKey::job("airflow", "etl"))
                    .with_metadata(serde_json::json!({"run_id": "r1"})),
            )
            .unwrap();
        let node = store.get_node(&outcome.node_id).unwrap().unwrap();
        assert_eq!(node.node_type, NodeType::Job);
        assert_eq!(node.metadata["run_id"], "r1");
        assert_eq!(node.parent_id, None);
        assert!(store.get_node("missing").unwrap().is_none());
    }

    #[test]
    fn test_upsert_is_keyed_by_identity() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = column(&store, "orders", "id");
        let b = column(&store, "orders", "id");
        let c = column(&store, "users", "id");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(store.node_count().unwrap(), 4);
    }

    #[test]
    fn test_edge_dedup_by_sql_hash() {
        let store = SqliteStore::open_in_memory().unwrap();
        let source = column(&store, "orders", "amount");
        let target = column(&store, "totals", "total");

        let mut edge = NewEdge::new(&source, &target, TransformationSubtype::Aggregation);
        edge.sql_hash = Some("h1".to_owned());
        let first = store.create_edge(&edge).unwrap();
        let second = store.create_edge(&edge).unwrap();
        assert!(first.created);
        assert!(second.duplicate);
        assert_eq!(first.edge_id, second.edge_id);

        edge.sql_hash = Some("h2".to_owned());
        assert!(store.create_edge(&edge).unwrap().created);

        edge.sql_hash = None;
        assert!(store.create_edge(&edge).unwrap().duplicate);
        assert_eq!(store.edge_count().unwrap(), 2);
        assert_eq!(store.count_edges_with_sql_hash("h1").unwrap(), 1);

        let outgoing = store.outgoing_edges(&source).unwrap();
        assert_eq!(outgoing.len(), 2);
        assert_eq!(
            outgoing[0].transformation_subtype,
            TransformationSubtype::Aggregation
        );
        assert_eq!(store.incoming_edges(&target).unwrap().len(), 2);
    }

    #[test]
    fn test_reopen_keeps_graph() {
        let path = std::env::temp_dir().join(format!("sqlineage-{}.db", uuid::Uuid::new_v4()));
        {
            let store = SqliteStore::open(&path).unwrap();
            column(&store, "orders", "id");
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.node_count().unwrap(), 2);
        assert!(
            store
                .find_node(&NodeKey::dataset("ns", "orders"))
                .unwrap()
                .is_some()
        );
        drop(store);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_connections_to_one_file_wait_for_each_other() {
        let path = std::env::temp_dir().join(format!("sqlineage-{}.db", uuid::Uuid::new_v4()));
        let stores = [
            SqliteStore::open(&path).unwrap(),
            SqliteStore::open(&path).unwrap(),
        ];
        std::thread::scope(|s| {
            for store in &stores {
                s.spawn(move || {
                    for i in 0..50 {
                        column(store, "orders", &format!("c{}", i));
                    }
                });
            }
        });
        assert_eq!(stores[0].node_count().unwrap(), 51);
        assert_eq!(stores[1].node_count().unwrap(), 51);
        drop(stores);
        let _ = std::fs::remove_file(&path);
    }
}
