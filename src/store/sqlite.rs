//! SQLite backend
//!
//! The three tables become relational tables. Name order is delegated to a
//! registered collation backed by the same [`Collator`] the key-value backends use,
//! so `ORDER BY` reproduces the NameIndex order. The database runs in WAL mode
//! with one writer and one reader connection; a cursor is captured inside a read
//! transaction and therefore never waits for or observes an in-flight replace.

use crate::collation::Collator;
use crate::error::StorageError;
use crate::schema::{validate_name, NodeRecord, SchemaError, SCHEMA_VERSION};
use crate::store::cursor::{CursorSlot, NodeCursor};
use crate::store::kv::FaultPoint;
use crate::store::replace::{plan_replace, PlanSource, ReplacePlan};
use crate::store::NodeDb;
use crate::tree::node::{DirectoryNode, Node, ROOT_DIRECTORY_NAME};
use crate::types::{NodeId, NodeKind, SortType, ROOT_NODE_ID, ROOT_PARENT_NODE_ID};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Database file inside the store directory
pub const DATABASE_FILE_NAME: &str = "nodedb.sqlite3";

const NAME_COLLATION: &str = "nodedb_name";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS nodes (
    node_id INTEGER PRIMARY KEY,
    type    INTEGER NOT NULL,
    name    TEXT NOT NULL,
    stamp   INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS relationships (
    parent_id INTEGER NOT NULL,
    node_id   INTEGER NOT NULL,
    PRIMARY KEY (parent_id, node_id)
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS relationships_by_node ON relationships (node_id);
CREATE TABLE IF NOT EXISTS name_index (
    parent_id INTEGER NOT NULL,
    node_id   INTEGER NOT NULL,
    mtime     INTEGER NOT NULL,
    type      INTEGER NOT NULL,
    name      TEXT NOT NULL COLLATE nodedb_name,
    PRIMARY KEY (parent_id, type, name, node_id)
) WITHOUT ROWID;
";

const META_SCHEMA_VERSION: &str = "schema_version";
const META_NEXT_NODE_ID: &str = "next_node_id";
const META_COLLATION: &str = "collation";

/// NodeDB over a SQLite database in a store directory
pub struct SqliteNodeDb {
    path: PathBuf,
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    fault: FaultPoint,
}

impl SqliteNodeDb {
    pub fn open(path: &Path, collator: Collator) -> Result<Self, StorageError> {
        std::fs::create_dir_all(path)?;
        let file = path.join(DATABASE_FILE_NAME);
        let mut writer = connect(&file, &collator)?;
        writer.execute_batch(SCHEMA)?;
        bootstrap(&mut writer, &collator)?;
        let reader = connect(&file, &collator)?;
        info!(path = %file.display(), "Opened sqlite node store");
        Ok(SqliteNodeDb {
            path: file,
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            fault: FaultPoint::default(),
        })
    }

    /// Database file backing this store.
    pub fn database_path(&self) -> &Path {
        &self.path
    }

    fn commit(&self, tx: &Transaction<'_>, plan: &ReplacePlan) -> Result<(), StorageError> {
        for removal in &plan.removals {
            self.fault.check()?;
            tx.execute(
                "DELETE FROM nodes WHERE node_id = ?1",
                params![removal.node_id],
            )?;
            tx.execute(
                "DELETE FROM relationships WHERE parent_id = ?1 AND node_id = ?2",
                params![removal.parent_id, removal.node_id],
            )?;
            tx.execute(
                "DELETE FROM name_index WHERE parent_id = ?1 AND node_id = ?2",
                params![removal.parent_id, removal.node_id],
            )?;
        }

        let mut upsert_node = tx.prepare_cached(
            "INSERT OR REPLACE INTO nodes (node_id, type, name, stamp) VALUES (?1, ?2, ?3, ?4)",
        )?;
        let mut link = tx.prepare_cached(
            "INSERT OR IGNORE INTO relationships (parent_id, node_id) VALUES (?1, ?2)",
        )?;
        let mut unindex =
            tx.prepare_cached("DELETE FROM name_index WHERE parent_id = ?1 AND node_id = ?2")?;
        let mut index = tx.prepare_cached(
            "INSERT INTO name_index (parent_id, node_id, mtime, type, name)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for upsert in &plan.upserts {
            self.fault.check()?;
            let record = &upsert.record;
            validate_name(&record.name)?;
            let mtime = match record.kind {
                NodeKind::File => record.stamp,
                NodeKind::Directory => 0,
            };
            upsert_node.execute(params![
                upsert.node_id,
                record.kind.tag(),
                record.name,
                to_sql_stamp(record.stamp)
            ])?;
            link.execute(params![plan.target_id, upsert.node_id])?;
            unindex.execute(params![plan.target_id, upsert.node_id])?;
            index.execute(params![
                plan.target_id,
                upsert.node_id,
                to_sql_stamp(mtime),
                record.kind.tag(),
                record.name
            ])?;
        }

        self.fault.check()?;
        tx.execute(
            "UPDATE nodes SET stamp = ?2 WHERE node_id = ?1",
            params![plan.target_id, to_sql_stamp(plan.target_record.stamp)],
        )?;
        set_meta(tx, META_NEXT_NODE_ID, &plan.next_node_id.to_string())?;
        Ok(())
    }
}

fn connect(file: &Path, collator: &Collator) -> Result<Connection, StorageError> {
    let conn = Connection::open(file)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        debug!(mode = %mode, "SQLite refused WAL journal mode");
    }
    let collator = collator.clone();
    conn.create_collation(NAME_COLLATION, move |a: &str, b: &str| {
        collator.compare(a, b)
    })?;
    Ok(conn)
}

fn bootstrap(conn: &mut Connection, collator: &Collator) -> Result<(), StorageError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    match get_meta(&tx, META_SCHEMA_VERSION)? {
        Some(version) => {
            if version != SCHEMA_VERSION.to_string() {
                return Err(StorageError::corruption(format!(
                    "schema version {} is not supported (expected {})",
                    version, SCHEMA_VERSION
                )));
            }
            match SqlPlanSource(&tx).node_record(ROOT_NODE_ID)? {
                Some(record) if record.kind == NodeKind::Directory => {}
                _ => return Err(StorageError::corruption("root directory record missing")),
            }
            if get_meta(&tx, META_COLLATION)?.as_deref() != Some(collator.name().as_str()) {
                // The persisted index order follows the previous collation.
                tx.execute_batch(&format!("REINDEX {}", NAME_COLLATION))?;
                set_meta(&tx, META_COLLATION, &collator.name())?;
                info!(collation = %collator.name(), "Rebuilt name index for new collation");
            }
        }
        None => {
            tx.execute(
                "INSERT INTO nodes (node_id, type, name, stamp) VALUES (?1, ?2, ?3, 0)",
                params![ROOT_NODE_ID, NodeKind::Directory.tag(), ROOT_DIRECTORY_NAME],
            )?;
            set_meta(&tx, META_SCHEMA_VERSION, &SCHEMA_VERSION.to_string())?;
            set_meta(&tx, META_NEXT_NODE_ID, &(ROOT_NODE_ID + 1).to_string())?;
            set_meta(&tx, META_COLLATION, &collator.name())?;
            info!(collation = %collator.name(), "Bootstrapped sqlite node store");
        }
    }
    tx.commit()?;
    Ok(())
}

fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>, StorageError> {
    Ok(conn
        .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()?)
}

fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

/// SQLite integers are signed; stamps round-trip bit for bit.
fn to_sql_stamp(stamp: u64) -> i64 {
    stamp as i64
}

fn from_sql_stamp(value: i64) -> u64 {
    value as u64
}

fn record_from_columns(
    kind: Option<i64>,
    name: Option<String>,
    stamp: Option<i64>,
) -> Result<Option<NodeRecord>, SchemaError> {
    let (Some(kind), Some(name), Some(stamp)) = (kind, name, stamp) else {
        return Ok(None);
    };
    let kind = u8::try_from(kind)
        .ok()
        .and_then(NodeKind::from_tag)
        .ok_or_else(|| SchemaError::MalformedRecord(format!("unknown node type {}", kind)))?;
    if name.is_empty() {
        return Err(SchemaError::MalformedRecord("empty name".to_string()));
    }
    Ok(Some(NodeRecord {
        kind,
        name,
        stamp: from_sql_stamp(stamp),
    }))
}

struct SqlPlanSource<'a>(&'a Connection);

impl PlanSource for SqlPlanSource<'_> {
    fn node_record(&self, node_id: NodeId) -> Result<Option<NodeRecord>, StorageError> {
        let row = self
            .0
            .query_row(
                "SELECT type, name, stamp FROM nodes WHERE node_id = ?1",
                params![node_id],
                |row| {
                    Ok((
                        row.get::<_, Option<i64>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((kind, name, stamp)) => Ok(record_from_columns(kind, name, stamp)?),
            None => Ok(None),
        }
    }

    fn child_ids(&self, parent_id: NodeId) -> Result<Vec<NodeId>, StorageError> {
        let mut stmt = self
            .0
            .prepare_cached("SELECT node_id FROM relationships WHERE parent_id = ?1")?;
        let ids = stmt
            .query_map(params![parent_id], |row| row.get(0))?
            .collect::<Result<Vec<NodeId>, _>>()?;
        Ok(ids)
    }

    fn next_node_id(&self) -> Result<NodeId, StorageError> {
        let value = get_meta(self.0, META_NEXT_NODE_ID)?
            .ok_or_else(|| StorageError::corruption("metadata entry next_node_id missing"))?;
        value.parse().map_err(|_| {
            StorageError::corruption(format!("next_node_id holds {:?}", value))
        })
    }
}

impl NodeDb for SqliteNodeDb {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn root_directory_node(&self) -> DirectoryNode {
        let conn = self.reader.lock();
        match SqlPlanSource(&conn).node_record(ROOT_NODE_ID) {
            Ok(Some(record)) => DirectoryNode {
                node_id: Some(ROOT_NODE_ID),
                name: record.name,
                listing_revision: record.stamp,
                children: Vec::new(),
            },
            _ => DirectoryNode::root(),
        }
    }

    fn cursor_for_directory(
        &self,
        directory: &DirectoryNode,
        sort_type: SortType,
    ) -> Result<Option<NodeCursor>, StorageError> {
        let Some(directory_id) = directory.node_id else {
            return Ok(None);
        };
        let mut conn = self.reader.lock();
        let tx = conn.transaction()?;
        let record = match SqlPlanSource(&tx).node_record(directory_id)? {
            Some(record) if record.kind == NodeKind::Directory => record,
            _ => return Ok(None),
        };

        let sql = match sort_type {
            SortType::Unsorted => {
                "SELECT r.node_id, n.type, n.name, n.stamp
                 FROM relationships r LEFT JOIN nodes n ON n.node_id = r.node_id
                 WHERE r.parent_id = ?1"
            }
            SortType::ByName => {
                "SELECT i.node_id, n.type, n.name, n.stamp
                 FROM name_index i LEFT JOIN nodes n ON n.node_id = i.node_id
                 WHERE i.parent_id = ?1
                 ORDER BY i.type, i.name COLLATE nodedb_name, i.node_id"
            }
        };
        let entries = {
            let mut stmt = tx.prepare_cached(sql)?;
            let rows = stmt.query_map(params![directory_id], |row| {
                Ok((
                    row.get::<_, NodeId>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                ))
            })?;
            let mut entries = Vec::new();
            for row in rows {
                let (node_id, kind, name, stamp) = row?;
                let slot = CursorSlot::from_decoded(record_from_columns(kind, name, stamp));
                entries.push((node_id, slot));
            }
            entries
        };
        tx.commit()?;

        debug!(
            directory = directory_id,
            count = entries.len(),
            ?sort_type,
            "Captured cursor"
        );
        let snapshot = DirectoryNode {
            node_id: Some(directory_id),
            name: record.name,
            listing_revision: record.stamp,
            children: Vec::new(),
        };
        Ok(Some(NodeCursor::new(snapshot, sort_type, entries)))
    }

    fn replace_nodes_in_directory(
        &self,
        target: &mut DirectoryNode,
        children: Vec<Node>,
    ) -> Result<(), StorageError> {
        let mut conn = self.writer.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let plan = plan_replace(&SqlPlanSource(&tx), target, children)?;
        self.commit(&tx, &plan)?;
        tx.commit()?;
        debug!(
            directory = plan.target_id,
            retained = plan.retained(),
            added = plan.added(),
            removed = plan.removals.len(),
            "Replaced directory children"
        );
        plan.apply_to(target);
        Ok(())
    }

    fn parent_of(&self, node_id: NodeId) -> Result<Option<NodeId>, StorageError> {
        if node_id == ROOT_NODE_ID {
            return Ok(Some(ROOT_PARENT_NODE_ID));
        }
        let conn = self.reader.lock();
        Ok(conn
            .query_row(
                "SELECT parent_id FROM relationships WHERE node_id = ?1",
                params![node_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn flush(&self) -> Result<(), StorageError> {
        let conn = self.writer.lock();
        conn.query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_| Ok(()))?;
        Ok(())
    }
}
