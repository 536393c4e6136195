//! SQLite-backed artifact graph store.
//!
//! One [`Connection`] guarded by a mutex. Every public operation takes the lock
//! once and runs to completion, so in-process callers observe each operation
//! atomically. Cross-process writers are serialised one level up by the
//! per-project build lock.

use super::schema;
use super::{Edge, NewNode, Node, NodeFilter, NodeStatus, NodeType};
use crate::core::IntentError;
use crate::utils::{ensure_dir, hash_json, hash_text};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

const NODE_COLUMNS: &str = "seq, id, parent_id, scope_id, status, node_type, name, \
     text_content, text_content_hash, structured_content, structured_content_hash, \
     structured_updated_at, created_at";

const SUBTREE_CTE: &str = "WITH RECURSIVE subtree(id) AS ( \
         SELECT id FROM nodes WHERE id = ?1 \
         UNION ALL \
         SELECT n.id FROM nodes n JOIN subtree s ON n.parent_id = s.id \
     )";

/// Persisted tree of typed, named nodes.
#[derive(Debug)]
pub struct GraphStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl GraphStore {
    /// Open (or create) the graph database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open graph database: {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Create an in-memory store.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Location of the database file, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA synchronous = NORMAL;")?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(journal_mode = %mode, "Opened graph database");
        conn.execute_batch(schema::SCHEMA_SQL).context("Failed to migrate graph schema")?;
        conn.execute(
            "INSERT OR IGNORE INTO intentcode_meta (key, value) VALUES ('schema_version', ?1)",
            params![schema::SCHEMA_VERSION],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("Graph store lock poisoned"))
    }

    /// Run `f` with exclusive access to the underlying connection.
    pub(crate) fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Look a node up by id, whatever its status.
    pub fn get_by_id(&self, id: &str) -> Result<Option<Node>> {
        let conn = self.lock()?;
        node_by_id(&conn, id)
    }

    /// Look a non-deleted node up by its unique key. A miss is `None`.
    pub fn get_by_unique_key(
        &self,
        parent_id: Option<&str>,
        scope_id: &str,
        node_type: NodeType,
        name: &str,
    ) -> Result<Option<Node>> {
        let conn = self.lock()?;
        node_by_key(&conn, parent_id, scope_id, node_type, name)
    }

    /// Insert a new node.
    ///
    /// Fails with [`IntentError::InvalidParentType`] when the parent's type does
    /// not allow this node, and with [`IntentError::DuplicateKey`] when the
    /// unique key is taken.
    pub fn create(&self, new: NewNode) -> Result<Node> {
        let conn = self.lock()?;
        insert_node(&conn, &new)
    }

    /// Update by `id`, or when `id` is absent, update the node at the unique key
    /// or create it.
    pub fn upsert(&self, id: Option<&str>, new: NewNode) -> Result<Node> {
        let conn = self.lock()?;
        upsert_node(&conn, id, &new)
    }

    /// Return the node at the unique key, creating it with `new`'s content if missing.
    /// Existing content is left untouched.
    pub fn get_or_create(&self, new: NewNode) -> Result<Node> {
        let conn = self.lock()?;
        match node_by_key(&conn, new.parent_id.as_deref(), &new.scope_id, new.node_type, &new.name)? {
            Some(existing) => Ok(existing),
            None => insert_node(&conn, &new),
        }
    }

    /// Replace a node's structured payload and stamp `structured_updated_at`.
    pub fn set_structured_content(&self, id: &str, value: &serde_json::Value) -> Result<Node> {
        let conn = self.lock()?;
        let hash = hash_json(value);
        let changed = conn.execute(
            "UPDATE nodes SET structured_content = ?2, structured_content_hash = ?3, \
             structured_updated_at = ?4 WHERE id = ?1",
            params![id, serde_json::to_string(value)?, hash, now_string()],
        )?;
        if changed == 0 {
            return Err(IntentError::NodeNotFound {
                id: id.to_string(),
            }
            .into());
        }
        require_node(&conn, id)
    }

    /// Change a node's lifecycle status.
    pub fn set_status(&self, id: &str, status: NodeStatus) -> Result<Node> {
        let conn = self.lock()?;
        conn.execute("UPDATE nodes SET status = ?2 WHERE id = ?1", params![id, status.as_str()])?;
        require_node(&conn, id)
    }

    /// Nodes matching every set predicate of `filter`.
    pub fn filter(&self, filter: &NodeFilter) -> Result<Vec<Node>> {
        let conn = self.lock()?;
        filter_nodes(&conn, filter)
    }

    /// Non-deleted children of a given type, ordered by name.
    pub fn children(&self, parent_id: &str, node_type: NodeType) -> Result<Vec<Node>> {
        self.filter(&NodeFilter::new().parent(parent_id).node_type(node_type).ordered())
    }

    /// The node and all its descendants, parents before children.
    pub fn subtree(&self, id: &str) -> Result<Vec<Node>> {
        let conn = self.lock()?;
        let sql = format!(
            "{SUBTREE_CTE} SELECT {NODE_COLUMNS} FROM nodes WHERE id IN (SELECT id FROM subtree) ORDER BY seq"
        );
        let mut stmt = conn.prepare(&sql)?;
        let nodes = stmt.query_map(params![id], row_to_node)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    /// Delete a node and every node whose parent chain reaches it.
    ///
    /// Generation records and edges of the deleted nodes go with them.
    /// Returns the number of nodes removed.
    pub fn delete_cascade(&self, id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let removed = delete_subtree(&conn, id)?;
        debug!(node = %id, removed, "Cascade-deleted subtree");
        Ok(removed)
    }

    /// Children of `parent_id` with `node_type` beyond the `keep_newest` most
    /// recently created, newest first.
    pub fn get_oldest(
        &self,
        parent_id: &str,
        node_type: NodeType,
        keep_newest: usize,
    ) -> Result<Vec<Node>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {NODE_COLUMNS} FROM nodes \
             WHERE parent_id = ?1 AND node_type = ?2 AND status != 'deleted' \
             ORDER BY seq DESC LIMIT -1 OFFSET ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let nodes = stmt
            .query_map(params![parent_id, node_type.as_str(), keep_newest as i64], row_to_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    /// Add a labelled edge. Adding an existing edge is a no-op.
    pub fn add_edge(&self, from_id: &str, to_id: &str, label: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO edges (from_id, to_id, label, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![from_id, to_id, label, now_string()],
        )?;
        Ok(())
    }

    /// Remove a labelled edge, returning whether it existed.
    pub fn remove_edge(&self, from_id: &str, to_id: &str, label: &str) -> Result<bool> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM edges WHERE from_id = ?1 AND to_id = ?2 AND label = ?3",
            params![from_id, to_id, label],
        )?;
        Ok(removed > 0)
    }

    /// Outgoing edges of a node, ordered by target and label.
    pub fn edges_from(&self, from_id: &str) -> Result<Vec<Edge>> {
        let conn = self.lock()?;
        query_edges(
            &conn,
            "SELECT from_id, to_id, label FROM edges WHERE from_id = ?1 ORDER BY to_id, label",
            from_id,
        )
    }

    /// Incoming edges of a node, ordered by source and label.
    pub fn edges_to(&self, to_id: &str) -> Result<Vec<Edge>> {
        let conn = self.lock()?;
        query_edges(
            &conn,
            "SELECT from_id, to_id, label FROM edges WHERE to_id = ?1 ORDER BY from_id, label",
            to_id,
        )
    }

    /// Copy the subtree rooted at `source_id` under `target_parent_id` in
    /// `target_scope`, preserving type, name and content.
    ///
    /// Nodes already present at a target key are updated in place; target
    /// children with no counterpart in the source are deleted.
    pub fn copy_subtree(
        &self,
        source_id: &str,
        target_parent_id: Option<&str>,
        target_scope: &str,
    ) -> Result<Node> {
        let conn = self.lock()?;
        let source = require_node(&conn, source_id)?;

        if let Some(target) = target_parent_id {
            let inside: bool = conn.query_row(
                &format!("{SUBTREE_CTE} SELECT EXISTS(SELECT 1 FROM subtree WHERE id = ?2)"),
                params![source_id, target],
                |row| row.get(0),
            )?;
            if inside {
                return Err(anyhow!("Cannot copy node {source_id} into its own subtree"));
            }
        }

        let tx = conn.unchecked_transaction()?;
        let copied = copy_node(&tx, &source, target_parent_id, target_scope)?;
        tx.commit()?;
        debug!(source = %source_id, target = %copied.id, scope = %target_scope, "Copied subtree");
        Ok(copied)
    }
}

fn copy_node(
    conn: &Connection,
    source: &Node,
    target_parent_id: Option<&str>,
    target_scope: &str,
) -> Result<Node> {
    let new = NewNode {
        parent_id: target_parent_id.map(str::to_string),
        scope_id: target_scope.to_string(),
        node_type: source.node_type,
        name: source.name.clone(),
        status: source.status,
        text_content: source.text_content.clone(),
        structured_content: source.structured_content.clone(),
    };
    let copied = upsert_node(conn, None, &new)?;

    let children = filter_nodes(conn, &NodeFilter::new().parent(&source.id).ordered())?;
    for child in &children {
        copy_node(conn, child, Some(&copied.id), target_scope)?;
    }

    for stale in filter_nodes(conn, &NodeFilter::new().parent(&copied.id))? {
        let in_source = children.iter().any(|c| c.node_type == stale.node_type && c.name == stale.name);
        if !in_source {
            delete_subtree(conn, &stale.id)?;
        }
    }
    Ok(copied)
}

fn delete_subtree(conn: &Connection, id: &str) -> Result<usize> {
    let removed: i64 = conn.query_row(
        &format!("{SUBTREE_CTE} SELECT COUNT(*) FROM subtree"),
        params![id],
        |row| row.get(0),
    )?;
    let sql = format!("{SUBTREE_CTE} DELETE FROM nodes WHERE id IN (SELECT id FROM subtree)");
    conn.execute(&sql, params![id])?;
    Ok(usize::try_from(removed).unwrap_or_default())
}

fn upsert_node(conn: &Connection, id: Option<&str>, new: &NewNode) -> Result<Node> {
    match id {
        Some(id) => {
            require_node(conn, id)?;
            update_content(conn, id, new)
        }
        None => {
            match node_by_key(conn, new.parent_id.as_deref(), &new.scope_id, new.node_type, &new.name)? {
                Some(existing) => update_content(conn, &existing.id, new),
                None => insert_node(conn, new),
            }
        }
    }
}

fn insert_node(conn: &Connection, new: &NewNode) -> Result<Node> {
    if new.name.is_empty() {
        return Err(missing_field(new.node_type, "name"));
    }
    if new.scope_id.is_empty() {
        return Err(missing_field(new.node_type, "scope_id"));
    }

    let parent_type = match &new.parent_id {
        Some(parent_id) => Some(require_node(conn, parent_id)?.node_type),
        None => None,
    };
    new.node_type.check_parent(parent_type)?;

    if node_by_key(conn, new.parent_id.as_deref(), &new.scope_id, new.node_type, &new.name)?
        .is_some()
    {
        return Err(IntentError::DuplicateKey {
            scope: new.scope_id.clone(),
            node_type: new.node_type.as_str().to_string(),
            name: new.name.clone(),
        }
        .into());
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = now_string();
    let text_hash = new.text_content.as_deref().map(hash_text);
    let structured = new.structured_content.as_ref().map(serde_json::to_string).transpose()?;
    let structured_hash = new.structured_content.as_ref().map(hash_json);
    let structured_at = structured.as_ref().map(|_| now.clone());

    conn.execute(
        "INSERT INTO nodes (id, parent_id, scope_id, status, node_type, name, text_content, \
         text_content_hash, structured_content, structured_content_hash, structured_updated_at, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            id,
            new.parent_id,
            new.scope_id,
            new.status.as_str(),
            new.node_type.as_str(),
            new.name,
            new.text_content,
            text_hash,
            structured,
            structured_hash,
            structured_at,
            now,
        ],
    )?;

    debug!(node_type = %new.node_type, name = %new.name, id = %id, "Created node");
    require_node(conn, &id)
}

fn update_content(conn: &Connection, id: &str, new: &NewNode) -> Result<Node> {
    let text_hash = new.text_content.as_deref().map(hash_text);
    let structured = new.structured_content.as_ref().map(serde_json::to_string).transpose()?;
    let structured_hash = new.structured_content.as_ref().map(hash_json);

    // Right-hand sides see the old row, so the timestamp compares old and new hashes.
    conn.execute(
        "UPDATE nodes SET status = ?2, text_content = ?3, text_content_hash = ?4, \
         structured_updated_at = CASE WHEN IFNULL(structured_content_hash, '') = IFNULL(?6, '') \
             THEN structured_updated_at ELSE ?7 END, \
         structured_content = ?5, structured_content_hash = ?6 \
         WHERE id = ?1",
        params![
            id,
            new.status.as_str(),
            new.text_content,
            text_hash,
            structured,
            structured_hash,
            now_string(),
        ],
    )?;
    require_node(conn, id)
}

fn node_by_id(conn: &Connection, id: &str) -> Result<Option<Node>> {
    let sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], row_to_node).optional()?)
}

fn require_node(conn: &Connection, id: &str) -> Result<Node> {
    node_by_id(conn, id)?.ok_or_else(|| {
        IntentError::NodeNotFound {
            id: id.to_string(),
        }
        .into()
    })
}

fn node_by_key(
    conn: &Connection,
    parent_id: Option<&str>,
    scope_id: &str,
    node_type: NodeType,
    name: &str,
) -> Result<Option<Node>> {
    let sql = format!(
        "SELECT {NODE_COLUMNS} FROM nodes \
         WHERE IFNULL(parent_id, '') = IFNULL(?1, '') AND scope_id = ?2 AND node_type = ?3 \
         AND name = ?4 AND status != 'deleted'"
    );
    Ok(conn
        .query_row(&sql, params![parent_id, scope_id, node_type.as_str(), name], row_to_node)
        .optional()?)
}

fn filter_nodes(conn: &Connection, filter: &NodeFilter) -> Result<Vec<Node>> {
    let mut sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE 1 = 1");
    let mut values: Vec<String> = Vec::new();

    let mut bind = |sql: &mut String, column: &str, value: String| {
        values.push(value);
        sql.push_str(&format!(" AND {column} = ?{}", values.len()));
    };

    if let Some(parent_id) = &filter.parent_id {
        bind(&mut sql, "parent_id", parent_id.clone());
    }
    if filter.roots_only {
        sql.push_str(" AND parent_id IS NULL");
    }
    if let Some(scope_id) = &filter.scope_id {
        bind(&mut sql, "scope_id", scope_id.clone());
    }
    if let Some(node_type) = filter.node_type {
        bind(&mut sql, "node_type", node_type.as_str().to_string());
    }
    if let Some(name) = &filter.name {
        bind(&mut sql, "name", name.clone());
    }
    match filter.status {
        Some(status) => bind(&mut sql, "status", status.as_str().to_string()),
        None if !filter.include_deleted => sql.push_str(" AND status != 'deleted'"),
        None => {}
    }

    if filter.ordered {
        sql.push_str(" ORDER BY IFNULL(parent_id, ''), scope_id, node_type, name, seq");
    } else {
        sql.push_str(" ORDER BY seq");
    }

    let mut stmt = conn.prepare(&sql)?;
    let nodes = stmt
        .query_map(params_from_iter(values.iter()), row_to_node)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(nodes)
}

fn query_edges(conn: &Connection, sql: &str, id: &str) -> Result<Vec<Edge>> {
    let mut stmt = conn.prepare(sql)?;
    let edges = stmt
        .query_map(params![id], |row| {
            Ok(Edge {
                from_id: row.get(0)?,
                to_id: row.get(1)?,
                label: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(edges)
}

fn row_to_node(row: &Row<'_>) -> rusqlite::Result<Node> {
    let status: String = row.get(4)?;
    let node_type: String = row.get(5)?;
    let structured: Option<String> = row.get(9)?;
    let structured_updated_at: Option<String> = row.get(11)?;
    let created_at: String = row.get(12)?;

    Ok(Node {
        seq: row.get(0)?,
        id: row.get(1)?,
        parent_id: row.get(2)?,
        scope_id: row.get(3)?,
        status: parse_column(4, &status)?,
        node_type: parse_column(5, &node_type)?,
        name: row.get(6)?,
        text_content: row.get(7)?,
        text_content_hash: row.get(8)?,
        structured_content: parse_json_column(9, structured)?,
        structured_content_hash: row.get(10)?,
        structured_updated_at: structured_updated_at.map(|s| parse_time(11, &s)).transpose()?,
        created_at: parse_time(12, &created_at)?,
    })
}

fn missing_field(node_type: NodeType, field: &str) -> anyhow::Error {
    IntentError::MissingField {
        node_type: node_type.as_str().to_string(),
        field: field.to_string(),
    }
    .into()
}

fn parse_column<T: FromStr<Err = IntentError>>(idx: usize, value: &str) -> rusqlite::Result<T> {
    value.parse().map_err(|e| conversion_error(idx, e))
}

pub(crate) fn conversion_error<E>(idx: usize, error: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(error))
}

pub(crate) fn parse_json_column(
    idx: usize,
    value: Option<String>,
) -> rusqlite::Result<Option<serde_json::Value>> {
    value.map(|s| serde_json::from_str(&s)).transpose().map_err(|e| conversion_error(idx, e))
}

pub(crate) fn parse_time(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

pub(crate) fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
