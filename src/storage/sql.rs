// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL storage backend for the node tree.
//!
//! Base rows live in `nodes`; type-specific payload lives in `folder_nodes`
//! and `file_nodes`. Every change to `nodes` (and to file payloads) is
//! journaled into `node_changes` by triggers, so writes made by other
//! processes show up in the change feed exactly like ours do.
//!
//! ```sql
//! CREATE TABLE nodes (
//!   id VARCHAR(36) PRIMARY KEY,
//!   name VARCHAR(255) NOT NULL,
//!   parent_id VARCHAR(36) NOT NULL,   -- root: parent_id = id
//!   node_type INT NOT NULL            -- 0 = folder, 1 = file
//! );
//! CREATE TABLE folder_nodes (id VARCHAR(36) PRIMARY KEY);
//! CREATE TABLE file_nodes (
//!   id VARCHAR(36) PRIMARY KEY,
//!   extension VARCHAR(255) NOT NULL DEFAULT '',
//!   content LONGBLOB
//! );
//! CREATE TABLE node_changes (
//!   version BIGINT AUTO_INCREMENT PRIMARY KEY,
//!   op CHAR(1) NOT NULL,              -- I / U / D
//!   node_id VARCHAR(36) NOT NULL
//! );
//! ```
//!
//! ## sqlx Any Driver Quirks
//!
//! MySQL text columns may come back as bytes and small integer columns as
//! `i32`, so row readers try the wider type first and fall back.
//! DDL runs through the unprepared path because MySQL refuses
//! `CREATE TRIGGER` as a prepared statement.

use std::collections::HashSet;
use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Executor, Row};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::node::{FileNode, FolderNode, Node, NodeId, NodeType};
use crate::resilience::retry::{retry, RetryConfig};
use super::traits::{ChangeEntry, ChangeOp, HousekeepingStats, JournalRetention, NodeStore, StoreError};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

/// Parent ids per cascade `DELETE ... IN (...)` statement.
const DELETE_CHUNK_SIZE: usize = 500;

const SQLITE_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS nodes (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        parent_id TEXT NOT NULL,
        node_type INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id)",
    "CREATE TABLE IF NOT EXISTS folder_nodes (id TEXT PRIMARY KEY)",
    "CREATE TABLE IF NOT EXISTS file_nodes (
        id TEXT PRIMARY KEY,
        extension TEXT NOT NULL DEFAULT '',
        content BLOB
    )",
    "CREATE TABLE IF NOT EXISTS node_changes (
        version INTEGER PRIMARY KEY AUTOINCREMENT,
        op TEXT NOT NULL,
        node_id TEXT NOT NULL
    )",
    "CREATE TRIGGER IF NOT EXISTS trg_nodes_insert AFTER INSERT ON nodes
     BEGIN INSERT INTO node_changes (op, node_id) VALUES ('I', NEW.id); END",
    "CREATE TRIGGER IF NOT EXISTS trg_nodes_update AFTER UPDATE ON nodes
     BEGIN INSERT INTO node_changes (op, node_id) VALUES ('U', NEW.id); END",
    "CREATE TRIGGER IF NOT EXISTS trg_nodes_delete AFTER DELETE ON nodes
     BEGIN INSERT INTO node_changes (op, node_id) VALUES ('D', OLD.id); END",
    "CREATE TRIGGER IF NOT EXISTS trg_file_nodes_update AFTER UPDATE ON file_nodes
     BEGIN INSERT INTO node_changes (op, node_id) VALUES ('U', NEW.id); END",
];

// CREATE TRIGGER IF NOT EXISTS needs MySQL 8.0.29+
const MYSQL_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS nodes (
        id VARCHAR(36) PRIMARY KEY,
        name VARCHAR(255) NOT NULL,
        parent_id VARCHAR(36) NOT NULL,
        node_type INT NOT NULL,
        INDEX idx_nodes_parent (parent_id)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
    "CREATE TABLE IF NOT EXISTS folder_nodes (
        id VARCHAR(36) PRIMARY KEY
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
    "CREATE TABLE IF NOT EXISTS file_nodes (
        id VARCHAR(36) PRIMARY KEY,
        extension VARCHAR(255) NOT NULL DEFAULT '',
        content LONGBLOB
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
    "CREATE TABLE IF NOT EXISTS node_changes (
        version BIGINT AUTO_INCREMENT PRIMARY KEY,
        op CHAR(1) NOT NULL,
        node_id VARCHAR(36) NOT NULL
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
    "CREATE TRIGGER IF NOT EXISTS trg_nodes_insert AFTER INSERT ON nodes
     FOR EACH ROW INSERT INTO node_changes (op, node_id) VALUES ('I', NEW.id)",
    "CREATE TRIGGER IF NOT EXISTS trg_nodes_update AFTER UPDATE ON nodes
     FOR EACH ROW INSERT INTO node_changes (op, node_id) VALUES ('U', NEW.id)",
    "CREATE TRIGGER IF NOT EXISTS trg_nodes_delete AFTER DELETE ON nodes
     FOR EACH ROW INSERT INTO node_changes (op, node_id) VALUES ('D', OLD.id)",
    "CREATE TRIGGER IF NOT EXISTS trg_file_nodes_update AFTER UPDATE ON file_nodes
     FOR EACH ROW INSERT INTO node_changes (op, node_id) VALUES ('U', NEW.id)",
];

const SELECT_NODES: &str = "SELECT n.id, n.name, n.parent_id, n.node_type, f.extension, f.content \
     FROM nodes n LEFT JOIN file_nodes f ON f.id = n.id";

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Read a text column (String on SQLite, possibly bytes on MySQL).
fn text(row: &AnyRow, column: &str) -> Option<String> {
    row.try_get::<String, _>(column).ok().or_else(|| {
        row.try_get::<Vec<u8>, _>(column)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
    })
}

/// Read an integer column of any width.
fn int(row: &AnyRow, column: &str) -> Option<i64> {
    row.try_get::<i64, _>(column)
        .ok()
        .or_else(|| row.try_get::<i32, _>(column).ok().map(i64::from))
        .or_else(|| row.try_get::<i16, _>(column).ok().map(i64::from))
}

fn id_column(row: &AnyRow, column: &str) -> Result<NodeId, StoreError> {
    let raw = text(row, column).ok_or_else(|| StoreError::Corrupt {
        id: "?".to_string(),
        reason: format!("missing {column}"),
    })?;
    Uuid::parse_str(raw.trim()).map_err(|e| StoreError::Corrupt {
        id: raw.clone(),
        reason: format!("bad {column}: {e}"),
    })
}

fn node_from_row(row: &AnyRow) -> Result<Node, StoreError> {
    let id = id_column(row, "id")?;
    let parent_id = id_column(row, "parent_id")?;
    let name = text(row, "name").unwrap_or_default();
    let raw_type = int(row, "node_type").ok_or_else(|| StoreError::Corrupt {
        id: id.to_string(),
        reason: "missing node_type".to_string(),
    })?;

    match NodeType::from_i64(raw_type) {
        Some(NodeType::Folder) => Ok(Node::Folder(FolderNode {
            id,
            name,
            parent_id,
            is_root: parent_id == id,
        })),
        Some(NodeType::File) => Ok(Node::File(FileNode {
            id,
            name,
            parent_id,
            extension: text(row, "extension").unwrap_or_default(),
            content: row.try_get::<Vec<u8>, _>("content").unwrap_or_default(),
        })),
        None => Err(StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("unknown node_type {raw_type}"),
        }),
    }
}

/// `(?, ?, ...)` with `n` placeholders.
fn placeholders(n: usize) -> String {
    let mut s = String::with_capacity(n * 3 + 2);
    s.push('(');
    for i in 0..n {
        if i > 0 {
            s.push_str(", ");
        }
        s.push('?');
    }
    s.push(')');
    s
}

pub struct SqlNodeStore {
    pool: AnyPool,
    is_sqlite: bool,
}

impl SqlNodeStore {
    /// Connect with startup-mode retry (fails fast if config is wrong) and
    /// create the schema if missing.
    pub async fn connect(connection_string: &str) -> Result<Self, StoreError> {
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(backend)
        })
        .await?;

        let store = Self { pool, is_sqlite };
        if is_sqlite {
            store.enable_wal_mode().await?;
        }
        store.init_schema().await?;
        info!(sqlite = is_sqlite, "SQL node store connected");
        Ok(store)
    }

    /// Wrap an existing pool. Call [`init_schema`](Self::init_schema) yourself.
    pub fn from_pool(pool: AnyPool, is_sqlite: bool) -> Self {
        Self { pool, is_sqlite }
    }

    /// Clone of the connection pool.
    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    async fn enable_wal_mode(&self) -> Result<(), StoreError> {
        (&self.pool)
            .execute("PRAGMA journal_mode = WAL")
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to enable WAL mode: {}", e)))?;
        (&self.pool)
            .execute("PRAGMA synchronous = NORMAL")
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to set synchronous mode: {}", e)))?;
        Ok(())
    }

    /// Create tables and change-journal triggers if they do not exist.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        let statements = if self.is_sqlite { SQLITE_SCHEMA } else { MYSQL_SCHEMA };

        retry("sql_init_schema", &RetryConfig::startup(), || async {
            for stmt in statements {
                (&self.pool).execute(*stmt).await.map_err(backend)?;
            }
            Ok::<(), StoreError>(())
        })
        .await
    }

    /// Number of rows in `nodes`.
    pub async fn count_nodes(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM nodes")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(int(&row, "cnt").unwrap_or(0) as u64)
    }
}

#[async_trait]
impl NodeStore for SqlNodeStore {
    #[instrument(skip(self))]
    async fn load_all(&self) -> Result<Vec<Node>, StoreError> {
        let rows = retry("sql_load_all", &RetryConfig::query(), || async {
            sqlx::query(SELECT_NODES)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)
        })
        .await?;

        let mut nodes = Vec::with_capacity(rows.len());
        for row in &rows {
            match node_from_row(row) {
                Ok(node) => nodes.push(node),
                Err(e) => warn!(error = %e, "Skipping unreadable node row"),
            }
        }
        debug!(count = nodes.len(), "Loaded nodes");
        Ok(nodes)
    }

    async fn load_by_id(&self, id: NodeId) -> Result<Option<Node>, StoreError> {
        let id = id.to_string();
        let sql = format!("{} WHERE n.id = ?", SELECT_NODES);

        let row = retry("sql_load_by_id", &RetryConfig::query(), || async {
            sqlx::query(&sql)
                .bind(&id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)
        })
        .await?;

        row.as_ref().map(node_from_row).transpose()
    }

    #[instrument(skip(self, folder), fields(id = %folder.id))]
    async fn insert_folder(&self, folder: &FolderNode) -> Result<(), StoreError> {
        let id = folder.id.to_string();
        let parent_id = folder.parent_id.to_string();

        retry("sql_insert_folder", &RetryConfig::query(), || async {
            let mut tx = self.pool.begin().await.map_err(backend)?;
            sqlx::query("INSERT INTO nodes (id, name, parent_id, node_type) VALUES (?, ?, ?, ?)")
                .bind(&id)
                .bind(&folder.name)
                .bind(&parent_id)
                .bind(NodeType::Folder.as_i64())
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            sqlx::query("INSERT INTO folder_nodes (id) VALUES (?)")
                .bind(&id)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            tx.commit().await.map_err(backend)
        })
        .await
    }

    #[instrument(skip(self, file), fields(id = %file.id))]
    async fn insert_file(&self, file: &FileNode) -> Result<(), StoreError> {
        let id = file.id.to_string();
        let parent_id = file.parent_id.to_string();

        retry("sql_insert_file", &RetryConfig::query(), || async {
            let mut tx = self.pool.begin().await.map_err(backend)?;
            sqlx::query("INSERT INTO nodes (id, name, parent_id, node_type) VALUES (?, ?, ?, ?)")
                .bind(&id)
                .bind(&file.name)
                .bind(&parent_id)
                .bind(NodeType::File.as_i64())
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            sqlx::query("INSERT INTO file_nodes (id, extension, content) VALUES (?, ?, ?)")
                .bind(&id)
                .bind(&file.extension)
                .bind(&file.content)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            tx.commit().await.map_err(backend)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn change_parent(&self, node_id: NodeId, new_parent_id: NodeId) -> Result<NodeId, StoreError> {
        let id = node_id.to_string();
        let parent = new_parent_id.to_string();

        // None: node row missing
        let resulting = retry("sql_change_parent", &RetryConfig::query(), || async {
            let mut tx = self.pool.begin().await.map_err(backend)?;

            let Some(row) = sqlx::query("SELECT name, parent_id FROM nodes WHERE id = ?")
                .bind(&id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?
            else {
                return Ok(None);
            };
            let name = text(&row, "name").unwrap_or_default();
            let current_parent = id_column(&row, "parent_id")?;

            let collision = sqlx::query(
                "SELECT id FROM nodes WHERE parent_id = ? AND name = ? AND id <> ? LIMIT 1",
            )
            .bind(&parent)
            .bind(&name)
            .bind(&id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?;

            if collision.is_some() {
                tx.commit().await.map_err(backend)?;
                return Ok(Some(current_parent));
            }

            sqlx::query("UPDATE nodes SET parent_id = ? WHERE id = ?")
                .bind(&parent)
                .bind(&id)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;

            let row = sqlx::query("SELECT parent_id FROM nodes WHERE id = ?")
                .bind(&id)
                .fetch_one(&mut *tx)
                .await
                .map_err(backend)?;
            let resulting = id_column(&row, "parent_id")?;
            tx.commit().await.map_err(backend)?;
            Ok(Some(resulting))
        })
        .await?;

        resulting.ok_or(StoreError::NotFound(node_id))
    }

    #[instrument(skip(self, known_child_parent_ids), fields(parents = known_child_parent_ids.len()))]
    async fn delete_folder_cascade(
        &self,
        node_id: NodeId,
        known_child_parent_ids: &HashSet<NodeId>,
    ) -> Result<(), StoreError> {
        let id = node_id.to_string();
        let parent_ids: Vec<String> = known_child_parent_ids.iter().map(ToString::to_string).collect();

        retry("sql_delete_folder", &RetryConfig::query(), || async {
            let mut tx = self.pool.begin().await.map_err(backend)?;

            sqlx::query("DELETE FROM nodes WHERE id = ?")
                .bind(&id)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;

            // Direct children of every known folder, including ones created
            // since the mirror last saw them. Deeper strays wait for housekeeping.
            for chunk in parent_ids.chunks(DELETE_CHUNK_SIZE) {
                let sql = format!(
                    "DELETE FROM nodes WHERE parent_id IN {} AND parent_id <> id",
                    placeholders(chunk.len())
                );
                let mut query = sqlx::query(&sql);
                for parent in chunk {
                    query = query.bind(parent);
                }
                query.execute(&mut *tx).await.map_err(backend)?;
            }

            sqlx::query("DELETE FROM folder_nodes WHERE id NOT IN (SELECT id FROM nodes)")
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            sqlx::query("DELETE FROM file_nodes WHERE id NOT IN (SELECT id FROM nodes)")
                .execute(&mut *tx)
                .await
                .map_err(backend)?;

            tx.commit().await.map_err(backend)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_file(&self, node_id: NodeId) -> Result<(), StoreError> {
        let id = node_id.to_string();
        retry("sql_delete_file", &RetryConfig::query(), || async {
            let mut tx = self.pool.begin().await.map_err(backend)?;
            sqlx::query("DELETE FROM nodes WHERE id = ?")
                .bind(&id)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            sqlx::query("DELETE FROM file_nodes WHERE id = ?")
                .bind(&id)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            tx.commit().await.map_err(backend)
        })
        .await
    }

    async fn change_baseline_version(&self) -> Result<i64, StoreError> {
        let row = retry("sql_change_baseline", &RetryConfig::query(), || async {
            sqlx::query("SELECT COALESCE(MAX(version), 0) AS v FROM node_changes")
                .fetch_one(&self.pool)
                .await
                .map_err(backend)
        })
        .await?;
        Ok(int(&row, "v").unwrap_or(0))
    }

    async fn fetch_changes_since(&self, version: i64) -> Result<Vec<ChangeEntry>, StoreError> {
        let rows = retry("sql_fetch_changes", &RetryConfig::query(), || async {
            sqlx::query("SELECT version, op, node_id FROM node_changes WHERE version > ? ORDER BY version")
                .bind(version)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)
        })
        .await?;

        let mut changes = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(v) = int(row, "version") else {
                warn!("Skipping change row without version");
                continue;
            };
            let Some(op) = text(row, "op").as_deref().and_then(ChangeOp::from_code) else {
                warn!(version = v, "Skipping change row with unknown op");
                continue;
            };
            match id_column(row, "node_id") {
                Ok(node_id) => changes.push(ChangeEntry { version: v, op, node_id }),
                Err(e) => warn!(version = v, error = %e, "Skipping change row with bad node id"),
            }
        }
        Ok(changes)
    }

    #[instrument(skip(self))]
    async fn housekeeping_once(&self, retention: JournalRetention) -> Result<HousekeepingStats, StoreError> {
        retry("sql_housekeeping", &RetryConfig::query(), || async {
            let mut tx = self.pool.begin().await.map_err(backend)?;

            // Derived table so MySQL accepts the self-reference
            let orphaned_nodes = sqlx::query(
                "DELETE FROM nodes WHERE parent_id <> id \
                 AND parent_id NOT IN (SELECT id FROM (SELECT id FROM nodes) AS live)",
            )
            .execute(&mut *tx)
            .await
            .map_err(backend)?
            .rows_affected();

            let folders = sqlx::query("DELETE FROM folder_nodes WHERE id NOT IN (SELECT id FROM nodes)")
                .execute(&mut *tx)
                .await
                .map_err(backend)?
                .rows_affected();
            let files = sqlx::query("DELETE FROM file_nodes WHERE id NOT IN (SELECT id FROM nodes)")
                .execute(&mut *tx)
                .await
                .map_err(backend)?
                .rows_affected();

            // Newest version is read after the reaping above journaled its deletes
            let newest = sqlx::query("SELECT COALESCE(MAX(version), 0) AS v FROM node_changes")
                .fetch_one(&mut *tx)
                .await
                .map_err(backend)?;
            let pruned_changes = match retention.prune_through(int(&newest, "v").unwrap_or(0)) {
                Some(cutoff) => sqlx::query("DELETE FROM node_changes WHERE version <= ?")
                    .bind(cutoff)
                    .execute(&mut *tx)
                    .await
                    .map_err(backend)?
                    .rows_affected(),
                None => 0,
            };

            tx.commit().await.map_err(backend)?;
            Ok(HousekeepingStats {
                orphaned_nodes,
                orphaned_payloads: folders + files,
                pruned_changes,
            })
        })
        .await
    }
}
