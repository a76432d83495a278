//! Document-store backend over sqlite.
//!
//! Each whisper is one JSON document in a `whispers` row, next to an
//! integer version column. The conditional write is a plain
//! `UPDATE ... WHERE id = ? AND version = ?`, which sqlite applies
//! atomically. This is the row-level guard every other adapter emulates.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use rusqlite::Connection;
use serde_json::Value;
use uuid::Uuid;

use super::{Backend, Version};
use crate::codec;
use crate::error::StoreError;
use crate::models::WhisperNode;

struct Migration {
    version: &'static str,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "001",
        name: "initial",
        sql: include_str!("migrations/001_initial.sql"),
    },
    Migration {
        version: "002",
        name: "children_version",
        sql: include_str!("migrations/002_children_version.sql"),
    },
];

pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("database path has no parent directory")))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
        let conn = Connection::open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self, StoreError> {
        let dirs = directories::ProjectDirs::from("", "", "whisperhub")
            .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("could not determine data directory")))?;
        let db_path = dirs.data_dir().join("whispers.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Bring the schema up to date and normalize legacy documents.
    ///
    /// Idempotent; must run before the backend takes traffic.
    pub fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("database lock poisoned");
        run_migrations(&conn)?;
        normalize_documents(&conn)?;
        Ok(())
    }
}

impl Clone for SqliteBackend {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )
    .context("creating schema_migrations table")?;

    // Databases created before version tracking carry the initial table
    // but no migration rows; baseline them instead of re-running 001.
    if needs_baseline(conn)? {
        mark_applied(conn, "001", "initial")?;
        tracing::info!("existing whisper table detected, baselined migration 001");
    }

    let applied = applied_versions(conn)?;
    for migration in MIGRATIONS {
        if !applied.contains(&migration.version.to_string()) {
            tracing::info!("applying migration {}: {}", migration.version, migration.name);
            conn.execute_batch(&format!("BEGIN TRANSACTION; {} COMMIT;", migration.sql))
                .with_context(|| {
                    format!("applying migration {}: {}", migration.version, migration.name)
                })?;
            mark_applied(conn, migration.version, migration.name)?;
        }
    }
    Ok(())
}

fn needs_baseline(conn: &Connection) -> Result<bool, StoreError> {
    let migration_count: i32 =
        conn.query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))?;
    if migration_count > 0 {
        return Ok(false);
    }
    let tables_exist: i32 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='whispers'",
        [],
        |row| row.get(0),
    )?;
    Ok(tables_exist > 0)
}

fn applied_versions(conn: &Connection) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(versions)
}

fn mark_applied(conn: &Connection, version: &str, name: &str) -> Result<(), StoreError> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)",
        (version, name, &now),
    )?;
    Ok(())
}

/// One-time repair pass: decode every document through the codec and write
/// back the ones that needed normalizing.
fn normalize_documents(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare("SELECT id, doc FROM whispers")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);

    let mut repaired = 0usize;
    for (id, doc) in rows {
        let value: Value = serde_json::from_str(&doc)
            .with_context(|| format!("parsing document {}", id))?;
        let (node, needs_repair) = codec::decode(&value)?;
        if needs_repair {
            let fixed = serde_json::to_string(&codec::encode(&node)?)?;
            conn.execute("UPDATE whispers SET doc = ? WHERE id = ?", (&fixed, &id))?;
            repaired += 1;
        }
    }
    if repaired > 0 {
        tracing::info!(repaired, "normalized legacy whisper documents");
    }
    Ok(())
}

fn decode_doc(doc: &str) -> Result<WhisperNode, StoreError> {
    let value: Value = serde_json::from_str(doc)?;
    codec::decode(&value).map(|(node, _)| node)
}

impl Backend for SqliteBackend {
    fn put(&self, node: &WhisperNode) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let doc = serde_json::to_string(&codec::encode(node)?)?;
        let result = conn.execute(
            "INSERT INTO whispers (id, doc, version) VALUES (?, ?, 0)",
            (node.id.to_string(), &doc),
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict(node.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, id: Uuid) -> Result<WhisperNode, StoreError> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM whispers WHERE id = ?",
                [id.to_string()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        match doc {
            Some(doc) => decode_doc(&doc),
            None => Err(StoreError::NotFound(id)),
        }
    }

    fn list_all(&self) -> Result<Vec<WhisperNode>, StoreError> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare("SELECT doc FROM whispers")?;
        let docs = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        docs.iter().map(|d| decode_doc(d)).collect()
    }

    fn load_children(&self, parent: Uuid) -> Result<(Vec<Uuid>, Version), StoreError> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT doc, version FROM whispers WHERE id = ?",
                [parent.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        let (doc, version) = row.ok_or(StoreError::NotFound(parent))?;
        Ok((decode_doc(&doc)?.children, version as Version))
    }

    fn store_children(
        &self,
        parent: Uuid,
        expected: Version,
        children: &[Uuid],
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM whispers WHERE id = ?",
                [parent.to_string()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        let doc = doc.ok_or(StoreError::NotFound(parent))?;

        // Only `children` is mutable, so rebuilding the document from the
        // just-read row is safe as long as the guarded UPDATE lands.
        let mut node = decode_doc(&doc)?;
        node.children = children.to_vec();
        let updated = serde_json::to_string(&codec::encode(&node)?)?;

        let rows = conn.execute(
            "UPDATE whispers SET doc = ?, version = version + 1 WHERE id = ? AND version = ?",
            (&updated, parent.to_string(), expected as i64),
        )?;
        Ok(rows == 1)
    }
}
