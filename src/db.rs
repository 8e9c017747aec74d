use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::store::{DocumentStore, StoredRecord};

/// Durable store backend: keyed documents plus indexed collections, persisted
/// as JSON bodies in SQLite.
pub struct SqliteStore {
    connection: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(data_dir: P, database_file: &str) -> AppResult<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(database_file);

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let connection = Connection::open_with_flags(&db_path, flags)?;
        configure(&connection)?;
        run_migrations(&connection)?;

        info!(
            target: "store_bootstrap",
            path = %db_path.display(),
            "sqlite store opened"
        );

        Ok(Self {
            connection: Mutex::new(connection),
            path: db_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn configure(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;
        "#,
    )?;
    Ok(())
}

fn run_migrations(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            key TEXT PRIMARY KEY,
            body TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (DATETIME('now'))
        );

        CREATE TABLE IF NOT EXISTS records (
            id TEXT PRIMARY KEY,
            collection TEXT NOT NULL,
            body TEXT NOT NULL,
            position INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (DATETIME('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection, position);
        "#,
    )?;
    Ok(())
}

fn next_position(connection: &Connection, collection: &str) -> AppResult<i64> {
    let max = connection
        .query_row(
            "SELECT MAX(position) FROM records WHERE collection = ?1",
            [collection],
            |row| row.get::<_, Option<i64>>(0),
        )
        .optional()?
        .flatten();
    Ok(max.unwrap_or(0) + 1)
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, key: &str) -> AppResult<Value> {
        let connection = self.connection.lock();
        let body: Option<String> = connection
            .query_row("SELECT body FROM documents WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        match body {
            Some(text) => Ok(serde_json::from_str(&text)?),
            None => Ok(Value::Object(serde_json::Map::new())),
        }
    }

    async fn save(&self, document: Value, key: &str) -> AppResult<()> {
        let body = serde_json::to_string(&document)?;
        let connection = self.connection.lock();
        connection.execute(
            "INSERT INTO documents (key, body, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at",
            params![key, body, now_timestamp()],
        )?;
        Ok(())
    }

    async fn insert(&self, record: Value, collection: &str) -> AppResult<StoredRecord> {
        let body = serde_json::to_string(&record)?;
        let id = Uuid::new_v4().to_string();
        let connection = self.connection.lock();
        let position = next_position(&connection, collection)?;
        connection.execute(
            "INSERT INTO records (id, collection, body, position) VALUES (?1, ?2, ?3, ?4)",
            params![id, collection, body, position],
        )?;
        Ok(StoredRecord { id, data: record })
    }

    async fn bulk_insert(&self, records: Vec<Value>, collection: &str) -> AppResult<()> {
        let mut connection = self.connection.lock();
        let tx = connection.transaction()?;
        let mut position = next_position(&tx, collection)?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO records (id, collection, body, position) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for record in &records {
                stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    collection,
                    serde_json::to_string(record)?,
                    position
                ])?;
                position += 1;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn delete(&self, id: &str, collection: &str) -> AppResult<()> {
        let connection = self.connection.lock();
        let affected = connection.execute(
            "DELETE FROM records WHERE id = ?1 AND collection = ?2",
            params![id, collection],
        )?;
        if affected == 0 {
            return Err(AppError::Store(format!(
                "record {id} not found in {collection}"
            )));
        }
        Ok(())
    }

    async fn search(&self, query: Value, collection: &str) -> AppResult<Vec<StoredRecord>> {
        let connection = self.connection.lock();
        let mut stmt = connection.prepare(
            "SELECT id, body FROM records WHERE collection = ?1 ORDER BY position ASC",
        )?;
        let rows = stmt
            .query_map([collection], |row| {
                let id: String = row.get(0)?;
                let body: String = row.get(1)?;
                Ok((id, body))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (id, body) in rows {
            let data: Value = serde_json::from_str(&body)?;
            if matches_query(&query, &data) {
                records.push(StoredRecord { id, data });
            }
        }
        Ok(records)
    }
}

/// Top-level field equality; an empty object matches everything, which is the
/// shape the sync core uses to fetch a whole collection.
fn matches_query(query: &Value, data: &Value) -> bool {
    match query.as_object() {
        None => true,
        Some(fields) => fields
            .iter()
            .all(|(key, expected)| data.get(key) == Some(expected)),
    }
}
