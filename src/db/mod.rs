//! Database module - document storage for player progress
//!
//! Documents are JSON objects addressed by collection name and key.
//! `update` merges top-level fields only; nested objects such as the
//! inventory are replaced wholesale.

pub mod memory;

pub use memory::MemoryStore;

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// JSON object stored under one key
pub type Document = Map<String, Value>;

/// Document store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt document {collection}/{key}: {reason}")]
    Corrupt {
        collection: String,
        key: String,
        reason: String,
    },

    #[error("document {collection}/{key} not found")]
    NotFound { collection: String, key: String },

    #[error("store lock poisoned")]
    Poisoned,

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StoreError {
    pub fn not_found(collection: &str, key: &str) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            key: key.to_string(),
        }
    }

    pub fn corrupt(collection: &str, key: &str, reason: impl ToString) -> Self {
        StoreError::Corrupt {
            collection: collection.to_string(),
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Remote-style document store keyed by (collection, key)
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document, `None` when absent
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError>;

    /// Overwrite the whole document
    async fn set(&self, collection: &str, key: &str, document: &Document) -> Result<(), StoreError>;

    /// Merge top-level fields into an existing document
    async fn update(&self, collection: &str, key: &str, fields: &Document) -> Result<(), StoreError>;
}

/// SQLite-backed document store
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create database
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking closure against the connection off the async runtime
    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut *guard)
        })
        .await?
    }
}

/// Initialize database schema
fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            key TEXT NOT NULL,
            body TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (collection, key)
        )",
        [],
    )?;
    Ok(())
}

fn read_document(
    conn: &Connection,
    collection: &str,
    key: &str,
) -> Result<Option<Document>, StoreError> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM documents WHERE collection = ?1 AND key = ?2",
            params![collection, key],
            |row| row.get(0),
        )
        .optional()?;

    let Some(body) = body else {
        return Ok(None);
    };

    match serde_json::from_str::<Value>(&body) {
        Ok(Value::Object(doc)) => Ok(Some(doc)),
        Ok(_) => Err(StoreError::corrupt(collection, key, "body is not a JSON object")),
        Err(e) => Err(StoreError::corrupt(collection, key, e)),
    }
}

fn write_document(
    conn: &Connection,
    collection: &str,
    key: &str,
    document: &Document,
) -> Result<(), StoreError> {
    let body = serde_json::to_string(document)
        .map_err(|e| StoreError::corrupt(collection, key, e))?;
    conn.execute(
        "INSERT INTO documents (collection, key, body, updated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(collection, key) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
        params![collection, key, body, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError> {
        let (collection, key) = (collection.to_string(), key.to_string());
        self.run(move |conn| read_document(conn, &collection, &key)).await
    }

    async fn set(&self, collection: &str, key: &str, document: &Document) -> Result<(), StoreError> {
        let (collection, key, document) = (collection.to_string(), key.to_string(), document.clone());
        self.run(move |conn| write_document(conn, &collection, &key, &document))
            .await
    }

    async fn update(&self, collection: &str, key: &str, fields: &Document) -> Result<(), StoreError> {
        let (collection, key, fields) = (collection.to_string(), key.to_string(), fields.clone());
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let mut doc = read_document(&tx, &collection, &key)?
                .ok_or_else(|| StoreError::not_found(&collection, &key))?;
            debug!(collection = %collection, key = %key, fields = fields.len(), "merging fields");
            doc.extend(fields);
            write_document(&tx, &collection, &key, &doc)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
