use crate::ledger::error::LedgerError;
use crate::ledger::models::{Candidate, IngestEvent};
use crate::ledger::repository::{MetadataRepository, ProvenanceLedger};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::task;
use tracing::{debug, error, info};
use uuid::Uuid;

/// SQLite-backed metadata repository and provenance ledger.
///
/// Writes are visible to the next query, so `is_event_visible` is effectively
/// immediate; the polling contract still holds for slower backends.
pub struct SqliteLedger {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    /// Open (or create) the ledger at `db_path`; `:memory:` gives a private in-memory ledger
    pub fn new(db_path: &str) -> Result<Self, LedgerError> {
        info!("Opening SQLite ledger at path: {db_path}");

        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).map_err(|e| {
                    error!("Failed to create directory {parent:?}: {e}");
                    LedgerError::OpenError(format!("Failed to create directory: {e}"))
                })?;
            }
        }

        let connection = Connection::open(db_path).map_err(|e| {
            error!("Failed to open SQLite database at {db_path}: {e}");
            LedgerError::OpenError(format!("Failed to open SQLite database: {e}"))
        })?;

        connection
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS packages (
                    item_id TEXT PRIMARY KEY,
                    sort_key TEXT NOT NULL UNIQUE,
                    title TEXT
                );
                CREATE TABLE IF NOT EXISTS properties (
                    item_id TEXT NOT NULL,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (item_id, key)
                );
                CREATE TABLE IF NOT EXISTS ingest_events (
                    id TEXT PRIMARY KEY,
                    item_id TEXT NOT NULL,
                    bag_name TEXT NOT NULL,
                    bag_size INTEGER NOT NULL,
                    payload_size INTEGER NOT NULL,
                    etag TEXT,
                    manifest TEXT NOT NULL,
                    event_date TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_ingest_events_item ON ingest_events(item_id);",
            )
            .map_err(|e| {
                error!("Failed to create ledger tables: {e}");
                LedgerError::OpenError(format!("Failed to create ledger tables: {e}"))
            })?;

        info!("SQLite ledger initialized successfully at: {db_path}");
        Ok(SqliteLedger {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Add (or re-key) a preservation package eligible for submission
    pub async fn register_package(
        &self,
        item_id: &str,
        sort_key: &str,
        title: Option<&str>,
    ) -> Result<(), LedgerError> {
        let item_id = item_id.to_string();
        let sort_key = sort_key.to_string();
        let title = title.map(str::to_string);

        self.with_connection("register package", move |conn| {
            conn.execute(
                "INSERT INTO packages (item_id, sort_key, title) VALUES (?1, ?2, ?3)
                 ON CONFLICT(item_id) DO UPDATE SET sort_key = excluded.sort_key, title = excluded.title",
                params![item_id, sort_key, title],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_property(&self, item_id: &str, key: &str, value: &str) -> Result<(), LedgerError> {
        let item_id = item_id.to_string();
        let key = key.to_string();
        let value = value.to_string();

        self.with_connection("set property", move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO properties (item_id, key, value) VALUES (?1, ?2, ?3)",
                params![item_id, key, value],
            )?;
            Ok(())
        })
        .await
    }

    /// All ingestion events of an item, oldest first
    pub async fn ingest_events(&self, item_id: &str) -> Result<Vec<IngestEvent>, LedgerError> {
        let item_id = item_id.to_string();

        let rows = self
            .with_connection("list ingest events", move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, item_id, bag_name, bag_size, payload_size, etag, manifest, event_date
                     FROM ingest_events WHERE item_id = ?1 ORDER BY event_date ASC",
                )?;
                let rows = stmt
                    .query_map(params![item_id], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, i64>(4)?,
                            row.get::<_, Option<String>>(5)?,
                            row.get::<_, String>(6)?,
                            row.get::<_, String>(7)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(
                |(id, item_id, bag_name, bag_size, payload_size, etag, manifest, event_date)| {
                    Ok(IngestEvent {
                        id: Uuid::parse_str(&id).map_err(|e| {
                            LedgerError::OperationError(format!("Invalid event id {id}: {e}"))
                        })?,
                        item_id,
                        bag_name,
                        bag_size: bag_size as u64,
                        payload_size: payload_size as u64,
                        etag,
                        manifest,
                        event_date: Self::string_to_datetime(&event_date)?,
                    })
                },
            )
            .collect()
    }

    // Run a query on the blocking pool; rusqlite connections are synchronous
    async fn with_connection<T, F>(&self, operation: &'static str, f: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);

        task::spawn_blocking(move || {
            let conn = match connection.lock() {
                Ok(conn) => conn,
                Err(_) => {
                    error!("Failed to acquire database lock");
                    return Err(LedgerError::Locked);
                }
            };

            f(&conn).map_err(|e| {
                error!("Failed to {operation}: {e}");
                LedgerError::OperationError(format!("Failed to {operation}: {e}"))
            })
        })
        .await
        .map_err(|e| {
            error!("Task panic during {operation}: {e}");
            LedgerError::OperationError(format!("Task panic: {e}"))
        })?
    }

    fn datetime_to_string(dt: DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, LedgerError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| LedgerError::OperationError(format!("Failed to parse datetime: {e}")))
    }
}

#[async_trait]
impl MetadataRepository for SqliteLedger {
    async fn get_properties(
        &self,
        item_id: &str,
    ) -> Result<BTreeMap<String, String>, LedgerError> {
        let id = item_id.to_string();

        let (title, properties) = self
            .with_connection("read properties", move |conn| {
                let title: Option<Option<String>> = conn
                    .query_row(
                        "SELECT title FROM packages WHERE item_id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?;

                let mut stmt =
                    conn.prepare("SELECT key, value FROM properties WHERE item_id = ?1")?;
                let properties = stmt
                    .query_map(params![id], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<Result<BTreeMap<_, _>, _>>()?;

                Ok((title, properties))
            })
            .await?;

        let Some(title) = title else {
            if properties.is_empty() {
                return Err(LedgerError::NotFound(item_id.to_string()));
            }
            return Ok(properties);
        };

        let mut properties = properties;
        if let Some(title) = title {
            properties.entry("title".to_string()).or_insert(title);
        }
        Ok(properties)
    }

    async fn create_ingest_event(&self, event: &IngestEvent) -> Result<(), LedgerError> {
        debug!(
            "Recording ingest event {} for {} (etag={:?})",
            event.id, event.item_id, event.etag
        );

        let id = event.id.to_string();
        let item_id = event.item_id.clone();
        let bag_name = event.bag_name.clone();
        let bag_size = event.bag_size as i64;
        let payload_size = event.payload_size as i64;
        let etag = event.etag.clone();
        let manifest = event.manifest.clone();
        let event_date = Self::datetime_to_string(event.event_date);

        self.with_connection("insert ingest event", move |conn| {
            conn.execute(
                "INSERT INTO ingest_events (id, item_id, bag_name, bag_size, payload_size, etag, manifest, event_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![id, item_id, bag_name, bag_size, payload_size, etag, manifest, event_date],
            )?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ProvenanceLedger for SqliteLedger {
    async fn candidates_after(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Candidate>, LedgerError> {
        let after = after.map(str::to_string);
        let limit = limit as i64;

        self.with_connection("list candidates", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT p.item_id, p.sort_key, p.title FROM packages p
                 WHERE (?1 IS NULL OR p.sort_key > ?1)
                   AND NOT EXISTS (SELECT 1 FROM ingest_events e WHERE e.item_id = p.item_id)
                 ORDER BY p.sort_key ASC
                 LIMIT ?2",
            )?;
            let candidates = stmt
                .query_map(params![after, limit], |row| {
                    Ok(Candidate {
                        item_id: row.get(0)?,
                        sort_key: row.get(1)?,
                        title: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(candidates)
        })
        .await
    }

    async fn has_been_sent(&self, item_id: &str) -> Result<bool, LedgerError> {
        let item_id = item_id.to_string();

        self.with_connection("count ingest events", move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM ingest_events WHERE item_id = ?1",
                params![item_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
    }

    async fn payload_bytes_submitted(&self) -> Result<u64, LedgerError> {
        self.with_connection("sum payload bytes", |conn| {
            let total: i64 = conn.query_row(
                "SELECT COALESCE(SUM(payload_size), 0) FROM ingest_events",
                [],
                |row| row.get(0),
            )?;
            Ok(total as u64)
        })
        .await
    }

    async fn is_event_visible(&self, item_id: &str, event_id: Uuid) -> Result<bool, LedgerError> {
        let item_id = item_id.to_string();
        let event_id = event_id.to_string();

        self.with_connection("look up ingest event", move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM ingest_events WHERE id = ?1 AND item_id = ?2",
                params![event_id, item_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
    }
}
