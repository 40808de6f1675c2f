use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection};

use super::{parse_times, ResultStore};
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::session::{HistoryQuery, SessionResult, StoredTimes};

/// Local results table, same columns as the hosted one. Statements run on
/// tokio's blocking pool so a slow disk never stalls the runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

impl SqliteStore {
    pub fn open(path: &str, table: &str) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("open sqlite store {}", path))?;
        Self::from_connection(conn, table)
    }

    pub fn in_memory(table: &str) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, table)
    }

    fn from_connection(conn: Connection, table: &str) -> Result<Self> {
        // table names cannot be bound as parameters
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            bail!("invalid results table name {:?}", table);
        }
        let store = Self { conn: Arc::new(Mutex::new(conn)), table: table.to_string() };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| anyhow!("sqlite connection poisoned"))?;
        conn.execute_batch(&format!(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                level_id TEXT NOT NULL,
                mode TEXT NOT NULL,
                time_sec REAL NOT NULL,
                tone_replays INTEGER NOT NULL,
                mistakes TEXT NOT NULL,
                times TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS {table}_lookup ON {table} (user_id, mode, level_id);
            COMMIT;",
            table = self.table
        ))?;
        Ok(())
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &str) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        let table = self.table.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| anyhow!("sqlite connection poisoned"))?;
            work(&conn, &table)
        })
        .await
        .context("sqlite worker")?
    }
}

#[async_trait]
impl ResultStore for SqliteStore {
    async fn fetch_times(&self, query: &HistoryQuery) -> Result<Vec<StoredTimes>> {
        let user_id = query.user_id.as_str().to_string();
        let mode = query.mode.as_str();
        let lesson_id = query.lesson_id.clone();
        let raw = self
            .blocking(move |conn, table| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT times FROM {} WHERE user_id = ?1 AND mode = ?2 AND level_id = ?3 ORDER BY id",
                    table
                ))?;
                let rows = stmt
                    .query_map(params![user_id, mode, lesson_id], |row| row.get::<_, Option<String>>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        let mut records = Vec::with_capacity(raw.len());
        for times in raw {
            let times = match times {
                Some(text) => match serde_json::from_str::<BTreeMap<String, f64>>(&text) {
                    Ok(map) => Some(parse_times(map)),
                    Err(err) => {
                        log(
                            Level::Warn,
                            Domain::Store,
                            "bad_times_row",
                            obj(&[("error", v_str(&err.to_string()))]),
                        );
                        None
                    }
                },
                None => None,
            };
            records.push(StoredTimes { times });
        }
        Ok(records)
    }

    async fn insert(&self, result: &SessionResult) -> Result<()> {
        let mistakes = serde_json::to_string(&result.mistakes)?;
        let times = serde_json::to_string(&result.times)?;
        let user_id = result.user_id.as_str().to_string();
        let lesson_id = result.lesson_id.clone();
        let mode = result.mode.as_str();
        let time_sec = result.total_elapsed_seconds;
        let tone_replays = result.tone_replay_count as i64;
        let created_at = chrono::Utc::now().to_rfc3339();
        self.blocking(move |conn, table| {
            conn.execute(
                &format!(
                    "INSERT INTO {} (user_id, level_id, mode, time_sec, tone_replays, mistakes, times, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    table
                ),
                params![user_id, lesson_id, mode, time_sec, tone_replays, mistakes, times, created_at],
            )?;
            Ok(())
        })
        .await
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
