use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::logging::{log, obj, v_str, Domain, Level};
use crate::session::{HistoryQuery, SessionResult, StoredTimes};
use crate::state::Config;

mod memory;
mod rest;
mod sqlite;

pub use memory::MemoryStore;
pub use rest::RestStore;
pub use sqlite::SqliteStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Rest,
    Sqlite,
    Memory,
}

impl StoreKind {
    pub fn from_env() -> Self {
        match std::env::var("STORE").unwrap_or_else(|_| "sqlite".to_string()).as_str() {
            "rest" | "supabase" => StoreKind::Rest,
            "memory" => StoreKind::Memory,
            _ => StoreKind::Sqlite,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Rest => "rest",
            StoreKind::Sqlite => "sqlite",
            StoreKind::Memory => "memory",
        }
    }

    pub fn build(self, cfg: &Config) -> Result<Arc<dyn ResultStore>> {
        let store: Arc<dyn ResultStore> = match self {
            StoreKind::Rest => Arc::new(RestStore::new(cfg)?),
            StoreKind::Sqlite => Arc::new(SqliteStore::open(&cfg.sqlite_path, &cfg.results_table)?),
            StoreKind::Memory => Arc::new(MemoryStore::new()),
        };
        let store: Arc<dyn ResultStore> = match cfg.store_timeout_ms {
            Some(ms) => Arc::new(TimeoutStore::new(store, Duration::from_millis(ms))),
            None => store,
        };
        Ok(store)
    }
}

/// Durable home of session results. Both calls may fail; callers decide
/// whether a failure matters.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Every stored record for exactly this (user, lesson, mode).
    async fn fetch_times(&self, query: &HistoryQuery) -> Result<Vec<StoredTimes>>;
    async fn insert(&self, result: &SessionResult) -> Result<()>;
    fn backend(&self) -> &'static str;
}

/// Applies a deadline to every call of the wrapped store.
pub struct TimeoutStore {
    inner: Arc<dyn ResultStore>,
    limit: Duration,
}

impl TimeoutStore {
    pub fn new(inner: Arc<dyn ResultStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl ResultStore for TimeoutStore {
    async fn fetch_times(&self, query: &HistoryQuery) -> Result<Vec<StoredTimes>> {
        tokio::time::timeout(self.limit, self.inner.fetch_times(query))
            .await
            .map_err(|_| anyhow!("{} fetch timed out after {:?}", self.inner.backend(), self.limit))?
    }

    async fn insert(&self, result: &SessionResult) -> Result<()> {
        tokio::time::timeout(self.limit, self.inner.insert(result))
            .await
            .map_err(|_| anyhow!("{} insert timed out after {:?}", self.inner.backend(), self.limit))?
    }

    fn backend(&self) -> &'static str {
        self.inner.backend()
    }
}

/// Converts a stored `times` object, dropping keys that are not a single character.
pub(crate) fn parse_times(raw: BTreeMap<String, f64>) -> BTreeMap<char, f64> {
    let mut times = BTreeMap::new();
    for (key, avg) in raw {
        let mut chars = key.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                times.insert(c, avg);
            }
            _ => log(
                Level::Debug,
                Domain::Store,
                "skip_key",
                obj(&[("key", v_str(&key))]),
            ),
        }
    }
    times
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Mode, UserId};

    struct SlowStore;

    #[async_trait]
    impl ResultStore for SlowStore {
        async fn fetch_times(&self, _query: &HistoryQuery) -> Result<Vec<StoredTimes>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }

        async fn insert(&self, _result: &SessionResult) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }

        fn backend(&self) -> &'static str {
            "slow"
        }
    }

    #[test]
    fn test_parse_times_drops_multi_char_keys() {
        let raw: BTreeMap<String, f64> = [
            ("a".to_string(), 0.5),
            ("<AR>".to_string(), 1.0),
            ("".to_string(), 2.0),
            ("?".to_string(), 1.5),
        ]
        .into_iter()
        .collect();
        let times = parse_times(raw);
        assert_eq!(times.len(), 2);
        assert_eq!(times[&'a'], 0.5);
        assert_eq!(times[&'?'], 1.5);
    }

    #[tokio::test]
    async fn test_timeout_store_reports_expiry_as_error() {
        let store = TimeoutStore::new(Arc::new(SlowStore), Duration::from_millis(10));
        let query = HistoryQuery {
            user_id: UserId::new("u").unwrap(),
            lesson_id: "l".to_string(),
            mode: Mode::Copy,
        };
        let err = store.fetch_times(&query).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(store.backend(), "slow");
    }

    #[tokio::test]
    async fn test_timeout_store_passes_fast_calls() {
        let inner = Arc::new(MemoryStore::new());
        let store = TimeoutStore::new(inner.clone(), Duration::from_secs(1));
        let query = HistoryQuery {
            user_id: UserId::new("u").unwrap(),
            lesson_id: "l".to_string(),
            mode: Mode::Send,
        };
        assert!(store.fetch_times(&query).await.unwrap().is_empty());
        assert_eq!(inner.reads(), 1);
    }
}
