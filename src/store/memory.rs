use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::ResultStore;
use crate::session::{HistoryQuery, SessionResult, StoredTimes};

/// Process-local store. Faults can be switched on to exercise the degrade paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<SessionResult>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<SessionResult>) -> Self {
        Self { rows: Mutex::new(rows), ..Self::default() }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fetch calls issued, failed ones included.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Insert calls issued, failed ones included.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn rows(&self) -> Vec<SessionResult> {
        self.rows.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn fetch_times(&self, query: &HistoryQuery) -> Result<Vec<StoredTimes>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("injected read failure"));
        }
        let rows = self.rows.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        Ok(rows
            .iter()
            .filter(|r| r.user_id == query.user_id && r.mode == query.mode && r.lesson_id == query.lesson_id)
            .map(|r| StoredTimes { times: Some(r.times.clone()) })
            .collect())
    }

    async fn insert(&self, result: &SessionResult) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("injected write failure"));
        }
        let mut rows = self.rows.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        rows.push(result.clone());
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
