//! Comparison with the user's earlier sessions of the same lesson and mode.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use crate::logging::{log, obj, v_str, Domain, Level, ProfileScope};
use crate::session::{HistoricalAverage, HistoryQuery, Mode, StoredTimes, UserId};
use crate::store::ResultStore;

/// Mean of per-record averages. Every record weighs the same regardless of
/// how many samples produced its average.
pub fn merge_historical(records: &[StoredTimes]) -> HistoricalAverage {
    let mut collected: BTreeMap<char, Vec<f64>> = BTreeMap::new();
    for times in records.iter().filter_map(|r| r.times.as_ref()) {
        for (&c, &avg) in times {
            collected.entry(c).or_default().push(avg);
        }
    }
    collected
        .into_iter()
        .map(|(c, avgs)| (c, avgs.iter().sum::<f64>() / avgs.len() as f64))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryOutcome {
    /// Session incomplete or nobody signed in; the store was not asked.
    Skipped,
    /// Possibly empty when there were no records or the fetch failed.
    Loaded(HistoricalAverage),
}

impl HistoryOutcome {
    pub fn averages(&self) -> Option<&HistoricalAverage> {
        match self {
            HistoryOutcome::Skipped => None,
            HistoryOutcome::Loaded(avg) => Some(avg),
        }
    }
}

#[derive(Clone)]
pub struct HistoricalComparator {
    store: Arc<dyn ResultStore>,
}

impl HistoricalComparator {
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        Self { store }
    }

    pub async fn compare(
        &self,
        user: Option<&UserId>,
        completed: bool,
        lesson_id: &str,
        mode: Mode,
    ) -> HistoryOutcome {
        let Some(user) = user.filter(|_| completed) else {
            return HistoryOutcome::Skipped;
        };
        let query = HistoryQuery {
            user_id: user.clone(),
            lesson_id: lesson_id.to_string(),
            mode,
        };
        HistoryOutcome::Loaded(self.load(&query).await)
    }

    /// Fetch and merge; failures are logged and read as "no history".
    pub async fn load(&self, query: &HistoryQuery) -> HistoricalAverage {
        let fetched = {
            let _p = ProfileScope::with_context("history_fetch", &[("backend", v_str(self.store.backend()))]);
            self.store.fetch_times(query).await
        };
        match fetched {
            Ok(records) => {
                let merged = merge_historical(&records);
                log(
                    Level::Debug,
                    Domain::History,
                    "loaded",
                    obj(&[
                        ("user_id", v_str(query.user_id.as_str())),
                        ("lesson_id", v_str(&query.lesson_id)),
                        ("mode", v_str(query.mode.as_str())),
                        ("records", json!(records.len())),
                        ("chars", json!(merged.len())),
                    ]),
                );
                merged
            }
            Err(err) => {
                log(
                    Level::Warn,
                    Domain::History,
                    "fetch_failed",
                    obj(&[
                        ("user_id", v_str(query.user_id.as_str())),
                        ("lesson_id", v_str(&query.lesson_id)),
                        ("mode", v_str(query.mode.as_str())),
                        ("msg", v_str("error loading historical data")),
                        ("error", v_str(&format!("{:#}", err))),
                    ]),
                );
                HistoricalAverage::new()
            }
        }
    }
}
