//! Writes the one result row of a completed session.
//!
//! The lifecycle doubles as the latch: the transition into `Recording` is
//! made under the lock before the store is called, so overlapping triggers
//! of the same session cannot both reach the insert.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::json;

use crate::logging::{fingerprint, log, obj, v_num, v_str, Domain, Level, ProfileScope};
use crate::session::{SessionInput, SessionResult, UserId};
use crate::store::ResultStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Pending,
    Completed,
    /// Insert claimed and in flight.
    Recording,
    /// Insert attempted; no further attempts for this session.
    Recorded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotCompleted,
    NoUser,
    AlreadyRecorded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Saved,
    /// Insert failed; logged and not retried.
    Failed,
    Skipped(SkipReason),
}

/// Latch for one session instance. Clones share the latch.
#[derive(Debug, Clone)]
pub struct ResultRecorder {
    session_id: String,
    state: Arc<Mutex<Lifecycle>>,
}

impl ResultRecorder {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: Arc::new(Mutex::new(Lifecycle::Pending)),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> Lifecycle {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        // the lifecycle is a plain enum, a poisoned guard still holds a valid value
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `Pending -> Completed`; any other state is left alone.
    pub fn mark_completed(&self) {
        let mut state = self.lock();
        if *state == Lifecycle::Pending {
            *state = Lifecycle::Completed;
        }
    }

    fn claim<'u>(&self, completed: bool, user: Option<&'u UserId>) -> Result<&'u UserId, SkipReason> {
        if !completed {
            return Err(SkipReason::NotCompleted);
        }
        let mut state = self.lock();
        if *state == Lifecycle::Pending {
            *state = Lifecycle::Completed;
        }
        match (*state, user) {
            (Lifecycle::Pending, _) => Err(SkipReason::NotCompleted),
            (Lifecycle::Recording | Lifecycle::Recorded, _) => Err(SkipReason::AlreadyRecorded),
            (Lifecycle::Completed, None) => Err(SkipReason::NoUser),
            (Lifecycle::Completed, Some(user)) => {
                *state = Lifecycle::Recording;
                Ok(user)
            }
        }
    }

    pub async fn record(
        &self,
        store: &dyn ResultStore,
        user: Option<&UserId>,
        input: &SessionInput,
    ) -> RecordOutcome {
        let user = match self.claim(input.completed, user) {
            Ok(user) => user,
            Err(reason) => return RecordOutcome::Skipped(reason),
        };

        let result = SessionResult::from_session(user.clone(), input);
        let row_hash = serde_json::to_string(&result)
            .map(|row| fingerprint(&row))
            .unwrap_or_default();

        let inserted = {
            let _p = ProfileScope::with_context("result_insert", &[("backend", v_str(store.backend()))]);
            store.insert(&result).await
        };
        *self.lock() = Lifecycle::Recorded;

        let mut fields = obj(&[
            ("session_id", v_str(&self.session_id)),
            ("user_id", v_str(user.as_str())),
            ("lesson_id", v_str(&result.lesson_id)),
            ("mode", v_str(result.mode.as_str())),
            ("time_sec", v_num(result.total_elapsed_seconds)),
            ("chars", json!(result.times.len())),
            ("row_hash", v_str(&row_hash)),
        ]);
        match inserted {
            Ok(()) => {
                log(Level::Info, Domain::Record, "saved", fields);
                RecordOutcome::Saved
            }
            Err(err) => {
                fields.insert("msg".to_string(), v_str("error saving training result"));
                fields.insert("error".to_string(), v_str(&format!("{:#}", err)));
                log(Level::Error, Domain::Record, "save_failed", fields);
                RecordOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Mode, ResponseSample};
    use crate::store::MemoryStore;

    fn completed_input() -> SessionInput {
        SessionInput {
            completed: true,
            elapsed_seconds: 33.3,
            replay_count: 1,
            mistakes: [('a', 2), ('b', 0)].into_iter().collect(),
            samples: vec![
                ResponseSample::new('a', 0.5),
                ResponseSample::new('a', 0.9),
                ResponseSample::new('b', 3.5),
            ],
            lesson_id: "lesson-1".to_string(),
            mode: Mode::Copy,
        }
    }

    #[tokio::test]
    async fn test_second_call_does_not_write() {
        let store = MemoryStore::new();
        let recorder = ResultRecorder::new("s-1");
        let user = UserId::new("u1").unwrap();
        let input = completed_input();

        assert_eq!(recorder.record(&store, Some(&user), &input).await, RecordOutcome::Saved);
        assert_eq!(
            recorder.record(&store, Some(&user), &input).await,
            RecordOutcome::Skipped(SkipReason::AlreadyRecorded)
        );
        assert_eq!(store.writes(), 1);
        assert_eq!(recorder.state(), Lifecycle::Recorded);

        let rows = store.rows();
        assert_eq!(rows[0].times.len(), 2);
        assert!((rows[0].times[&'a'] - 0.7).abs() < 1e-12);
        assert_eq!(rows[0].tone_replay_count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_write_once() {
        let store: Arc<dyn ResultStore> = Arc::new(MemoryStore::new());
        let recorder = ResultRecorder::new("s-2");
        let user = UserId::new("u1").unwrap();
        let input = completed_input();
        let rerender = recorder.clone();

        let (a, b) = tokio::join!(
            recorder.record(store.as_ref(), Some(&user), &input),
            rerender.record(store.as_ref(), Some(&user), &input),
        );
        let saved = [a, b].iter().filter(|o| **o == RecordOutcome::Saved).count();
        assert_eq!(saved, 1);
    }

    #[tokio::test]
    async fn test_not_completed_never_writes() {
        let store = MemoryStore::new();
        let recorder = ResultRecorder::new("s-3");
        let user = UserId::new("u1").unwrap();
        let input = SessionInput { completed: false, ..completed_input() };

        assert_eq!(
            recorder.record(&store, Some(&user), &input).await,
            RecordOutcome::Skipped(SkipReason::NotCompleted)
        );
        assert_eq!(recorder.state(), Lifecycle::Pending);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_no_user_keeps_session_recordable() {
        let store = MemoryStore::new();
        let recorder = ResultRecorder::new("s-4");
        let input = completed_input();

        assert_eq!(
            recorder.record(&store, None, &input).await,
            RecordOutcome::Skipped(SkipReason::NoUser)
        );
        assert_eq!(recorder.state(), Lifecycle::Completed);
        assert_eq!(store.writes(), 0);

        let user = UserId::new("u1").unwrap();
        assert_eq!(recorder.record(&store, Some(&user), &input).await, RecordOutcome::Saved);
    }

    #[tokio::test]
    async fn test_uncompleted_input_never_writes_after_earlier_completion() {
        let store = MemoryStore::new();
        let recorder = ResultRecorder::new("s-7");
        let input = completed_input();

        assert_eq!(
            recorder.record(&store, None, &input).await,
            RecordOutcome::Skipped(SkipReason::NoUser)
        );
        assert_eq!(recorder.state(), Lifecycle::Completed);

        let user = UserId::new("u1").unwrap();
        let reopened = SessionInput { completed: false, ..input };
        assert_eq!(
            recorder.record(&store, Some(&user), &reopened).await,
            RecordOutcome::Skipped(SkipReason::NotCompleted)
        );
        assert_eq!(recorder.state(), Lifecycle::Completed);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_is_not_retried() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let recorder = ResultRecorder::new("s-5");
        let user = UserId::new("u1").unwrap();
        let input = completed_input();

        assert_eq!(recorder.record(&store, Some(&user), &input).await, RecordOutcome::Failed);
        store.set_fail_writes(false);
        assert_eq!(
            recorder.record(&store, Some(&user), &input).await,
            RecordOutcome::Skipped(SkipReason::AlreadyRecorded)
        );
        assert_eq!(store.writes(), 1);
        assert!(store.rows().is_empty());
    }

    #[test]
    fn test_mark_completed_only_from_pending() {
        let recorder = ResultRecorder::new("s-6");
        recorder.mark_completed();
        assert_eq!(recorder.state(), Lifecycle::Completed);
        *recorder.lock() = Lifecycle::Recorded;
        recorder.mark_completed();
        assert_eq!(recorder.state(), Lifecycle::Recorded);
    }
}
