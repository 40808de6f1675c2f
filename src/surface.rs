//! The mounted results screen.
//!
//! Holds the latest inputs and, once the session is complete and someone is
//! signed in, runs two independent background tasks: the history fetch,
//! which reports into its own slot, and the result save, which goes through
//! the recorder latch. Neither blocks `view`.

use std::sync::{Arc, Mutex};

use rand::Rng;
use tokio::task::JoinHandle;

use crate::history::{HistoricalComparator, HistoryOutcome};
use crate::keys::{bind_shortcuts, KeyRegistry, ListenerGuard, SessionHooks};
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::recorder::{Lifecycle, ResultRecorder};
use crate::session::{HistoricalAverage, Mode, SessionInput, UserId};
use crate::store::ResultStore;
use crate::summary::SummaryView;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum HistoryStatus {
    #[default]
    Idle,
    Loading,
    Loaded(HistoricalAverage),
}

#[derive(Debug, Default)]
struct SlotState {
    generation: u64,
    status: HistoryStatus,
}

/// Result slot of the history task. Each fetch is tagged with the generation
/// current when it started; a write from an older generation is dropped.
#[derive(Debug, Clone, Default)]
pub struct HistorySlot {
    inner: Arc<Mutex<SlotState>>,
}

impl HistorySlot {
    pub fn get(&self) -> HistoryStatus {
        self.inner.lock().map(|s| s.status.clone()).unwrap_or_default()
    }

    /// Invalidates every earlier fetch and returns the new generation.
    fn begin(&self, status: HistoryStatus) -> u64 {
        match self.inner.lock() {
            Ok(mut slot) => {
                slot.generation += 1;
                slot.status = status;
                slot.generation
            }
            Err(_) => 0,
        }
    }

    fn finish(&self, generation: u64, status: HistoryStatus) -> bool {
        match self.inner.lock() {
            Ok(mut slot) if slot.generation == generation => {
                slot.status = status;
                true
            }
            _ => false,
        }
    }
}

/// Inputs the history effect depends on; a change re-runs the fetch.
type HistoryKey = (Option<UserId>, bool, String, Mode);

fn new_session_id() -> String {
    format!("s-{:016x}", rand::thread_rng().gen::<u64>())
}

pub struct ResultsSurface {
    input: SessionInput,
    user: Option<UserId>,
    store: Arc<dyn ResultStore>,
    recorder: ResultRecorder,
    history: HistorySlot,
    history_key: Option<HistoryKey>,
    history_task: Option<JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
    keys: KeyRegistry,
    hooks: SessionHooks,
    shortcuts: Option<(bool, ListenerGuard)>,
}

impl ResultsSurface {
    /// Must be called inside a tokio runtime.
    pub fn mount(
        input: SessionInput,
        user: Option<UserId>,
        store: Arc<dyn ResultStore>,
        keys: &KeyRegistry,
        hooks: SessionHooks,
    ) -> Self {
        let recorder = ResultRecorder::new(new_session_id());
        log(
            Level::Info,
            Domain::Session,
            "mount",
            obj(&[
                ("session_id", v_str(recorder.session_id())),
                ("lesson_id", v_str(&input.lesson_id)),
                ("mode", v_str(input.mode.as_str())),
                ("signed_in", serde_json::Value::Bool(user.is_some())),
                ("completed", serde_json::Value::Bool(input.completed)),
            ]),
        );
        let mut surface = Self {
            input,
            user,
            store,
            recorder,
            history: HistorySlot::default(),
            history_key: None,
            history_task: None,
            tasks: Vec::new(),
            keys: keys.clone(),
            hooks,
            shortcuts: None,
        };
        surface.sync();
        surface
    }

    /// Re-render with fresh inputs from the controller.
    pub fn update(&mut self, input: SessionInput, user: Option<UserId>) {
        self.input = input;
        self.user = user;
        self.sync();
    }

    fn sync(&mut self) {
        self.tasks.retain(|t| !t.is_finished());
        self.bind_keys();
        if self.input.completed {
            self.recorder.mark_completed();
        }
        self.schedule_history();
        self.schedule_save();
    }

    fn bind_keys(&mut self) {
        let completed = self.input.completed;
        if matches!(&self.shortcuts, Some((bound, _)) if *bound == completed) {
            return;
        }
        // release the stale binding before registering the new one
        self.shortcuts = None;
        let guard = bind_shortcuts(&self.keys, self.hooks.clone(), completed);
        self.shortcuts = Some((completed, guard));
    }

    fn schedule_history(&mut self) {
        let key: HistoryKey = (
            self.user.clone(),
            self.input.completed,
            self.input.lesson_id.clone(),
            self.input.mode,
        );
        if self.history_key.as_ref() == Some(&key) {
            return;
        }
        self.history_key = Some(key);
        if let Some(stale) = self.history_task.take() {
            stale.abort();
        }

        let Some(user) = self.user.clone().filter(|_| self.input.completed) else {
            self.history.begin(HistoryStatus::Idle);
            return;
        };
        let comparator = HistoricalComparator::new(self.store.clone());
        let slot = self.history.clone();
        let (lesson_id, mode) = (self.input.lesson_id.clone(), self.input.mode);
        let generation = slot.begin(HistoryStatus::Loading);
        self.history_task = Some(tokio::spawn(async move {
            if let HistoryOutcome::Loaded(avg) = comparator.compare(Some(&user), true, &lesson_id, mode).await {
                if !slot.finish(generation, HistoryStatus::Loaded(avg)) {
                    log(
                        Level::Debug,
                        Domain::History,
                        "stale_dropped",
                        obj(&[("lesson_id", v_str(&lesson_id)), ("mode", v_str(mode.as_str()))]),
                    );
                }
            }
        }));
    }

    fn schedule_save(&mut self) {
        if !self.input.completed || self.user.is_none() || self.recorder.state() != Lifecycle::Completed {
            return;
        }
        let recorder = self.recorder.clone();
        let store = self.store.clone();
        let user = self.user.clone();
        let input = self.input.clone();
        self.tasks.push(tokio::spawn(async move {
            recorder.record(store.as_ref(), user.as_ref(), &input).await;
        }));
    }

    pub fn view(&self) -> SummaryView {
        let history = match self.history.get() {
            HistoryStatus::Loaded(avg) => Some(avg),
            HistoryStatus::Idle | HistoryStatus::Loading => None,
        };
        SummaryView::build(&self.input, history.as_ref())
    }

    pub fn history_status(&self) -> HistoryStatus {
        self.history.get()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.recorder.state()
    }

    pub fn session_id(&self) -> &str {
        self.recorder.session_id()
    }

    /// Waits for in-flight background tasks.
    pub async fn settle(&mut self) {
        let history = self.history_task.take();
        for task in history.into_iter().chain(self.tasks.drain(..)) {
            match task.await {
                Err(err) if !err.is_cancelled() => log(
                    Level::Error,
                    Domain::Session,
                    "task_failed",
                    obj(&[
                        ("session_id", v_str(self.recorder.session_id())),
                        ("error", v_str(&err.to_string())),
                    ]),
                ),
                _ => {}
            }
        }
    }

    /// Releases the key bindings. Background tasks finish on their own.
    pub fn unmount(self) {
        log(
            Level::Info,
            Domain::Session,
            "unmount",
            obj(&[("session_id", v_str(self.recorder.session_id()))]),
        );
    }
}
