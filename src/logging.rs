//! JSON-line logging on stderr.
//!
//! `LOG_LEVEL` sets the floor (default `info`) and `LOG_DOMAINS` narrows output
//! to a comma-separated list of domains. Every line carries the run id and a
//! sequence number so the history and save tasks of one session can be read
//! back in order. With `LOG_DIR` set, lines are also appended under
//! `LOG_DIR/<run_id>/`: debug and trace to `trace.jsonl`, the rest to
//! `events.jsonl`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn parse(s: &str) -> Option<Self> {
        Some(match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Level::Trace,
            "debug" => Level::Debug,
            "info" => Level::Info,
            "warn" | "warning" => Level::Warn,
            "error" => Level::Error,
            _ => return None,
        })
    }

    pub fn from_env() -> Self {
        std::env::var("LOG_LEVEL").ok().and_then(|v| Self::parse(&v)).unwrap_or(Level::Info)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    /// mount, re-render, unmount
    Session,
    History,
    Record,
    Store,
    /// session documents and key events
    Input,
    System,
    /// store call latency
    Profile,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Session => "session",
            Domain::History => "history",
            Domain::Record => "record",
            Domain::Store => "store",
            Domain::Input => "input",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match std::env::var("LOG_DOMAINS") {
            Err(_) => true,
            Ok(list) if list.trim() == "all" => true,
            Ok(list) => list.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

type Sink = Mutex<BufWriter<File>>;

struct Run {
    id: String,
    events: Option<Sink>,
    trace: Option<Sink>,
}

static SEQ: AtomicU64 = AtomicU64::new(0);
static RUN: OnceLock<Run> = OnceLock::new();

fn next_seq() -> u64 {
    SEQ.fetch_add(1, Ordering::SeqCst)
}

fn run() -> &'static Run {
    RUN.get_or_init(|| {
        let id = std::env::var("RUN_ID").unwrap_or_else(|_| {
            format!("r-{}-{}", Utc::now().timestamp_millis(), std::process::id())
        });
        let dir = std::env::var("LOG_DIR").ok().map(|base| Path::new(&base).join(&id));
        let (events, trace) = match dir {
            Some(dir) => match fs::create_dir_all(&dir) {
                Ok(()) => (sink(&dir.join("events.jsonl")), sink(&dir.join("trace.jsonl"))),
                Err(err) => {
                    eprintln!("[log] cannot create {}: {}", dir.display(), err);
                    (None, None)
                }
            },
            None => (None, None),
        };
        Run { id, events, trace }
    })
}

fn sink(path: &Path) -> Option<Sink> {
    File::create(path)
        .map(|f| Mutex::new(BufWriter::new(f)))
        .map_err(|err| eprintln!("[log] cannot create {}: {}", path.display(), err))
        .ok()
}

fn append(sink: Option<&Sink>, line: &str) {
    let Some(sink) = sink else { return };
    if let Ok(mut w) = sink.lock() {
        let _ = writeln!(w, "{}", line).and_then(|_| w.flush());
    }
}

const SECRET_KEYS: [&str; 5] = ["apikey", "anon_key", "api_key", "authorization", "Authorization"];
/// Correlation fields lifted out of `data` to the top level of the line.
const TOP_KEYS: [&str; 4] = ["session_id", "user_id", "lesson_id", "mode"];

fn build_entry(run_id: &str, level: Level, component: &str, event: &str, mut fields: Map<String, Value>) -> Map<String, Value> {
    for key in SECRET_KEYS {
        if let Some(v) = fields.get_mut(key) {
            *v = json!("[REDACTED]");
        }
    }
    let mut entry = Map::new();
    entry.insert("ts".into(), json!(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)));
    entry.insert("run_id".into(), json!(run_id));
    entry.insert("seq".into(), json!(next_seq()));
    entry.insert("lvl".into(), json!(level.as_str()));
    entry.insert("component".into(), json!(component));
    entry.insert("event".into(), json!(event));
    entry.insert("msg".into(), fields.remove("msg").unwrap_or_else(|| json!("")));
    for key in TOP_KEYS {
        if let Some(v) = fields.remove(key) {
            entry.insert(key.into(), v);
        }
    }
    entry.insert("data".into(), Value::Object(fields));
    entry
}

pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < Level::from_env() || !domain.is_enabled() {
        return;
    }
    let run = run();
    let entry = build_entry(&run.id, level, domain.as_str(), event, fields);
    let line = Value::Object(entry.clone()).to_string();
    let file = if level <= Level::Debug { &run.trace } else { &run.events };
    append(file.as_ref(), &line);
    eprintln!("{}", line);
    #[cfg(test)]
    capture::push(entry);
}


/// Hex sha256, tags persisted rows in the audit log.
pub fn fingerprint(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

/// Logs the elapsed time of its scope at trace level when dropped.
pub struct ProfileScope {
    label: &'static str,
    fields: Map<String, Value>,
    started: Instant,
}

impl ProfileScope {
    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        Self { label, fields: obj(fields), started: Instant::now() }
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let mut fields = std::mem::take(&mut self.fields);
        fields.insert("label".into(), v_str(self.label));
        fields.insert("elapsed_ms".into(), v_num(self.started.elapsed().as_secs_f64() * 1000.0));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse_and_order() {
        assert_eq!(Level::parse("WARN"), Some(Level::Warn));
        assert_eq!(Level::parse("warning"), Some(Level::Warn));
        assert_eq!(Level::parse("fatal"), None);
        assert!(Level::Trace < Level::Debug && Level::Info < Level::Warn && Level::Warn < Level::Error);
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let h1 = fingerprint("row");
        assert_eq!(h1, fingerprint("row"));
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, fingerprint("other row"));
    }

    #[test]
    fn test_credentials_redacted() {
        let entry = build_entry(
            "r-test",
            Level::Info,
            "store",
            "insert",
            obj(&[("apikey", v_str("secret")), ("user_id", v_str("u1")), ("msg", v_str("hi"))]),
        );
        assert_eq!(entry["user_id"], "u1");
        assert_eq!(entry["msg"], "hi");
        assert_eq!(entry["data"]["apikey"], "[REDACTED]");
        assert!(entry["data"].get("user_id").is_none());
        assert_eq!(entry["lvl"], "INFO");
    }

    #[test]
    fn test_seq_increments() {
        let s1 = next_seq();
        assert!(next_seq() > s1);
    }

    #[test]
    fn test_emitted_entries_are_captured_per_thread() {
        capture::take();
        log(Level::Error, Domain::System, "boom", obj(&[("msg", v_str("x"))]));
        let entries = capture::take();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["event"], "boom");
        assert_eq!(entries[0]["component"], "system");
    }
}
