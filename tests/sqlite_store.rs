use std::sync::Arc;

use cwdrill::session::{HistoryQuery, Mode, ResponseSample, SessionInput, SessionResult, UserId};
use cwdrill::store::{ResultStore, SqliteStore};
use rusqlite::Connection;
use tempfile::TempDir;

fn result(user: &str, lesson: &str, mode: Mode, samples: &[(char, f64)]) -> SessionResult {
    let input = SessionInput {
        completed: true,
        elapsed_seconds: 90.0,
        replay_count: 2,
        mistakes: [('k', 3)].into_iter().collect(),
        samples: samples.iter().map(|&(c, t)| ResponseSample::new(c, t)).collect(),
        lesson_id: lesson.to_string(),
        mode,
    };
    SessionResult::from_session(UserId::new(user).unwrap(), &input)
}

fn query(user: &str, lesson: &str, mode: Mode) -> HistoryQuery {
    HistoryQuery { user_id: UserId::new(user).unwrap(), lesson_id: lesson.to_string(), mode }
}

#[tokio::test]
async fn insert_then_fetch_by_exact_tuple() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.sqlite");
    let store = SqliteStore::open(path.to_str().unwrap(), "training_results").unwrap();

    store.insert(&result("u1", "l1", Mode::Copy, &[('k', 0.5), ('m', 1.5)])).await.unwrap();
    store.insert(&result("u2", "l1", Mode::Copy, &[('k', 9.0)])).await.unwrap();
    store.insert(&result("u1", "l2", Mode::Copy, &[('k', 9.0)])).await.unwrap();
    store.insert(&result("u1", "l1", Mode::Send, &[('k', 9.0)])).await.unwrap();

    let rows = store.fetch_times(&query("u1", "l1", Mode::Copy)).await.unwrap();
    assert_eq!(rows.len(), 1);
    let times = rows[0].times.as_ref().unwrap();
    assert_eq!(times[&'k'], 0.5);
    assert_eq!(times[&'m'], 1.5);
}

#[tokio::test]
async fn rows_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.sqlite");
    let path = path.to_str().unwrap();
    {
        let store = SqliteStore::open(path, "training_results").unwrap();
        store.insert(&result("u1", "l1", Mode::Send, &[('a', 0.25)])).await.unwrap();
    }
    let store = SqliteStore::open(path, "training_results").unwrap();
    let rows = store.fetch_times(&query("u1", "l1", Mode::Send)).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn null_and_odd_times_are_tolerated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.sqlite");
    let path = path.to_str().unwrap();
    let store = SqliteStore::open(path, "training_results").unwrap();

    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "INSERT INTO training_results (user_id, level_id, mode, time_sec, tone_replays, mistakes, times, created_at)
         VALUES ('u1', 'l1', 'copy', 1.0, 0, '{}', NULL, 'x');
         INSERT INTO training_results (user_id, level_id, mode, time_sec, tone_replays, mistakes, times, created_at)
         VALUES ('u1', 'l1', 'copy', 1.0, 0, '{}', '{\"a\": 0.4, \"<SK>\": 2.0}', 'x');
         INSERT INTO training_results (user_id, level_id, mode, time_sec, tone_replays, mistakes, times, created_at)
         VALUES ('u1', 'l1', 'copy', 1.0, 0, '{}', 'not json', 'x');",
    )
    .unwrap();

    let rows = store.fetch_times(&query("u1", "l1", Mode::Copy)).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows[0].times.is_none());
    let second = rows[1].times.as_ref().unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[&'a'], 0.4);
    assert!(rows[2].times.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_calls_share_one_connection() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.sqlite");
    let store = Arc::new(SqliteStore::open(path.to_str().unwrap(), "training_results").unwrap());

    let mut tasks = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store.insert(&result("u1", "l1", Mode::Copy, &[('e', i as f64)])).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let rows = store.fetch_times(&query("u1", "l1", Mode::Copy)).await.unwrap();
    assert_eq!(rows.len(), 8);
}

#[test]
fn rejects_unsafe_table_name() {
    assert!(SqliteStore::in_memory("results; DROP TABLE x").is_err());
    assert!(SqliteStore::in_memory("").is_err());
    assert!(SqliteStore::in_memory("training_results").is_ok());
}
