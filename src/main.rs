//! Results screen driver.
//!
//! Usage:
//!   cwdrill [session.json]      - read the session document (stdin when omitted)
//!
//! The document is the training controller's output plus two optional fields:
//!   "user_id"  - signed-in identity (falls back to CWDRILL_USER)
//!   "keys"     - key presses to replay against the mounted screen ("Tab", "Enter")

use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;

use cwdrill::keys::{Key, KeyRegistry, SessionHooks};
use cwdrill::logging::{log, obj, v_str, Domain, Level};
use cwdrill::session::{SessionInput, UserId};
use cwdrill::state::Config;
use cwdrill::store::StoreKind;
use cwdrill::surface::ResultsSurface;

#[derive(Debug, Deserialize)]
struct SessionDocument {
    #[serde(flatten)]
    session: SessionInput,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    keys: Vec<String>,
}

fn read_document(path: Option<&str>) -> Result<SessionDocument> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("read {}", path))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("read stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("parse session document")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let path = std::env::args().nth(1);
    let doc = read_document(path.as_deref())?;

    let user = doc.user_id.and_then(UserId::new).or_else(|| cfg.default_user.clone());
    let kind = StoreKind::from_env();
    let store = kind.build(&cfg)?;
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("store", v_str(kind.as_str())),
            ("lesson_id", v_str(&doc.session.lesson_id)),
            ("signed_in", json!(user.is_some())),
        ]),
    );

    let repeats = Arc::new(AtomicUsize::new(0));
    let advances = Arc::new(AtomicUsize::new(0));
    let hooks = {
        let (r, a) = (repeats.clone(), advances.clone());
        SessionHooks::new(
            move || {
                r.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                a.fetch_add(1, Ordering::SeqCst);
            },
        )
    };

    let keys = KeyRegistry::new();
    let mut surface = ResultsSurface::mount(doc.session, user, store, &keys, hooks);
    for name in &doc.keys {
        keys.dispatch(Key::parse(name));
    }
    surface.settle().await;

    print!("{}", surface.view().render_text());
    if !doc.keys.is_empty() {
        println!(
            "repeat requested: {}, advance requested: {}",
            repeats.load(Ordering::SeqCst),
            advances.load(Ordering::SeqCst)
        );
    }
    surface.unmount();
    Ok(())
}
