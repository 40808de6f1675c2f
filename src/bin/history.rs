//! Prints a user's historical per-character averages.
//!
//! Usage:
//!   history <user_id> <lesson_id> [copy|send]

use anyhow::{anyhow, Result};

use cwdrill::aggregate::SpeedClass;
use cwdrill::history::HistoricalComparator;
use cwdrill::session::{HistoryQuery, Mode, UserId};
use cwdrill::state::Config;
use cwdrill::store::StoreKind;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("usage: history <user_id> <lesson_id> [copy|send]");
        std::process::exit(2);
    }
    let user_id = UserId::new(args[0].as_str()).ok_or_else(|| anyhow!("user id must not be blank"))?;
    let mode = match args.get(2) {
        Some(m) => Mode::parse(m).ok_or_else(|| anyhow!("unknown mode {:?}", m))?,
        None => cfg.default_mode,
    };
    let query = HistoryQuery { user_id, lesson_id: args[1].clone(), mode };

    let store = StoreKind::from_env().build(&cfg)?;
    let averages = HistoricalComparator::new(store).load(&query).await;
    if averages.is_empty() {
        println!("no history for {} / {} ({})", query.user_id, query.lesson_id, query.mode);
        return Ok(());
    }
    for (c, avg) in &averages {
        println!("{}  {:>6.2}s  {}", c.to_uppercase(), avg, SpeedClass::classify(*avg).as_str());
    }
    Ok(())
}
