use crate::session::{Mode, UserId};

#[derive(Clone, Debug)]
pub struct Config {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub results_table: String,
    pub sqlite_path: String,
    /// Deadline for each store call; unset means wait indefinitely
    pub store_timeout_ms: Option<u64>,
    pub default_user: Option<UserId>,
    pub default_mode: Mode,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            supabase_url: std::env::var("SUPABASE_URL").ok().filter(|v| !v.is_empty()),
            supabase_anon_key: std::env::var("SUPABASE_ANON_KEY").ok().filter(|v| !v.is_empty()),
            results_table: std::env::var("RESULTS_TABLE").unwrap_or_else(|_| "training_results".to_string()),
            sqlite_path: std::env::var("SQLITE_PATH").unwrap_or_else(|_| "./cwdrill.sqlite".to_string()),
            store_timeout_ms: std::env::var("STORE_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).filter(|&ms| ms > 0),
            default_user: std::env::var("CWDRILL_USER").ok().and_then(UserId::new),
            default_mode: std::env::var("MODE").ok().and_then(|v| Mode::parse(&v)).unwrap_or_default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_anon_key: None,
            results_table: "training_results".to_string(),
            sqlite_path: "./cwdrill.sqlite".to_string(),
            store_timeout_ms: None,
            default_user: None,
            default_mode: Mode::Copy,
        }
    }
}
