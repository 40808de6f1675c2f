use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use url::Url;

use super::{parse_times, ResultStore};
use crate::session::{HistoryQuery, SessionResult, StoredTimes};
use crate::state::Config;

/// Hosted backend speaking the PostgREST dialect (`/rest/v1/<table>`).
pub struct RestStore {
    client: Client,
    base: Url,
    anon_key: String,
    table: String,
}

#[derive(Deserialize, Debug)]
struct TimesRow {
    #[serde(default)]
    times: Option<BTreeMap<String, f64>>,
}

impl RestStore {
    pub fn new(cfg: &Config) -> Result<Self> {
        let url = cfg
            .supabase_url
            .as_deref()
            .ok_or_else(|| anyhow!("SUPABASE_URL is required for the rest store"))?;
        let anon_key = cfg
            .supabase_anon_key
            .clone()
            .ok_or_else(|| anyhow!("SUPABASE_ANON_KEY is required for the rest store"))?;
        Ok(Self {
            client: Client::new(),
            base: Url::parse(url).with_context(|| format!("bad backend url {}", url))?,
            anon_key,
            table: cfg.results_table.clone(),
        })
    }

    fn table_url(&self) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("backend url cannot be a base: {}", self.base))?
            .pop_if_empty()
            .extend(["rest", "v1", self.table.as_str()]);
        Ok(url)
    }

    fn history_url(&self, query: &HistoryQuery) -> Result<Url> {
        let mut url = self.table_url()?;
        url.query_pairs_mut()
            .append_pair("select", "times")
            .append_pair("user_id", &format!("eq.{}", query.user_id))
            .append_pair("mode", &format!("eq.{}", query.mode))
            .append_pair("level_id", &format!("eq.{}", query.lesson_id));
        Ok(url)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }
}

async fn check_status(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    bail!("{} failed with {}: {}", what, status, body)
}

#[async_trait]
impl ResultStore for RestStore {
    async fn fetch_times(&self, query: &HistoryQuery) -> Result<Vec<StoredTimes>> {
        let url = self.history_url(query)?;
        let resp = self.authorized(self.client.get(url)).send().await?;
        let rows: Vec<TimesRow> = check_status(resp, "history fetch").await?.json().await?;
        Ok(rows
            .into_iter()
            .map(|row| StoredTimes { times: row.times.map(parse_times) })
            .collect())
    }

    async fn insert(&self, result: &SessionResult) -> Result<()> {
        let url = self.table_url()?;
        let resp = self
            .authorized(self.client.post(url))
            .header("Prefer", "return=minimal")
            .json(&[result])
            .send()
            .await?;
        check_status(resp, "result insert").await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "rest"
    }
}
