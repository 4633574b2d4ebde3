use std::collections::BTreeMap;
use std::env;
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{DEFAULT_PAGE_INFO_BATCH, WikiConfig};
use crate::error::TranslatorError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemotePage {
    pub title: String,
    pub page_id: i64,
    pub revision_id: i64,
    pub timestamp: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub exists: bool,
    pub is_redirect: bool,
}

pub trait WikiReadApi {
    /// Latest revision of `title`, `None` when the page is missing.
    fn fetch_page(&mut self, title: &str) -> Result<Option<RemotePage>>;

    fn fetch_raw_content(&mut self, title: &str) -> Result<Option<String>> {
        Ok(self.fetch_page(title)?.map(|page| page.content))
    }

    /// Existence and redirect flags keyed by the titles as requested.
    fn query_page_info(&mut self, titles: &[String]) -> Result<BTreeMap<String, PageInfo>>;

    fn query_outgoing_links(&mut self, titles: &[String]) -> Result<BTreeMap<String, String>>;

    fn request_count(&self) -> usize;
}

impl<A: WikiReadApi + ?Sized> WikiReadApi for &mut A {
    fn fetch_page(&mut self, title: &str) -> Result<Option<RemotePage>> {
        (**self).fetch_page(title)
    }

    fn fetch_raw_content(&mut self, title: &str) -> Result<Option<String>> {
        (**self).fetch_raw_content(title)
    }

    fn query_page_info(&mut self, titles: &[String]) -> Result<BTreeMap<String, PageInfo>> {
        (**self).query_page_info(titles)
    }

    fn query_outgoing_links(&mut self, titles: &[String]) -> Result<BTreeMap<String, String>> {
        (**self).query_outgoing_links(titles)
    }

    fn request_count(&self) -> usize {
        (**self).request_count()
    }
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub page_info_batch: usize,
}

impl MediaWikiClientConfig {
    pub fn from_config(config: &WikiConfig) -> Self {
        Self {
            api_url: config.api_url(),
            user_agent: config.user_agent(),
            timeout_ms: env_value_u64("WIKI_HTTP_TIMEOUT_MS", 30_000),
            rate_limit_read_ms: env_value_u64("WIKI_RATE_LIMIT_READ", 300),
            max_retries: env_value_usize("WIKI_HTTP_RETRIES", 2),
            retry_delay_ms: env_value_u64("WIKI_HTTP_RETRY_DELAY_MS", 500),
            page_info_batch: config.page_info_batch(),
        }
    }
}

pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
        })
    }

    fn batch_size(&self) -> usize {
        if self.config.page_info_batch == 0 {
            DEFAULT_PAGE_INFO_BATCH
        } else {
            self.config.page_info_batch
        }
    }

    fn request_json_get(&mut self, params: &[(&str, String)]) -> Result<Value> {
        let base_url = Url::parse(&self.config.api_url)
            .with_context(|| format!("invalid WIKI_API_URL: {}", self.config.api_url))?;

        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            if !value.is_empty() {
                pairs.push(((*key).to_string(), value.clone()));
            }
        }

        for attempt in 0..=self.config.max_retries {
            self.apply_rate_limit();
            let response = self
                .client
                .get(base_url.clone())
                .header("User-Agent", self.config.user_agent.clone())
                .query(&pairs)
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < self.config.max_retries && is_retryable_status(status) {
                            warn!(%status, attempt, "retrying MediaWiki request");
                            self.wait_before_retry(attempt);
                            continue;
                        }
                        return Err(transport_error(format!(
                            "MediaWiki API request failed with HTTP {status}"
                        )));
                    }

                    let payload: Value = response
                        .json()
                        .context("failed to decode MediaWiki API JSON response")?;
                    if let Some(message) = api_error_message(&payload) {
                        return Err(transport_error(message));
                    }
                    return Ok(payload);
                }
                Err(error) => {
                    if attempt < self.config.max_retries && is_retryable_error(&error) {
                        warn!(%error, attempt, "retrying MediaWiki request");
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    return Err(anyhow::Error::new(error).context(TranslatorError::Transport(
                        "failed to call MediaWiki API".to_string(),
                    )));
                }
            }
        }

        Err(transport_error(
            "MediaWiki API request exhausted retry budget".to_string(),
        ))
    }

    fn apply_rate_limit(&mut self) {
        let delay = Duration::from_millis(self.config.rate_limit_read_ms);
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        sleep(Duration::from_millis(base.saturating_add(jitter)));
    }
}

impl WikiReadApi for MediaWikiClient {
    fn fetch_page(&mut self, title: &str) -> Result<Option<RemotePage>> {
        let params = vec![
            ("action", "query".to_string()),
            ("titles", title.to_string()),
            ("prop", "revisions".to_string()),
            ("rvprop", "content|timestamp|ids".to_string()),
            ("rvslots", "main".to_string()),
        ];
        let response = self.request_json_get(&params)?;
        debug!(title, "fetched page revision");
        remote_page_from_response(response)
    }

    fn query_page_info(&mut self, titles: &[String]) -> Result<BTreeMap<String, PageInfo>> {
        let batch_size = self.batch_size();
        query_in_batches(titles, batch_size, |batch| {
            let params = vec![
                ("action", "query".to_string()),
                ("titles", batch.join("|")),
                ("prop", "info".to_string()),
            ];
            let response = self.request_json_get(&params)?;
            page_info_from_response(batch, response)
        })
    }

    fn query_outgoing_links(&mut self, titles: &[String]) -> Result<BTreeMap<String, String>> {
        let batch_size = self.batch_size();
        query_in_batches(titles, batch_size, |batch| {
            let params = vec![
                ("action", "query".to_string()),
                ("titles", batch.join("|")),
                ("prop", "links".to_string()),
                ("pllimit", "max".to_string()),
            ];
            let response = self.request_json_get(&params)?;
            first_links_from_response(batch, response)
        })
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

/// Sequential sub-requests of at most `batch_size` titles, merged.
fn query_in_batches<T, F>(
    titles: &[String],
    batch_size: usize,
    mut request: F,
) -> Result<BTreeMap<String, T>>
where
    F: FnMut(&[String]) -> Result<BTreeMap<String, T>>,
{
    let mut results = BTreeMap::new();
    for batch in titles.chunks(batch_size.max(1)) {
        results.extend(request(batch)?);
    }
    Ok(results)
}

fn transport_error(message: String) -> anyhow::Error {
    TranslatorError::Transport(message).into()
}

fn api_error_message(payload: &Value) -> Option<String> {
    let error = payload.get("error")?;
    let code = error
        .get("code")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error");
    let info = error
        .get("info")
        .and_then(Value::as_str)
        .unwrap_or("unknown info");
    Some(format!("MediaWiki API error [{code}]: {info}"))
}

fn remote_page_from_response(response: Value) -> Result<Option<RemotePage>> {
    let parsed: QueryResponse = serde_json::from_value(response)
        .context("failed to decode page content API response")?;
    let Some(page) = parsed.query.pages.into_vec().into_iter().next() else {
        return Ok(None);
    };
    if page.is_absent() {
        return Ok(None);
    }
    let Some(revision) = page.revisions.into_iter().next() else {
        return Ok(None);
    };
    let content = revision
        .slots
        .and_then(|slots| slots.main)
        .map(|slot| slot.content)
        .unwrap_or_default();
    Ok(Some(RemotePage {
        title: page.title,
        page_id: page.pageid.unwrap_or_default(),
        revision_id: revision.revid,
        timestamp: revision.timestamp,
        content,
    }))
}

fn page_info_from_response(
    requested: &[String],
    response: Value,
) -> Result<BTreeMap<String, PageInfo>> {
    let parsed: QueryResponse =
        serde_json::from_value(response).context("failed to decode page info API response")?;
    let query = parsed.query;
    let normalized = query.normalized_map();
    let interwiki = query
        .interwiki
        .iter()
        .map(|item| item.title.clone())
        .collect::<Vec<_>>();
    let pages = query
        .pages
        .into_vec()
        .into_iter()
        .map(|page| (page.title.clone(), page))
        .collect::<BTreeMap<_, _>>();

    let mut results = BTreeMap::new();
    for title in requested {
        let resolved = normalized.get(title).unwrap_or(title);
        let info = if interwiki.contains(resolved) {
            PageInfo::default()
        } else {
            match pages.get(resolved) {
                Some(page) => PageInfo {
                    exists: !page.is_absent(),
                    is_redirect: page.redirect,
                },
                None => PageInfo::default(),
            }
        };
        results.insert(title.clone(), info);
    }
    Ok(results)
}

fn first_links_from_response(
    requested: &[String],
    response: Value,
) -> Result<BTreeMap<String, String>> {
    let parsed: QueryResponse =
        serde_json::from_value(response).context("failed to decode page links API response")?;
    let query = parsed.query;
    let normalized = query.normalized_map();
    let first_links = query
        .pages
        .into_vec()
        .into_iter()
        .filter_map(|page| {
            let link = page.links.into_iter().next()?;
            Some((page.title, link.title))
        })
        .collect::<BTreeMap<_, _>>();

    let mut results = BTreeMap::new();
    for title in requested {
        let resolved = normalized.get(title).unwrap_or(title);
        if let Some(link) = first_links.get(resolved) {
            results.insert(title.clone(), link.clone());
        }
    }
    Ok(results)
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    #[serde(default)]
    normalized: Vec<NormalizedItem>,
    #[serde(default)]
    interwiki: Vec<InterwikiItem>,
    #[serde(default)]
    pages: PagesPayload,
}

impl QueryPayload {
    fn normalized_map(&self) -> BTreeMap<String, String> {
        self.normalized
            .iter()
            .map(|item| (item.from.clone(), item.to.clone()))
            .collect()
    }
}

/// `formatversion=2` sends a list; legacy responses key pages by id.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PagesPayload {
    List(Vec<PageQueryItem>),
    Keyed(BTreeMap<String, PageQueryItem>),
}

impl Default for PagesPayload {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl PagesPayload {
    fn into_vec(self) -> Vec<PageQueryItem> {
        match self {
            Self::List(pages) => pages,
            Self::Keyed(pages) => pages.into_values().collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NormalizedItem {
    from: String,
    to: String,
}

#[derive(Debug, Deserialize)]
struct InterwikiItem {
    title: String,
}

#[derive(Debug, Deserialize)]
struct PageQueryItem {
    pageid: Option<i64>,
    title: String,
    #[serde(default, deserialize_with = "flag")]
    missing: bool,
    #[serde(default, deserialize_with = "flag")]
    invalid: bool,
    #[serde(default, deserialize_with = "flag")]
    redirect: bool,
    #[serde(default)]
    revisions: Vec<RevisionQueryItem>,
    #[serde(default)]
    links: Vec<LinkQueryItem>,
}

impl PageQueryItem {
    fn is_absent(&self) -> bool {
        self.missing || self.invalid
    }
}

/// Accepts both `true` and the legacy empty-string presence marker.
fn flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(flag) => flag,
        Value::Null => false,
        _ => true,
    })
}

#[derive(Debug, Deserialize)]
struct RevisionQueryItem {
    revid: i64,
    timestamp: String,
    slots: Option<RevisionSlotContainer>,
}

#[derive(Debug, Deserialize)]
struct RevisionSlotContainer {
    main: Option<RevisionMainSlot>,
}

#[derive(Debug, Deserialize)]
struct RevisionMainSlot {
    content: String,
}

#[derive(Debug, Deserialize)]
struct LinkQueryItem {
    title: String,
}
