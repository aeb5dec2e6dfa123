use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::CACHE_CONTROL;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use crate::error::FetchError;
use crate::normalize::RawRecord;

pub const PAGE_SIZE: usize = 1000;
/// Hard cap on requests per dataset.
pub const MAX_PAGES: usize = 200;
pub const DEFAULT_PROXY_BASE: &str = "https://corsproxy.io/?";

// Characters `encodeURIComponent` leaves alone besides alphanumerics.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Anything that can GET a URL and hand back its JSON body.
pub trait PageSource {
    async fn get_json(&self, url: &str) -> Result<Value, FetchError>;
}

#[derive(Default)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PageSource for HttpSource {
    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let resp = self
            .client
            .get(url)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;
        check_status(resp.status(), url)?;
        let body = resp.text().await?;
        parse_body(&body)
    }
}

/// Non-success statuses become `FetchError::Network`.
pub fn check_status(status: StatusCode, url: &str) -> Result<(), FetchError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(FetchError::Network {
            status,
            url: url.to_string(),
        })
    }
}

pub fn parse_body(body: &str) -> Result<Value, FetchError> {
    Ok(serde_json::from_str(body)?)
}

/// Prefix-style proxy: `base` + percent-encoded target URL.
#[derive(Debug, Clone)]
pub struct Proxy {
    pub base: String,
}

impl Proxy {
    pub fn wrap(&self, url: &str) -> String {
        format!("{}{}", self.base, utf8_percent_encode(url, URI_COMPONENT))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    CountReached,
    SafetyCap,
    ShortPage,
    EmptyPage,
    /// The page repeated the previous one; the API ignores `offset`.
    NoGrowth,
}

#[derive(Debug, Default)]
pub struct Page {
    pub rows: Vec<RawRecord>,
    pub count: Option<usize>,
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub rows: Vec<RawRecord>,
    pub pages: usize,
    pub stop: StopReason,
}

/// Fetch every page of `endpoint` until one of the stop conditions fires.
pub async fn fetch_all<S: PageSource>(
    source: &S,
    endpoint: &str,
    proxy: Option<&Proxy>,
) -> Result<FetchOutcome, FetchError> {
    let mut rows: Vec<RawRecord> = Vec::new();
    let mut pages = 0usize;
    let mut total: Option<usize> = None;
    let mut last_len = 0usize;

    let stop = loop {
        if total.is_some_and(|t| rows.len() >= t) {
            break StopReason::CountReached;
        }
        if pages >= MAX_PAGES {
            break StopReason::SafetyCap;
        }

        let page = fetch_page(source, endpoint, rows.len(), proxy).await?;
        pages += 1;
        if pages == 1 {
            total = page.count;
        }

        let short = page.rows.len() < PAGE_SIZE;
        // A short first page means the API does not paginate at all.
        if pages == 1 && short {
            rows.extend(page.rows);
            break StopReason::ShortPage;
        }
        if page.rows.is_empty() {
            break StopReason::EmptyPage;
        }
        if last_len == page.rows.len() && rows[rows.len() - last_len..] == page.rows[..] {
            break StopReason::NoGrowth;
        }

        last_len = page.rows.len();
        rows.extend(page.rows);
        if short {
            break StopReason::ShortPage;
        }
    };

    debug!(rows = rows.len(), pages, ?stop, "pagination finished");
    Ok(FetchOutcome { rows, pages, stop })
}

async fn fetch_page<S: PageSource>(
    source: &S,
    endpoint: &str,
    offset: usize,
    proxy: Option<&Proxy>,
) -> Result<Page, FetchError> {
    let url = with_page_params(endpoint, PAGE_SIZE, offset)?;
    let url = match proxy {
        Some(p) => p.wrap(&url),
        None => url,
    };
    debug!(%url, offset, "fetching page");

    let payload = source.get_json(&url).await?;
    match unwrap_envelope(payload) {
        Err(FetchError::EmptyEnvelope) => {
            debug!(offset, "no result envelope, treating as empty page");
            Ok(Page::default())
        }
        other => other,
    }
}

/// Set `limit` and `offset` on the endpoint, keeping any other query params.
pub fn with_page_params(endpoint: &str, limit: usize, offset: usize) -> Result<String, FetchError> {
    let mut url = Url::parse(endpoint).map_err(|e| FetchError::InvalidUrl {
        url: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "limit" && k != "offset")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("limit", &limit.to_string())
        .append_pair("offset", &offset.to_string());
    Ok(url.into())
}

/// Pull the row array (and declared count) out of a response body.
pub fn unwrap_envelope(payload: Value) -> Result<Page, FetchError> {
    let wrapper = match payload {
        Value::Object(mut map) => ["result", "Result", "data"]
            .iter()
            .find_map(|k| map.remove(*k).filter(|v| !v.is_null()))
            .unwrap_or(Value::Object(map)),
        other => other,
    };

    let count = wrapper
        .get("count")
        .and_then(Value::as_u64)
        .map(|c| c as usize);

    let rows = match wrapper {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            let key = ["results", "records"]
                .into_iter()
                .find(|k| map.get(*k).is_some_and(Value::is_array))
                .map(str::to_string)
                .or_else(|| {
                    map.iter()
                        .find(|(_, v)| v.is_array())
                        .map(|(k, _)| k.clone())
                })
                .ok_or(FetchError::EmptyEnvelope)?;
            match map.remove(&key) {
                Some(Value::Array(items)) => items,
                _ => return Err(FetchError::EmptyEnvelope),
            }
        }
        _ => return Err(FetchError::EmptyEnvelope),
    };

    let total = rows.len();
    let rows: Vec<RawRecord> = rows
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();
    if rows.len() < total {
        debug!(dropped = total - rows.len(), "skipped non-object rows");
    }

    Ok(Page { rows, count })
}
