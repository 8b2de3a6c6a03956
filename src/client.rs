use std::time::Duration;

use chrono::Utc;
use reqwest::Client as HttpClient;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::cache::{DEFAULT_MAX_ENTRIES, ResponseCache, ttl_for_range};
use crate::error::{Error, Result as EResult};
use crate::model::Page;
use crate::parser::decode_envelope;
use crate::rate_limit::RateLimiter;
use crate::request::ReadingsQuery;
use crate::retry::{AttemptOutcome, FailureType, FetchState, RetryPolicy, classify_reqwest, classify_status};
use crate::sources::{is_http_url, source_to_base_url};
use crate::url_builder::readings_url;

const OFFSET_PARAM: &str = "_offset";
const MAX_ERROR_BODY: usize = 512;

/// How the upstream splits a result set into pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// The response names the next page (`meta.next` or `next`); the value is
    /// sent back verbatim in `cursor_param`.
    Cursor,
    /// `_limit`/`_offset` paging: a full page implies there may be another one.
    Offset,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Built-in source name (`ea-flood`, `ea-hydrology`) or an `http(s)` base URL.
    pub source: String,
    /// Static token, sent as a bearer `Authorization` header.
    pub api_key: Option<String>,
    pub page_size: usize,
    /// Upper bound on pages fetched per query, whatever the upstream says.
    pub max_pages: usize,
    pub pagination: Pagination,
    pub cursor_param: String,
    pub retry: RetryPolicy,
    pub min_request_interval: Duration,
    pub request_timeout: Duration,
    pub verify_tls: bool,
    pub user_agent: String,
    pub cache_responses: bool,
    /// Upper bound on cached response bodies; the entry closest to expiry is
    /// evicted first.
    pub cache_max_entries: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            source: "ea-flood".to_string(),
            api_key: None,
            page_size: 10_000,
            max_pages: 100,
            pagination: Pagination::Cursor,
            cursor_param: "_cursor".to_string(),
            retry: RetryPolicy::default(),
            min_request_interval: Duration::from_millis(500),
            request_timeout: Duration::from_secs(30),
            verify_tls: true,
            user_agent: concat!("ea-readings-rs/", env!("CARGO_PKG_VERSION")).to_string(),
            cache_responses: true,
            cache_max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl ClientOptions {
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }

    pub fn cache_responses(mut self, enabled: bool) -> Self {
        self.cache_responses = enabled;
        self
    }

    pub fn cache_max_entries(mut self, max_entries: usize) -> Self {
        self.cache_max_entries = max_entries;
        self
    }
}

#[derive(Debug)]
pub struct Client {
    opts: ClientOptions,
    base_url: String,
    http: HttpClient,
    limiter: RateLimiter,
    cache: ResponseCache,
}

impl Client {
    pub fn new(opts: ClientOptions) -> EResult<Self> {
        let base_url = if is_http_url(&opts.source) {
            opts.source.clone()
        } else {
            source_to_base_url(&opts.source)
                .ok_or_else(|| Error::InvalidConfig(format!("unknown source: {}", opts.source)))?
                .to_string()
        };

        if opts.page_size == 0 {
            return Err(Error::InvalidConfig("page_size must be > 0".into()));
        }
        if opts.max_pages == 0 {
            return Err(Error::InvalidConfig("max_pages must be > 0".into()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&opts.user_agent)
                .map_err(|_| Error::InvalidConfig("user agent is not a valid header value".into()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(key) = &opts.api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|_| Error::InvalidConfig("api key is not a valid header value".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = HttpClient::builder()
            .default_headers(headers)
            .timeout(opts.request_timeout);
        if !opts.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build()?;

        Ok(Self {
            limiter: RateLimiter::new(opts.min_request_interval),
            cache: ResponseCache::with_capacity(opts.cache_max_entries),
            base_url,
            http,
            opts,
        })
    }

    /// Convenience constructor for the real-time flood-monitoring API.
    pub fn default_client() -> EResult<Self> {
        Self::new(ClientOptions::default())
    }

    pub fn options(&self) -> &ClientOptions {
        &self.opts
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch every page of `query`, following cursors until the upstream stops
    /// returning one or `max_pages` is reached.
    ///
    /// A page that cannot be fetched aborts the whole call; no partial result
    /// is returned.
    pub async fn fetch_all(&self, query: &ReadingsQuery) -> EResult<Vec<Page>> {
        self.fetch_all_from(query, 0).await
    }

    /// Like [`fetch_all`](Self::fetch_all), numbering pages from `first_index`
    /// so that several queries of one run share a single fetch order.
    #[instrument(skip(self, query), fields(start = %query.start, end = %query.end, stations = ?query.stations))]
    pub async fn fetch_all_from(&self, query: &ReadingsQuery, first_index: usize) -> EResult<Vec<Page>> {
        query.validate()?;

        let mut pages: Vec<Page> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            if pages.len() >= self.opts.max_pages {
                warn!(
                    max_pages = self.opts.max_pages,
                    cursor = ?cursor,
                    "page limit reached, stopping pagination"
                );
                break;
            }

            let page = self
                .fetch_page(query, cursor.as_deref(), first_index + pages.len())
                .await?;
            cursor = page.next_cursor.clone();
            pages.push(page);

            if cursor.is_none() {
                break;
            }
        }

        info!(pages = pages.len(), "fetch complete");
        Ok(pages)
    }

    /// Fetch a single page. `cursor` is `None` for the first page.
    pub async fn fetch_page(&self, query: &ReadingsQuery, cursor: Option<&str>, index: usize) -> EResult<Page> {
        let url = match (self.opts.pagination, cursor) {
            (_, None) => readings_url(&self.base_url, query, self.opts.page_size, None)?,
            (Pagination::Cursor, Some(c)) => {
                readings_url(&self.base_url, query, self.opts.page_size, Some((&self.opts.cursor_param, c)))?
            }
            (Pagination::Offset, Some(c)) => {
                readings_url(&self.base_url, query, self.opts.page_size, Some((OFFSET_PARAM, c)))?
            }
        };

        let cached = if self.opts.cache_responses {
            self.cache.get(url.as_str())
        } else {
            None
        };
        let envelope = match cached {
            Some(body) => decode_envelope(&body, index)?,
            None => {
                let body = self.get_body(&url).await?;
                let envelope = decode_envelope(&body, index)?;
                // Only bodies with a readable envelope are kept.
                if self.opts.cache_responses {
                    self.cache
                        .insert(url.as_str(), body, ttl_for_range(&query.end, Utc::now()));
                }
                envelope
            }
        };

        let next_cursor = match self.opts.pagination {
            Pagination::Cursor => envelope.next_cursor,
            Pagination::Offset => {
                if envelope.entries.len() >= self.opts.page_size {
                    let offset: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
                    Some((offset + envelope.entries.len()).to_string())
                } else {
                    None
                }
            }
        };

        debug!(index, entries = envelope.entries.len(), next = ?next_cursor, "page fetched");

        Ok(Page {
            index,
            url: url.to_string(),
            entries: envelope.entries,
            next_cursor,
        })
    }

    async fn get_body(&self, url: &Url) -> EResult<String> {
        let policy = &self.opts.retry;
        let mut state = FetchState::Idle;

        loop {
            state = match state {
                FetchState::Requesting { attempt } => {
                    self.limiter.acquire().await;
                    debug!(url = %url, attempt, "requesting page");
                    let outcome = self.attempt(url).await;
                    FetchState::Requesting { attempt }.advance(Some(outcome), policy, url.as_str())
                }
                FetchState::Backoff { attempt, delay, reason } => {
                    warn!(
                        url = %url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    FetchState::Backoff { attempt, delay, reason }.advance(None, policy, url.as_str())
                }
                FetchState::Succeeded(body) => return Ok(body),
                FetchState::Failed(err) => {
                    warn!(url = %url, error = %err, "page fetch failed");
                    return Err(err.into());
                }
                idle @ FetchState::Idle => idle.advance(None, policy, url.as_str()),
            };
        }
    }

    async fn attempt(&self, url: &Url) -> AttemptOutcome {
        let resp = match self.http.get(url.clone()).send().await {
            Ok(resp) => resp,
            Err(e) => {
                return match classify_reqwest(&e) {
                    FailureType::Transient => AttemptOutcome::Transient(e.to_string()),
                    FailureType::Permanent => AttemptOutcome::Rejected {
                        status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                        body: e.to_string(),
                    },
                };
            }
        };

        let status = resp.status();
        if status.is_success() {
            return match resp.text().await {
                Ok(body) => AttemptOutcome::Success(body),
                Err(e) => AttemptOutcome::Transient(format!("reading body: {e}")),
            };
        }

        match classify_status(status.as_u16()) {
            FailureType::Transient => AttemptOutcome::Transient(format!("HTTP {status}")),
            FailureType::Permanent => {
                let mut body = resp.text().await.unwrap_or_default();
                if body.len() > MAX_ERROR_BODY {
                    let cut = (0..=MAX_ERROR_BODY)
                        .rev()
                        .find(|i| body.is_char_boundary(*i))
                        .unwrap_or(0);
                    body.truncate(cut);
                }
                AttemptOutcome::Rejected {
                    status: status.as_u16(),
                    body,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_builtin_and_custom_sources() {
        let client = Client::new(ClientOptions::default()).unwrap();
        assert_eq!(client.base_url(), "https://environment.data.gov.uk/flood-monitoring");

        let client = Client::new(ClientOptions::default().source("http://127.0.0.1:9/api")).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:9/api");
    }

    #[test]
    fn rejects_bad_options() {
        assert!(matches!(
            Client::new(ClientOptions::default().source("somewhere")),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Client::new(ClientOptions::default().page_size(0)),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Client::new(ClientOptions::default().max_pages(0)),
            Err(Error::InvalidConfig(_))
        ));
    }
}
