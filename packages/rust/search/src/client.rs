//! HTTP client for the Custom Search JSON API with credential rotation.
//!
//! One call to [`SearchClient::fetch_page`] issues a single paginated search
//! request. Quota responses move on to the next key in the pool; any other
//! failure is reported as a page-level error without touching the rotation.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use greylit_shared::{
    CredentialPool, GreylitError, PAGE_SIZE, QuerySpec, RawResult, Result, SearchConfig,
};

use crate::query::build_query;
use crate::rotation::KeyRotation;

/// User-Agent string for search requests.
const USER_AGENT: &str = concat!("Greylit/", env!("CARGO_PKG_VERSION"));

/// Pause before the single retry of a transient network failure.
const RETRY_DELAY: Duration = Duration::from_millis(250);

/// Error reasons the API uses for per-key quota exhaustion.
const QUOTA_REASONS: &[&str] = &[
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "dailyLimitExceeded",
    "quotaExceeded",
];

// ---------------------------------------------------------------------------
// PageSource
// ---------------------------------------------------------------------------

/// One page request: which website, which tier's query, which page (from 1).
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub website: &'a str,
    pub query: &'a QuerySpec,
    pub page: u32,
}

impl PageRequest<'_> {
    fn page_error(&self, message: impl Into<String>) -> GreylitError {
        GreylitError::PageFetch {
            website: self.website.to_string(),
            tier: self.query.priority,
            page: self.page,
            message: message.into(),
        }
    }
}

/// Anything that can fetch one page of search results.
///
/// The escalator is generic over this so tests can script page responses
/// without a network.
pub trait PageSource: Send + Sync {
    /// Fetch a single page (at most [`PAGE_SIZE`] records).
    ///
    /// # Errors
    ///
    /// [`GreylitError::RateLimitExhausted`] when every credential is spent for
    /// the run, [`GreylitError::PageFetch`] for any other failure.
    fn fetch_page(
        &self,
        request: &PageRequest<'_>,
        rotation: &mut KeyRotation,
    ) -> impl Future<Output = Result<Vec<RawResult>>> + Send;
}

// ---------------------------------------------------------------------------
// API payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    /// Omitted by the API when a page has no results.
    #[serde(default)]
    items: Vec<RawResult>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    reason: String,
}

/// What a single keyed attempt produced.
enum Attempt {
    Page(Vec<RawResult>),
    QuotaExceeded(String),
}

// ---------------------------------------------------------------------------
// SearchClient
// ---------------------------------------------------------------------------

/// Custom Search client that rotates through a credential pool on quota errors.
pub struct SearchClient {
    endpoint: String,
    credentials: CredentialPool,
    client: Client,
}

impl SearchClient {
    /// Create a new client with the given configuration.
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| GreylitError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: config.endpoint,
            credentials: config.credentials,
            client,
        })
    }

    /// Number of keys in the rotation pool.
    pub fn key_count(&self) -> usize {
        self.credentials.len()
    }

    fn exhausted(&self, request: &PageRequest<'_>) -> GreylitError {
        GreylitError::RateLimitExhausted {
            website: request.website.to_string(),
            tier: request.query.priority,
            page: request.page,
            keys: self.credentials.len(),
        }
    }

    /// Issue one keyed request, retrying once on a transient network failure.
    async fn attempt(
        &self,
        request: &PageRequest<'_>,
        query: &str,
        key: &str,
    ) -> Result<Attempt> {
        let start = (request.page.max(1) as usize - 1) * PAGE_SIZE + 1;
        let params = [
            ("q", query.to_string()),
            ("key", key.to_string()),
            ("cx", self.credentials.engine_id().to_string()),
            ("num", PAGE_SIZE.to_string()),
            ("start", start.to_string()),
        ];

        let send = || self.client.get(&self.endpoint).query(&params).send();

        let response = match send().await {
            Ok(response) => response,
            Err(e) if is_transient(&e) => {
                warn!(error = %e, "transient network failure, retrying once");
                tokio::time::sleep(RETRY_DELAY).await;
                send().await.map_err(|e| request.page_error(e.to_string()))?
            }
            Err(e) => return Err(request.page_error(e.to_string())),
        };

        let status = response.status();

        if status.is_success() {
            let body: SearchResponse = response
                .json()
                .await
                .map_err(|e| request.page_error(format!("invalid response body: {e}")))?;
            return Ok(Attempt::Page(body.items));
        }

        let text = response.text().await.unwrap_or_default();
        let api_error = serde_json::from_str::<ErrorResponse>(&text)
            .map(|r| r.error)
            .unwrap_or_default();

        if is_quota_error(status, &api_error) {
            let reason = api_error
                .errors
                .first()
                .map(|d| d.reason.clone())
                .unwrap_or_else(|| status.to_string());
            return Ok(Attempt::QuotaExceeded(reason));
        }

        let message = if api_error.message.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", api_error.message)
        };
        Err(request.page_error(message))
    }
}

impl PageSource for SearchClient {
    #[instrument(skip_all, fields(website = request.website, tier = %request.query.priority, page = request.page))]
    async fn fetch_page(
        &self,
        request: &PageRequest<'_>,
        rotation: &mut KeyRotation,
    ) -> Result<Vec<RawResult>> {
        if rotation.is_exhausted() {
            return Err(self.exhausted(request));
        }

        let query = build_query(request.query, request.website);
        debug!(%query, key_index = rotation.current(), "requesting page");

        for index in rotation.current()..self.credentials.len() {
            let Some(key) = self.credentials.key(index) else {
                break;
            };

            match self.attempt(request, &query, key).await? {
                Attempt::Page(items) => {
                    if index != rotation.current() {
                        debug!(key_index = index, "switched search API key");
                    }
                    rotation.settle(index);
                    debug!(items = items.len(), "page received");
                    return Ok(items);
                }
                Attempt::QuotaExceeded(reason) => {
                    warn!(key_index = index, %reason, "search API key hit its quota");
                }
            }
        }

        rotation.mark_exhausted();
        Err(self.exhausted(request))
    }
}

/// Quota responses: 429, or 403 with a quota reason, or `RESOURCE_EXHAUSTED`.
fn is_quota_error(status: StatusCode, error: &ApiError) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    if error.status.as_deref() == Some("RESOURCE_EXHAUSTED") {
        return true;
    }
    status == StatusCode::FORBIDDEN
        && error
            .errors
            .iter()
            .any(|d| QUOTA_REASONS.iter().any(|r| d.reason.contains(r)))
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

#[cfg(test)]
mod tests {
    use greylit_shared::Priority;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(endpoint: String, keys: &[&str]) -> SearchConfig {
        SearchConfig {
            endpoint,
            credentials: CredentialPool::new(
                "engine-1",
                keys.iter().map(|k| k.to_string()).collect(),
            )
            .unwrap(),
            timeout: Duration::from_secs(2),
        }
    }

    fn items(prefix: &str, n: usize) -> serde_json::Value {
        let items: Vec<_> = (0..n)
            .map(|i| {
                serde_json::json!({
                    "title": format!("{prefix} {i}"),
                    "link": format!("https://example.com/{prefix}/{i}"),
                    "snippet": "…",
                })
            })
            .collect();
        serde_json::json!({ "items": items })
    }

    fn quota_body(reason: &str) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": 429,
                "message": "Quota exceeded for quota metric 'Queries'",
                "errors": [{ "reason": reason, "domain": "global" }],
                "status": "RESOURCE_EXHAUSTED"
            }
        })
    }

    fn spec() -> QuerySpec {
        QuerySpec::new(Priority::First).all_words("flood report")
    }

    #[tokio::test]
    async fn sends_query_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "flood report site:example.com"))
            .and(query_param("key", "A"))
            .and(query_param("cx", "engine-1"))
            .and(query_param("num", "10"))
            .and(query_param("start", "11"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items("p2", 10)))
            .expect(1)
            .mount(&server)
            .await;

        let client = SearchClient::new(config(server.uri(), &["A"])).unwrap();
        let spec = spec();
        let request = PageRequest {
            website: "example.com",
            query: &spec,
            page: 2,
        };
        let mut rotation = KeyRotation::new();
        let page = client.fetch_page(&request, &mut rotation).await.unwrap();
        assert_eq!(page.len(), 10);
        assert_eq!(page[0].title, "p2 0");
    }

    #[tokio::test]
    async fn missing_items_is_an_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "kind": "customsearch#search" })),
            )
            .mount(&server)
            .await;

        let client = SearchClient::new(config(server.uri(), &["A"])).unwrap();
        let spec = spec();
        let request = PageRequest {
            website: "example.com",
            query: &spec,
            page: 1,
        };
        let page = client
            .fetch_page(&request, &mut KeyRotation::new())
            .await
            .unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn rotates_past_quota_errors_and_sticks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("key", "A"))
            .respond_with(ResponseTemplate::new(429).set_body_json(quota_body("rateLimitExceeded")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("key", "B"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(serde_json::json!({
                    "error": {
                        "code": 403,
                        "message": "Daily Limit Exceeded",
                        "errors": [{ "reason": "dailyLimitExceeded" }]
                    }
                })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("key", "C"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items("c", 10)))
            .expect(2)
            .mount(&server)
            .await;

        let client = SearchClient::new(config(server.uri(), &["A", "B", "C"])).unwrap();
        let spec = spec();
        let mut rotation = KeyRotation::new();

        let first = PageRequest {
            website: "example.com",
            query: &spec,
            page: 1,
        };
        let page = client.fetch_page(&first, &mut rotation).await.unwrap();
        assert_eq!(page[0].title, "c 0");
        assert_eq!(rotation.current(), 2);

        // Next page starts from C: A and B see no further traffic.
        let second = PageRequest { page: 2, ..first };
        client.fetch_page(&second, &mut rotation).await.unwrap();
        assert_eq!(server.received_requests().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn all_keys_exhausted_fails_the_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_json(quota_body("rateLimitExceeded")))
            .expect(3)
            .mount(&server)
            .await;

        let client = SearchClient::new(config(server.uri(), &["A", "B", "C"])).unwrap();
        let spec = spec();
        let request = PageRequest {
            website: "example.com",
            query: &spec,
            page: 1,
        };
        let mut rotation = KeyRotation::new();
        let err = client.fetch_page(&request, &mut rotation).await.unwrap_err();
        assert!(matches!(err, GreylitError::RateLimitExhausted { keys: 3, .. }));
        assert!(rotation.is_exhausted());

        // Exhaustion is remembered for the run: no further network calls.
        let err = client.fetch_page(&request, &mut rotation).await.unwrap_err();
        assert!(matches!(err, GreylitError::RateLimitExhausted { .. }));
    }

    #[tokio::test]
    async fn non_quota_error_is_not_retried_across_keys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("key", "A"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(serde_json::json!({
                    "error": {
                        "code": 400,
                        "message": "Request contains an invalid argument.",
                        "errors": [{ "reason": "badRequest" }],
                        "status": "INVALID_ARGUMENT"
                    }
                })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("key", "B"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items("b", 10)))
            .expect(0)
            .mount(&server)
            .await;

        let client = SearchClient::new(config(server.uri(), &["A", "B"])).unwrap();
        let spec = spec();
        let request = PageRequest {
            website: "badsite.org",
            query: &spec,
            page: 2,
        };
        let mut rotation = KeyRotation::new();
        let err = client.fetch_page(&request, &mut rotation).await.unwrap_err();
        match err {
            GreylitError::PageFetch {
                website,
                page,
                message,
                ..
            } => {
                assert_eq!(website, "badsite.org");
                assert_eq!(page, 2);
                assert!(message.contains("invalid argument"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(rotation.current(), 0);
        assert!(!rotation.is_exhausted());
    }

    #[tokio::test]
    async fn server_error_is_a_page_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let client = SearchClient::new(config(server.uri(), &["A", "B"])).unwrap();
        let spec = spec();
        let request = PageRequest {
            website: "example.com",
            query: &spec,
            page: 1,
        };
        let err = client
            .fetch_page(&request, &mut KeyRotation::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GreylitError::PageFetch { .. }));
        assert!(err.to_string().contains("503"));
    }

    fn slow(body: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(body)
            .set_delay(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn timeout_is_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(slow(items("late", 10)))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items("retry", 10)))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = config(server.uri(), &["A", "B"]);
        config.timeout = Duration::from_millis(200);
        let client = SearchClient::new(config).unwrap();
        let spec = spec();
        let request = PageRequest {
            website: "example.com",
            query: &spec,
            page: 1,
        };
        let mut rotation = KeyRotation::new();
        let page = client.fetch_page(&request, &mut rotation).await.unwrap();

        assert_eq!(page[0].title, "retry 0");
        assert_eq!(rotation.current(), 0);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn second_timeout_is_a_page_failure_on_the_same_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("key", "A"))
            .respond_with(slow(items("late", 10)))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("key", "B"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items("b", 10)))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = config(server.uri(), &["A", "B"]);
        config.timeout = Duration::from_millis(200);
        let client = SearchClient::new(config).unwrap();
        let spec = spec();
        let request = PageRequest {
            website: "example.com",
            query: &spec,
            page: 1,
        };
        let mut rotation = KeyRotation::new();
        let err = client.fetch_page(&request, &mut rotation).await.unwrap_err();

        assert!(matches!(err, GreylitError::PageFetch { page: 1, .. }));
        assert_eq!(rotation.current(), 0);
        assert!(!rotation.is_exhausted());
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[test]
    fn forbidden_without_quota_reason_is_not_quota() {
        let error = ApiError {
            message: "API key not valid".into(),
            status: Some("PERMISSION_DENIED".into()),
            errors: vec![ApiErrorDetail {
                reason: "forbidden".into(),
            }],
        };
        assert!(!is_quota_error(StatusCode::FORBIDDEN, &error));

        let quota = ApiError {
            errors: vec![ApiErrorDetail {
                reason: "quotaExceeded".into(),
            }],
            ..Default::default()
        };
        assert!(is_quota_error(StatusCode::FORBIDDEN, &quota));
        assert!(is_quota_error(StatusCode::TOO_MANY_REQUESTS, &ApiError::default()));
    }
}
