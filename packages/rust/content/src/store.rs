//! The content-store seam and its HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode, header};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use pagegen_gateway::UpstreamError;
use pagegen_shared::{ContentStoreConfig, PagegenError, Result, RichContent};

/// User-Agent string for content-store requests.
const USER_AGENT: &str = concat!("pagegen/", env!("CARGO_PKG_VERSION"));

/// Longest error body excerpt carried into an [`UpstreamError`].
const MAX_ERROR_BODY: usize = 200;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One entry as returned by the entries API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEntry {
    pub id: String,
    #[serde(default)]
    pub fields: serde_json::Value,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One page of entries for a content type.
#[derive(Debug, Clone, Deserialize)]
pub struct EntriesPage {
    pub items: Vec<RawEntry>,
    pub total: u32,
    #[serde(default)]
    pub skip: u32,
    #[serde(default)]
    pub limit: u32,
}

// ---------------------------------------------------------------------------
// ContentStore
// ---------------------------------------------------------------------------

/// Read access to the remote content store.
///
/// Each method is a single upstream call; callers wrap them in the fetch
/// gateway, which owns retries and the concurrency ceiling.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch one page of entries of `content_type`.
    async fn entries_page(
        &self,
        content_type: &str,
        skip: u32,
        limit: u32,
    ) -> std::result::Result<EntriesPage, UpstreamError>;

    /// Fetch the dedicated body for a service×location page, if one exists.
    async fn page_body(
        &self,
        service_slug: &str,
        location_slug: &str,
    ) -> std::result::Result<Option<RichContent>, UpstreamError>;
}

// ---------------------------------------------------------------------------
// HttpContentStore
// ---------------------------------------------------------------------------

/// [`ContentStore`] backed by the CMS entries HTTP API.
#[derive(Debug, Clone)]
pub struct HttpContentStore {
    client: Client,
    entries_url: Url,
    token: Option<String>,
    page_type: String,
}

impl HttpContentStore {
    /// Build a store from config; `token` is sent as a bearer token when set.
    pub fn new(config: &ContentStoreConfig, token: Option<String>) -> Result<Self> {
        let base = config.base_url.trim_end_matches('/');
        let entries_url = Url::parse(&format!("{base}/entries")).map_err(|e| {
            PagegenError::config(format!("invalid content_store.base_url '{base}': {e}"))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(3))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PagegenError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            entries_url,
            token,
            page_type: config.page_type.clone(),
        })
    }

    async fn get_entries(
        &self,
        query: &[(&str, String)],
    ) -> std::result::Result<EntriesPage, UpstreamError> {
        let mut url = self.entries_url.clone();
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));

        debug!(%url, "requesting entries");

        let mut request = self.client.get(url.as_str());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(format!("{url}: {e}")))?;

        let response = check_status(response).await?;

        response
            .json::<EntriesPage>()
            .await
            .map_err(|e| UpstreamError::Malformed(format!("{url}: {e}")))
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    async fn entries_page(
        &self,
        content_type: &str,
        skip: u32,
        limit: u32,
    ) -> std::result::Result<EntriesPage, UpstreamError> {
        self.get_entries(&[
            ("content_type", content_type.to_string()),
            ("skip", skip.to_string()),
            ("limit", limit.to_string()),
        ])
        .await
    }

    async fn page_body(
        &self,
        service_slug: &str,
        location_slug: &str,
    ) -> std::result::Result<Option<RichContent>, UpstreamError> {
        let page = self
            .get_entries(&[
                ("content_type", self.page_type.clone()),
                ("fields.service", service_slug.to_string()),
                ("fields.location", location_slug.to_string()),
                ("limit", "1".to_string()),
            ])
            .await?;

        Ok(page
            .items
            .into_iter()
            .next()
            .and_then(|entry| match entry.fields.get("body") {
                None | Some(serde_json::Value::Null) => None,
                Some(body) => Some(RichContent::from(body.clone())),
            }))
    }
}

/// Turn a non-success response into an [`UpstreamError::Status`].
async fn check_status(response: Response) -> std::result::Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()))
    } else {
        None
    };

    let mut message = response.text().await.unwrap_or_default();
    if message.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|i| message.is_char_boundary(*i))
            .unwrap_or(0);
        message.truncate(cut);
    }

    Err(UpstreamError::Status {
        status: status.as_u16(),
        retry_after,
        message,
    })
}

/// Parse a `Retry-After` header: delta-seconds or an HTTP-date.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{header as header_eq, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer, token: Option<&str>) -> HttpContentStore {
        let config = ContentStoreConfig {
            base_url: server.uri(),
            ..ContentStoreConfig::default()
        };
        HttpContentStore::new(&config, token.map(String::from)).unwrap()
    }

    #[test]
    fn retry_after_seconds() {
        assert_eq!(
            parse_retry_after(" 7 ", Utc::now()),
            Some(Duration::from_secs(7))
        );
    }

    #[test]
    fn retry_after_http_date() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 27, 30).unwrap();
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT", now),
            Some(Duration::from_secs(30))
        );
        // A date in the past means "retry now".
        let later = Utc.with_ymd_and_hms(2015, 10, 21, 8, 0, 0).unwrap();
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT", later),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }

    #[test]
    fn rejects_invalid_base_url() {
        let config = ContentStoreConfig {
            base_url: "not a url".into(),
            ..ContentStoreConfig::default()
        };
        assert!(HttpContentStore::new(&config, None).is_err());
    }

    #[tokio::test]
    async fn entries_page_sends_query_and_token() {
        let server = MockServer::start().await;
        let body = std::fs::read_to_string("../../../fixtures/cms/services.json")
            .expect("read services fixture");

        Mock::given(method("GET"))
            .and(path("/entries"))
            .and(query_param("content_type", "service"))
            .and(query_param("skip", "0"))
            .and(query_param("limit", "100"))
            .and(header_eq("authorization", "Bearer secret-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body, "application/json"),
            )
            .mount(&server)
            .await;

        let store = store_for(&server, Some("secret-token"));
        let page = store.entries_page("service", 0, 100).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.items[0].fields["slug"], "teeth-whitening");
        assert!(page.items[0].updated_at.is_some());
    }

    #[tokio::test]
    async fn status_errors_carry_retry_after() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/entries"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "3")
                    .set_body_string("rate limited"),
            )
            .mount(&server)
            .await;

        let store = store_for(&server, None);
        let err = store.entries_page("service", 0, 100).await.unwrap_err();
        assert_eq!(
            err,
            UpstreamError::Status {
                status: 429,
                retry_after: Some(Duration::from_secs(3)),
                message: "rate limited".into(),
            }
        );
    }

    #[tokio::test]
    async fn not_found_has_no_retry_after() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/entries"))
            .respond_with(ResponseTemplate::new(404).insert_header("retry-after", "3"))
            .mount(&server)
            .await;

        let store = store_for(&server, None);
        let err = store.entries_page("service", 0, 100).await.unwrap_err();
        assert_eq!(err.http_status(), Some(404));
        assert_eq!(err.retry_after(), None);
    }

    #[tokio::test]
    async fn invalid_json_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/entries"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let store = store_for(&server, None);
        let err = store.entries_page("service", 0, 100).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Malformed(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn page_body_found_and_missing() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/entries"))
            .and(query_param("content_type", "servicePage"))
            .and(query_param("fields.service", "teeth-whitening"))
            .and(query_param("fields.location", "nottingham"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{
                    "id": "page-1",
                    "fields": { "body": "<p>Bright smiles in Nottingham.</p>" }
                }],
                "total": 1
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/entries"))
            .and(query_param("content_type", "servicePage"))
            .and(query_param("fields.location", "beeston"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "items": [], "total": 0 })),
            )
            .mount(&server)
            .await;

        let store = store_for(&server, None);

        let body = store.page_body("teeth-whitening", "nottingham").await.unwrap();
        assert!(matches!(body, Some(RichContent::Html(_))));

        let missing = store.page_body("teeth-whitening", "beeston").await.unwrap();
        assert!(missing.is_none());
    }
}
