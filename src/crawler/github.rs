//! GitHub GraphQL search client
//!
//! Implements [`PageSource`] over `search(type: REPOSITORY)`.
//!
//! # Response Mapping
//!
//! | Condition | Result |
//! |-----------|--------|
//! | HTTP 200, no `errors` | `Page` |
//! | `errors[].type == RATE_LIMITED` or "rate limit" message | `QuotaExceeded` |
//! | HTTP 403/429 with `x-ratelimit-remaining: 0` | `QuotaExceeded` |
//! | HTTP 403/429 otherwise (secondary limit) | `RateLimited` (transient) |
//! | HTTP 5xx, timeout, connection error | transient |
//! | HTTP 401 | `Unauthorized` |
//! | Other 4xx, other GraphQL errors, bad JSON | permanent |

use crate::config::ApiConfig;
use crate::crawler::{FetchError, PageSource};
use crate::state::{Item, Page, QuotaSnapshot};
use crate::CrawlError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// GraphQL query fetching one page of repositories with the current quota
pub const SEARCH_QUERY: &str = r#"
query SearchRepositories($query: String!, $cursor: String, $perPage: Int!) {
  search(query: $query, type: REPOSITORY, first: $perPage, after: $cursor) {
    repositoryCount
    pageInfo {
      hasNextPage
      endCursor
    }
    edges {
      node {
        ... on Repository {
          databaseId
          name
          owner {
            login
          }
          stargazerCount
          forkCount
          issues(states: OPEN) {
            totalCount
          }
        }
      }
    }
  }
  rateLimit {
    remaining
    resetAt
  }
}
"#;

/// Builds an HTTP client for the API
pub fn build_http_client(config: &ApiConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Authenticated client for the GitHub GraphQL endpoint
pub struct GithubClient {
    client: Client,
    endpoint: String,
    token: String,
}

impl GithubClient {
    pub fn new(config: &ApiConfig, token: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            endpoint: config.endpoint.clone(),
            token: token.into(),
        })
    }

    /// Builds a client with the token read from `config.token_env`
    pub fn from_env(config: &ApiConfig) -> Result<Self, CrawlError> {
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| FetchError::MissingToken(config.token_env.clone()))?;
        Ok(Self::new(config, token)?)
    }

    fn quota_error_from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Option<FetchError> {
        let remaining = header_value(headers, "x-ratelimit-remaining")?;
        if remaining != "0" {
            return None;
        }
        Some(FetchError::QuotaExceeded {
            reset_at: reset_from_headers(headers).unwrap_or_else(|| default_reset(now)),
        })
    }
}

#[async_trait]
impl PageSource for GithubClient {
    async fn query(
        &self,
        filter: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Page, FetchError> {
        let body = json!({
            "query": SEARCH_QUERY,
            "variables": {
                "query": filter,
                "cursor": cursor,
                "perPage": page_size,
            },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await.map_err(classify_transport_error)?;
        let now = Utc::now();

        if let Some(err) = classify_status(status, &headers, &text, now) {
            return Err(err);
        }

        let parsed: GraphqlResponse = serde_json::from_str(&text)
            .map_err(|e| FetchError::Decode(format!("invalid JSON: {}", e)))?;

        into_page(parsed, &headers, now)
    }
}

fn classify_transport_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(err.to_string())
    } else if err.is_decode() {
        FetchError::Decode(err.to_string())
    } else {
        FetchError::Network(err.to_string())
    }
}

/// Maps a non-success HTTP status to an error, or `None` for 2xx
fn classify_status(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    now: DateTime<Utc>,
) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }

    if status == StatusCode::UNAUTHORIZED {
        return Some(FetchError::Unauthorized {
            status: status.as_u16(),
        });
    }

    let retry_after = header_value(headers, "retry-after")
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs);

    if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && (retry_after.is_some() || header_value(headers, "x-ratelimit-remaining").is_some()))
    {
        if let Some(quota) = GithubClient::quota_error_from_headers(headers, now) {
            return Some(quota);
        }
        return Some(FetchError::RateLimited { retry_after });
    }

    if status.is_server_error() {
        return Some(FetchError::Server {
            status: status.as_u16(),
        });
    }

    Some(FetchError::Client {
        status: status.as_u16(),
        message: body.chars().take(200).collect(),
    })
}

fn into_page(
    response: GraphqlResponse,
    headers: &HeaderMap,
    now: DateTime<Utc>,
) -> Result<Page, FetchError> {
    let rate_limit = response
        .data
        .as_ref()
        .and_then(|d| d.rate_limit.as_ref())
        .map(|r| QuotaSnapshot::new(r.remaining, r.reset_at));

    if !response.errors.is_empty() {
        let quota_hit = response.errors.iter().any(|e| {
            e.kind.as_deref() == Some("RATE_LIMITED")
                || e.message.to_lowercase().contains("rate limit")
        });

        if quota_hit {
            let reset_at = rate_limit
                .map(|q| q.reset_at)
                .or_else(|| reset_from_headers(headers))
                .unwrap_or_else(|| default_reset(now));
            return Err(FetchError::QuotaExceeded { reset_at });
        }

        let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
        tracing::error!("GraphQL errors: {}", messages.join("; "));
        return Err(FetchError::Query(messages.join("; ")));
    }

    let data = response
        .data
        .ok_or_else(|| FetchError::Decode("response has no data".to_string()))?;
    let quota =
        rate_limit.ok_or_else(|| FetchError::Decode("response has no rateLimit".to_string()))?;
    let search = data
        .search
        .ok_or_else(|| FetchError::Decode("response has no search result".to_string()))?;

    let next_cursor = match (search.page_info.has_next_page, search.page_info.end_cursor) {
        (true, Some(cursor)) => Some(cursor),
        (true, None) => {
            tracing::warn!("hasNextPage is set but endCursor is missing; treating as last page");
            None
        }
        (false, _) => None,
    };

    let items = normalize_edges(search.edges, now);

    tracing::info!(
        "Fetched {} repositories. Rate limit: {} remaining, resets at {}",
        items.len(),
        quota.remaining,
        quota.reset_at
    );

    Ok(Page {
        items,
        next_cursor,
        quota,
        total_count: search.repository_count,
    })
}

/// Converts search edges to items, skipping nodes that cannot be stored
fn normalize_edges(edges: Vec<Edge>, observed_at: DateTime<Utc>) -> Vec<Item> {
    let mut items = Vec::with_capacity(edges.len());

    for node in edges.into_iter().filter_map(|e| e.node) {
        // Deleted repositories come back without a databaseId
        let Some(external_id) = node.database_id else {
            tracing::debug!("Skipping search node without databaseId");
            continue;
        };

        let owner = node.owner.map(|o| o.login).unwrap_or_default();
        let name = node.name.unwrap_or_default();
        let stars = node.stargazer_count.unwrap_or(0);

        match Item::new(external_id, name, owner, stars, observed_at) {
            Ok(item) => items.push(
                item.with_forks(node.fork_count)
                    .with_open_issues(node.issues.map(|i| i.total_count)),
            ),
            Err(e) => tracing::warn!("Skipping repository {}: {}", external_id, e),
        }
    }

    items
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn reset_from_headers(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let epoch = header_value(headers, "x-ratelimit-reset")?.parse::<i64>().ok()?;
    Utc.timestamp_opt(epoch, 0).single()
}

fn default_reset(now: DateTime<Utc>) -> DateTime<Utc> {
    now + ChronoDuration::hours(1)
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<SearchData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchData {
    search: Option<SearchResult>,
    rate_limit: Option<RateLimitInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitInfo {
    remaining: u32,
    reset_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    repository_count: Option<u64>,
    page_info: PageInfo,
    #[serde(default)]
    edges: Vec<Edge>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Edge {
    node: Option<RepoNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoNode {
    database_id: Option<i64>,
    name: Option<String>,
    owner: Option<Owner>,
    stargazer_count: Option<i64>,
    fork_count: Option<i64>,
    issues: Option<TotalCount>,
}

#[derive(Debug, Deserialize)]
struct Owner {
    login: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TotalCount {
    total_count: i64,
}
