//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the GitHub GraphQL endpoint and
//! run the full fetch, upsert and checkpoint cycle against an on-disk database.

use serde_json::{json, Value};
use star_ripple::config::{
    ApiConfig, Config, CrawlerConfig, OutputConfig, RateLimitConfig, RetryConfig,
};
use star_ripple::crawler::{crawl, Coordinator, GithubClient, SystemClock};
use star_ripple::storage::{CheckpointStore, RecordStore, SqliteStorage};
use star_ripple::{CrawlError, CrawlState};
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

const FILTER: &str = "stars:>100";

/// Matches GraphQL requests whose `variables.cursor` equals the given value
struct CursorIs(Option<&'static str>);

impl Match for CursorIs {
    fn matches(&self, request: &Request) -> bool {
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return false;
        };
        match self.0 {
            Some(cursor) => body["variables"]["cursor"] == cursor,
            None => body["variables"]["cursor"].is_null(),
        }
    }
}

/// Creates a test configuration pointing at the mock server
fn create_test_config(endpoint: &str, db_path: &str, token_env: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            target_count: 100,
            page_size: 2,
            query: FILTER.to_string(),
        },
        api: ApiConfig {
            endpoint: endpoint.to_string(),
            token_env: token_env.to_string(),
            timeout_secs: 5,
            user_agent: "star-ripple-test/1.0".to_string(),
        },
        // Very short for testing
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 50,
            jitter: false,
        },
        rate_limit: RateLimitConfig {
            low_water_mark: 10,
            reset_buffer_ms: 0,
        },
        output: OutputConfig {
            database_path: db_path.to_string(),
        },
    }
}

fn search_response(ids: &[i64], next_cursor: Option<&str>) -> Value {
    let edges: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "node": {
                    "databaseId": id,
                    "name": format!("repo-{}", id),
                    "owner": { "login": "acme" },
                    "stargazerCount": 1000 - id,
                    "forkCount": id,
                    "issues": { "totalCount": 1 }
                }
            })
        })
        .collect();

    json!({
        "data": {
            "search": {
                "repositoryCount": 5,
                "pageInfo": {
                    "hasNextPage": next_cursor.is_some(),
                    "endCursor": next_cursor
                },
                "edges": edges
            },
            "rateLimit": { "remaining": 4000, "resetAt": "2030-01-01T00:00:00Z" }
        }
    })
}

async fn mount_page(
    server: &MockServer,
    cursor: Option<&'static str>,
    ids: &[i64],
    next: Option<&str>,
) {
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("authorization", "Bearer it-token"))
        .and(CursorIs(cursor))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_response(ids, next)))
        .mount(server)
        .await;
}

fn coordinator(
    config: &Config,
) -> Coordinator<GithubClient, SqliteStorage, SystemClock> {
    let storage = SqliteStorage::new(Path::new(&config.output.database_path)).unwrap();
    let client = GithubClient::new(&config.api, "it-token").unwrap();
    Coordinator::from_config(client, storage, SystemClock, config)
}

async fn requested_cursors(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| {
            serde_json::from_slice::<Value>(&r.body).unwrap()["variables"]["cursor"].clone()
        })
        .collect()
}

#[tokio::test]
async fn test_full_crawl_three_pages() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, None, &[1, 2], Some("A")).await;
    mount_page(&mock_server, Some("A"), &[3, 4], Some("B")).await;
    mount_page(&mock_server, Some("B"), &[5], None).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("stars.db");
    let config = create_test_config(
        &format!("{}/graphql", mock_server.uri()),
        db_path.to_str().unwrap(),
        "STAR_RIPPLE_IT_UNUSED",
    );

    let summary = coordinator(&config)
        .run(config.crawler.target_count, FILTER, false)
        .await;

    assert_eq!(summary.final_state, CrawlState::Completed);
    assert_eq!(summary.processed_count, 5);
    assert_eq!(summary.pages_fetched, 3);
    assert!(summary.last_error.is_none());

    // Reopen from disk
    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_items().unwrap(), 5);
    assert!(storage.load().unwrap().is_none());

    let stored = storage.get_item(3).unwrap().unwrap();
    assert_eq!(stored.item.full_name(), "acme/repo-3");
    assert_eq!(stored.item.stars, 997);
    assert_eq!(stored.item.forks, Some(3));

    let history = storage.history().unwrap();
    assert_eq!(history.len(), 1);
    assert!(!history[0].active);
    assert_eq!(history[0].processed_count, 5);

    assert_eq!(
        requested_cursors(&mock_server).await,
        vec![Value::Null, json!("A"), json!("B")]
    );
}

#[tokio::test]
async fn test_auth_failure_then_resume() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, None, &[1, 2], Some("A")).await;
    Mock::given(method("POST"))
        .and(CursorIs(Some("A")))
        .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("stars.db");
    let config = create_test_config(
        &format!("{}/graphql", mock_server.uri()),
        db_path.to_str().unwrap(),
        "STAR_RIPPLE_IT_UNUSED",
    );

    let summary = coordinator(&config).run(100, FILTER, false).await;

    assert_eq!(summary.final_state, CrawlState::Failed);
    assert_eq!(summary.processed_count, 2);
    assert!(matches!(summary.last_error, Some(CrawlError::Fetch(_))));

    {
        let storage = SqliteStorage::new(&db_path).unwrap();
        let checkpoint = storage.load().unwrap().unwrap();
        assert_eq!(checkpoint.cursor.as_deref(), Some("A"));
        assert_eq!(checkpoint.processed_count, 2);
        assert_eq!(storage.count_items().unwrap(), 2);
    }

    // Credentials fixed: the remaining pages are now served
    mock_server.reset().await;
    mount_page(&mock_server, Some("A"), &[3, 4], Some("B")).await;
    mount_page(&mock_server, Some("B"), &[5], None).await;

    let summary = coordinator(&config).run(100, FILTER, true).await;

    assert_eq!(summary.final_state, CrawlState::Completed);
    assert_eq!(summary.processed_count, 5);
    assert_eq!(
        requested_cursors(&mock_server).await,
        vec![json!("A"), json!("B")]
    );

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_items().unwrap(), 5);
}

#[tokio::test]
async fn test_transient_server_error_is_retried() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, None, &[1, 2], None).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("stars.db");
    let config = create_test_config(
        &format!("{}/graphql", mock_server.uri()),
        db_path.to_str().unwrap(),
        "STAR_RIPPLE_IT_UNUSED",
    );

    let summary = coordinator(&config).run(100, FILTER, false).await;

    assert_eq!(summary.final_state, CrawlState::Completed);
    assert_eq!(summary.processed_count, 2);
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_quota_exceeded_waits_and_retries_same_cursor() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, None, &[1, 2], Some("A")).await;
    Mock::given(method("POST"))
        .and(CursorIs(Some("A")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "search": null,
                "rateLimit": { "remaining": 0, "resetAt": "2020-01-01T00:00:00Z" }
            },
            "errors": [{ "type": "RATE_LIMITED", "message": "API rate limit exceeded" }]
        })))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, Some("A"), &[3], None).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("stars.db");
    let config = create_test_config(
        &format!("{}/graphql", mock_server.uri()),
        db_path.to_str().unwrap(),
        "STAR_RIPPLE_IT_UNUSED",
    );

    let mut coordinator = coordinator(&config);
    let summary = coordinator.run(100, FILTER, false).await;

    assert_eq!(summary.final_state, CrawlState::Completed);
    assert_eq!(summary.processed_count, 3);
    assert_eq!(summary.quota_pauses, 1);
    assert!(coordinator
        .transitions()
        .contains(&CrawlState::PausedForQuota));
    assert_eq!(
        requested_cursors(&mock_server).await,
        vec![Value::Null, json!("A"), json!("A")]
    );
}

#[tokio::test]
async fn test_crawl_entry_point_reads_token_from_env() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, None, &[1, 2], Some("A")).await;
    mount_page(&mock_server, Some("A"), &[3], None).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("stars.db");
    let config = create_test_config(
        &format!("{}/graphql", mock_server.uri()),
        db_path.to_str().unwrap(),
        "STAR_RIPPLE_IT_TOKEN",
    );
    std::env::set_var("STAR_RIPPLE_IT_TOKEN", "it-token");

    let summary = crawl(&config, true, None).await.unwrap();

    assert_eq!(summary.final_state, CrawlState::Completed);
    assert_eq!(summary.processed_count, 3);
    assert_eq!(SqliteStorage::new(&db_path).unwrap().count_items().unwrap(), 3);
}
