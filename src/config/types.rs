use serde::Deserialize;

/// Main configuration structure for Star-Ripple
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitConfig,
    pub output: OutputConfig,
}

/// Crawl shape: what to search for and how far to go
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Stop once this many repositories have been processed
    #[serde(rename = "target-count", default = "default_target_count")]
    pub target_count: u64,

    /// Repositories requested per page (the API allows at most 100)
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// GitHub search qualifier, held constant for one crawl lineage
    #[serde(default = "default_query")]
    pub query: String,
}

/// Remote API connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// GraphQL endpoint URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Name of the environment variable holding the bearer token
    #[serde(rename = "token-env", default = "default_token_env")]
    pub token_env: String,

    /// Per-request timeout in seconds
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

/// Exponential back-off settings for transient failures
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds), doubled on each attempt
    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on a single delay (milliseconds)
    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Add up to 10% random jitter to each delay
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

/// Quota pause settings
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Pause when the remaining quota falls below this many points
    #[serde(rename = "low-water-mark", default = "default_low_water_mark")]
    pub low_water_mark: u32,

    /// Extra time to wait past the reported reset instant (milliseconds)
    #[serde(rename = "reset-buffer-ms", default = "default_reset_buffer_ms")]
    pub reset_buffer_ms: u64,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_target_count() -> u64 {
    100_000
}

fn default_page_size() -> u32 {
    100
}

fn default_query() -> String {
    "stars:>1".to_string()
}

fn default_endpoint() -> String {
    "https://api.github.com/graphql".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("star-ripple/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_attempts() -> u32 {
    6
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    120_000
}

fn default_jitter() -> bool {
    true
}

fn default_low_water_mark() -> u32 {
    100
}

fn default_reset_buffer_ms() -> u64 {
    1_000
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            target_count: default_target_count(),
            page_size: default_page_size(),
            query: default_query(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            low_water_mark: default_low_water_mark(),
            reset_buffer_ms: default_reset_buffer_ms(),
        }
    }
}
