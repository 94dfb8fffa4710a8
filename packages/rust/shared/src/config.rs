//! Application configuration for the page generator.
//!
//! User config lives at `~/.pagegen/pagegen.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PagegenError, Result};
use crate::types::ChangeFrequency;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "pagegen.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".pagegen";

// ---------------------------------------------------------------------------
// Config structs (matching pagegen.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote content store connection.
    #[serde(default)]
    pub content_store: ContentStoreConfig,

    /// Fetch gateway limits.
    #[serde(default)]
    pub gateway: GatewaySection,

    /// Indexability rules.
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Sitemap shape.
    #[serde(default)]
    pub sitemap: SitemapConfig,

    /// Generator tuning.
    #[serde(default)]
    pub generator: GeneratorSection,

    /// Cohort variants.
    #[serde(default)]
    pub cohort: CohortConfig,
}

/// `[content_store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentStoreConfig {
    /// Base URL of the entries API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the access token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Entries requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_service_type")]
    pub service_type: String,

    #[serde(default = "default_location_type")]
    pub location_type: String,

    /// Content type holding hand-written service×location page bodies.
    #[serde(default = "default_page_type")]
    pub page_type: String,
}

impl Default for ContentStoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_env: default_token_env(),
            page_size: default_page_size(),
            timeout_secs: default_request_timeout(),
            service_type: default_service_type(),
            location_type: default_location_type(),
            page_type: default_page_type(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:1337/api".into()
}
fn default_token_env() -> String {
    "PAGEGEN_CMS_TOKEN".into()
}
fn default_page_size() -> u32 {
    100
}
fn default_request_timeout() -> u64 {
    30
}
fn default_service_type() -> String {
    "service".into()
}
fn default_location_type() -> String {
    "location".into()
}
fn default_page_type() -> String {
    "servicePage".into()
}

/// `[gateway]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySection {
    /// Maximum simultaneous in-flight requests.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Total attempts per operation, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, doubled on each subsequent one.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Upper bound on the computed backoff.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Longest `Retry-After` wait honoured; longer requests are clamped.
    #[serde(default = "default_max_retry_after")]
    pub max_retry_after_ms: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_retry_after_ms: default_max_retry_after(),
        }
    }
}

fn default_concurrency() -> u32 {
    4
}
fn default_max_attempts() -> u32 {
    6
}
fn default_base_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    8000
}
fn default_max_retry_after() -> u64 {
    60_000
}

/// `[indexing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Service slugs eligible for location pages.
    #[serde(default)]
    pub priority_services: Vec<String>,

    /// Location slugs eligible for service pages.
    #[serde(default)]
    pub allowed_locations: Vec<String>,

    /// Minimum body length in words.
    #[serde(default = "default_min_word_count")]
    pub min_word_count: usize,

    /// Require testimonials or unique local content.
    #[serde(default)]
    pub require_local_proof: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            priority_services: Vec::new(),
            allowed_locations: Vec::new(),
            min_word_count: default_min_word_count(),
            require_local_proof: false,
        }
    }
}

fn default_min_word_count() -> usize {
    300
}

/// `[[sitemap.static_routes]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticRoute {
    pub path: String,
    pub priority: f32,
    pub change_frequency: ChangeFrequency,
}

impl StaticRoute {
    fn new(path: &str, priority: f32, change_frequency: ChangeFrequency) -> Self {
        Self {
            path: path.into(),
            priority,
            change_frequency,
        }
    }
}

/// `[sitemap]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitemapConfig {
    /// First path segment of generated pages: `/<namespace>/<service>/<location>`.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Absolute site URL; when set, entries carry absolute URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,

    /// Routes that are always included.
    #[serde(default = "default_static_routes")]
    pub static_routes: Vec<StaticRoute>,
}

impl Default for SitemapConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            site_url: None,
            static_routes: default_static_routes(),
        }
    }
}

fn default_namespace() -> String {
    "services".into()
}
fn default_static_routes() -> Vec<StaticRoute> {
    vec![
        StaticRoute::new("/", 1.0, ChangeFrequency::Weekly),
        StaticRoute::new("/services", 0.9, ChangeFrequency::Monthly),
        StaticRoute::new("/locations", 0.9, ChangeFrequency::Monthly),
    ]
}

/// `[generator]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSection {
    /// Upper bound on one pair's fetch-and-decide.
    #[serde(default = "default_pair_timeout")]
    pub pair_timeout_secs: u64,
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            pair_timeout_secs: default_pair_timeout(),
        }
    }
}

fn default_pair_timeout() -> u64 {
    30
}

/// `[[cohort.variants]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantWeight {
    pub label: String,
    pub weight: u32,
}

/// `[cohort]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortConfig {
    #[serde(default = "default_variants")]
    pub variants: Vec<VariantWeight>,
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            variants: default_variants(),
        }
    }
}

fn default_variants() -> Vec<VariantWeight> {
    [("control", 34), ("social-proof", 33), ("urgency", 33)]
        .into_iter()
        .map(|(label, weight)| VariantWeight {
            label: label.into(),
            weight,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retry_after: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from(&GatewaySection::default())
    }
}

impl From<&GatewaySection> for GatewayConfig {
    fn from(section: &GatewaySection) -> Self {
        Self {
            concurrency: section.concurrency as usize,
            max_attempts: section.max_attempts,
            base_delay: Duration::from_millis(section.base_delay_ms),
            max_delay: Duration::from_millis(section.max_delay_ms),
            max_retry_after: Duration::from_millis(section.max_retry_after_ms),
        }
    }
}

impl From<&AppConfig> for GatewayConfig {
    fn from(config: &AppConfig) -> Self {
        Self::from(&config.gateway)
    }
}

/// Runtime generator configuration.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub namespace: String,
    pub site_url: Option<url::Url>,
    pub static_routes: Vec<StaticRoute>,
    pub pair_timeout: Duration,
    pub service_type: String,
    pub location_type: String,
    pub page_size: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        let sitemap = SitemapConfig::default();
        let store = ContentStoreConfig::default();
        Self {
            namespace: sitemap.namespace,
            site_url: None,
            static_routes: sitemap.static_routes,
            pair_timeout: Duration::from_secs(default_pair_timeout()),
            service_type: store.service_type,
            location_type: store.location_type,
            page_size: store.page_size,
        }
    }
}

impl TryFrom<&AppConfig> for GeneratorConfig {
    type Error = PagegenError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        let site_url = config
            .sitemap
            .site_url
            .as_deref()
            .map(url::Url::parse)
            .transpose()
            .map_err(|e| PagegenError::config(format!("invalid sitemap.site_url: {e}")))?;

        Ok(Self {
            namespace: config.sitemap.namespace.trim_matches('/').to_string(),
            site_url,
            static_routes: config.sitemap.static_routes.clone(),
            pair_timeout: Duration::from_secs(config.generator.pair_timeout_secs),
            service_type: config.content_store.service_type.clone(),
            location_type: config.content_store.location_type.clone(),
            page_size: config.content_store.page_size,
        })
    }
}

impl AppConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let gw = &self.gateway;
        if gw.concurrency == 0 {
            return Err(PagegenError::config("gateway.concurrency must be at least 1"));
        }
        if gw.max_attempts == 0 {
            return Err(PagegenError::config("gateway.max_attempts must be at least 1"));
        }
        if gw.base_delay_ms > gw.max_delay_ms {
            return Err(PagegenError::config(format!(
                "gateway.base_delay_ms ({}) exceeds gateway.max_delay_ms ({})",
                gw.base_delay_ms, gw.max_delay_ms
            )));
        }
        if gw.max_retry_after_ms < gw.max_delay_ms {
            return Err(PagegenError::config(format!(
                "gateway.max_retry_after_ms ({}) is below gateway.max_delay_ms ({})",
                gw.max_retry_after_ms, gw.max_delay_ms
            )));
        }
        if self.content_store.page_size == 0 {
            return Err(PagegenError::config("content_store.page_size must be at least 1"));
        }
        if self.generator.pair_timeout_secs == 0 {
            return Err(PagegenError::config("generator.pair_timeout_secs must be at least 1"));
        }
        if self.cohort.variants.is_empty() {
            return Err(PagegenError::config("cohort.variants must not be empty"));
        }
        if self.cohort.variants.iter().all(|v| v.weight == 0) {
            return Err(PagegenError::config("cohort.variants need a non-zero weight"));
        }
        for route in &self.sitemap.static_routes {
            if !(0.0..=1.0).contains(&route.priority) {
                return Err(PagegenError::config(format!(
                    "static route {} has priority {} outside 0.0..=1.0",
                    route.path, route.priority
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.pagegen/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PagegenError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.pagegen/pagegen.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PagegenError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        PagegenError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| PagegenError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PagegenError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| PagegenError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(())
}

/// Read the content store token from the configured env var, if set.
pub fn content_store_token(config: &AppConfig) -> Option<String> {
    std::env::var(&config.content_store.token_env)
        .ok()
        .filter(|val| !val.is_empty())
}
