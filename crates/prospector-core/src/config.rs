//! Configuration loading and typed config structures for the pipeline.
//!
//! The canonical configuration lives in `prospector.yaml`. This module
//! defines strongly-typed structs that mirror the YAML structure, fills in
//! defaults for anything omitted, and validates the result before the
//! pipeline is built from it.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed fine but makes no sense for the pipeline.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level pipeline configuration.
///
/// Mirrors the structure of `prospector.yaml`. Every section has defaults,
/// so an empty file yields a runnable configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PipelineConfig {
    /// World tiling and depth.
    #[serde(default)]
    pub world: WorldConfig,

    /// Worker pool sizes and pre-exploration schedule.
    #[serde(default)]
    pub workers: WorkersConfig,

    /// Region queue and channel capacities.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Permit pool capacity.
    #[serde(default)]
    pub permits: PermitConfig,

    /// Price controller and offer book tuning.
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Depth optimizer tuning.
    #[serde(default)]
    pub depth: DepthConfig,

    /// Game server endpoint and per-operation retry settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Status reporting.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override the game server address
    /// (see [`ApiConfig::apply_env_overrides`]).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.api.apply_env_overrides();
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would deadlock or divide by zero at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(bool, &str); 14] = [
            (self.world.width > 0 && self.world.height > 0, "world extent must be positive"),
            (
                self.world.block_width > 0 && self.world.block_height > 0,
                "world block size must be positive",
            ),
            (self.world.max_depth > 0, "world.max_depth must be at least 1"),
            (self.workers.diggers > 0, "workers.diggers must be at least 1"),
            (self.workers.cashers > 0, "workers.cashers must be at least 1"),
            (self.workers.issuers > 0, "workers.issuers must be at least 1"),
            (
                self.queue.treasure_channel_capacity > 0,
                "queue.treasure_channel_capacity must be at least 1",
            ),
            (self.queue.cell_lookahead > 0, "queue.cell_lookahead must be at least 1"),
            (self.permits.max_concurrent > 0, "permits.max_concurrent must be at least 1"),
            (
                self.pricing.sample_budget > 0 && self.pricing.experiment_period > 0,
                "pricing sample budget and experiment period must be positive",
            ),
            (
                self.pricing.drift_threshold > 1.0 && self.pricing.step_growth >= 1.0,
                "pricing drift threshold must exceed 1 and step growth must be at least 1",
            ),
            (
                self.depth.forced_sample_interval > 0 && self.depth.recompute_interval > 0,
                "depth k and g must be positive",
            ),
            (
                self.pricing.benchmark_interval_ms > 0,
                "pricing.benchmark_interval_ms must be positive",
            ),
            (
                self.workers.re_explore_interval_ms > 0,
                "workers.re_explore_interval_ms must be positive",
            ),
        ];
        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, message)) => Err(ConfigError::Invalid((*message).to_owned())),
            None => Ok(()),
        }
    }
}

/// World tiling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Left edge of the world.
    #[serde(default)]
    pub x: i64,

    /// Top edge of the world.
    #[serde(default)]
    pub y: i64,

    /// World width in cells.
    #[serde(default = "default_world_extent")]
    pub width: i64,

    /// World height in cells.
    #[serde(default = "default_world_extent")]
    pub height: i64,

    /// Deepest dig level the server accepts.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Width of one exploration block.
    #[serde(default = "default_block_size")]
    pub block_width: i64,

    /// Height of one exploration block.
    #[serde(default = "default_block_size")]
    pub block_height: i64,

    /// Regions reporting fewer treasures than this are never dug.
    #[serde(default = "default_min_treasures")]
    pub min_treasures_per_region: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: default_world_extent(),
            height: default_world_extent(),
            max_depth: default_max_depth(),
            block_width: default_block_size(),
            block_height: default_block_size(),
            min_treasures_per_region: default_min_treasures(),
        }
    }
}

/// Worker pool sizes and the pre-exploration schedule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkersConfig {
    /// Steady-state exploration workers.
    #[serde(default = "default_explorers")]
    pub explorers: usize,

    /// Digging workers.
    #[serde(default = "default_diggers")]
    pub diggers: usize,

    /// Cashing workers.
    #[serde(default = "default_cashers")]
    pub cashers: usize,

    /// Permit-issuing workers.
    #[serde(default = "default_issuers")]
    pub issuers: usize,

    /// Pre-exploration workers launched during bootstrap.
    #[serde(default = "default_pre_explorers")]
    pub pre_explorers: usize,

    /// Regions each pre-exploration worker may enqueue before stopping.
    #[serde(default = "default_pre_explore_budget")]
    pub pre_explore_budget: usize,

    /// Wall-clock budget of one pre-exploration batch.
    #[serde(default = "default_pre_exploration_timeout_ms")]
    pub pre_exploration_timeout_ms: u64,

    /// Interval between re-exploration batches after bootstrap.
    #[serde(default = "default_re_explore_interval_ms")]
    pub re_explore_interval_ms: u64,

    /// Workers launched by each re-exploration batch.
    #[serde(default = "default_pre_explorers")]
    pub re_explore_batch: usize,
}

impl WorkersConfig {
    /// Pre-exploration batch timeout as a [`Duration`].
    pub const fn pre_exploration_timeout(&self) -> Duration {
        Duration::from_millis(self.pre_exploration_timeout_ms)
    }

    /// Re-exploration interval as a [`Duration`].
    pub const fn re_explore_interval(&self) -> Duration {
        Duration::from_millis(self.re_explore_interval_ms)
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            explorers: default_explorers(),
            diggers: default_diggers(),
            cashers: default_cashers(),
            issuers: default_issuers(),
            pre_explorers: default_pre_explorers(),
            pre_explore_budget: default_pre_explore_budget(),
            pre_exploration_timeout_ms: default_pre_exploration_timeout_ms(),
            re_explore_interval_ms: default_re_explore_interval_ms(),
            re_explore_batch: default_pre_explorers(),
        }
    }
}

/// Queue and channel capacities.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueConfig {
    /// Blocking pushes wait while the region queue holds more than this.
    #[serde(default = "default_high_water")]
    pub high_water: usize,

    /// Capacity of the digger -> casher treasure channel.
    #[serde(default = "default_treasure_channel_capacity")]
    pub treasure_channel_capacity: usize,

    /// Cells a digger may scan ahead of the cell it is digging.
    #[serde(default = "default_cell_lookahead")]
    pub cell_lookahead: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            high_water: default_high_water(),
            treasure_channel_capacity: default_treasure_channel_capacity(),
            cell_lookahead: default_cell_lookahead(),
        }
    }
}

/// Permit pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PermitConfig {
    /// Upper bound on permits that are live or being issued.
    #[serde(default = "default_max_permits")]
    pub max_concurrent: usize,
}

impl Default for PermitConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_permits(),
        }
    }
}

/// Price controller and offer book tuning.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PricingConfig {
    /// Price ceiling before the first adjustment.
    #[serde(default)]
    pub initial_price: u64,

    /// Rate samples collected at one price before stepping up.
    #[serde(default = "default_sample_budget")]
    pub sample_budget: u32,

    /// Best-rate / current-rate ratio that triggers a price decrease.
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: f64,

    /// Factor applied to the price increment after every increase.
    #[serde(default = "default_step_growth")]
    pub step_growth: f64,

    /// Interval of the inflow benchmark task.
    #[serde(default = "default_benchmark_interval_ms")]
    pub benchmark_interval_ms: u64,

    /// Experimental amounts are seeded as `1, 4, 7, ...` below this bound.
    #[serde(default = "default_experiments")]
    pub experiments: u64,

    /// Every n-th offer is experimental.
    #[serde(default = "default_experiment_period")]
    pub experiment_period: u64,

    /// Pause after a failed purchase before trying again.
    #[serde(default = "default_failure_backoff_ms")]
    pub failure_backoff_ms: u64,
}

impl PricingConfig {
    /// Benchmark interval as a [`Duration`].
    pub const fn benchmark_interval(&self) -> Duration {
        Duration::from_millis(self.benchmark_interval_ms)
    }

    /// Failure backoff as a [`Duration`].
    pub const fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            initial_price: 0,
            sample_budget: default_sample_budget(),
            drift_threshold: default_drift_threshold(),
            step_growth: default_step_growth(),
            benchmark_interval_ms: default_benchmark_interval_ms(),
            experiments: default_experiments(),
            experiment_period: default_experiment_period(),
            failure_backoff_ms: default_failure_backoff_ms(),
        }
    }
}

/// Depth optimizer tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DepthConfig {
    /// Every k-th depth request returns the maximum depth.
    #[serde(default = "default_forced_sample_interval")]
    pub forced_sample_interval: u64,

    /// The best depth is recomputed every g-th registration.
    #[serde(default = "default_recompute_interval")]
    pub recompute_interval: u64,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            forced_sample_interval: default_forced_sample_interval(),
            recompute_interval: default_recompute_interval(),
        }
    }
}

/// Retry settings for one remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PollerConfig {
    /// Deadline of a single attempt.
    #[serde(default = "default_attempt_timeout_ms")]
    pub timeout_ms: u64,

    /// Pause between failed attempts.
    #[serde(default)]
    pub interval_ms: u64,

    /// Attempt budget; 0 retries until success or an absolute deadline.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl PollerConfig {
    /// Per-attempt timeout as a [`Duration`].
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Inter-attempt interval as a [`Duration`].
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_attempt_timeout_ms(),
            interval_ms: 0,
            max_attempts: default_max_attempts(),
        }
    }
}

/// Game server endpoint and per-operation retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the game server.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Startup health check.
    #[serde(default)]
    pub health_check: PollerConfig,

    /// Explore calls.
    #[serde(default)]
    pub explore: PollerConfig,

    /// Dig calls.
    #[serde(default)]
    pub dig: PollerConfig,

    /// Cash calls.
    #[serde(default)]
    pub cash: PollerConfig,

    /// Permit issue calls.
    #[serde(default)]
    pub issue_license: PollerConfig,

    /// Permit listing calls.
    #[serde(default)]
    pub list_licenses: PollerConfig,
}

impl ApiConfig {
    /// Apply environment variable overrides.
    ///
    /// `PROSPECTOR_BASE_URL` replaces the base URL outright. Otherwise, if
    /// any of `ADDRESS`, `PORT` or `SCHEMA` is set, the base URL is rebuilt
    /// as `{SCHEMA}://{ADDRESS}:{PORT}` with defaults `http`, `localhost`
    /// and `8000`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("PROSPECTOR_BASE_URL") {
            self.base_url = url;
            return;
        }
        let address = std::env::var("ADDRESS").ok();
        let port = std::env::var("PORT").ok();
        let schema = std::env::var("SCHEMA").ok();
        if address.is_none() && port.is_none() && schema.is_none() {
            return;
        }
        self.base_url = format!(
            "{}://{}:{}",
            schema.as_deref().unwrap_or("http"),
            address.as_deref().unwrap_or("localhost"),
            port.as_deref().unwrap_or("8000"),
        );
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            health_check: PollerConfig::default(),
            explore: PollerConfig::default(),
            dig: PollerConfig::default(),
            cash: PollerConfig::default(),
            issue_license: PollerConfig::default(),
            list_licenses: PollerConfig::default(),
        }
    }
}

/// Status reporting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Interval between status lines; 0 disables the reporter.
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: default_status_interval_ms(),
        }
    }
}

impl LoggingConfig {
    /// Status interval as a [`Duration`], or `None` when disabled.
    pub const fn status_interval(&self) -> Option<Duration> {
        if self.status_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.status_interval_ms))
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_world_extent() -> i64 {
    3500
}

const fn default_max_depth() -> u32 {
    10
}

const fn default_block_size() -> i64 {
    16
}

const fn default_min_treasures() -> u64 {
    3
}

const fn default_explorers() -> usize {
    10
}

const fn default_diggers() -> usize {
    20
}

const fn default_cashers() -> usize {
    10
}

const fn default_issuers() -> usize {
    3
}

const fn default_pre_explorers() -> usize {
    30
}

const fn default_pre_explore_budget() -> usize {
    1000
}

const fn default_pre_exploration_timeout_ms() -> u64 {
    30_000
}

const fn default_re_explore_interval_ms() -> u64 {
    120_000
}

const fn default_high_water() -> usize {
    60
}

const fn default_treasure_channel_capacity() -> usize {
    100_000
}

const fn default_cell_lookahead() -> usize {
    3
}

const fn default_max_permits() -> usize {
    10
}

const fn default_sample_budget() -> u32 {
    30
}

const fn default_drift_threshold() -> f64 {
    1.05
}

const fn default_step_growth() -> f64 {
    1.0003
}

const fn default_benchmark_interval_ms() -> u64 {
    250
}

const fn default_experiments() -> u64 {
    30
}

const fn default_experiment_period() -> u64 {
    10
}

const fn default_failure_backoff_ms() -> u64 {
    10
}

const fn default_forced_sample_interval() -> u64 {
    10
}

const fn default_recompute_interval() -> u64 {
    50
}

const fn default_attempt_timeout_ms() -> u64 {
    1000
}

const fn default_max_attempts() -> u32 {
    10
}

fn default_base_url() -> String {
    "http://localhost:8000".to_owned()
}

const fn default_status_interval_ms() -> u64 {
    5000
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.world.max_depth, 10);
        assert_eq!(config.queue.high_water, 60);
        assert_eq!(config.pricing.sample_budget, 30);
        assert_eq!(config.api.base_url, "http://localhost:8000");
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
world:
  x: 0
  y: 0
  width: 100
  height: 50
  max_depth: 5
  block_width: 4
  block_height: 2
  min_treasures_per_region: 2
workers:
  explorers: 2
  diggers: 4
  cashers: 1
  issuers: 1
  pre_explorers: 3
  pre_explore_budget: 10
  pre_exploration_timeout_ms: 500
  re_explore_interval_ms: 1000
  re_explore_batch: 2
queue:
  high_water: 8
  treasure_channel_capacity: 16
  cell_lookahead: 2
permits:
  max_concurrent: 4
pricing:
  initial_price: 2
  sample_budget: 12
  drift_threshold: 1.1
  step_growth: 1.5
  benchmark_interval_ms: 100
  experiments: 10
  experiment_period: 5
  failure_backoff_ms: 0
depth:
  forced_sample_interval: 4
  recompute_interval: 8
api:
  base_url: "http://game:9000"
  dig:
    timeout_ms: 300
    interval_ms: 5
    max_attempts: 0
logging:
  status_interval_ms: 0
"#;
        let config = PipelineConfig::parse(yaml).unwrap();
        assert_eq!(config.world.width, 100);
        assert_eq!(config.world.block_height, 2);
        assert_eq!(config.workers.diggers, 4);
        assert_eq!(config.queue.high_water, 8);
        assert_eq!(config.permits.max_concurrent, 4);
        assert_eq!(config.pricing.initial_price, 2);
        assert_eq!(config.depth.recompute_interval, 8);
        assert_eq!(config.api.base_url, "http://game:9000");
        assert_eq!(config.api.dig.max_attempts, 0);
        assert_eq!(config.api.dig.timeout(), Duration::from_millis(300));
        // Unspecified pollers keep their defaults.
        assert_eq!(config.api.cash, PollerConfig::default());
        assert_eq!(config.logging.status_interval_ms, 0);
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = PipelineConfig::parse("permits:\n  max_concurrent: 3\n").unwrap();
        assert_eq!(config.permits.max_concurrent, 3);
        assert_eq!(config.workers.diggers, 20);
        assert_eq!(config.depth.forced_sample_interval, 10);
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(PipelineConfig::parse("").is_ok());
    }

    #[test]
    fn rejects_zero_permit_capacity() {
        let result = PipelineConfig::parse("permits:\n  max_concurrent: 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_depth_intervals() {
        let result = PipelineConfig::parse("depth:\n  forced_sample_interval: 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_drift_threshold_at_or_below_one() {
        let result = PipelineConfig::parse("pricing:\n  drift_threshold: 1.0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("prospector.yaml");
        if path.exists() {
            let config = PipelineConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
