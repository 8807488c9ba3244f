//! Configuration management for the influence engine
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with SINF__)
//! - Configuration files (config/default, config/{SINF_ENV}, config/local)
//! - Default values
//!
//! Every value is validated before any table is read, so a bad threshold or an
//! unknown flag value fails the run up front.

use crate::errors::{InfluenceError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    /// Influence computation settings
    #[serde(default)]
    #[validate(nested)]
    pub engine: EngineConfig,

    /// Column names of the input tables
    #[serde(default)]
    #[validate(nested)]
    pub columns: ColumnConfig,

    /// Optional timeframe coarsening
    #[serde(default)]
    #[validate(nested)]
    pub bucketing: BucketingConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct EngineConfig {
    /// Similarity method: cosine, euclidean, manhattan
    #[serde(default = "default_similarity_method")]
    pub similarity_method: String,

    /// Minimum similarity to be considered as influence
    #[serde(default = "default_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub threshold: f64,

    /// Balance influence by edge weight
    #[serde(default = "default_balance_inf")]
    pub balance_inf: bool,

    /// Fraction of the influence removed at maximal weight
    #[serde(default = "default_penalty")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub penalty: f64,

    /// Edges carry their own timeframe history
    #[serde(default = "default_dynamic")]
    pub dynamic: bool,

    /// Worker count (defaults to available CPU cores)
    #[serde(default)]
    #[validate(range(min = 1))]
    pub n_workers: Option<usize>,

    /// Compute peak count and standard deviation per node
    #[serde(default)]
    pub compute_stats: bool,

    /// What to do with non-positive weights when balancing
    #[serde(default)]
    pub invalid_weight: InvalidWeightPolicy,
}

/// Handling of non-positive edge weights when balancing is enabled
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvalidWeightPolicy {
    /// Fail table validation with InvalidWeight
    #[default]
    Reject,
    /// Keep the raw influence for transitions at non-positive weights
    SkipBalance,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ColumnConfig {
    /// Node identifier column of the attribute table
    #[serde(default = "default_node_column")]
    #[validate(length(min = 1))]
    pub node_id: String,

    /// First endpoint column of the edge table
    #[serde(default = "default_edge_u")]
    #[validate(length(min = 1))]
    pub p1: String,

    /// Second endpoint column of the edge table
    #[serde(default = "default_edge_v")]
    #[validate(length(min = 1))]
    pub p2: String,

    /// Timeframe column (attribute table, and edge table when dynamic)
    #[serde(default = "default_timeframe_column")]
    #[validate(length(min = 1))]
    pub timeframe: String,

    /// Weight column of the edge table
    #[serde(default = "default_weight_column")]
    #[validate(length(min = 1))]
    pub weight: String,

    /// Feature columns; empty means every non-key attribute column
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct BucketingConfig {
    /// Number of raw timeframes per bucket (1 disables bucketing)
    #[serde(default = "default_bucket_width")]
    #[validate(range(min = 1))]
    pub width: i64,

    /// Aggregation for features without an explicit entry
    #[serde(default)]
    pub default_aggregation: Aggregation,

    /// Per-feature aggregation overrides
    #[serde(default)]
    pub aggregations: HashMap<String, Aggregation>,
}

/// How attribute values of one bucket are merged
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Sum,
    Mean,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logging: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_similarity_method() -> String { "cosine".to_string() }
fn default_threshold() -> f64 { 0.80 }
fn default_balance_inf() -> bool { true }
fn default_penalty() -> f64 { 0.1 }
fn default_dynamic() -> bool { true }
fn default_node_column() -> String { "node_id".to_string() }
fn default_edge_u() -> String { "p1".to_string() }
fn default_edge_v() -> String { "p2".to_string() }
fn default_timeframe_column() -> String { "timeframe".to_string() }
fn default_weight_column() -> String { "weight".to_string() }
fn default_bucket_width() -> i64 { 1 }
fn default_log_level() -> String { "info".to_string() }
fn default_service_name() -> String { "sinf".to_string() }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            similarity_method: default_similarity_method(),
            threshold: default_threshold(),
            balance_inf: default_balance_inf(),
            penalty: default_penalty(),
            dynamic: default_dynamic(),
            n_workers: None,
            compute_stats: false,
            invalid_weight: InvalidWeightPolicy::default(),
        }
    }
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_column(),
            p1: default_edge_u(),
            p2: default_edge_v(),
            timeframe: default_timeframe_column(),
            weight: default_weight_column(),
            features: Vec::new(),
        }
    }
}

impl Default for BucketingConfig {
    fn default() -> Self {
        Self {
            width: default_bucket_width(),
            default_aggregation: Aggregation::default(),
            aggregations: HashMap::new(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: false,
            service_name: default_service_name(),
        }
    }
}

impl EngineConfig {
    /// Worker count, falling back to the available CPU cores
    pub fn workers(&self) -> usize {
        self.n_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

impl BucketingConfig {
    /// Whether bucketing changes the timeframes at all
    pub fn is_enabled(&self) -> bool {
        self.width > 1
    }

    /// Aggregation for a given feature
    pub fn aggregation_for(&self, feature: &str) -> Aggregation {
        self.aggregations
            .get(feature)
            .copied()
            .unwrap_or(self.default_aggregation)
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self> {
        let env = std::env::var("SINF_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with SINF__ prefix
            // e.g., SINF__ENGINE__THRESHOLD=0.7
            .add_source(env_source())
            .build()?;

        Self::finish(config)
    }

    /// Load from a specific config file
    pub fn from_file(path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?;

        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self> {
        let app: AppConfig = config.try_deserialize()?;
        app.validate()?;
        app.check_columns()?;
        Ok(app)
    }

    /// Reject column mappings where two roles share one name
    fn check_columns(&self) -> Result<()> {
        let c = &self.columns;
        if c.p1 == c.p2 {
            return Err(InfluenceError::config(format!(
                "edge endpoint columns must differ, both are '{}'",
                c.p1
            )));
        }
        for key in [&c.node_id, &c.timeframe] {
            if c.features.iter().any(|f| f == key) {
                return Err(InfluenceError::config(format!(
                    "key column '{}' cannot also be a feature",
                    key
                )));
            }
        }
        Ok(())
    }

    /// Validate a programmatically built configuration
    pub fn checked(self) -> Result<Self> {
        self.validate()?;
        self.check_columns()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("SINF")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("columns.features")
}
