//! SAR fit configuration
//!
//! Loads and validates the knobs that shape a fitted model: similarity
//! metric, time decay, affinity normalization, co-occurrence threshold and
//! the column names used when reading tabular interaction records.
//!
//! # Sources
//!
//! [`SarConfig::load`] layers, lowest priority first:
//!
//! - built-in defaults
//! - an optional TOML/JSON/YAML file
//! - `SAR_`-prefixed environment variables (`.env` is read via dotenvy),
//!   nested keys separated by `__` (e.g. `SAR_COLUMNS__USER=customer_id`)
//!
//! # Example
//!
//! ```
//! use sar_recommender::config::{SarConfig, SimilarityMetric};
//!
//! let config = SarConfig::default()
//!     .with_metric(SimilarityMetric::Cosine)
//!     .with_time_decay(30.0);
//! config.validate().unwrap();
//! ```

use crate::error::{Result, SarError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const ENV_PREFIX: &str = "SAR";
const DEFAULT_HALF_LIFE_DAYS: f64 = 30.0;

/// Item-item similarity derived from co-occurrence counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SimilarityMetric {
    /// `C[i,j] / (C[i,i] + C[j,j] - C[i,j])`
    Jaccard,
    /// `C[i,j] / (C[i,i] * C[j,j])`
    Lift,
    /// `C[i,j] / sqrt(C[i,i] * C[j,j])`
    Cosine,
    /// Raw co-occurrence counts
    Count,
    /// `C[i,j] / min(C[i,i], C[j,j])`
    InclusionIndex,
}

impl SimilarityMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMetric::Jaccard => "jaccard",
            SimilarityMetric::Lift => "lift",
            SimilarityMetric::Cosine => "cosine",
            SimilarityMetric::Count => "count",
            SimilarityMetric::InclusionIndex => "inclusion_index",
        }
    }

    /// Every metric except raw counts pins the diagonal to 1.
    pub fn is_normalized(&self) -> bool {
        !matches!(self, SimilarityMetric::Count)
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimilarityMetric {
    type Err = SarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "jaccard" => Ok(SimilarityMetric::Jaccard),
            "lift" => Ok(SimilarityMetric::Lift),
            "cosine" => Ok(SimilarityMetric::Cosine),
            "count" | "cooccurrence" => Ok(SimilarityMetric::Count),
            "inclusion_index" | "inclusion index" => Ok(SimilarityMetric::InclusionIndex),
            other => Err(SarError::configuration(
                format!(
                    "unsupported similarity metric '{}'. Must be one of: jaccard, lift, cosine, count, inclusion_index",
                    other
                ),
                Some("similarity_metric"),
            )),
        }
    }
}

impl TryFrom<String> for SimilarityMetric {
    type Error = SarError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SimilarityMetric> for String {
    fn from(metric: SimilarityMetric) -> Self {
        metric.as_str().to_string()
    }
}

/// Per-user affinity rescaling applied after aggregation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffinityScaling {
    /// Divide each row by its maximum, mapping it into (0, 1]
    #[default]
    Max,
    /// Divide each row by its sum so it adds up to 1
    Sum,
}

/// Column names used when reading tabular interaction records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub user: String,
    pub item: String,
    pub rating: String,
    pub timestamp: String,
    pub event_type: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            user: "userID".to_string(),
            item: "itemID".to_string(),
            rating: "rating".to_string(),
            timestamp: "timestamp".to_string(),
            event_type: "event_type".to_string(),
        }
    }
}

/// SAR model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SarConfig {
    /// Similarity metric (default: jaccard)
    pub similarity_metric: SimilarityMetric,
    /// Apply exponential half-life decay to interaction weights
    pub time_decay_enabled: bool,
    /// Half-life in days (default: 30)
    pub half_life_days: f64,
    /// Decay reference point; latest observed timestamp when unset
    pub reference_time: Option<DateTime<Utc>>,
    /// Rescale each user's affinity row after aggregation
    pub normalize_affinity: bool,
    /// How rows are rescaled when `normalize_affinity` is set
    pub affinity_scaling: AffinityScaling,
    /// Co-occurrence counts below this value are dropped (default: 1)
    pub threshold: u32,
    /// Record column names
    pub columns: ColumnMap,
    /// Multiplier per lowercase event type; empty means event types are
    /// ignored. Lookups are case-insensitive.
    pub event_weights: HashMap<String, f64>,
    /// Use rayon for co-occurrence and scoring
    pub parallel: bool,
}

impl Default for SarConfig {
    fn default() -> Self {
        Self {
            similarity_metric: SimilarityMetric::Jaccard,
            time_decay_enabled: false,
            half_life_days: DEFAULT_HALF_LIFE_DAYS,
            reference_time: None,
            normalize_affinity: false,
            affinity_scaling: AffinityScaling::Max,
            threshold: 1,
            columns: ColumnMap::default(),
            event_weights: HashMap::new(),
            parallel: true,
        }
    }
}

impl SarConfig {
    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.similarity_metric = metric;
        self
    }

    pub fn with_time_decay(mut self, half_life_days: f64) -> Self {
        self.time_decay_enabled = true;
        self.half_life_days = half_life_days;
        self
    }

    pub fn with_reference_time(mut self, reference_time: DateTime<Utc>) -> Self {
        self.reference_time = Some(reference_time);
        self
    }

    pub fn with_normalization(mut self, scaling: AffinityScaling) -> Self {
        self.normalize_affinity = true;
        self.affinity_scaling = scaling;
        self
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_event_weight(mut self, event_type: impl Into<String>, weight: f64) -> Self {
        self.event_weights
            .insert(event_type.into().to_lowercase(), weight);
        self
    }

    /// Multiplier for `event_type`, matched case-insensitively
    pub fn event_weight(&self, event_type: &str) -> Option<f64> {
        self.event_weights.get(&event_type.to_lowercase()).copied()
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&SarConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let mut config: SarConfig = settings.try_deserialize()?;
        // file and env sources may lowercase keys; store every key that way
        config.event_weights = config
            .event_weights
            .into_iter()
            .map(|(event_type, weight)| (event_type.to_lowercase(), weight))
            .collect();
        config.validate()?;

        tracing::debug!(
            metric = %config.similarity_metric,
            time_decay = config.time_decay_enabled,
            normalize = config.normalize_affinity,
            "Loaded SAR configuration"
        );

        Ok(config)
    }

    /// Validate parameter ranges
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` when decay is enabled with a non-positive
    /// half-life, when `threshold` is zero, or when an event weight is
    /// negative or not finite. Returns `Configuration` for event types that
    /// are not lowercase.
    pub fn validate(&self) -> Result<()> {
        if self.time_decay_enabled && !(self.half_life_days > 0.0 && self.half_life_days.is_finite())
        {
            return Err(SarError::invalid_parameter(
                "half_life_days",
                format!("must be greater than 0, got {}", self.half_life_days),
            ));
        }

        if self.threshold == 0 {
            return Err(SarError::invalid_parameter(
                "threshold",
                "must be at least 1",
            ));
        }

        for (event_type, weight) in &self.event_weights {
            if *event_type != event_type.to_lowercase() {
                return Err(SarError::configuration(
                    format!("event type '{}' must be lowercase", event_type),
                    Some("event_weights"),
                ));
            }
            if !weight.is_finite() || *weight < 0.0 {
                return Err(SarError::invalid_parameter(
                    "event_weights",
                    format!(
                        "weight for event type '{}' must be finite and non-negative, got {}",
                        event_type, weight
                    ),
                ));
            }
        }

        for (name, column) in [
            ("columns.user", &self.columns.user),
            ("columns.item", &self.columns.item),
        ] {
            if column.trim().is_empty() {
                return Err(SarError::configuration(
                    format!("{} must not be empty", name),
                    Some(name),
                ));
            }
        }

        Ok(())
    }
}
