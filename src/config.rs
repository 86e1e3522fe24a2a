use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{LabelerError, Result};

/// Gmail rejects batchModify calls with more than 1000 ids
pub const MAX_IDS_PER_MUTATION: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub labeling: LabelingConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    #[serde(default = "default_search_backoff_secs")]
    pub rate_limit_backoff_secs: u64,
    #[serde(default = "default_search_backoff_secs")]
    pub error_backoff_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rate_limit_waits: Option<u32>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            page_delay_ms: default_page_delay_ms(),
            rate_limit_backoff_secs: default_search_backoff_secs(),
            error_backoff_secs: default_search_backoff_secs(),
            max_retries: default_max_retries(),
            max_rate_limit_waits: None,
        }
    }
}

impl SearchConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    #[serde(default = "default_group_size")]
    pub group_size: usize,
    #[serde(default = "default_group_size")]
    pub max_concurrency: usize,
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,
    #[serde(default = "default_group_delay_ms")]
    pub group_delay_ms: u64,
    #[serde(default = "default_search_backoff_secs")]
    pub rate_limit_backoff_secs: u64,
    #[serde(default = "default_search_backoff_secs")]
    pub error_backoff_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_group_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rate_limit_requeues: Option<u32>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            group_size: default_group_size(),
            max_concurrency: default_group_size(),
            item_delay_ms: default_item_delay_ms(),
            group_delay_ms: default_group_delay_ms(),
            rate_limit_backoff_secs: default_search_backoff_secs(),
            error_backoff_secs: default_search_backoff_secs(),
            max_group_failures: default_max_retries(),
            max_rate_limit_requeues: None,
        }
    }
}

impl ClassificationConfig {
    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn group_delay(&self) -> Duration {
        Duration::from_millis(self.group_delay_ms)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
    #[serde(default = "default_labeling_backoff_secs")]
    pub rate_limit_backoff_secs: u64,
    /// Generic failures are not retried by default: a failed chunk is skipped
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_delay_ms: default_chunk_delay_ms(),
            rate_limit_backoff_secs: default_labeling_backoff_secs(),
            max_retries: 0,
        }
    }
}

impl LabelingConfig {
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }
}

/// Weights of the linear receipt scorer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "weight_two")]
    pub amount: f64,
    #[serde(default = "weight_one_and_half")]
    pub confirmation: f64,
    #[serde(default = "weight_one")]
    pub subscription: f64,
    #[serde(default = "weight_two")]
    pub attachment: f64,
    #[serde(default = "weight_three")]
    pub invoice_or_receipt: f64,
    #[serde(default = "weight_one_and_half")]
    pub lexical: f64,
    #[serde(default = "weight_two")]
    pub known_sender: f64,
    #[serde(default = "weight_one_and_half")]
    pub order_number: f64,
    #[serde(default = "weight_one_and_half")]
    pub payment: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            amount: 2.0,
            confirmation: 1.5,
            subscription: 1.0,
            attachment: 2.0,
            invoice_or_receipt: 3.0,
            lexical: 1.5,
            known_sender: 2.0,
            order_number: 1.5,
            payment: 1.5,
        }
    }
}

impl ScoringWeights {
    fn values(&self) -> [(&'static str, f64); 9] {
        [
            ("amount", self.amount),
            ("confirmation", self.confirmation),
            ("subscription", self.subscription),
            ("attachment", self.attachment),
            ("invoice_or_receipt", self.invoice_or_receipt),
            ("lexical", self.lexical),
            ("known_sender", self.known_sender),
            ("order_number", self.order_number),
            ("payment", self.payment),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_attachment_bonus")]
    pub attachment_bonus: i64,
    #[serde(default = "default_bonus_min_lexical")]
    pub bonus_min_lexical: i64,
    #[serde(default)]
    pub weights: ScoringWeights,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            attachment_bonus: default_attachment_bonus(),
            bonus_min_lexical: default_bonus_min_lexical(),
            weights: ScoringWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default)]
    pub strategy: BackoffStrategy,
    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: u64,
    #[serde(default = "default_randomization_factor")]
    pub randomization_factor: f64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::default(),
            max_interval_secs: default_max_interval_secs(),
            randomization_factor: default_randomization_factor(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_page_size() -> u32 {
    100
}

fn default_page_delay_ms() -> u64 {
    100
}

fn default_search_backoff_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_group_size() -> usize {
    10
}

fn default_item_delay_ms() -> u64 {
    100
}

fn default_group_delay_ms() -> u64 {
    1000
}

fn default_chunk_size() -> usize {
    900
}

fn default_chunk_delay_ms() -> u64 {
    1000
}

fn default_labeling_backoff_secs() -> u64 {
    1
}

fn default_threshold() -> f64 {
    5.0
}

fn default_attachment_bonus() -> i64 {
    2
}

fn default_bonus_min_lexical() -> i64 {
    5
}

fn default_max_interval_secs() -> u64 {
    300
}

fn default_randomization_factor() -> f64 {
    0.5
}

fn default_multiplier() -> f64 {
    2.0
}

fn weight_one() -> f64 {
    1.0
}

fn weight_one_and_half() -> f64 {
    1.5
}

fn weight_two() -> f64 {
    2.0
}

fn weight_three() -> f64 {
    3.0
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LabelerError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| LabelerError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                LabelerError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| LabelerError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| LabelerError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.search.page_size == 0 || self.search.page_size > 500 {
            return Err(LabelerError::ConfigError(
                "search.page_size must be between 1 and 500".to_string(),
            ));
        }

        if self.classification.group_size == 0 {
            return Err(LabelerError::ConfigError(
                "classification.group_size must be at least 1".to_string(),
            ));
        }
        if self.classification.max_concurrency == 0 {
            return Err(LabelerError::ConfigError(
                "classification.max_concurrency must be at least 1".to_string(),
            ));
        }

        if self.labeling.chunk_size == 0 {
            return Err(LabelerError::ConfigError(
                "labeling.chunk_size must be at least 1".to_string(),
            ));
        }
        if self.labeling.chunk_size > MAX_IDS_PER_MUTATION {
            return Err(LabelerError::ConfigError(format!(
                "labeling.chunk_size cannot exceed {} (Gmail batchModify limit)",
                MAX_IDS_PER_MUTATION
            )));
        }

        if !self.scoring.threshold.is_finite() || self.scoring.threshold < 0.0 {
            return Err(LabelerError::ConfigError(
                "scoring.threshold must be a non-negative number".to_string(),
            ));
        }
        for (name, weight) in self.scoring.weights.values() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(LabelerError::ConfigError(format!(
                    "scoring.weights.{} must be a non-negative number",
                    name
                )));
            }
        }

        if self.backoff.multiplier < 1.0 {
            return Err(LabelerError::ConfigError(
                "backoff.multiplier must be at least 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.backoff.randomization_factor) {
            return Err(LabelerError::ConfigError(
                "backoff.randomization_factor must be between 0 and 1".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        Self::default().save(path).await
    }
}
