//! Configuration management for Tessera.
//!
//! Provides runtime configuration for rewriting and per-group evaluation.

use common_error::TesseraResult;
use serde::{Deserialize, Serialize};

/// Global Tessera configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseraConfig {
    /// Evaluation configuration.
    pub evaluation: EvaluationConfig,
}

impl TesseraConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> TesseraResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize this configuration to pretty-printed JSON.
    pub fn to_json_string(&self) -> TesseraResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// How expressions are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// Substitute recognized sub-expressions with result handlers.
    #[default]
    Hybrid,
    /// Run everything through the generic evaluator.
    Generic,
}

/// Rewrite and per-group evaluation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Evaluation mode.
    pub mode: EvaluationMode,
    /// Upper bound on handler substitution steps for one expression.
    pub max_rewrite_steps: usize,
    /// Worker threads for parallel group evaluation (`None` = available parallelism).
    pub parallelism: Option<usize>,
    /// Number of groups evaluated between two cancellation checks.
    pub cancellation_check_interval: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            mode: EvaluationMode::Hybrid,
            max_rewrite_steps: 1024,
            parallelism: None,
            cancellation_check_interval: 1,
        }
    }
}

impl EvaluationConfig {
    /// Set the evaluation mode.
    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the rewrite step bound.
    pub fn with_max_rewrite_steps(mut self, steps: usize) -> Self {
        self.max_rewrite_steps = steps;
        self
    }

    /// Set the parallelism level.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    /// Set how many groups run between cancellation checks (at least 1).
    pub fn with_cancellation_check_interval(mut self, interval: usize) -> Self {
        self.cancellation_check_interval = interval.max(1);
        self
    }

    /// Whether handler substitution is enabled.
    pub fn is_hybrid(&self) -> bool {
        self.mode == EvaluationMode::Hybrid
    }
}
