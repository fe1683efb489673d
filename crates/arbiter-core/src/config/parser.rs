//! Config parsing from YAML/JSON.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::{schema, ArbiterConfig, WEIGHT_TOLERANCE};
use crate::types::{Complexity, Dimension};

/// Errors that can occur when loading a configuration document.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Config does not match schema: {}", .0.join("; "))]
    SchemaError(Vec<String>),

    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

impl ArbiterConfig {
    /// Parse a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        // An empty document means "all defaults"
        let value = if value.is_null() {
            serde_json::json!({})
        } else {
            value
        };

        schema::validate_config_schema(&value).map_err(ConfigError::SchemaError)?;

        let config: ArbiterConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the semantic invariants a schema cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_admission()?;
        self.validate_tiers()?;
        self.validate_router()?;
        self.validate_shadow()?;
        Ok(())
    }

    fn validate_admission(&self) -> Result<(), ConfigError> {
        let admission = &self.admission;

        for dimension in Dimension::ALL {
            let w = admission.weights.get(dimension);
            if !(0.0..=1.0).contains(&w) {
                return Err(invalid(format!("weight for {} must be in [0, 1], got {}", dimension, w)));
            }
        }

        let sum = admission.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(invalid(format!("dimension weights must sum to 1.0, got {:.6}", sum)));
        }

        for (name, value) in [
            ("admission_threshold", admission.admission_threshold),
            ("risk_threshold", admission.risk_threshold),
            ("hard_block_floor", admission.hard_block_floor),
            ("spread_alert", admission.spread_alert),
            ("evaluators.default_neutral", self.evaluators.default_neutral),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{} must be in [0, 1], got {}", name, value)));
            }
        }

        for (dimension, score) in &self.evaluators.neutral_scores {
            if !(0.0..=1.0).contains(score) {
                return Err(invalid(format!(
                    "neutral score for {} must be in [0, 1], got {}",
                    dimension, score
                )));
            }
        }

        Ok(())
    }

    fn validate_tiers(&self) -> Result<(), ConfigError> {
        let tiers = &self.evaluators.tiers;

        for complexity in [Complexity::Low, Complexity::Medium, Complexity::High] {
            let plan = tiers.for_complexity(complexity);

            let size_ok = match complexity {
                Complexity::Low => plan.len() == 1,
                Complexity::Medium => plan.len() == 2,
                Complexity::High => plan.len() >= 3,
            };
            if !size_ok {
                return Err(invalid(format!(
                    "tier '{}' has {} evaluators (expected {})",
                    complexity,
                    plan.len(),
                    match complexity {
                        Complexity::Low => "exactly 1",
                        Complexity::Medium => "exactly 2",
                        Complexity::High => "3 or more",
                    }
                )));
            }

            if !plan.contains(&Dimension::Safety) {
                return Err(invalid(format!("tier '{}' must include the safety evaluator", complexity)));
            }

            let unique: HashSet<_> = plan.iter().collect();
            if unique.len() != plan.len() {
                return Err(invalid(format!("tier '{}' lists an evaluator twice", complexity)));
            }
        }

        Ok(())
    }

    fn validate_router(&self) -> Result<(), ConfigError> {
        let router = &self.router;

        if router.backends.is_empty() {
            return Err(invalid("at least one backend must be configured"));
        }

        let sum = router.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(invalid(format!("routing weights must sum to 1.0, got {:.6}", sum)));
        }

        let mut seen = HashSet::new();
        for backend in &router.backends {
            if !seen.insert(backend.name.as_str()) {
                return Err(invalid(format!("Duplicate backend name: {}", backend.name)));
            }
            if backend.quality_tier == 0 {
                return Err(invalid(format!("backend '{}' quality_tier must be >= 1", backend.name)));
            }
            if backend.latency_ms == 0 {
                return Err(invalid(format!("backend '{}' latency_ms must be > 0", backend.name)));
            }
            if !(backend.cost_per_1k_tokens > 0.0) {
                return Err(invalid(format!(
                    "backend '{}' cost_per_1k_tokens must be > 0",
                    backend.name
                )));
            }
        }

        Ok(())
    }

    fn validate_shadow(&self) -> Result<(), ConfigError> {
        let shadow = &self.shadow;

        if !(0.0..=1.0).contains(&shadow.sample_rate) {
            return Err(invalid(format!(
                "shadow.sample_rate must be in [0, 1], got {}",
                shadow.sample_rate
            )));
        }

        if let Some(canary) = &shadow.canary_backend {
            if self.router.backend(canary).is_none() {
                return Err(invalid(format!("shadow.canary_backend '{}' is not a configured backend", canary)));
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}
