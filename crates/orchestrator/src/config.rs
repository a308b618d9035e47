//! Engine configuration and per-request options.

use serde::{Deserialize, Serialize};

/// Configuration for the message-processing engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Completed interactions per context window when the request does not
    /// say otherwise
    #[serde(default = "default_memory_size")]
    pub default_memory_size: usize,

    /// Maximum model rounds per top-level request (safety limit)
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Default sampling temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,
}

fn default_memory_size() -> usize {
    10
}
fn default_max_rounds() -> u32 {
    8
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_memory_size: default_memory_size(),
            max_rounds: default_max_rounds(),
            default_temperature: default_temperature(),
        }
    }
}

/// Per-request overrides. Unset fields fall back to [`EngineConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessOptions {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens per model response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Completed interactions per context window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_size: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_memory_size, 10);
        assert_eq!(config.max_rounds, 8);
        assert!((config.default_temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn config_deserializes_with_partial_fields() {
        let config: EngineConfig = serde_json::from_str(r#"{"max_rounds": 3}"#).unwrap();
        assert_eq!(config.max_rounds, 3);
        assert_eq!(config.default_memory_size, 10);
    }
}
