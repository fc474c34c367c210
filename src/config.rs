// ⚙️ Configuration - Environment-derived runtime settings
// Every knob has a default so the CLI runs out of the box; the reasoning
// API key is the only value with no useful default.

use crate::validator::DEFAULT_SIMILARITY_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_DB_PATH: &str = "reference.db";
pub const DEFAULT_ARTIFACT_DIR: &str = "staged_updates";
pub const DEFAULT_REASONING_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_REASONING_MODEL: &str = "gpt-4o";
pub const DEFAULT_REASONING_TIMEOUT_SECS: u64 = 30;

/// Reasoning-service connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,

    /// Per-call timeout; a timed-out call counts as a failed step
    pub timeout_secs: u64,
}

/// Runtime configuration
///
/// Environment variables:
/// - `JANITOR_DB_PATH`: reference store location
/// - `JANITOR_ARTIFACT_DIR`: staging directory for generated artifacts
/// - `JANITOR_SIMILARITY_THRESHOLD`: minimum fuzzy-match score (0.0–1.0)
/// - `REASONING_ENDPOINT`, `REASONING_MODEL`, `REASONING_TIMEOUT_SECS`
/// - `REASONING_API_KEY` (falls back to `OPENAI_API_KEY`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub db_path: PathBuf,
    pub artifact_dir: PathBuf,
    pub similarity_threshold: f64,
    pub reasoning: ReasoningConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars(get: impl Fn(&str) -> Option<String>) -> Self {
        let similarity_threshold = match get("JANITOR_SIMILARITY_THRESHOLD") {
            Some(raw) => match raw.parse::<f64>() {
                Ok(value) if (0.0..=1.0).contains(&value) => value,
                _ => {
                    warn!(
                        value = %raw,
                        "invalid JANITOR_SIMILARITY_THRESHOLD, using default"
                    );
                    DEFAULT_SIMILARITY_THRESHOLD
                }
            },
            None => DEFAULT_SIMILARITY_THRESHOLD,
        };

        let timeout_secs = get("REASONING_TIMEOUT_SECS")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_REASONING_TIMEOUT_SECS);

        Config {
            db_path: get("JANITOR_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            artifact_dir: get("JANITOR_ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_DIR)),
            similarity_threshold,
            reasoning: ReasoningConfig {
                endpoint: get("REASONING_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_REASONING_ENDPOINT.to_string()),
                api_key: get("REASONING_API_KEY")
                    .or_else(|| get("OPENAI_API_KEY"))
                    .unwrap_or_default(),
                model: get("REASONING_MODEL")
                    .unwrap_or_else(|| DEFAULT_REASONING_MODEL.to_string()),
                timeout_secs,
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_vars(|_| None)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.artifact_dir, PathBuf::from(DEFAULT_ARTIFACT_DIR));
        assert_eq!(config.similarity_threshold, DEFAULT_SIMILARITY_THRESHOLD);
        assert_eq!(config.reasoning.endpoint, DEFAULT_REASONING_ENDPOINT);
        assert_eq!(config.reasoning.model, DEFAULT_REASONING_MODEL);
        assert_eq!(config.reasoning.timeout_secs, DEFAULT_REASONING_TIMEOUT_SECS);
        assert!(config.reasoning.api_key.is_empty());
    }

    #[test]
    fn test_overrides() {
        let map = vars(&[
            ("JANITOR_DB_PATH", "/tmp/geo.db"),
            ("JANITOR_SIMILARITY_THRESHOLD", "0.85"),
            ("REASONING_MODEL", "gpt-4o-mini"),
            ("REASONING_TIMEOUT_SECS", "10"),
            ("REASONING_API_KEY", "sk-test"),
        ]);
        let config = Config::from_vars(|key| map.get(key).cloned());

        assert_eq!(config.db_path, PathBuf::from("/tmp/geo.db"));
        assert_eq!(config.similarity_threshold, 0.85);
        assert_eq!(config.reasoning.model, "gpt-4o-mini");
        assert_eq!(config.reasoning.timeout_secs, 10);
        assert_eq!(config.reasoning.api_key, "sk-test");
    }

    #[test]
    fn test_invalid_threshold_falls_back() {
        let map = vars(&[("JANITOR_SIMILARITY_THRESHOLD", "1.5")]);
        let config = Config::from_vars(|key| map.get(key).cloned());
        assert_eq!(config.similarity_threshold, DEFAULT_SIMILARITY_THRESHOLD);

        let map = vars(&[("JANITOR_SIMILARITY_THRESHOLD", "not-a-number")]);
        let config = Config::from_vars(|key| map.get(key).cloned());
        assert_eq!(config.similarity_threshold, DEFAULT_SIMILARITY_THRESHOLD);
    }

    #[test]
    fn test_openai_key_fallback() {
        let map = vars(&[("OPENAI_API_KEY", "sk-fallback")]);
        let config = Config::from_vars(|key| map.get(key).cloned());
        assert_eq!(config.reasoning.api_key, "sk-fallback");
    }
}
