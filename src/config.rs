//! Reasoner configuration, loaded from TOML.
//!
//! ```toml
//! [graph]
//! merge_strategy = { kind = "noisy-or" }
//!
//! [merge]
//! enabled = true
//! assert_alternate_names = true
//!
//! [inference]
//! rules_path = "data/kbp.rules"
//! enabled = true
//!
//! [resolver]
//! objective = "sum"
//! mixing_iterations = 100
//! seed = 42
//! min_score = 0.0
//! ```
//!
//! Every section and field is optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::graph::MergeStrategy;
use crate::resolve::{ConsistencyResolver, ObjectiveKind};

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerConfig {
    pub graph: GraphConfig,
    pub merge: MergeConfig,
    pub inference: InferenceConfig,
    pub resolver: ResolverConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub merge_strategy: MergeStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub enabled: bool,
    /// Record merged names as alternate names of the representative.
    pub assert_alternate_names: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            assert_alternate_names: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Rule file; the builtin rules are used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_path: Option<PathBuf>,
    pub enabled: bool,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            rules_path: None,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub objective: ObjectiveKind,
    pub mixing_iterations: usize,
    pub seed: u64,
    pub min_score: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            objective: ObjectiveKind::default(),
            mixing_iterations: ConsistencyResolver::DEFAULT_MIXING_ITERATIONS,
            seed: ConsistencyResolver::DEFAULT_SEED,
            min_score: 0.0,
        }
    }
}

impl ReasonerConfig {
    /// Parse TOML text. `origin` names the source in error messages.
    pub fn from_toml(text: &str, origin: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content, &path.display().to_string())
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |message: String| Err(ConfigError::Invalid { message });

        if let MergeStrategy::MaxPlus { bonus } = self.graph.merge_strategy {
            if !(0.0..=1.0).contains(&bonus) {
                return invalid(format!(
                    "graph.merge_strategy bonus must be in [0, 1], got {bonus}"
                ));
            }
        }
        let min_score = self.resolver.min_score;
        if !min_score.is_finite() || !(0.0..=1.0).contains(&min_score) {
            return invalid(format!("resolver.min_score must be in [0, 1], got {min_score}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = ReasonerConfig::from_toml("", "<inline>").unwrap();
        assert_eq!(config, ReasonerConfig::default());
        assert_eq!(config.graph.merge_strategy, MergeStrategy::Max);
        assert!(config.merge.enabled);
        assert_eq!(config.resolver.objective, ObjectiveKind::Sum);
        assert_eq!(config.resolver.seed, 42);
    }

    #[test]
    fn full_config() {
        let text = r#"
            [graph]
            merge_strategy = { kind = "max-plus", bonus = 0.1 }

            [merge]
            assert_alternate_names = false

            [inference]
            rules_path = "rules/custom.rules"
            enabled = false

            [resolver]
            objective = "mean"
            mixing_iterations = 5
            seed = 7
            min_score = 0.2
        "#;
        let config = ReasonerConfig::from_toml(text, "<inline>").unwrap();
        assert_eq!(config.graph.merge_strategy, MergeStrategy::MaxPlus { bonus: 0.1 });
        assert!(config.merge.enabled);
        assert!(!config.merge.assert_alternate_names);
        assert_eq!(config.inference.rules_path, Some(PathBuf::from("rules/custom.rules")));
        assert!(!config.inference.enabled);
        assert_eq!(config.resolver.objective, ObjectiveKind::Mean);
        assert_eq!(config.resolver.mixing_iterations, 5);
        assert_eq!(config.resolver.seed, 7);
        assert_eq!(config.resolver.min_score, 0.2);
    }

    #[test]
    fn noisy_or_strategy() {
        let config = ReasonerConfig::from_toml(
            "[graph]\nmerge_strategy = { kind = \"noisy-or\" }\n",
            "<inline>",
        )
        .unwrap();
        assert_eq!(config.graph.merge_strategy, MergeStrategy::NoisyOr);
    }

    #[test]
    fn invalid_values_rejected() {
        let bonus = "[graph]\nmerge_strategy = { kind = \"max-plus\", bonus = 2.0 }\n";
        assert!(matches!(
            ReasonerConfig::from_toml(bonus, "<inline>"),
            Err(ConfigError::Invalid { .. })
        ));
        let min = "[resolver]\nmin_score = -0.5\n";
        assert!(matches!(
            ReasonerConfig::from_toml(min, "<inline>"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            ReasonerConfig::from_toml("[resolver]\nobjective = \"median\"\n", "<inline>"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn load_from_file_and_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[resolver]\nseed = 99").unwrap();
        let config = ReasonerConfig::load(file.path()).unwrap();
        assert_eq!(config.resolver.seed, 99);

        let rendered = config.to_toml().unwrap();
        assert_eq!(ReasonerConfig::from_toml(&rendered, "<rendered>").unwrap(), config);

        assert!(matches!(
            ReasonerConfig::load(Path::new("/nonexistent/slotfill.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
