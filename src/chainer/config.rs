//! Run configuration and rule-base files.
//!
//! A rule base is a TOML document:
//!
//! ```toml
//! name = "inheritance"
//! rules = """
//! @rule deduction
//!   match: (Inheritance $A $B), (Inheritance $B $C)
//!   produce: (Inheritance $A $C)
//! """
//!
//! [config]
//! maximum-iterations = 50
//! jobs = 4
//! retry-exhausted-sources = false
//! full-rule-application = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ChainerError, ChainerResult};
use crate::rule::parse::parse_rules;
use crate::rule::Rule;

use super::selector::DEFAULT_SAMPLES;

/// Knobs of a single chainer run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ChainerConfig {
    /// Upper bound on steps. Negative means unbounded.
    pub maximum_iterations: i64,
    /// Maximum number of steps in flight at once.
    pub jobs: usize,
    /// Reset exhaustion flags instead of stopping when every source is spent,
    /// as long as the previous reset led to new sources.
    pub retry_exhausted_sources: bool,
    /// Apply selected rules to the whole knowledge base rather than only to
    /// the instance that unified with the source.
    pub full_rule_application: bool,
    /// How strongly source selection prefers simple (short-chain) sources.
    pub complexity_penalty: f64,
    /// Thompson-sampling rounds per rule selection.
    pub thompson_samples: usize,
    /// RNG seed. Runs with `jobs = 1` and a fixed seed are reproducible.
    pub seed: Option<u64>,
}

fn default_maximum_iterations() -> i64 {
    100
}

impl Default for ChainerConfig {
    fn default() -> Self {
        Self {
            maximum_iterations: default_maximum_iterations(),
            jobs: 1,
            retry_exhausted_sources: false,
            full_rule_application: false,
            complexity_penalty: 0.0,
            thompson_samples: DEFAULT_SAMPLES,
            seed: None,
        }
    }
}

impl ChainerConfig {
    /// The iteration bound, or `None` when unbounded.
    pub fn max_iterations(&self) -> Option<u64> {
        u64::try_from(self.maximum_iterations).ok()
    }

    /// The iteration bound for log messages.
    pub fn maximum_iterations_str(&self) -> String {
        match self.max_iterations() {
            Some(max) => max.to_string(),
            None => "inf".into(),
        }
    }

    pub fn validate(&self) -> ChainerResult<()> {
        if self.jobs == 0 {
            return Err(ChainerError::InvalidConfig {
                message: "jobs must be at least 1".into(),
            });
        }
        if !self.complexity_penalty.is_finite() || self.complexity_penalty < 0.0 {
            return Err(ChainerError::InvalidConfig {
                message: format!(
                    "complexity-penalty must be finite and non-negative, got {}",
                    self.complexity_penalty
                ),
            });
        }
        if self.thompson_samples == 0 {
            return Err(ChainerError::InvalidConfig {
                message: "thompson-samples must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// A named set of rules together with the configuration to run them with.
#[derive(Debug, Clone)]
pub struct RuleBase {
    pub name: String,
    pub config: ChainerConfig,
    pub rules: Vec<Rule>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RuleBaseToml {
    name: Option<String>,
    #[serde(default)]
    config: ChainerConfig,
    #[serde(default)]
    rules: String,
}

impl RuleBase {
    pub fn new(name: impl Into<String>, rules: Vec<Rule>, config: ChainerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            rules,
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: ChainerConfig) -> Self {
        self.config = config;
        self
    }

    /// Parse a rule base document. `fallback_name` is used when the document
    /// does not name itself.
    pub fn from_toml(text: &str, fallback_name: &str) -> ChainerResult<Self> {
        let parsed: RuleBaseToml =
            toml::from_str(text).map_err(|e| ChainerError::RuleBaseFormat {
                name: fallback_name.to_string(),
                message: e.to_string(),
            })?;
        let name = parsed.name.unwrap_or_else(|| fallback_name.to_string());
        parsed.config.validate()?;
        let rules = parse_rules(&parsed.rules)?;
        Ok(Self {
            name,
            config: parsed.config,
            rules,
        })
    }

    /// Load a rule base file, named after the file stem unless it says otherwise.
    pub fn load(path: &Path) -> ChainerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ChainerError::RuleBaseIo {
            path: path.display().to_string(),
            source: e,
        })?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "rule-base".into());
        Self::from_toml(&content, &stem)
    }

    /// Parse rules serialized as a JSON array.
    pub fn rules_from_json(json: &str) -> ChainerResult<Vec<Rule>> {
        serde_json::from_str(json).map_err(|e| ChainerError::RuleBaseFormat {
            name: "json".into(),
            message: format!("JSON parse error: {e}"),
        })
    }
}
