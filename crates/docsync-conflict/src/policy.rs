//! Conflict policy table
//!
//! Holds the naming and nag heuristics together with the per-path winner
//! rules. Rules are matched using glob patterns in first-match-wins order
//! against the path relative to the sync root.

use glob::Pattern;
use tracing::{debug, trace, warn};

use docsync_core::config::ConflictsConfig;

use crate::error::ConflictError;
use crate::namer::DEFAULT_SUFFIX;

/// Which side wins a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    /// The repository copy is fetched; local edits are kept under a new name
    Remote,
    /// The local content is pushed over the repository copy
    Local,
}

impl std::fmt::Display for Winner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Winner::Remote => write!(f, "remote"),
            Winner::Local => write!(f, "local"),
        }
    }
}

impl std::str::FromStr for Winner {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remote" => Ok(Winner::Remote),
            "local" => Ok(Winner::Local),
            other => Err(format!("invalid winner '{other}'; valid: remote, local")),
        }
    }
}

/// A single conflict rule
#[derive(Debug, Clone)]
pub struct ConflictRule {
    /// Glob pattern matched against the relative path (e.g. "*.lock", "Drafts/**")
    pub pattern: String,
    /// Winner for matching paths
    pub winner: Winner,
}

impl ConflictRule {
    /// Parses a rule from its configuration strings
    pub fn parse(pattern: &str, winner: &str) -> Result<Self, ConflictError> {
        Pattern::new(pattern).map_err(|e| ConflictError::InvalidRule {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let winner = winner
            .parse::<Winner>()
            .map_err(|reason| ConflictError::InvalidRule {
                pattern: pattern.to_string(),
                reason,
            })?;
        Ok(Self {
            pattern: pattern.to_string(),
            winner,
        })
    }
}

/// Naming, probing, nag and winner settings for conflict handling
#[derive(Debug, Clone)]
pub struct ConflictPolicy {
    suffix_template: String,
    max_probe_index: u32,
    nag_after_passes: u32,
    rules: Vec<(Pattern, Winner)>,
    default_winner: Winner,
}

impl ConflictPolicy {
    /// Creates a policy with the given default winner and rules
    ///
    /// Invalid rule patterns are logged and skipped.
    pub fn new(default_winner: Winner, rules: &[ConflictRule]) -> Self {
        let compiled: Vec<(Pattern, Winner)> = rules
            .iter()
            .filter_map(|rule| match Pattern::new(&rule.pattern) {
                Ok(p) => Some((p, rule.winner)),
                Err(e) => {
                    warn!(
                        pattern = %rule.pattern,
                        error = %e,
                        "Skipping invalid conflict rule pattern"
                    );
                    None
                }
            })
            .collect();

        debug!(
            rules_count = compiled.len(),
            default = %default_winner,
            "Conflict policy initialized"
        );

        Self {
            suffix_template: DEFAULT_SUFFIX.to_string(),
            max_probe_index: 1000,
            nag_after_passes: 3,
            rules: compiled,
            default_winner,
        }
    }

    /// Builds the policy from the `conflicts` configuration section
    ///
    /// Rules with an unknown winner are logged and skipped, like invalid patterns.
    pub fn from_config(config: &ConflictsConfig) -> Self {
        let default_winner = config.winner.parse().unwrap_or_else(|e: String| {
            warn!(error = %e, "Falling back to remote as the default conflict winner");
            Winner::Remote
        });
        let rules: Vec<ConflictRule> = config
            .rules
            .iter()
            .filter_map(|rule| match ConflictRule::parse(&rule.pattern, &rule.winner) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    warn!(error = %e, "Skipping conflict rule");
                    None
                }
            })
            .collect();

        Self::new(default_winner, &rules)
            .with_max_probe_index(config.max_probe_index)
            .with_nag_after_passes(config.nag_after_passes)
    }

    pub fn with_suffix_template(mut self, template: impl Into<String>) -> Self {
        self.suffix_template = template.into();
        self
    }

    pub fn with_max_probe_index(mut self, max: u32) -> Self {
        self.max_probe_index = max.max(1);
        self
    }

    pub fn with_nag_after_passes(mut self, passes: u32) -> Self {
        self.nag_after_passes = passes.max(1);
        self
    }

    /// Winner for a path relative to the sync root
    ///
    /// First matching rule wins; otherwise the default winner applies.
    pub fn winner_for(&self, relative_path: &str) -> Winner {
        for (pattern, winner) in &self.rules {
            if pattern.matches(relative_path) {
                trace!(
                    path = %relative_path,
                    pattern = %pattern,
                    winner = %winner,
                    "Conflict rule matched"
                );
                return *winner;
            }
        }
        self.default_winner
    }

    pub fn suffix_template(&self) -> &str {
        &self.suffix_template
    }

    pub fn max_probe_index(&self) -> u32 {
        self.max_probe_index
    }

    pub fn nag_after_passes(&self) -> u32 {
        self.nag_after_passes
    }

    pub fn default_winner(&self) -> Winner {
        self.default_winner
    }

    /// Returns the number of compiled rules
    pub fn rules_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self::new(Winner::Remote, &[])
    }
}
