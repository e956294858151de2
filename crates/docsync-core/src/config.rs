//! Configuration module for docsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::newtypes::RemotePath;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for docsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub conflicts: ConflictsConfig,
    pub state: StateConfig,
    pub repository: RepositoryConfig,
    pub logging: LoggingConfig,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Local directory kept in sync.
    pub local_root: PathBuf,
    /// Repository folder kept in sync.
    pub remote_root: String,
    /// Propagate local changes to the repository (otherwise download-only).
    pub bidirectional: bool,
    /// Seconds between FULL pass requests.
    pub poll_interval: u64,
    /// Seconds of local quiet before a PARTIAL pass runs (debounce).
    pub debounce_delay: u64,
    /// Seconds between forced full crawls, regardless of change-feed health.
    pub full_crawl_interval: u64,
    /// Change-feed page size when the repository does not cap it.
    pub change_batch_size: u32,
    /// Attempts per item and operation kind before the operation is skipped.
    pub max_retries: u32,
    /// Milliseconds to wait before confirming a local deletion.
    pub delete_recheck_delay_ms: u64,
    /// User identity used in conflict copy names.
    pub user_name: String,
    /// Repository paths that are never synchronized (prefix match).
    pub ignored_paths: Vec<String>,
    /// File name glob patterns that are never synchronized.
    pub ignored_names: Vec<String>,
}

/// A per-path conflict rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRuleConfig {
    /// Glob pattern matched against the path relative to the sync root.
    pub pattern: String,
    /// `remote` or `local`.
    pub winner: String,
}

/// Conflict resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictsConfig {
    /// Default winner: `remote` or `local`.
    pub winner: String,
    /// Passes after which a remaining conflict copy triggers a reminder.
    pub nag_after_passes: u32,
    /// Highest index tried when probing for a free conflict copy name.
    pub max_probe_index: u32,
    /// Per-path overrides, first match wins.
    pub rules: Vec<ConflictRuleConfig>,
}

/// State store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Path of the SQLite database.
    pub database: PathBuf,
}

/// Repository adapter settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Directory served as the repository by the directory adapter.
    pub root: Option<PathBuf>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `text` or `json`.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/docsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("docsync")
            .join("config.yaml")
    }
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Name patterns of editor and OS scratch files.
pub const DEFAULT_IGNORED_NAMES: &[&str] = &[
    "~$*",
    ".~*",
    ".#*",
    "*~",
    "*.tmp",
    "*.swp",
    "*.swo",
    "*.part",
    "*.crdownload",
    ".DS_Store",
    "Thumbs.db",
    "desktop.ini",
];

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            local_root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("DocSync"),
            remote_root: "/".to_string(),
            bidirectional: true,
            poll_interval: 60,
            debounce_delay: 2,
            full_crawl_interval: 4 * 60 * 60,
            change_batch_size: 100,
            max_retries: 3,
            delete_recheck_delay_ms: 500,
            user_name: std::env::var("USER")
                .ok()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| "user".to_string()),
            ignored_paths: Vec::new(),
            ignored_names: DEFAULT_IGNORED_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for ConflictsConfig {
    fn default() -> Self {
        Self {
            winner: "remote".to_string(),
            nag_after_passes: 3,
            max_probe_index: 1000,
            rules: Vec::new(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            database: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("docsync")
                .join("state.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.poll_interval"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

/// Valid values for `conflicts.winner` and rule winners.
pub const VALID_CONFLICT_WINNERS: &[&str] = &["remote", "local"];

/// Characters that cannot appear in a conflict copy name.
const INVALID_USER_NAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', '(', ')'];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ValidationError {
                field: field.into(),
                message,
            })
        };

        // --- sync ---
        if self.sync.poll_interval == 0 {
            push("sync.poll_interval", "must be greater than 0".into());
        }
        if self.sync.debounce_delay == 0 {
            push("sync.debounce_delay", "must be greater than 0".into());
        }
        if self.sync.full_crawl_interval < self.sync.poll_interval {
            push(
                "sync.full_crawl_interval",
                format!(
                    "full_crawl_interval ({}) must not be shorter than poll_interval ({})",
                    self.sync.full_crawl_interval, self.sync.poll_interval
                ),
            );
        }
        if self.sync.change_batch_size == 0 {
            push("sync.change_batch_size", "must be greater than 0".into());
        }
        if self.sync.max_retries == 0 {
            push("sync.max_retries", "must be greater than 0".into());
        }

        // `~` is expanded at runtime.
        let root_str = self.sync.local_root.to_string_lossy();
        if !root_str.starts_with('~') && !self.sync.local_root.is_absolute() {
            push(
                "sync.local_root",
                format!("must be an absolute path: {}", self.sync.local_root.display()),
            );
        }
        if let Err(e) = RemotePath::new(self.sync.remote_root.clone()) {
            push("sync.remote_root", e.to_string());
        }
        for (i, p) in self.sync.ignored_paths.iter().enumerate() {
            if let Err(e) = RemotePath::new(p.clone()) {
                push(&format!("sync.ignored_paths[{i}]"), e.to_string());
            }
        }
        for (i, pattern) in self.sync.ignored_names.iter().enumerate() {
            if pattern.is_empty() {
                push(&format!("sync.ignored_names[{i}]"), "must not be empty".into());
            }
        }
        if self.sync.user_name.trim().is_empty() {
            push("sync.user_name", "must not be empty".into());
        } else if self.sync.user_name.contains(INVALID_USER_NAME_CHARS) {
            push(
                "sync.user_name",
                format!(
                    "must not contain any of {:?}",
                    INVALID_USER_NAME_CHARS.iter().collect::<String>()
                ),
            );
        }

        // --- conflicts ---
        if !VALID_CONFLICT_WINNERS.contains(&self.conflicts.winner.as_str()) {
            push(
                "conflicts.winner",
                format!(
                    "invalid winner '{}'; valid options: {}",
                    self.conflicts.winner,
                    VALID_CONFLICT_WINNERS.join(", ")
                ),
            );
        }
        if self.conflicts.nag_after_passes == 0 {
            push("conflicts.nag_after_passes", "must be greater than 0".into());
        }
        if self.conflicts.max_probe_index == 0 {
            push("conflicts.max_probe_index", "must be greater than 0".into());
        }
        for (i, rule) in self.conflicts.rules.iter().enumerate() {
            if rule.pattern.is_empty() {
                push(&format!("conflicts.rules[{i}].pattern"), "must not be empty".into());
            }
            if !VALID_CONFLICT_WINNERS.contains(&rule.winner.as_str()) {
                push(
                    &format!("conflicts.rules[{i}].winner"),
                    format!(
                        "invalid winner '{}'; valid options: {}",
                        rule.winner,
                        VALID_CONFLICT_WINNERS.join(", ")
                    ),
                );
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level",
                format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            push(
                "logging.format",
                format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            );
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use docsync_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .sync_local_root(PathBuf::from("/home/user/Shared"))
///     .sync_remote_root("/Shared")
///     .sync_poll_interval(120)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_local_root(mut self, root: PathBuf) -> Self {
        self.config.sync.local_root = root;
        self
    }

    pub fn sync_remote_root(mut self, root: impl Into<String>) -> Self {
        self.config.sync.remote_root = root.into();
        self
    }

    pub fn sync_bidirectional(mut self, bidirectional: bool) -> Self {
        self.config.sync.bidirectional = bidirectional;
        self
    }

    pub fn sync_poll_interval(mut self, seconds: u64) -> Self {
        self.config.sync.poll_interval = seconds;
        self
    }

    pub fn sync_debounce_delay(mut self, seconds: u64) -> Self {
        self.config.sync.debounce_delay = seconds;
        self
    }

    pub fn sync_full_crawl_interval(mut self, seconds: u64) -> Self {
        self.config.sync.full_crawl_interval = seconds;
        self
    }

    pub fn sync_change_batch_size(mut self, n: u32) -> Self {
        self.config.sync.change_batch_size = n;
        self
    }

    pub fn sync_max_retries(mut self, n: u32) -> Self {
        self.config.sync.max_retries = n;
        self
    }

    pub fn sync_delete_recheck_delay_ms(mut self, ms: u64) -> Self {
        self.config.sync.delete_recheck_delay_ms = ms;
        self
    }

    pub fn sync_user_name(mut self, user: impl Into<String>) -> Self {
        self.config.sync.user_name = user.into();
        self
    }

    pub fn sync_ignored_path(mut self, path: impl Into<String>) -> Self {
        self.config.sync.ignored_paths.push(path.into());
        self
    }

    pub fn sync_ignored_names(mut self, patterns: Vec<String>) -> Self {
        self.config.sync.ignored_names = patterns;
        self
    }

    // --- conflicts ---

    pub fn conflicts_winner(mut self, winner: impl Into<String>) -> Self {
        self.config.conflicts.winner = winner.into();
        self
    }

    pub fn conflicts_nag_after_passes(mut self, passes: u32) -> Self {
        self.config.conflicts.nag_after_passes = passes;
        self
    }

    pub fn conflicts_max_probe_index(mut self, n: u32) -> Self {
        self.config.conflicts.max_probe_index = n;
        self
    }

    pub fn conflicts_rule(mut self, pattern: impl Into<String>, winner: impl Into<String>) -> Self {
        self.config.conflicts.rules.push(ConflictRuleConfig {
            pattern: pattern.into(),
            winner: winner.into(),
        });
        self
    }

    // --- state ---

    pub fn state_database(mut self, path: PathBuf) -> Self {
        self.config.state.database = path;
        self
    }

    // --- repository ---

    pub fn repository_root(mut self, root: PathBuf) -> Self {
        self.config.repository.root = Some(root);
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
