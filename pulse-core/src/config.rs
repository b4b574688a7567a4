//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/pulse/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/pulse/` (~/.config/pulse/)
//! - Data: `$XDG_DATA_HOME/pulse/` (~/.local/share/pulse/)
//! - State/Logs: `$XDG_STATE_HOME/pulse/` (~/.local/state/pulse/)

use crate::classifier::CategorySet;
use crate::error::{Error, Result};
use crate::policy::PolicyConfig;
use crate::types::{BrandVoiceProfile, PersonaId, StallCategory};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Log files are named `{prefix}.{date}.{suffix}`
pub const LOG_FILE_PREFIX: &str = "pulse";
pub const LOG_FILE_SUFFIX: &str = "log";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Category names the classifier may return, in prompt order
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    /// Tenant identity and voice
    #[serde(default)]
    pub tenant: TenantConfig,

    /// Confidence thresholds and auto-send permission
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Brand voice profiles keyed by persona id
    #[serde(default = "default_personas")]
    pub personas: BTreeMap<PersonaId, BrandVoiceProfile>,

    /// Language oracle used for classification and composition (optional)
    #[serde(default)]
    pub llm: Option<LlmConfig>,

    /// CRM/portal status source for the backend activity gate
    #[serde(default)]
    pub status_source: StatusSourceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            tenant: TenantConfig::default(),
            policy: PolicyConfig::default(),
            personas: default_personas(),
            llm: None,
            status_source: StatusSourceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_categories() -> Vec<String> {
    [
        StallCategory::Benign,
        StallCategory::Confusion,
        StallCategory::HighFriction,
    ]
    .iter()
    .map(|c| c.as_str().to_string())
    .collect()
}

fn default_personas() -> BTreeMap<PersonaId, BrandVoiceProfile> {
    PersonaId::ALL
        .iter()
        .map(|p| (*p, BrandVoiceProfile::builtin(*p)))
        .collect()
}

/// Tenant (carrier/agency) identity
#[derive(Debug, Deserialize, Clone)]
pub struct TenantConfig {
    #[serde(default = "default_tenant_id")]
    pub id: String,

    /// Display name (optional)
    pub name: Option<String>,

    /// Persona used when composing nudges
    #[serde(default = "default_persona")]
    pub persona: PersonaId,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            id: default_tenant_id(),
            name: None,
            persona: default_persona(),
        }
    }
}

fn default_tenant_id() -> String {
    "default".to_string()
}

fn default_persona() -> PersonaId {
    PersonaId::HelpfulNeighbor
}

/// LLM provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Provider type
    pub provider: LlmProvider,
    /// Model to use
    pub model: String,
    /// API endpoint (optional, uses default for provider)
    pub endpoint: Option<String>,
    /// API key (can also use env var)
    pub api_key: Option<String>,
    /// Per-call timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Use the oracle to pick nudge templates (otherwise deterministic)
    #[serde(default = "default_true")]
    pub compose_with_oracle: bool,
}

fn default_llm_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// Supported LLM providers
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    Claude,
    OpenAI,
}

impl LlmProvider {
    /// Returns the default endpoint for this provider
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "http://localhost:11434",
            LlmProvider::Claude => "https://api.anthropic.com",
            LlmProvider::OpenAI => "https://api.openai.com",
        }
    }
}

/// Which status source backs the gate.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusSourceKind {
    /// Query the CRM/portal over HTTP
    Http,
    /// Report no activity for every conversation. Development only.
    AssumeInactive,
}

/// Status source configuration
///
/// With no `kind` the gate has nothing to ask and fails closed on every
/// conversation.
#[derive(Debug, Deserialize, Clone)]
pub struct StatusSourceConfig {
    pub kind: Option<StatusSourceKind>,

    /// Base URL of the CRM/portal API
    pub endpoint: Option<String>,

    /// Bearer token for the CRM/portal API
    pub api_key: Option<String>,

    /// Query timeout in seconds
    #[serde(default = "default_status_timeout")]
    pub timeout_secs: u64,
}

impl Default for StatusSourceConfig {
    fn default() -> Self {
        Self {
            kind: None,
            endpoint: None,
            api_key: None,
            timeout_secs: default_status_timeout(),
        }
    }
}

fn default_status_timeout() -> u64 {
    5
}

impl StatusSourceConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.kind == Some(StatusSourceKind::Http) && self.endpoint.is_none() {
            return Err(Error::Config(
                "status_source.endpoint is required when kind = \"http\"".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "status_source.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
    }

    /// Check every tenant-setup invariant. Any failure is fatal.
    pub fn validate(&self) -> Result<()> {
        self.policy.validate()?;
        self.category_set()?;
        self.persona_profile(self.tenant.persona)?;
        self.status_source.validate()?;
        if let Some(llm) = &self.llm {
            if llm.timeout_secs == 0 {
                return Err(Error::Config(
                    "llm.timeout_secs must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Resolve the configured category names into a closed set.
    pub fn category_set(&self) -> Result<CategorySet> {
        CategorySet::from_names(&self.categories)
    }

    /// Profile for a persona, or a configuration error if it is not set up.
    pub fn persona_profile(&self, persona: PersonaId) -> Result<&BrandVoiceProfile> {
        self.personas.get(&persona).ok_or_else(|| {
            Error::Config(format!(
                "persona `{}` is not configured under [personas]",
                persona
            ))
        })
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/pulse/config.toml` (~/.config/pulse/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("pulse").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/pulse/` (~/.local/share/pulse/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("pulse")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/pulse/` (~/.local/state/pulse/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("pulse")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/pulse/pulse.db` (~/.local/share/pulse/pulse.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("pulse.db")
    }

    /// Returns today's log file path
    ///
    /// Logs rotate daily (UTC), so this is
    /// `$XDG_STATE_HOME/pulse/pulse.YYYY-MM-DD.log`.
    pub fn log_path() -> PathBuf {
        Self::state_dir().join(format!(
            "{LOG_FILE_PREFIX}.{}.{LOG_FILE_SUFFIX}",
            chrono::Utc::now().format("%Y-%m-%d")
        ))
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
