//! Configuration for overseer.
//!
//! Settings are read from `<data_dir>/overseer.toml` and layered
//! file → environment → CLI. Every key has a default, so a missing file or
//! an empty one is valid.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! dev_mode = false
//!
//! [storage]
//! db_path = ".overseer/overseer.db"
//!
//! [approval]
//! default_timeout_minutes = 60
//!
//! [agent]
//! claude_cmd = "claude"
//! skip_permissions = true
//! timeout_secs = 600
//! plan = "pro"
//!
//! [agent.retry]
//! max_attempts = 3
//! initial_delay_ms = 1000
//! backoff_multiplier = 2.0
//! max_delay_ms = 30000
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::retry::RetryConfig;
use crate::errors::ConfigError;

pub const CONFIG_FILE_NAME: &str = "overseer.toml";
pub const DEFAULT_DATA_DIR: &str = ".overseer";
pub const DB_FILE_NAME: &str = "overseer.db";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverseerConfig {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub approval: ApprovalSettings,
    pub agent: AgentSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Permissive CORS for a frontend dev server.
    pub dev_mode: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3141,
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Defaults to `<data_dir>/overseer.db`.
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalSettings {
    pub default_timeout_minutes: i64,
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self {
            default_timeout_minutes: crate::approval::DEFAULT_TIMEOUT_MINUTES,
        }
    }
}

/// Claude subscription plan. Streaming runs on larger plans get longer to finish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    #[default]
    Pro,
    Max5x,
    Max20x,
}

impl Plan {
    pub fn streaming_timeout(&self) -> Duration {
        match self {
            Plan::Pro => Duration::from_secs(10 * 60),
            Plan::Max5x => Duration::from_secs(20 * 60),
            Plan::Max20x => Duration::from_secs(30 * 60),
        }
    }
}

impl std::str::FromStr for Plan {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pro" => Ok(Plan::Pro),
            "max5x" | "max_5x" | "max" => Ok(Plan::Max5x),
            "max20x" | "max_20x" => Ok(Plan::Max20x),
            _ => Err(ConfigError::Invalid(format!(
                "Invalid plan '{}'. Valid values: pro, max5x, max20x",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub claude_cmd: String,
    pub skip_permissions: bool,
    /// Timeout for non-streaming runs.
    pub timeout_secs: u64,
    pub plan: Plan,
    pub working_dir: Option<PathBuf>,
    pub retry: RetryConfig,
    /// Credentials are only taken from the environment.
    #[serde(skip)]
    pub anthropic_api_key: Option<String>,
    #[serde(skip)]
    pub oauth_token: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            claude_cmd: "claude".to_string(),
            skip_permissions: true,
            timeout_secs: 600,
            plan: Plan::default(),
            working_dir: None,
            retry: RetryConfig::default(),
            anthropic_api_key: None,
            oauth_token: None,
        }
    }
}

impl AgentSettings {
    pub fn timeout(&self, streaming: bool) -> Duration {
        if streaming {
            self.plan.streaming_timeout()
        } else {
            Duration::from_secs(self.timeout_secs)
        }
    }

    /// Flags passed to the Claude CLI.
    pub fn claude_flags(&self, streaming: bool) -> Vec<String> {
        let mut flags = vec!["--print".to_string()];
        if streaming {
            flags.push("--verbose".to_string());
            flags.push("--output-format".to_string());
            flags.push("stream-json".to_string());
        }
        if self.skip_permissions {
            flags.push("--dangerously-skip-permissions".to_string());
        }
        flags
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl OverseerConfig {
    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::from(CONFIG_FILE_NAME),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `<data_dir>/overseer.toml`, falling back to defaults when the
    /// file does not exist.
    pub fn load_or_default(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// File layer plus process environment.
    pub fn resolve(data_dir: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_or_default(data_dir)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        if config.storage.db_path.is_none() {
            config.storage.db_path = Some(data_dir.join(DB_FILE_NAME));
        }
        Ok(config)
    }

    /// Apply environment overrides using `lookup` for variable access.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(cmd) = lookup("CLAUDE_CMD").filter(|v| !v.is_empty()) {
            self.agent.claude_cmd = cmd;
        }
        if let Some(skip) = lookup("SKIP_PERMISSIONS") {
            self.agent.skip_permissions = skip != "false";
        }
        if let Some(port) = lookup("OVERSEER_PORT") {
            self.server.port = port.parse().map_err(|_| {
                ConfigError::Invalid(format!("OVERSEER_PORT must be a port number, got '{}'", port))
            })?;
        }
        if let Some(path) = lookup("OVERSEER_DB_PATH").filter(|v| !v.is_empty()) {
            self.storage.db_path = Some(PathBuf::from(path));
        }
        if let Some(plan) = lookup("CLAUDE_PLAN") {
            self.agent.plan = plan.parse()?;
        }
        if let Some(key) = lookup("ANTHROPIC_API_KEY").filter(|v| !v.is_empty()) {
            self.agent.anthropic_api_key = Some(key);
        }
        if let Some(token) = lookup("CLAUDE_CODE_OAUTH_TOKEN").filter(|v| !v.is_empty()) {
            self.agent.oauth_token = Some(token);
        }
        Ok(())
    }

    /// Reject values that would make the runtime misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.claude_cmd.trim().is_empty() {
            return Err(ConfigError::Invalid("agent.claude_cmd must not be empty".into()));
        }
        if self.agent.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("agent.retry.max_attempts must be at least 1".into()));
        }
        if self.agent.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "agent.retry.backoff_multiplier must be >= 1.0".into(),
            ));
        }
        let max = crate::approval::MAX_TIMEOUT_MINUTES;
        if !(0..=max).contains(&self.approval.default_timeout_minutes) {
            return Err(ConfigError::Invalid(format!(
                "approval.default_timeout_minutes must be between 0 and {}",
                max
            )));
        }
        Ok(())
    }

    /// Serialize the file layer, as written by `overseer init`.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(format!("Failed to serialize config: {}", e)))
    }

    pub fn db_path(&self, data_dir: &Path) -> PathBuf {
        self.storage
            .db_path
            .clone()
            .unwrap_or_else(|| data_dir.join(DB_FILE_NAME))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = OverseerConfig::parse("").unwrap();
        assert_eq!(config, OverseerConfig::default());
        assert_eq!(config.server.port, 3141);
        assert_eq!(config.approval.default_timeout_minutes, 60);
        assert_eq!(config.agent.retry.max_attempts, 3);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_partial_sections() {
        let content = r#"
[server]
port = 8080

[agent]
claude_cmd = "/opt/claude"
plan = "max20x"

[agent.retry]
max_delay_ms = 5000

[logging]
format = "json"
"#;
        let config = OverseerConfig::parse(content).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.agent.claude_cmd, "/opt/claude");
        assert_eq!(config.agent.plan, Plan::Max20x);
        assert_eq!(config.agent.retry.max_delay_ms, 5000);
        assert_eq!(config.agent.retry.initial_delay_ms, 1000);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_parse_rejects_bad_toml() {
        let err = OverseerConfig::parse("[server\nport = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = OverseerConfig::parse("[agent]\nclaude_cmd = \"file-claude\"\n").unwrap();
        config
            .apply_env(env(&[
                ("CLAUDE_CMD", "env-claude"),
                ("SKIP_PERMISSIONS", "false"),
                ("OVERSEER_PORT", "9000"),
                ("ANTHROPIC_API_KEY", "sk-test"),
            ]))
            .unwrap();
        assert_eq!(config.agent.claude_cmd, "env-claude");
        assert!(!config.agent.skip_permissions);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.agent.anthropic_api_key.as_deref(), Some("sk-test"));
        assert!(config.agent.oauth_token.is_none());
    }

    #[test]
    fn test_env_invalid_port_is_error() {
        let mut config = OverseerConfig::default();
        let err = config.apply_env(env(&[("OVERSEER_PORT", "http")])).unwrap_err();
        assert!(err.to_string().contains("OVERSEER_PORT"));
    }

    #[test]
    fn test_timeouts_by_mode_and_plan() {
        let mut agent = AgentSettings::default();
        assert_eq!(agent.timeout(false), Duration::from_secs(600));
        assert_eq!(agent.timeout(true), Duration::from_secs(600));
        agent.plan = Plan::Max20x;
        assert_eq!(agent.timeout(true), Duration::from_secs(1800));
        assert_eq!(agent.timeout(false), Duration::from_secs(600));
    }

    #[test]
    fn test_claude_flags() {
        let mut agent = AgentSettings::default();
        assert_eq!(
            agent.claude_flags(true),
            vec![
                "--print",
                "--verbose",
                "--output-format",
                "stream-json",
                "--dangerously-skip-permissions"
            ]
        );
        agent.skip_permissions = false;
        assert_eq!(agent.claude_flags(false), vec!["--print"]);
    }

    #[test]
    fn test_validate() {
        let mut config = OverseerConfig::default();
        assert!(config.validate().is_ok());
        config.agent.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = OverseerConfig::default();
        config.approval.default_timeout_minutes = i64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_and_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = OverseerConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config, OverseerConfig::default());

        let mut custom = OverseerConfig::default();
        custom.approval.default_timeout_minutes = 15;
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), custom.to_toml().unwrap()).unwrap();
        let loaded = OverseerConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.approval.default_timeout_minutes, 15);
    }

    #[test]
    fn test_db_path_defaults_under_data_dir() {
        let config = OverseerConfig::default();
        assert_eq!(
            config.db_path(Path::new("/data")),
            PathBuf::from("/data/overseer.db")
        );
    }
}
