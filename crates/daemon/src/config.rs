//! Configuration management for the WebTerm daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/webterm/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("max_sessions must be between 1 and 1000, got {0}")]
    InvalidMaxSessions(usize),

    #[error("web_path must start with '/' and not end with '/', got {0}")]
    InvalidWebPath(String),

    #[error("shell_command path does not exist: {0}")]
    InvalidShellPath(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("listen_addr is not a valid socket address: {0}")]
    InvalidListenAddr(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the WebTerm daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// Network-related configuration.
    pub network: NetworkConfig,

    /// Terminal subsystem configuration.
    pub terminal: TerminalConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Network configuration for the WebSocket listener.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the terminal WebSocket server binds to.
    pub listen_addr: String,
}

/// Terminal subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerminalConfig {
    /// Whether the terminal subsystem is enabled.
    pub enabled: bool,

    /// URL prefix for the terminal endpoint; the WebSocket endpoint is
    /// `<web_path>/ws`.
    pub web_path: String,

    /// Shell command to run for new sessions.
    pub shell_command: String,

    /// Maximum number of concurrent sessions.
    pub max_sessions: usize,

    /// Seconds of inactivity after which a session is reclaimed.
    /// 0 disables idle expiry.
    pub idle_timeout_secs: u64,

    /// Seconds between background sweeps for expired sessions.
    /// 0 disables the sweeper (used by tests that sweep manually).
    pub sweep_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:5261".to_string(),
        }
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            web_path: "/terminal".to_string(),
            shell_command: default_shell(),
            max_sessions: 4,
            idle_timeout_secs: 300, // 5 minutes
            sweep_interval_secs: 30,
        }
    }
}

impl TerminalConfig {
    /// Idle timeout as a duration. Zero disables expiry.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Sweep interval as a duration, or `None` when the sweeper is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        if self.sweep_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.sweep_interval_secs))
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("webterm")
        .join("config.toml")
}

/// Returns the default shell for the current platform.
fn default_shell() -> String {
    if cfg!(windows) {
        "powershell.exe".to_string()
    } else {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
    }
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - WEBTERM_LISTEN_ADDR: Override the WebSocket listen address
    /// - WEBTERM_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - WEBTERM_SHELL: Override the session shell command
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("WEBTERM_LISTEN_ADDR") {
            if !addr.is_empty() {
                tracing::info!("Overriding listen_addr from environment: {}", addr);
                self.network.listen_addr = addr;
            }
        }

        if let Ok(level) = std::env::var("WEBTERM_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.daemon.log_level = level;
            }
        }

        if let Ok(shell) = std::env::var("WEBTERM_SHELL") {
            if !shell.is_empty() {
                tracing::info!("Overriding shell_command from environment: {}", shell);
                self.terminal.shell_command = shell;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate max_sessions: 1-1000
        if self.terminal.max_sessions < 1 || self.terminal.max_sessions > 1000 {
            return Err(ConfigError::InvalidMaxSessions(self.terminal.max_sessions));
        }

        // Validate web_path shape
        let web_path = &self.terminal.web_path;
        if !web_path.starts_with('/') || (web_path.len() > 1 && web_path.ends_with('/')) {
            return Err(ConfigError::InvalidWebPath(web_path.clone()));
        }

        // Validate shell_command path exists
        let shell_path = Path::new(&self.terminal.shell_command);

        // Check if it's an absolute path that exists
        if shell_path.is_absolute() {
            if !shell_path.exists() {
                return Err(ConfigError::InvalidShellPath(
                    self.terminal.shell_command.clone(),
                ));
            }
        } else {
            // For non-absolute paths, try to find in PATH
            if which::which(&self.terminal.shell_command).is_err() {
                return Err(ConfigError::InvalidShellPath(
                    self.terminal.shell_command.clone(),
                ));
            }
        }

        // Validate log_level is a known value
        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        // Validate listen_addr parses as a socket address
        if self
            .network
            .listen_addr
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::InvalidListenAddr(
                self.network.listen_addr.clone(),
            ));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    ///
    /// The default path is `~/.config/webterm/config.toml`.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.network.listen_addr, "127.0.0.1:5261");
        assert!(config.terminal.enabled);
        assert_eq!(config.terminal.web_path, "/terminal");
        assert_eq!(config.terminal.max_sessions, 4);
        assert_eq!(config.terminal.idle_timeout_secs, 300);
        assert_eq!(config.terminal.sweep_interval_secs, 30);
    }

    #[test]
    fn test_default_terminal_config() {
        let config = TerminalConfig::default();
        assert!(!config.shell_command.is_empty());
        assert_eq!(config.idle_timeout(), Duration::from_secs(300));
        assert_eq!(config.sweep_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_sweep_interval_zero_disables_sweeper() {
        let config = TerminalConfig {
            sweep_interval_secs: 0,
            ..TerminalConfig::default()
        };
        assert_eq!(config.sweep_interval(), None);
    }

    #[test]
    fn test_from_toml_empty() {
        // Empty TOML should use all defaults
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[daemon]
log_level = "debug"

[terminal]
max_sessions = 2
idle_timeout_secs = 60
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.terminal.max_sessions, 2);
        assert_eq!(config.terminal.idle_timeout_secs, 60);
        // Unspecified values keep their defaults
        assert_eq!(config.terminal.web_path, "/terminal");
        assert_eq!(config.network.listen_addr, "127.0.0.1:5261");
    }

    #[test]
    fn test_from_toml_invalid() {
        let result = Config::from_toml("this is not [valid toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.terminal.max_sessions = 7;
        config.terminal.idle_timeout_secs = 120;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("does-not-exist.toml");

        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_max_sessions_bounds() {
        let mut config = Config::default();

        config.terminal.max_sessions = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxSessions(0)));

        config.terminal.max_sessions = 1001;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidMaxSessions(1001))
        );

        config.terminal.max_sessions = 1000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_web_path() {
        let mut config = Config::default();

        config.terminal.web_path = "terminal".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWebPath(_))
        ));

        config.terminal.web_path = "/terminal/".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWebPath(_))
        ));
    }

    #[test]
    fn test_validate_shell_path() {
        let mut config = Config::default();
        config.terminal.shell_command = "/nonexistent/shell/path".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidShellPath(_))
        ));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.daemon.log_level = "chatty".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_validate_listen_addr() {
        let mut config = Config::default();
        config.network.listen_addr = "not-an-address".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidListenAddr(_))
        ));
    }

    #[test]
    #[serial]
    fn test_env_override_listen_addr() {
        std::env::set_var("WEBTERM_LISTEN_ADDR", "127.0.0.1:9999");
        let mut config = Config::default();
        config.apply_env_overrides();
        std::env::remove_var("WEBTERM_LISTEN_ADDR");

        assert_eq!(config.network.listen_addr, "127.0.0.1:9999");
    }

    #[test]
    #[serial]
    fn test_env_override_empty_value_ignored() {
        std::env::set_var("WEBTERM_LOG_LEVEL", "");
        let mut config = Config::default();
        config.apply_env_overrides();
        std::env::remove_var("WEBTERM_LOG_LEVEL");

        assert_eq!(config.daemon.log_level, "info");
    }
}
