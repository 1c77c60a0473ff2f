//! Main application configuration
//!
//! This module defines the primary configuration structures for the
//! matchmaking service, including TOML file loading, environment variable
//! overrides and validation.

use crate::config::matchmaking::MatchmakingSection;
use crate::types::FROM_POSITION_VARIANT;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub challenge: ChallengeSettings,
    #[serde(default)]
    pub matchmaking: MatchmakingSection,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health check endpoint
    pub health_port: u16,
    /// Serve health and metrics endpoints
    pub enable_health_server: bool,
    /// Seconds between matchmaking polls
    pub poll_interval_seconds: u64,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Game server connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Base URL of the game server API
    pub url: String,
    /// Bot API token
    pub token: String,
    /// Bot account name; looked up from the server when unset
    pub username: Option<String>,
    /// Request timeout in seconds
    pub request_timeout_seconds: u64,
}

/// Settings shared with the challenge handling side of the bot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeSettings {
    /// Variants the bot is able to play
    pub variants: Vec<String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "bot-matchmaker".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            enable_health_server: true,
            poll_interval_seconds: 1,
            shutdown_timeout_seconds: 10,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: "https://lichess.org".to_string(),
            token: String::new(),
            username: None,
            request_timeout_seconds: 15,
        }
    }
}

impl Default for ChallengeSettings {
    fn default() -> Self {
        Self {
            variants: vec!["standard".to_string()],
        }
    }
}

impl ChallengeSettings {
    /// Variants eligible for matchmaking; custom positions are never challenged
    pub fn matchmaking_variants(&self) -> Vec<String> {
        self.variants
            .iter()
            .filter(|variant| variant.as_str() != FROM_POSITION_VARIANT)
            .cloned()
            .collect()
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&contents)?;
        config.apply_env_overrides()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Parse configuration from TOML text without touching the environment
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| anyhow!("Invalid configuration: {}", e))
    }

    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Override settings from environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(port) = env::var("HEALTH_PORT") {
            self.service.health_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HEALTH_PORT value: {}", port))?;
        }
        if let Ok(interval) = env::var("POLL_INTERVAL_SECONDS") {
            self.service.poll_interval_seconds = interval
                .parse()
                .map_err(|_| anyhow!("Invalid POLL_INTERVAL_SECONDS value: {}", interval))?;
        }

        // Server settings
        if let Ok(url) = env::var("SERVER_URL") {
            self.server.url = url;
        }
        if let Ok(token) = env::var("BOT_TOKEN") {
            self.server.token = token;
        }
        if let Ok(username) = env::var("BOT_USERNAME") {
            self.server.username = Some(username);
        }

        // Matchmaking settings
        if let Ok(allow) = env::var("ALLOW_MATCHMAKING") {
            self.matchmaking.defaults.allow_matchmaking = Some(
                allow
                    .parse()
                    .map_err(|_| anyhow!("Invalid ALLOW_MATCHMAKING value: {}", allow))?,
            );
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.service.poll_interval_seconds)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.enable_health_server && config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }
    if config.service.poll_interval_seconds == 0 {
        return Err(anyhow!("Poll interval must be greater than 0"));
    }
    if config.server.url.is_empty() {
        return Err(anyhow!("Server URL cannot be empty"));
    }
    if config.server.request_timeout_seconds == 0 {
        return Err(anyhow!("Request timeout must be greater than 0"));
    }

    // Validate matchmaking profiles
    let variants = config.challenge.matchmaking_variants();
    for profile in config.matchmaking.profiles() {
        profile.validate(&variants)?;
    }

    Ok(())
}
