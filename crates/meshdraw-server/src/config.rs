//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (MESHDRAW_*)
//! - TOML configuration file

use anyhow::{bail, Context, Result};
use meshdraw_core::session::{default_tiers, DEFAULT_KEYWORD};
use meshdraw_core::{PrizeTier, SessionConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "MESHDRAW_CONFIG";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Draw configuration.
    #[serde(default)]
    pub lottery: LotteryConfig,

    /// Packet ingest configuration.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Draw configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotteryConfig {
    /// Phrase that registers the sender of a text message.
    #[serde(default = "default_keyword")]
    pub keyword: String,

    /// Delay before a triggered draw resolves, in milliseconds.
    #[serde(default = "default_draw_delay")]
    pub draw_delay_ms: u64,

    /// Prize tiers in draw order.
    #[serde(default = "default_tiers")]
    pub prizes: Vec<PrizeTier>,
}

/// Where packets come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Newline-delimited JSON on standard input.
    Stdin,
    /// Newline-delimited JSON from a TCP bridge.
    Tcp,
    /// No radio; HTTP only.
    #[serde(rename = "none")]
    Disabled,
}

/// Packet ingest configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Packet source.
    #[serde(default = "default_source")]
    pub source: SourceKind,

    /// Bridge address for the TCP source.
    #[serde(default)]
    pub address: Option<SocketAddr>,

    /// Delay between reconnect attempts, in milliseconds.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("MESHDRAW_HOST").unwrap_or_else(|_| "0.0.0.0".to_string())
}

fn default_port() -> u16 {
    std::env::var("MESHDRAW_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5000)
}

fn default_keyword() -> String {
    DEFAULT_KEYWORD.to_string()
}

fn default_draw_delay() -> u64 {
    2_000 // 2 seconds
}

fn default_source() -> SourceKind {
    SourceKind::Stdin
}

fn default_reconnect_delay() -> u64 {
    5_000 // 5 seconds
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            lottery: LotteryConfig::default(),
            ingest: IngestConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            keyword: default_keyword(),
            draw_delay_ms: default_draw_delay(),
            prizes: default_tiers(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            address: None,
            reconnect_delay_ms: default_reconnect_delay(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed or
    /// fails validation.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let expanded = shellexpand::tilde(&path);
            return Self::from_file(expanded.as_ref());
        }

        // Try to load from default paths
        let config_paths = [
            "meshdraw.toml",
            "/etc/meshdraw/meshdraw.toml",
            "~/.config/meshdraw/meshdraw.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Check invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.lottery.keyword.is_empty() {
            bail!("lottery.keyword must not be empty");
        }
        if self.lottery.prizes.is_empty() {
            bail!("at least one prize tier is required");
        }

        let mut names = HashSet::new();
        for tier in &self.lottery.prizes {
            if tier.name.trim().is_empty() {
                bail!("prize tier names must not be empty");
            }
            if !names.insert(tier.name.as_str()) {
                bail!("duplicate prize tier: {}", tier.name);
            }
        }

        if self.ingest.source == SourceKind::Tcp && self.ingest.address.is_none() {
            bail!("ingest.address is required for the tcp source");
        }

        Ok(())
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a valid address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Session settings derived from this configuration.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            keyword: self.lottery.keyword.clone(),
            tiers: self.lottery.prizes.clone(),
            draw_delay: Duration::from_millis(self.lottery.draw_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.lottery.keyword, "我要抽奖");
        assert_eq!(config.lottery.prizes.len(), 3);
        assert_eq!(config.ingest.source, SourceKind::Stdin);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 5000,
            ..Config::default()
        };
        assert_eq!(config.bind_addr().unwrap().port(), 5000);

        let bad = Config {
            host: "not a host".to_string(),
            ..Config::default()
        };
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "127.0.0.1"
            port = 8000

            [lottery]
            keyword = "join draw"
            draw_delay_ms = 0

            [[lottery.prizes]]
            name = "Grand"
            count = 1

            [[lottery.prizes]]
            name = "Runner-up"
            count = 2

            [ingest]
            source = "tcp"
            address = "127.0.0.1:4403"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 8000);
        assert_eq!(config.lottery.prizes[0].name, "Grand");
        assert_eq!(config.lottery.prizes[1].count.get(), 2);
        assert_eq!(config.ingest.source, SourceKind::Tcp);

        let session = config.session_config();
        assert_eq!(session.keyword, "join draw");
        assert!(session.draw_delay.is_zero());
    }

    #[test]
    fn test_config_rejects_zero_count() {
        let toml_str = r#"
            [[lottery.prizes]]
            name = "Grand"
            count = 0
        "#;
        assert!(toml::from_str::<Config>(toml_str).is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.lottery.prizes.push(config.lottery.prizes[0].clone());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.lottery.prizes.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ingest.source = SourceKind::Tcp;
        assert!(config.validate().is_err());
    }
}
