use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub bridge: BridgeConfig,
    pub audit: AuditConfig,
    #[serde(default = "default_storage_config")]
    pub storage: StorageConfig,
    #[serde(default = "default_broadcast_config")]
    pub broadcast: BroadcastConfig,
    #[serde(default = "default_quote_config")]
    pub quote: QuoteConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The child process that owns the connection to the messaging service.
#[derive(Debug, Deserialize, Clone)]
pub struct BridgeConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,
    /// Appended to bare phone numbers to form a chat id (e.g. "@c.us")
    #[serde(default = "default_contact_suffix")]
    pub contact_suffix: String,
    #[serde(default)]
    pub env: std::collections::HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditConfig {
    /// Chat that receives recovered content of revoked messages
    pub chat_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BroadcastConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QuoteConfig {
    #[serde(default = "default_quote_url")]
    pub api_url: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Optional JSON log file, in addition to console output
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Optional JSON log file that only receives errors
    #[serde(default)]
    pub error_file: Option<PathBuf>,
}

fn default_session_path() -> PathBuf {
    PathBuf::from(".session")
}

fn default_contact_suffix() -> String {
    "@c.us".to_string()
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("storage")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("local_storage/media.db")
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_quote_url() -> String {
    "https://api.quotable.io/quotes/random".to_string()
}

fn default_storage_config() -> StorageConfig {
    StorageConfig {
        media_dir: default_media_dir(),
        database_path: default_db_path(),
    }
}

fn default_broadcast_config() -> BroadcastConfig {
    BroadcastConfig {
        interval_ms: default_interval_ms(),
    }
}

fn default_quote_config() -> QuoteConfig {
    QuoteConfig {
        api_url: default_quote_url(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;

        if config.bridge.command.trim().is_empty() {
            anyhow::bail!("[bridge] command must not be empty");
        }
        if config.audit.chat_id.trim().is_empty() {
            anyhow::bail!("[audit] chat_id must not be empty");
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [bridge]
        command = "node"

        [audit]
        chat_id = "111@c.us"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.bridge.command, "node");
        assert!(config.bridge.args.is_empty());
        assert_eq!(config.bridge.contact_suffix, "@c.us");
        assert_eq!(config.storage.media_dir, PathBuf::from("storage"));
        assert_eq!(
            config.storage.database_path,
            PathBuf::from("local_storage/media.db")
        );
        assert_eq!(config.broadcast.interval_ms, 1000);
        assert!(config.quote.api_url.contains("quotable"));
        assert!(config.logging.file.is_none());
        assert!(config.logging.error_file.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
            [bridge]
            command = "node"
            args = ["bridge.js", "--headless"]
            session_path = "/var/lib/bot/session"

            [audit]
            chat_id = "999@c.us"

            [storage]
            media_dir = "/data/media"

            [broadcast]
            interval_ms = 250

            [logging]
            file = "combined.log"
            error_file = "error.log"
            "#,
        )
        .unwrap();
        assert_eq!(config.bridge.args, vec!["bridge.js", "--headless"]);
        assert_eq!(
            config.bridge.session_path,
            PathBuf::from("/var/lib/bot/session")
        );
        assert_eq!(config.storage.media_dir, PathBuf::from("/data/media"));
        assert_eq!(config.broadcast.interval_ms, 250);
        assert_eq!(config.logging.file, Some(PathBuf::from("combined.log")));
        assert_eq!(config.logging.error_file, Some(PathBuf::from("error.log")));
    }

    #[test]
    fn test_empty_audit_chat_rejected() {
        let err = Config::parse(
            r#"
            [bridge]
            command = "node"

            [audit]
            chat_id = "  "
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("chat_id"));
    }

    #[test]
    fn test_missing_bridge_section_rejected() {
        assert!(Config::parse("[audit]\nchat_id = \"1@c.us\"\n").is_err());
    }
}
