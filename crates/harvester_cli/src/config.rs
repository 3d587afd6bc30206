//! Configuration file support for harvester.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `HARVESTER_`, sections split by
//!    `__`, e.g. `HARVESTER_HUB__CLIENT_ID`)
//! 3. Config file (~/.config/harvester/config.toml or ./harvester.toml)
//! 4. Built-in defaults
//!
//! The database URL defaults to `sqlite://~/.local/state/harvester/harvester.db`
//! on Linux (using the XDG state directory) if not explicitly configured.
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "sqlite://~/.local/state/harvester/harvester.db"  # optional, this is the default
//!
//! [hub]
//! base_url = "https://www.openhumans.org"
//! client_id = "..."
//! client_secret = "..."
//!
//! [moves]
//! client_id = "..."
//! client_secret = "..."
//! requests_per_minute = 60
//!
//! [rescuetime]
//! client_id = "..."
//! client_secret = "..."
//! requests_per_minute = 30
//! first_date = "2008-01-01"
//!
//! [sync]
//! stale_after_days = 4
//! retry_after_secs = 61
//! max_pages = 520
//! workers = 4
//! ```

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

use harvester::artifact::hub::DEFAULT_BASE_URL;
use harvester::credentials::OAuthProvider;
use harvester::rate_limit::RealmQuota;
use harvester::source::{SourceKind, moves, rescuetime};
use harvester::sync::{DEFAULT_MAX_PAGES, RATE_LIMIT_RETRY_SECS, STALE_AFTER_DAYS, SyncOptions};
use harvester::task::{DEFAULT_WORKERS, QueueConfig};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Hub API and OAuth client.
    pub hub: HubConfig,
    /// Moves OAuth client and quota.
    pub moves: SourceConfig,
    /// RescueTime OAuth client, quota and first date.
    pub rescuetime: SourceConfig,
    /// Sync and scheduling defaults.
    pub sync: SyncConfig,
}

/// Database configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL.
    /// Supports sqlite:// and postgres:// schemes.
    pub url: Option<String>,
}

/// Hub configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub base_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: None,
            client_secret: None,
        }
    }
}

/// Per-source configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Overrides the source's built-in quota.
    pub requests_per_minute: Option<u32>,
    /// Overrides the source's API root.
    pub api_url: Option<String>,
    /// Floor for sources without a profile endpoint (RescueTime only).
    pub first_date: Option<NaiveDate>,
}

/// Sync and scheduling defaults.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Links not synced within this many days are refreshed by `update`.
    pub stale_after_days: i64,
    /// Minimum delay before a rate-limited run is re-queued.
    pub retry_after_secs: u64,
    /// Page cap per run.
    pub max_pages: u32,
    /// Concurrent sync runs.
    pub workers: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            stale_after_days: STALE_AFTER_DAYS,
            retry_after_secs: RATE_LIMIT_RETRY_SECS,
            max_pages: DEFAULT_MAX_PAGES,
            workers: DEFAULT_WORKERS,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/harvester/config.toml)
    /// 3. Local config file (./harvester.toml)
    /// 4. Environment variables with HARVESTER_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(config_path) = Self::default_config_path()
            && config_path.exists()
        {
            tracing::debug!("Loading config from {:?}", config_path);
            builder = builder.add_source(
                File::from(config_path)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("harvester.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./harvester.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(environment());

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Get the database URL, falling back to the default state directory path.
    ///
    /// The `mode=rwc` parameter creates the SQLite file if it doesn't exist.
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join("harvester.db");
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    pub fn source(&self, kind: SourceKind) -> &SourceConfig {
        match kind {
            SourceKind::Moves => &self.moves,
            SourceKind::RescueTime => &self.rescuetime,
        }
    }

    /// The hub's OAuth client. Every sync needs it.
    pub fn hub_provider(&self, token_url: String) -> Result<OAuthProvider, String> {
        match (&self.hub.client_id, &self.hub.client_secret) {
            (Some(id), Some(secret)) => Ok(OAuthProvider::new("hub", token_url, id, secret)),
            _ => Err("Hub OAuth client is not configured. Set [hub] client_id and \
                 client_secret, or HARVESTER_HUB__CLIENT_ID / HARVESTER_HUB__CLIENT_SECRET."
                .to_string()),
        }
    }

    /// OAuth client for `kind`, if one is configured.
    pub fn source_provider(&self, kind: SourceKind) -> Option<OAuthProvider> {
        let source = self.source(kind);
        let token_url = match kind {
            SourceKind::Moves => moves::TOKEN_URL,
            SourceKind::RescueTime => rescuetime::TOKEN_URL,
        };
        match (&source.client_id, &source.client_secret) {
            (Some(id), Some(secret)) => Some(OAuthProvider::new(kind.as_str(), token_url, id, secret)),
            _ => None,
        }
    }

    /// Quota override for `kind`'s realm, if configured.
    pub fn quota(&self, kind: SourceKind) -> Option<RealmQuota> {
        self.source(kind)
            .requests_per_minute
            .map(RealmQuota::per_minute)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            max_pages: self.sync.max_pages,
            retry_after: Duration::from_secs(self.sync.retry_after_secs),
        }
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::days(self.sync.stale_after_days)
    }

    /// Queue settings, with an optional worker count from the command line.
    pub fn queue_config(&self, workers: Option<usize>) -> QueueConfig {
        QueueConfig {
            workers: workers.unwrap_or(self.sync.workers).max(1),
            ..QueueConfig::default()
        }
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "harvester").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/harvester` or `~/.local/state/harvester`.
    /// On macOS/Windows, falls back to the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "harvester").map(|dirs| {
            // state_dir() returns None on macOS/Windows, fall back to data_dir
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}

/// `HARVESTER_` environment source; `__` separates section from key.
fn environment() -> Environment {
    Environment::with_prefix("HARVESTER")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        ConfigBuilder::builder()
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.database.url.is_none());
        assert_eq!(config.hub.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.sync.stale_after_days, 4);
        assert_eq!(config.sync.retry_after_secs, 61);
        assert_eq!(config.sync.max_pages, 520);
        assert_eq!(config.sync.workers, 4);
        assert!(config.moves.client_id.is_none());
    }

    #[test]
    fn test_full_config_parsing() {
        let config = parse(
            r#"
            [database]
            url = "sqlite:///tmp/test.db"

            [hub]
            base_url = "https://hub.example.com"
            client_id = "hub-id"
            client_secret = "hub-secret"

            [moves]
            client_id = "moves-id"
            client_secret = "moves-secret"
            requests_per_minute = 40

            [rescuetime]
            first_date = "2015-03-01"

            [sync]
            stale_after_days = 2
            workers = 8
        "#,
        );

        assert_eq!(config.database.url.as_deref(), Some("sqlite:///tmp/test.db"));
        assert_eq!(config.hub.base_url, "https://hub.example.com");
        assert_eq!(config.moves.requests_per_minute, Some(40));
        assert_eq!(
            config.rescuetime.first_date,
            NaiveDate::from_ymd_opt(2015, 3, 1)
        );
        assert_eq!(config.sync.stale_after_days, 2);
        assert_eq!(config.sync.workers, 8);
        // Unset values keep their defaults
        assert_eq!(config.sync.max_pages, 520);
    }

    #[test]
    fn test_hub_provider_requires_client() {
        let config = Config::default();
        assert!(config.hub_provider("https://hub.test/oauth2/token/".into()).is_err());

        let config = parse(
            r#"
            [hub]
            client_id = "id"
            client_secret = "secret"
        "#,
        );
        let provider = config
            .hub_provider("https://hub.test/oauth2/token/".into())
            .unwrap();
        assert_eq!(provider.client_id, "id");
        assert_eq!(provider.token_url, "https://hub.test/oauth2/token/");
    }

    #[test]
    fn test_source_provider_uses_source_token_url() {
        let config = parse(
            r#"
            [rescuetime]
            client_id = "rt-id"
            client_secret = "rt-secret"
        "#,
        );

        let provider = config.source_provider(SourceKind::RescueTime).unwrap();
        assert_eq!(provider.token_url, rescuetime::TOKEN_URL);
        assert_eq!(provider.name, "rescuetime");
        assert!(config.source_provider(SourceKind::Moves).is_none());
    }

    #[test]
    fn test_quota_and_options() {
        let config = parse(
            r#"
            [moves]
            requests_per_minute = 10

            [sync]
            retry_after_secs = 120
            max_pages = 5
        "#,
        );

        assert_eq!(
            config.quota(SourceKind::Moves),
            Some(RealmQuota::per_minute(10))
        );
        assert_eq!(config.quota(SourceKind::RescueTime), None);
        assert_eq!(
            config.sync_options(),
            SyncOptions {
                max_pages: 5,
                retry_after: Duration::from_secs(120),
            }
        );
    }

    #[test]
    fn test_queue_config_prefers_flag_and_never_zero() {
        let config = Config::default();
        assert_eq!(config.queue_config(None).workers, 4);
        assert_eq!(config.queue_config(Some(2)).workers, 2);
        assert_eq!(config.queue_config(Some(0)).workers, 1);
    }

    #[test]
    fn test_database_url_defaults_to_state_dir() {
        let config = Config::default();
        if let Some(url) = config.database_url() {
            assert!(url.starts_with("sqlite://"));
            assert!(url.contains("harvester.db"));
            assert!(url.ends_with("?mode=rwc"));
        }
    }

    #[test]
    fn test_database_url_respects_configured_value() {
        let config = parse(
            r#"
            [database]
            url = "postgres://localhost/harvester"
        "#,
        );
        assert_eq!(
            config.database_url().as_deref(),
            Some("postgres://localhost/harvester")
        );
    }

    #[test]
    fn test_environment_overrides_file() {
        let env: config::Map<String, String> = [
            ("HARVESTER_HUB__CLIENT_ID".to_string(), "from-env".to_string()),
            ("HARVESTER_SYNC__WORKERS".to_string(), "9".to_string()),
        ]
        .into_iter()
        .collect();

        let config: Config = ConfigBuilder::builder()
            .add_source(config::File::from_str(
                "[hub]\nclient_id = \"from-file\"\n[sync]\nworkers = 2\n",
                FileFormat::Toml,
            ))
            .add_source(environment().source(Some(env)))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.hub.client_id.as_deref(), Some("from-env"));
        assert_eq!(config.sync.workers, 9);
    }

    #[test]
    fn test_config_invalid_toml() {
        let result = ConfigBuilder::builder()
            .add_source(config::File::from_str("[sync\nworkers = 2", FileFormat::Toml))
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_default_state_dir() {
        if let Some(path) = Config::default_state_dir() {
            assert!(path.to_string_lossy().contains("harvester"));
        }
    }
}
