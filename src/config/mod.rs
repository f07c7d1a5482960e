//! # Configuration Management Module
//!
//! Type-safe configuration for the chattyd core, loaded from TOML with sensible
//! defaults for every section.
//!
//! ## Configuration Structure
//!
//! - [`ServerConfig`] - Instance name and stats logging cadence
//! - [`DispatcherConfig`] - Event log retention and long-poll timing
//! - [`SearchConfig`] - Search index working-set bounds
//! - [`StorageConfig`] - Optional JSON post dump used to seed the post store
//! - [`LoggingConfig`] - Log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chattyd::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("chattyd.toml").await?;
//!     config.validate()?;
//!     println!("Search window: {} posts", config.search.max_posts);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [dispatcher]
//! max_events = 11000
//! prune_events = 10000
//! wait_timeout_ms = 20000
//! sweep_interval_ms = 2500
//!
//! [search]
//! max_posts = 51000
//! prune_posts = 50000
//! ```
//!
//! Every section is optional. Both retention pairs must satisfy `prune < max`;
//! [`Config::validate`] rejects anything else before the components are built.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    /// Interval (ms) for periodic dispatcher stats logging (0 disables).
    pub stats_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "chattyd".to_string(),
            stats_interval_ms: 60_000,
        }
    }
}

/// Event log retention and long-poll timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Once the log holds more than this many events it is pruned.
    pub max_events: usize,
    /// Number of newest events kept after a prune.
    pub prune_events: usize,
    /// How long a long-poll waiter is held before it gets an empty answer.
    pub wait_timeout_ms: u64,
    /// How often expired waiters are swept.
    pub sweep_interval_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_events: 11_000,
            prune_events: 10_000,
            wait_timeout_ms: 20_000,
            sweep_interval_ms: 2_500,
        }
    }
}

impl DispatcherConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.prune_events == 0 {
            return Err("dispatcher.prune_events must be greater than zero".to_string());
        }
        if self.prune_events >= self.max_events {
            return Err(format!(
                "dispatcher.prune_events ({}) must be less than dispatcher.max_events ({})",
                self.prune_events, self.max_events
            ));
        }
        Ok(())
    }
}

/// Search index working-set bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// When the index holds this many posts, the oldest are evicted.
    pub max_posts: usize,
    /// Number of newest posts that survive an eviction.
    pub prune_posts: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_posts: 51_000,
            prune_posts: 50_000,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.prune_posts == 0 {
            return Err("search.prune_posts must be greater than zero".to_string());
        }
        if self.prune_posts >= self.max_posts {
            return Err(format!(
                "search.prune_posts ({}) must be less than search.max_posts ({})",
                self.prune_posts, self.max_posts
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON array of posts loaded into the in-memory post store at startup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posts_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Parsed level; unknown names fall back to `info`.
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub dispatcher: DispatcherConfig,
    pub search: SearchConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        Self::from_toml(&content).map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject retention settings the components would refuse at construction.
    pub fn validate(&self) -> Result<()> {
        self.dispatcher.validate().map_err(|e| anyhow!(e))?;
        self.search.validate().map_err(|e| anyhow!(e))?;
        Ok(())
    }
}
