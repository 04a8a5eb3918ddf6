//! Optional YAML configuration.
//!
//! Holds the values that rarely change between runs: feed metadata and the
//! social account defaults. Every key has a default, so the file itself is
//! optional; unknown keys are rejected to catch typos.
//!
//! ```yaml
//! feed:
//!   title: P3news
//!   language: cs
//! social:
//!   server_url: https://mastodonczech.cz/
//!   location_tags: [praha3, zizkov, zpravy]
//!   posts_window: 100
//! ```

use crate::error::ConfigError;
use crate::outputs::atom::FeedMetadata;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub feed: FeedMetadata,
    pub social: SocialConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SocialConfig {
    pub server_url: String,
    /// Hashtags added to every post, without the `#`.
    pub location_tags: Vec<String>,
    /// How many of the account's recent posts are checked for links.
    pub posts_window: usize,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            server_url: "https://mastodonczech.cz/".to_string(),
            location_tags: ["praha3", "zizkov", "zpravy"].map(String::from).to_vec(),
            posts_window: 100,
        }
    }
}

/// Load the configuration file, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config = parse_config(&text).map_err(|source| ConfigError::Yaml {
        path: path.display().to_string(),
        source,
    })?;
    info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

fn parse_config(text: &str) -> Result<Config, serde_yaml::Error> {
    if text.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(text)
}
