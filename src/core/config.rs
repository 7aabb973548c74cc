/// Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Tunables for a `StoryEngine`. Every field has a default, so a config
/// file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prefix the URL-escaped prompt is appended to.
    pub image_base_url: String,
    /// Idle time after which a session may be evicted.
    pub session_ttl_secs: u64,
    /// Styles used when a session profile carries none.
    pub default_styles: Vec<String>,
    /// Title printed on share cards.
    pub share_title: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            image_base_url: "https://image.pollinations.ai/prompt/".to_string(),
            session_ttl_secs: 86_400,
            default_styles: vec![
                "detailed".to_string(),
                "fantasy".to_string(),
                "ethereal".to_string(),
            ],
            share_title: "Mystic Forest Adventure".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        Ok(ron::from_str(input)?)
    }

    pub fn with_image_base_url(mut self, url: impl Into<String>) -> Self {
        self.image_base_url = url.into();
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_default_styles(mut self, styles: &[&str]) -> Self {
        self.default_styles = styles.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_share_title(mut self, title: impl Into<String>) -> Self {
        self.share_title = title.into();
        self
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}
