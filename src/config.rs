//! Runtime settings.
//!
//! Layered lowest to highest: built-in defaults, an optional `bookfeed.toml`
//! (or `.yaml`/`.json`) in the working directory, `BOOKFEED_*` environment
//! variables, then whatever the CLI overrides. `BITMEX_API_KEY` and
//! `BITMEX_API_SECRET` fill in credentials when the layers leave them empty.

use std::env;

use ::config::{Config, ConfigError, Environment as EnvSource, File};
use serde::Deserialize;

use crate::market_data::adapters::bitmex::{Credentials, Environment};
use crate::market_data::feed::{FeedConnection, TopicSelection};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub environment: Environment,
    /// Overrides the environment's realtime URL when set.
    pub url: Option<String>,
    /// Topics subscribed on connect. Empty means the BitMEX defaults.
    pub topics: Vec<String>,
    pub api_key: String,
    pub api_secret: String,
    /// Symbol shown by the CLI when none is given.
    pub symbol: String,
    /// Price bucket for grouped views; 0 disables grouping.
    pub group_size: f64,
    /// Rows per side printed by the CLI.
    pub depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            url: None,
            topics: Vec::new(),
            api_key: String::new(),
            api_secret: String::new(),
            symbol: "XBTUSD".to_string(),
            group_size: 1.0,
            depth: 15,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings: Settings = Config::builder()
            .add_source(File::with_name("bookfeed").required(false))
            .add_source(
                EnvSource::with_prefix("BOOKFEED")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("topics"),
            )
            .build()?
            .try_deserialize()?;

        if settings.api_key.is_empty() {
            settings.api_key = env::var("BITMEX_API_KEY").unwrap_or_default();
        }
        if settings.api_secret.is_empty() {
            settings.api_secret = env::var("BITMEX_API_SECRET").unwrap_or_default();
        }
        Ok(settings)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.api_key.clone(), self.api_secret.clone())
    }

    pub fn topic_selection(&self) -> TopicSelection {
        let defaults = TopicSelection::bitmex_defaults();
        if self.topics.is_empty() {
            return defaults;
        }
        let mut selection = TopicSelection::new();
        for topic in &self.topics {
            selection.set(topic, true);
        }
        // keep the well-known topics around (off) so they can be toggled
        for (topic, _) in defaults.iter() {
            if !selection.contains(topic) {
                selection.set(topic, false);
            }
        }
        selection
    }

    /// Grouping granularity for views; `None` when grouping is off.
    pub fn granularity(&self) -> Option<f64> {
        (self.group_size > 0.0).then_some(self.group_size)
    }

    pub fn apply_to(&self, feed: &mut FeedConnection) {
        feed.set_environment(self.environment);
        feed.set_url_override(self.url.clone());
        feed.set_topics(self.topic_selection());
        feed.set_credentials(self.credentials());
    }
}
