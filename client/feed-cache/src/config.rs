//! Client configuration, environment-driven with working defaults

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub feed: FeedConfig,
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Items requested per feed page, clamped to 1..=100
    pub page_size: u32,
    /// Items requested per comment page, clamped to 1..=100
    pub comment_page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Broadcast buffer for client events
    pub buffer: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig {
                base_url: std::env::var("CAMPUSLINK_API_BASE_URL")
                    .unwrap_or_else(|_| default_base_url()),
                timeout_secs: env_parse("CAMPUSLINK_API_TIMEOUT_SECS", default_timeout_secs()),
            },
            feed: FeedConfig {
                page_size: env_parse("CAMPUSLINK_FEED_PAGE_SIZE", default_page_size()),
                comment_page_size: env_parse(
                    "CAMPUSLINK_COMMENT_PAGE_SIZE",
                    default_comment_page_size(),
                ),
            },
            events: EventsConfig {
                buffer: env_parse("CAMPUSLINK_EVENT_BUFFER", default_event_buffer()),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: default_base_url(),
                timeout_secs: default_timeout_secs(),
            },
            feed: FeedConfig {
                page_size: default_page_size(),
                comment_page_size: default_comment_page_size(),
            },
            events: EventsConfig {
                buffer: default_event_buffer(),
            },
        }
    }
}

impl FeedConfig {
    pub fn page_size_clamped(&self) -> u32 {
        self.page_size.clamp(1, 100)
    }

    pub fn comment_page_size_clamped(&self) -> u32 {
        self.comment_page_size.clamp(1, 100)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_page_size() -> u32 {
    20
}

fn default_comment_page_size() -> u32 {
    30
}

fn default_event_buffer() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.feed.page_size, 20);
        assert_eq!(config.api.timeout_secs, 10);
        assert_eq!(config.events.buffer, 64);
    }

    #[test]
    fn test_page_size_clamping() {
        let feed = FeedConfig {
            page_size: 0,
            comment_page_size: 500,
        };
        assert_eq!(feed.page_size_clamped(), 1);
        assert_eq!(feed.comment_page_size_clamped(), 100);
    }
}
