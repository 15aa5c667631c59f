use serde::{Deserialize, Serialize};

use crate::classify::TierThresholds;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub refresh: RefreshConfig,
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub tiers: TierThresholds,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Refresh cadence, retry, and staleness policy.
///
/// All values are deployment knobs; the scheduler treats them as data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Interval between cycles while subscribers are connected.
    pub active_interval_secs: u64,
    /// Interval between cycles with no subscribers.
    pub idle_interval_secs: u64,
    /// Base delay for exponential backoff after a failed cycle or fetch.
    pub backoff_base_secs: u64,
    /// Ceiling for backed-off delays.
    pub backoff_max_secs: u64,
    /// Per-source retry attempts within one cycle.
    pub max_retries_per_source: u32,
    /// Timeout applied to each source fetch.
    pub per_source_timeout_secs: u64,
    /// Snapshot age beyond which the read path reports stale data.
    pub stale_after_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            active_interval_secs: 30,
            idle_interval_secs: 300,
            backoff_base_secs: 60,
            backoff_max_secs: 900,
            max_retries_per_source: 3,
            per_source_timeout_secs: 10,
            stale_after_secs: 120,
        }
    }
}

/// Change broadcast policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Minimum absolute EV% movement worth broadcasting.
    pub ev_noise_threshold: f64,
    /// Capacity of the delta channel.
    pub channel_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            ev_noise_threshold: 0.1,
            channel_capacity: 256,
        }
    }
}

/// One configured odds provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Stable source identifier (e.g., "draftkings").
    pub id: String,
    /// Provider base URL.
    pub base_url: String,
    /// API key sent on each request, if the provider requires one.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Requests per minute allowed against this provider.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

fn default_requests_per_minute() -> u32 {
    60
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            refresh: RefreshConfig::default(),
            broadcast: BroadcastConfig::default(),
            tiers: TierThresholds::default(),
            sources: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();

        assert_eq!(config.server.port, 8080);
        assert!(config.tiers.validate().is_ok());
        assert!(config.refresh.active_interval_secs < config.refresh.idle_interval_secs);
    }

    #[test]
    fn test_source_config_defaults() {
        use figment::providers::{Format, Toml};

        let source: SourceConfig = figment::Figment::new()
            .merge(Toml::string(
                r#"
                id = "draftkings"
                base_url = "https://odds.example.com/draftkings"
                "#,
            ))
            .extract()
            .unwrap();

        assert_eq!(source.id, "draftkings");
        assert_eq!(source.requests_per_minute, 60);
        assert!(source.api_key.is_none());
    }
}
