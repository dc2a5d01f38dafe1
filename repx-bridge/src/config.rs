use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use repx_core::RepProfile;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub ingress: IngressConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address for the WebSocket/HTTP server to listen on
    pub addr: SocketAddr,
    /// Upper bound on a single delivery to one subscriber, in milliseconds
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Outbound frames buffered per subscriber
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl ServerConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IngressConfig {
    Mock {
        /// Samples emitted per second
        #[serde(default = "default_sample_rate_hz")]
        sample_rate_hz: u32,
        /// Shortest rest between reps, in seconds
        #[serde(default = "default_rest_min_s")]
        rest_min_s: f64,
        /// Longest rest between reps, in seconds
        #[serde(default = "default_rest_max_s")]
        rest_max_s: f64,
        /// Fixed RNG seed for reproducible rest durations
        #[serde(default)]
        seed: Option<u64>,
        /// Rep profiles, cycled forever
        #[serde(default = "default_profiles")]
        profiles: Vec<RepProfile>,
    },
    Udp {
        /// Address to receive raw notification datagrams on
        addr: SocketAddr,
    },
}

/// What to do when the ingress cannot start or stops producing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngressPolicy {
    /// Shut the bridge down and exit with an error.
    #[default]
    Exit,
    /// Stop producing but keep serving subscribers until interrupted.
    KeepServing,
    /// Start the ingress again after an exponential backoff.
    Restart,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub on_ingress_end: IngressPolicy,
}

fn default_send_timeout_ms() -> u64 {
    250
}

fn default_queue_capacity() -> usize {
    64
}

fn default_sample_rate_hz() -> u32 {
    50
}

fn default_rest_min_s() -> f64 {
    0.4
}

fn default_rest_max_s() -> f64 {
    1.0
}

fn default_profiles() -> Vec<RepProfile> {
    vec![RepProfile::big_full(); 12]
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                addr: SocketAddr::from(([127, 0, 0, 1], 8765)),
                send_timeout_ms: default_send_timeout_ms(),
                queue_capacity: default_queue_capacity(),
            },
            ingress: IngressConfig::Mock {
                sample_rate_hz: default_sample_rate_hz(),
                rest_min_s: default_rest_min_s(),
                rest_max_s: default_rest_max_s(),
                seed: None,
                profiles: default_profiles(),
            },
            session: SessionConfig::default(),
        }
    }
}
