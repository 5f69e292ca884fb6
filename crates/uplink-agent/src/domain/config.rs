//! Agent configuration with validation.

use super::errors::ConfigError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uplink_crypto::DEFAULT_KEY_BITS;

/// Environment name that enables development-only behavior
/// (token in the trust proof and confirmation).
pub const DEVELOPMENT: &str = "development";

/// Main agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Connect to the control plane at all
    pub enabled: bool,
    /// Control-plane base URL (http or https)
    pub url: String,
    /// Shared secret proven during the handshake
    pub secret_key: String,
    /// Application identifier
    pub app_id: String,
    /// Application name
    pub name: String,
    /// Environment name (`development`, `production`, ...)
    pub environment: String,
    /// Application root; scratch files live under `<app_root>/.tmp`
    pub app_root: PathBuf,
    /// Credentials file name, relative to the user's home directory
    pub credentials_file: String,
    /// RSA modulus size for session keys
    pub key_bits: usize,
    /// Timeout for acknowledged calls, in seconds
    pub call_timeout_secs: u64,
    /// Reconnection policy
    pub reconnect: ReconnectPolicy,
    /// Host integration
    pub host: HostOptions,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: String::new(),
            secret_key: String::new(),
            app_id: String::new(),
            name: String::new(),
            environment: DEVELOPMENT.to_string(),
            app_root: PathBuf::from("."),
            credentials_file: ".uplinkrc".to_string(),
            key_bits: DEFAULT_KEY_BITS,
            call_timeout_secs: 30,
            reconnect: ReconnectPolicy::default(),
            host: HostOptions::default(),
        }
    }
}

impl AgentConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }

        if self.url.trim().is_empty() {
            return Err(ConfigError::Missing("url"));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(self.url.clone()));
        }
        if self.app_id.trim().is_empty() {
            return Err(ConfigError::Missing("app_id"));
        }

        // Small keys are only tolerated for local development
        if self.key_bits < DEFAULT_KEY_BITS && !self.is_development() {
            return Err(ConfigError::WeakKey(self.key_bits));
        }

        if self.call_timeout_secs == 0 {
            return Err(ConfigError::Missing("call_timeout_secs"));
        }

        self.reconnect.validate()
    }

    /// Whether development-only behavior applies.
    pub fn is_development(&self) -> bool {
        self.environment == DEVELOPMENT
    }

    /// Base URL without a trailing slash.
    fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// WebSocket endpoint: scheme swapped to ws(s), `/socket` appended.
    pub fn socket_url(&self) -> String {
        let base = self.base_url();
        let swapped = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}/socket", swapped)
    }

    /// Archive download endpoint.
    pub fn download_url(&self) -> String {
        format!("{}/socket/download", self.base_url())
    }

    /// Acknowledged call timeout.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Bounded reconnection with capped exponential backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Attempts after a failure before giving up
    pub max_attempts: u32,
    /// Lower delay bound, milliseconds
    pub min_delay_ms: u64,
    /// Upper delay bound, milliseconds
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_delay_ms: 2000,
            max_delay_ms: 5000,
        }
    }
}

impl ReconnectPolicy {
    /// Validate bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidReconnect(
                "max_attempts cannot be 0".into(),
            ));
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err(ConfigError::InvalidReconnect(format!(
                "min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.min_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Whether attempt `attempt` (1-based) is still allowed.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    /// Deterministic part of the delay: `min(min * 2^(attempt-1), max)`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let ms = self
            .min_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Delay before attempt `attempt`, with up to ±50% jitter, clamped into
    /// `[min_delay_ms, max_delay_ms]`.
    pub fn delay_for<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(attempt).as_millis() as u64;
        let spread = base / 2;
        let jittered = if spread == 0 {
            base
        } else {
            base - spread + rng.gen_range(0..=spread * 2)
        };
        Duration::from_millis(jittered.clamp(self.min_delay_ms, self.max_delay_ms))
    }
}

/// Host integration for the standalone runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostOptions {
    /// Shell command run by `rebuild`
    pub rebuild_command: Option<String>,
    /// Shell command run after a configuration change
    pub install_command: Option<String>,
    /// JSON file served as `models` by `pullServer`
    pub models_file: Option<PathBuf>,
    /// JSON file served as `api` by `pullServer`
    pub api_file: Option<PathBuf>,
}
