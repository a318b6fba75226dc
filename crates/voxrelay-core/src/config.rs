use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// May be overridden via config file / env, but these are the defaults a
// fresh checkout boots with.
pub const DEBOUNCE_MS: u64 = 1_500;
pub const KEEPALIVE_INTERVAL_MS: u64 = 10_000;
pub const KEEPALIVE_STALE_MS: u64 = 9_000;
pub const MIN_BUFFER_SPEECH_MS: u64 = 2_500;
pub const DEDUP_WINDOW_MS: u64 = 15_000;
pub const DEDUP_EVICT_MS: u64 = 2 * DEDUP_WINDOW_MS;
pub const MAX_CONVERSATIONS: usize = 50;

pub const DEFAULT_PORT: u16 = 8013;
pub const DEFAULT_UPSTREAM_URL: &str = "http://127.0.0.1:18789/v1/chat/completions";
pub const DEFAULT_UPSTREAM_AGENT: &str = "main";

/// Top-level config (`voxrelay.toml` + `VOXRELAY_*` env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VoxRelayConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub tuning: TuningConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_upstream_agent")]
    pub agent: String,
    /// "<prefix>:<agent>" model rewrite. Defaults to the agent name itself
    /// when no prefix is configured.
    #[serde(default)]
    pub model_prefix: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            token: None,
            agent: default_upstream_agent(),
            model_prefix: None,
        }
    }
}

impl UpstreamConfig {
    /// Rewritten model string sent upstream.
    pub fn rewritten_model(&self) -> String {
        match &self.model_prefix {
            Some(prefix) => format!("{prefix}:{}", self.agent),
            None => self.agent.clone(),
        }
    }
}

/// Tunable timing constants. Overridable for tests and unusual deployments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
    #[serde(default = "default_keepalive_stale_ms")]
    pub keepalive_stale_ms: u64,
    #[serde(default = "default_min_buffer_speech_ms")]
    pub min_buffer_speech_ms: u64,
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,
    #[serde(default = "default_max_conversations")]
    pub max_conversations: usize,
    /// Optional outer turn timeout. `None` (the default) means a turn runs
    /// to completion with no outer deadline.
    #[serde(default)]
    pub max_turn_ms: Option<u64>,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            keepalive_stale_ms: default_keepalive_stale_ms(),
            min_buffer_speech_ms: default_min_buffer_speech_ms(),
            dedup_window_ms: default_dedup_window_ms(),
            max_conversations: default_max_conversations(),
            max_turn_ms: None,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_upstream_url() -> String {
    DEFAULT_UPSTREAM_URL.to_string()
}
fn default_upstream_agent() -> String {
    DEFAULT_UPSTREAM_AGENT.to_string()
}
fn default_debounce_ms() -> u64 {
    DEBOUNCE_MS
}
fn default_keepalive_interval_ms() -> u64 {
    KEEPALIVE_INTERVAL_MS
}
fn default_keepalive_stale_ms() -> u64 {
    KEEPALIVE_STALE_MS
}
fn default_min_buffer_speech_ms() -> u64 {
    MIN_BUFFER_SPEECH_MS
}
fn default_dedup_window_ms() -> u64 {
    DEDUP_WINDOW_MS
}
fn default_max_conversations() -> usize {
    MAX_CONVERSATIONS
}

impl VoxRelayConfig {
    /// Load config from a TOML file with `VOXRELAY_*` env var overrides.
    ///
    /// Checks, in order: an explicit path argument, then `./voxrelay.toml`.
    /// Falls back to pure defaults when no file is present — the env layer
    /// still applies in that case, so a bare `VOXRELAY_UPSTREAM_URL=...`
    /// works with no file on disk at all.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("voxrelay.toml");

        let config: VoxRelayConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("VOXRELAY_").split("_"))
            .extract()
            .map_err(|e| crate::error::VoxRelayError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let cfg = VoxRelayConfig::default();
        assert_eq!(cfg.gateway.port, 8013);
        assert_eq!(cfg.upstream.url, "http://127.0.0.1:18789/v1/chat/completions");
        assert_eq!(cfg.upstream.agent, "main");
        assert_eq!(cfg.tuning.debounce_ms, 1_500);
        assert_eq!(cfg.tuning.keepalive_interval_ms, 10_000);
        assert_eq!(cfg.tuning.min_buffer_speech_ms, 2_500);
        assert_eq!(cfg.tuning.dedup_window_ms, 15_000);
        assert_eq!(cfg.tuning.max_conversations, 50);
        assert_eq!(cfg.tuning.max_turn_ms, None);
    }

    #[test]
    fn model_rewrite_uses_agent_alone_without_prefix() {
        let cfg = UpstreamConfig::default();
        assert_eq!(cfg.rewritten_model(), "main");
    }

    #[test]
    fn model_rewrite_uses_prefix_when_set() {
        let mut cfg = UpstreamConfig::default();
        cfg.model_prefix = Some("voxrelay".to_string());
        assert_eq!(cfg.rewritten_model(), "voxrelay:main");
    }
}
