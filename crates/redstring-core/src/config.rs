//! Environment-variable driven configuration, parsed once at startup
//! into an [`EngineConfig`]: a single plain-old-data struct, since this
//! core has no per-project/per-user config layering to merge — every
//! knob here is either an env var or a documented default.

use std::path::PathBuf;

/// `TRUST_PROXY` accepts a boolean, a hop count, or a comma-separated
/// allowlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustProxy {
    Disabled,
    Enabled,
    Hops(u32),
    List(Vec<String>),
}

impl TrustProxy {
    fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed {
            "" | "false" => TrustProxy::Disabled,
            "true" => TrustProxy::Enabled,
            _ => {
                if let Ok(hops) = trimmed.parse::<u32>() {
                    TrustProxy::Hops(hops)
                } else {
                    TrustProxy::List(trimmed.split(',').map(|s| s.trim().to_string()).collect())
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEnv {
    Development,
    Production,
}

impl NodeEnv {
    fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("production") {
            NodeEnv::Production
        } else {
            NodeEnv::Development
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, NodeEnv::Production)
    }
}

/// TLS wiring. If HTTPS is requested but key/cert material
/// is missing, [`serve`](../../redstring_server/fn.serve.html) logs a
/// warning and falls back to HTTP rather than failing startup.
#[derive(Debug, Clone, Default)]
pub struct HttpsConfig {
    pub requested: bool,
    pub key_path: Option<PathBuf>,
    pub cert_path: Option<PathBuf>,
    pub ca_path: Option<PathBuf>,
    pub passphrase: Option<String>,
}

impl HttpsConfig {
    pub fn is_usable(&self) -> bool {
        self.requested && self.key_path.is_some() && self.cert_path.is_some()
    }
}

/// Per-tick caps for the Scheduler's planner/executor/auditor stages.
#[derive(Debug, Clone, Copy)]
pub struct MaxPerTick {
    pub planner: usize,
    pub executor: usize,
    pub auditor: usize,
}

impl Default for MaxPerTick {
    fn default() -> Self {
        Self {
            planner: 1,
            executor: 2,
            auditor: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub bridge_port: u16,
    pub trust_proxy: TrustProxy,
    pub node_env: NodeEnv,
    pub log_level: String,
    pub https: HttpsConfig,
    pub state_dir: PathBuf,
    /// No automatic expiry unless this is set.
    pub action_lease_ttl_ms: Option<u64>,
    /// Gates `GET /metrics` behind `REDSTRING_METRICS=1`.
    pub metrics_enabled: bool,
    pub scheduler_cadence_ms: u64,
    pub max_per_tick: MaxPerTick,
    pub queue_lease_ttl_ms: u64,
    pub queue_max_attempts: u32,
    pub event_log_capacity: usize,
    pub tracer_max_traces: usize,
    pub committed_patch_ring_capacity: usize,
    pub default_fallback_models: Vec<String>,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let node_env = std::env::var("NODE_ENV")
            .map(|v| NodeEnv::parse(&v))
            .unwrap_or(NodeEnv::Development);

        let default_log_level = if node_env.is_production() { "info" } else { "debug" };
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| default_log_level.to_string());

        let bridge_port = std::env::var("BRIDGE_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3001);

        let trust_proxy = std::env::var("TRUST_PROXY")
            .map(|v| TrustProxy::parse(&v))
            .unwrap_or(TrustProxy::Disabled);

        let https = HttpsConfig {
            requested: env_flag("BRIDGE_USE_HTTPS"),
            key_path: std::env::var("BRIDGE_SSL_KEY_PATH").ok().map(PathBuf::from),
            cert_path: std::env::var("BRIDGE_SSL_CERT_PATH").ok().map(PathBuf::from),
            ca_path: std::env::var("BRIDGE_SSL_CA_PATH").ok().map(PathBuf::from),
            passphrase: std::env::var("BRIDGE_SSL_PASSPHRASE").ok(),
        };

        let state_dir = std::env::var("REDSTRING_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".redstring"));

        let action_lease_ttl_ms = std::env::var("REDSTRING_ACTION_LEASE_TTL_MS").ok().and_then(|v| v.parse().ok());

        let metrics_enabled = std::env::var("REDSTRING_METRICS").map(|v| v == "1").unwrap_or(false);

        Self {
            bridge_port,
            trust_proxy,
            node_env,
            log_level,
            https,
            state_dir,
            action_lease_ttl_ms,
            metrics_enabled,
            scheduler_cadence_ms: 250,
            max_per_tick: MaxPerTick::default(),
            queue_lease_ttl_ms: 30_000,
            queue_max_attempts: 5,
            event_log_capacity: 10_000,
            tracer_max_traces: 2_000,
            committed_patch_ring_capacity: 2_000,
            default_fallback_models: vec!["claude-3-5-haiku".to_string(), "gpt-4o-mini".to_string()],
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "true" || v == "1").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_proxy_parses_bool_hops_and_list() {
        assert_eq!(TrustProxy::parse("true"), TrustProxy::Enabled);
        assert_eq!(TrustProxy::parse("false"), TrustProxy::Disabled);
        assert_eq!(TrustProxy::parse("2"), TrustProxy::Hops(2));
        assert_eq!(
            TrustProxy::parse("10.0.0.1, 10.0.0.2"),
            TrustProxy::List(vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()])
        );
    }

    #[test]
    fn https_requires_both_key_and_cert_to_be_usable() {
        let mut https = HttpsConfig {
            requested: true,
            key_path: Some(PathBuf::from("key.pem")),
            cert_path: None,
            ca_path: None,
            passphrase: None,
        };
        assert!(!https.is_usable());
        https.cert_path = Some(PathBuf::from("cert.pem"));
        assert!(https.is_usable());
    }
}
