//! Control-plane configuration.

use sim_ecs::config::env_or;

/// Configuration for [`crate::node::NodeRegistry`] and [`crate::autoscaler::Autoscaler`].
#[derive(Debug, Clone, Copy)]
pub struct ControlPlaneConfig {
    /// Seconds of silence after which a node is considered stale.
    pub node_ttl_seconds: u64,
    /// Milliseconds between autoscaler evaluation windows.
    pub autoscaler_interval_ms: u64,
    /// Average cluster CPU load above which consecutive windows trigger
    /// `SCALE_UP`.
    pub cpu_high_watermark: f32,
    /// Average cluster CPU load below which `SCALE_DOWN` is considered.
    pub cpu_low_watermark: f32,
    /// Floor below which the autoscaler never recommends scaling down.
    pub min_nodes: u32,
    /// Consecutive over-watermark windows required before `SCALE_UP` fires.
    pub consecutive_windows: u32,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            node_ttl_seconds: 30,
            autoscaler_interval_ms: 30_000,
            cpu_high_watermark: 0.80,
            cpu_low_watermark: 0.30,
            min_nodes: 1,
            consecutive_windows: 3,
        }
    }
}

impl ControlPlaneConfig {
    /// Build from environment variables, falling back to documented defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            node_ttl_seconds: env_or("node_ttl_seconds", defaults.node_ttl_seconds),
            autoscaler_interval_ms: env_or("autoscaler_interval_ms", defaults.autoscaler_interval_ms),
            cpu_high_watermark: env_or("cpu_high_watermark", defaults.cpu_high_watermark),
            cpu_low_watermark: env_or("cpu_low_watermark", defaults.cpu_low_watermark),
            min_nodes: env_or("min_nodes", defaults.min_nodes),
            consecutive_windows: defaults.consecutive_windows,
        }
    }
}

/// Configuration for [`crate::proxy::NodeProxy`].
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Administrative kill switch; `false` makes every proxy call fail with
    /// `PROXY_DISABLED`.
    pub proxy_enabled: bool,
    /// Header name prefixes/exact names forwarded verbatim to the upstream
    /// node.
    pub forwarded_headers: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            proxy_enabled: true,
            forwarded_headers: vec!["Authorization".to_string(), "X-Api-Token".to_string(), "X-*".to_string()],
        }
    }
}

impl ProxyConfig {
    /// Build from environment variables, falling back to documented defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            proxy_enabled: env_or("proxy_enabled", defaults.proxy_enabled),
            forwarded_headers: std::env::var("forwarded_headers")
                .ok()
                .map(|raw| raw.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.forwarded_headers),
        }
    }

    /// True if `header_name` should be forwarded to the upstream, per the
    /// configured allow-list (exact match, or `X-*`-style prefix match).
    #[must_use]
    pub fn should_forward(&self, header_name: &str) -> bool {
        self.forwarded_headers.iter().any(|pattern| {
            pattern.strip_suffix('*').map_or_else(
                || pattern.eq_ignore_ascii_case(header_name),
                |prefix| header_name.len() >= prefix.len() && header_name[..prefix.len()].eq_ignore_ascii_case(prefix),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ControlPlaneConfig::default();
        assert_eq!(config.node_ttl_seconds, 30);
        assert_eq!(config.min_nodes, 1);
    }

    #[test]
    fn forwarded_headers_match_exact_and_wildcard() {
        let config = ProxyConfig::default();
        assert!(config.should_forward("Authorization"));
        assert!(config.should_forward("authorization"));
        assert!(config.should_forward("X-Correlation-Id"));
        assert!(!config.should_forward("Cookie"));
    }
}
