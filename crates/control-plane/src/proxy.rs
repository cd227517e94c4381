//! Forwarding client requests to the node that owns a target resource
//!. The actual HTTP call is out of scope for this crate; [`NodeProxy`] only decides *whether*
//! to forward and hands the request to a [`NodeTransport`].

use std::sync::Arc;

use sim_ecs::error::{ErrorKind, PlatformError};

use crate::config::ProxyConfig;
use crate::node::{NodeId, NodeRegistry};
use crate::transport::NodeTransport;

/// A request to forward, already trimmed to the allow-listed headers.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// HTTP method, e.g. `"GET"`.
    pub method: String,
    /// Sub-path under the node's advertise address, without a leading slash.
    pub sub_path: String,
    /// Raw query string, if any.
    pub query: Option<String>,
    /// Headers that survived the forwarding allow-list.
    pub headers: Vec<(String, String)>,
    /// Request body bytes, forwarded unchanged.
    pub body: Vec<u8>,
}

/// The upstream's response, round-tripped back to the original caller.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    /// Upstream HTTP status code.
    pub status: u16,
    /// Upstream response headers.
    pub headers: Vec<(String, String)>,
    /// Upstream response body bytes.
    pub body: Vec<u8>,
}

/// Decides whether to forward a request to a node, and does so through a
/// [`NodeTransport`].
pub struct NodeProxy {
    config: ProxyConfig,
    transport: Arc<dyn NodeTransport>,
}

impl NodeProxy {
    /// Build a proxy using `transport` for the actual forwarding call.
    #[must_use]
    pub fn new(config: ProxyConfig, transport: Arc<dyn NodeTransport>) -> Self {
        Self { config, transport }
    }

    /// Filter `headers` down to the configured forwarding allow-list. Call
    /// this in the binary before building a [`ProxyRequest`], since header
    /// extraction lives with the (out-of-scope) transport framing.
    #[must_use]
    pub fn filter_headers(&self, headers: Vec<(String, String)>) -> Vec<(String, String)> {
        headers.into_iter().filter(|(name, _)| self.config.should_forward(name)).collect()
    }

    /// Forward `request` to `node_id`'s advertise address.
    ///
    /// - `PROXY_DISABLED` if the proxy is administratively off.
    /// - `NOT_FOUND` if `node_id` is unknown.
    /// - `PROXY_UPSTREAM` if the transport call itself fails.
    pub async fn forward(
        &self,
        node_id: &NodeId,
        nodes: &NodeRegistry,
        request: ProxyRequest,
    ) -> Result<ProxyResponse, PlatformError> {
        if !self.config.proxy_enabled {
            return Err(PlatformError::new(ErrorKind::ProxyDisabled, "node proxying is administratively disabled"));
        }
        nodes
            .get(node_id)
            .await
            .ok_or_else(|| PlatformError::not_found(format!("node '{}' is not registered", node_id.0)))?;

        self.transport
            .forward(node_id, request)
            .await
            .map_err(|cause| PlatformError::new(ErrorKind::ProxyUpstream, format!("upstream call failed: {cause}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::transport::test_support::FakeTransport;
    use std::time::Duration;

    fn proxy(config: ProxyConfig) -> (NodeProxy, NodeRegistry) {
        let transport = Arc::new(FakeTransport::default());
        (NodeProxy::new(config, transport), NodeRegistry::new(Duration::from_secs(30)))
    }

    fn request() -> ProxyRequest {
        ProxyRequest {
            method: "GET".to_string(),
            sub_path: "api/foo".to_string(),
            query: Some("x=1".to_string()),
            headers: vec![("Authorization".to_string(), "Bearer T".to_string())],
            body: b"payload".to_vec(),
        }
    }

    #[tokio::test]
    async fn forward_round_trips_body_through_the_transport() {
        let (proxy, nodes) = proxy(ProxyConfig::default());
        nodes.register(NodeId("n1".to_string()), "http://n1".to_string(), 10).await;
        let response = proxy.forward(&NodeId("n1".to_string()), &nodes, request()).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"payload");
    }

    #[tokio::test]
    async fn disabled_proxy_rejects_before_touching_the_registry() {
        let (proxy, nodes) = proxy(ProxyConfig { proxy_enabled: false, ..ProxyConfig::default() });
        let err = proxy.forward(&NodeId("n1".to_string()), &nodes, request()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProxyDisabled);
    }

    #[tokio::test]
    async fn unknown_node_is_not_found() {
        let (proxy, nodes) = proxy(ProxyConfig::default());
        let err = proxy.forward(&NodeId("ghost".to_string()), &nodes, request()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn header_filter_keeps_allow_listed_and_drops_others() {
        let (proxy, _nodes) = proxy(ProxyConfig::default());
        let filtered = proxy.filter_headers(vec![
            ("Authorization".to_string(), "Bearer T".to_string()),
            ("X-Correlation-Id".to_string(), "abc".to_string()),
            ("Cookie".to_string(), "secret".to_string()),
        ]);
        let names: Vec<&str> = filtered.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"Authorization"));
        assert!(names.contains(&"X-Correlation-Id"));
        assert!(!names.contains(&"Cookie"));
    }
}
