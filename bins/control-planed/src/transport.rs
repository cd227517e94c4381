//! Concrete [`NodeTransport`] dispatching to a node-agentd instance over
//! HTTP, the wire-framing collaborator `control-plane` deliberately leaves
//! external.

use async_trait::async_trait;
use control_plane::{CreateMatchAck, CreateMatchRequest, DistributeOutcome, NodeId, NodeTransport, ProxyRequest, ProxyResponse};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};

/// Reused across every node the control plane talks to. Every call carries
/// the same pre-shared bearer token node-agentd expects on its
/// `control-plane.*` scoped endpoints.
pub struct ReqwestTransport {
    client: Client,
    api_token: Option<String>,
}

impl ReqwestTransport {
    /// Build a transport that authenticates with `api_token`, if given.
    #[must_use]
    pub fn new(api_token: Option<String>) -> Self {
        Self { client: Client::new(), api_token }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateContainerBody<'a> {
    name: &'a str,
    module_names: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ContainerIdView {
    id: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateMatchBody<'a> {
    enabled_module_names: &'a [String],
}

#[async_trait]
impl NodeTransport for ReqwestTransport {
    async fn push_artifact(&self, node: &NodeId, name: &str, version: &str, blob: &[u8]) -> DistributeOutcome {
        let url = format!("{}/internal/modules/{name}/{version}", node.0.trim_end_matches('/'));
        match self.authorize(self.client.post(url).body(blob.to_vec())).send().await {
            Ok(response) if response.status().is_success() => DistributeOutcome::Acked,
            Ok(response) => DistributeOutcome::Failed(format!("node responded {}", response.status())),
            Err(err) => DistributeOutcome::Failed(err.to_string()),
        }
    }

    async fn create_match(&self, node: &NodeId, request: CreateMatchRequest) -> Result<CreateMatchAck, String> {
        let base = node.0.trim_end_matches('/');

        let container: ContainerIdView = self
            .authorize(self.client.post(format!("{base}/api/containers")).json(&CreateContainerBody {
                name: &request.container_name,
                module_names: &request.module_names,
            }))
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;

        let match_id: u64 = self
            .authorize(
                self.client
                    .post(format!("{base}/api/containers/{}/matches", container.id))
                    .json(&CreateMatchBody { enabled_module_names: &request.module_names }),
            )
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;

        Ok(CreateMatchAck { container_id: container.id, match_id })
    }

    async fn undeploy_match(&self, node: &NodeId, container_id: u64, match_id: u64) -> Result<(), String> {
        let base = node.0.trim_end_matches('/');
        self.authorize(self.client.delete(format!("{base}/api/containers/{container_id}/matches/{match_id}")))
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn forward(&self, node: &NodeId, request: ProxyRequest) -> Result<ProxyResponse, String> {
        let base = node.0.trim_end_matches('/');
        let mut url = format!("{base}/{}", request.sub_path);
        if let Some(query) = &request.query {
            url.push('?');
            url.push_str(query);
        }
        let method = Method::from_bytes(request.method.as_bytes()).map_err(|e| e.to_string())?;
        let mut builder = self.client.request(method, url).body(request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await.map_err(|e| e.to_string())?.to_vec();
        Ok(ProxyResponse { status, headers, body })
    }
}
