//! Client for the target cluster's own management plane
//!
//! Once the new cluster is self-hosting, its API server supersedes the
//! orchestration API as the authoritative progress source. This client
//! issues the equivalent read calls there, plus the cheap reachability
//! probe the mode controller uses to detect that the handover is ready.

use crate::api::types::{
    CertificateRequest, ClusterNode, ClusterOperator, ObjectList,
};
use crate::error::ApiError;
use serde::de::DeserializeOwned;
use slog::{debug, warn, Logger};
use std::time::Duration;

const NODES_PATH: &str = "/api/v1/nodes";
const OPERATORS_PATH: &str = "/apis/config.openshift.io/v1/clusteroperators";
const CSRS_PATH: &str = "/apis/certificates.k8s.io/v1/certificatesigningrequests";

/// Read-only client for the target cluster's management plane.
pub struct ClusterApiClient {
    client: reqwest::Client,
    probe_client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    logger: Logger,
}

impl ClusterApiClient {
    /// Create a client against the given API server base URL.
    ///
    /// During bootstrap the API server presents certificates the local
    /// trust store does not know, so verification is disabled. Two
    /// underlying clients are kept: the probe uses a tighter timeout
    /// than ordinary reads.
    pub fn new(
        base_url: String,
        token: Option<String>,
        timeout: Duration,
        probe_timeout: Duration,
        logger: Logger,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        let probe_client = reqwest::Client::builder()
            .timeout(probe_timeout)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            client,
            probe_client,
            base_url,
            token,
            logger,
        })
    }

    /// Cheap reachability probe against the control-plane endpoint.
    ///
    /// Any HTTP response at all counts as reachable, including 401/403:
    /// an answering API server is an API server, whether or not we may
    /// read from it yet.
    pub async fn reachable(&self) -> bool {
        let url = format!("{}/version", self.base_url);
        match self.probe_client.get(&url).send().await {
            Ok(response) => {
                debug!(self.logger, "Control plane probe answered";
                    "status" => response.status().as_u16());
                true
            }
            Err(e) => {
                debug!(self.logger, "Control plane probe failed"; "error" => %e);
                false
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(self.logger, "Management plane read"; "url" => &url);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(|e| {
            warn!(self.logger, "Management plane request failed";
                "url" => &url, "error" => %e);
            ApiError::Transient {
                endpoint: path.to_string(),
                reason: e.to_string(),
            }
        })?;

        if !response.status().is_success() {
            warn!(self.logger, "Management plane returned error status";
                "url" => &url, "status" => response.status().as_u16());
            return Err(ApiError::Transient {
                endpoint: path.to_string(),
                reason: format!("status {}", response.status()),
            });
        }

        response.json::<T>().await.map_err(|e| {
            warn!(self.logger, "Management plane response did not decode";
                "url" => &url, "error" => %e);
            ApiError::Transient {
                endpoint: path.to_string(),
                reason: format!("decode: {}", e),
            }
        })
    }

    /// All nodes currently visible to the management plane.
    pub async fn list_nodes(&self) -> Result<Vec<ClusterNode>, ApiError> {
        let list: ObjectList<ClusterNode> = self.get(NODES_PATH).await?;
        Ok(list.items)
    }

    /// All cluster operators and their rollout conditions.
    pub async fn list_cluster_operators(&self) -> Result<Vec<ClusterOperator>, ApiError> {
        let list: ObjectList<ClusterOperator> = self.get(OPERATORS_PATH).await?;
        Ok(list.items)
    }

    /// Count of certificate signing requests still awaiting approval.
    pub async fn pending_csr_count(&self) -> Result<usize, ApiError> {
        let list: ObjectList<CertificateRequest> = self.get(CSRS_PATH).await?;
        Ok(list.items.iter().filter(|c| c.is_pending()).count())
    }
}
