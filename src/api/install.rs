//! Client for the installation orchestration API
//!
//! This source exists only while the bootstrap machine is serving the
//! orchestration API. Every read is authenticated with the token from
//! the shared install state store, re-read per call because the token
//! appears (and can rotate) while bootstrap is underway.

use crate::api::types::{EventRecord, InstallCluster, InstallHost};
use crate::auth::TokenSource;
use crate::error::ApiError;
use serde::de::DeserializeOwned;
use slog::{debug, warn, Logger};
use std::time::Duration;

/// Read-only client for the orchestration API.
pub struct InstallApiClient {
    client: reqwest::Client,
    base_url: String,
    tokens: TokenSource,
    logger: Logger,
}

impl InstallApiClient {
    /// Create a client against the given API base URL.
    ///
    /// The bootstrap machine serves with a throwaway self-signed
    /// certificate, so certificate verification is disabled here.
    pub fn new(
        base_url: String,
        tokens: TokenSource,
        timeout: Duration,
        logger: Logger,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            client,
            base_url,
            tokens,
            logger,
        })
    }

    /// Issue one authenticated GET and decode the body.
    ///
    /// Any non-200 status, transport error, or undecodable body becomes
    /// `ApiError::Transient`: the distinction does not matter to the
    /// caller, which treats all three as "no data this cycle".
    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let token = self.tokens.read().ok_or(ApiError::CredentialAbsent)?;
        let url = format!("{}{}", self.base_url, endpoint);

        debug!(self.logger, "Orchestration API read"; "url" => &url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", token)
            .send()
            .await
            .map_err(|e| {
                warn!(self.logger, "Orchestration API request failed";
                    "url" => &url, "error" => %e);
                ApiError::Transient {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                }
            })?;

        if !response.status().is_success() {
            warn!(self.logger, "Orchestration API returned error status";
                "url" => &url, "status" => response.status().as_u16());
            return Err(ApiError::Transient {
                endpoint: endpoint.to_string(),
                reason: format!("status {}", response.status()),
            });
        }

        response.json::<T>().await.map_err(|e| {
            warn!(self.logger, "Orchestration API response did not decode";
                "url" => &url, "error" => %e);
            ApiError::Transient {
                endpoint: endpoint.to_string(),
                reason: format!("decode: {}", e),
            }
        })
    }

    /// List clusters known to the orchestrator. An unattended install
    /// has exactly one; callers take the first.
    pub async fn list_clusters(&self) -> Result<Vec<InstallCluster>, ApiError> {
        self.get("/clusters").await
    }

    /// Hosts registered to a cluster.
    pub async fn cluster_hosts(&self, cluster_id: &str) -> Result<Vec<InstallHost>, ApiError> {
        self.get(&format!("/clusters/{}/hosts", cluster_id)).await
    }

    /// Hosts known to an infra-env. Preferred over `cluster_hosts` when
    /// an infra-env id is known: the records carry richer identity data
    /// for hosts that have not yet bound to the cluster.
    pub async fn infra_env_hosts(&self, infra_env_id: &str) -> Result<Vec<InstallHost>, ApiError> {
        self.get(&format!("/infra-envs/{}/hosts", infra_env_id)).await
    }

    /// The cluster's event feed, oldest first.
    pub async fn events(&self, cluster_id: &str) -> Result<Vec<EventRecord>, ApiError> {
        self.get(&format!("/events?cluster_id={}", cluster_id)).await
    }
}
