// Copyright 2025 bgpgg Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Read side of the engine as seen by the rest of the proxy.
//!
//! The facade answers discovery questions from a [`DiscoverySource`]: either
//! the in-process session manager, or a degraded-mode source that rebuilds
//! the same view from a speaker's HTTP surface.

use crate::advertise::LocalAgentRecord;
use crate::api::{ErrorBody, PATH_AGENTS, PATH_CANDIDATES, PATH_PEERS, PATH_STATS};
use crate::discovery::{AgentConflict, CandidateRoute, DiscoveredAgent, DiscoveryAggregator, NetworkView};
use crate::log::{debug, warn};
use crate::peer::PeerInfo;
use crate::rib::AgentRoute;
use crate::server::{PeerRoutes, SessionManager, SessionStats};
use crate::types::{Asn, SessionError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub enum FacadeError {
    Session(SessionError),
    Http(reqwest::Error),
    /// Remote answered with a non-success status and this message.
    Status(u16, String),
}

impl fmt::Display for FacadeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacadeError::Session(e) => write!(f, "{}", e),
            FacadeError::Http(e) => write!(f, "http error: {}", e),
            FacadeError::Status(code, msg) => write!(f, "status {}: {}", code, msg),
        }
    }
}

impl std::error::Error for FacadeError {}

impl From<SessionError> for FacadeError {
    fn from(e: SessionError) -> Self {
        FacadeError::Session(e)
    }
}

impl From<reqwest::Error> for FacadeError {
    fn from(e: reqwest::Error) -> Self {
        FacadeError::Http(e)
    }
}

/// Where the facade reads engine state from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacadeMode {
    InProcess,
    HttpFallback,
}

impl fmt::Display for FacadeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacadeMode::InProcess => write!(f, "in_process"),
            FacadeMode::HttpFallback => write!(f, "http_fallback"),
        }
    }
}

#[async_trait]
pub trait DiscoverySource: Send + Sync {
    fn mode(&self) -> FacadeMode;
    async fn route_snapshot(&self) -> Result<Vec<PeerRoutes>, FacadeError>;
    async fn session_stats(&self) -> Result<SessionStats, FacadeError>;
    async fn peers(&self) -> Result<Vec<PeerInfo>, FacadeError>;
    async fn peer(&self, asn: Asn) -> Result<Option<PeerInfo>, FacadeError>;
    async fn peer_routes(&self, asn: Asn) -> Result<Vec<AgentRoute>, FacadeError>;
    async fn local_agents(&self) -> Result<Vec<LocalAgentRecord>, FacadeError>;
}

#[async_trait]
impl DiscoverySource for SessionManager {
    fn mode(&self) -> FacadeMode {
        FacadeMode::InProcess
    }

    async fn route_snapshot(&self) -> Result<Vec<PeerRoutes>, FacadeError> {
        Ok(self.get_route_snapshot().await?)
    }

    async fn session_stats(&self) -> Result<SessionStats, FacadeError> {
        Ok(self.get_session_stats().await?)
    }

    async fn peers(&self) -> Result<Vec<PeerInfo>, FacadeError> {
        Ok(self.get_peers().await?)
    }

    async fn peer(&self, asn: Asn) -> Result<Option<PeerInfo>, FacadeError> {
        Ok(self.get_peer(asn).await?)
    }

    async fn peer_routes(&self, asn: Asn) -> Result<Vec<AgentRoute>, FacadeError> {
        Ok(self.get_routes_from_peer(asn).await?)
    }

    async fn local_agents(&self) -> Result<Vec<LocalAgentRecord>, FacadeError> {
        Ok(self.get_local_agents().await?)
    }
}

/// Reads a speaker's HTTP surface. Used when the engine is not running in
/// this process.
pub struct HttpFallbackSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFallbackSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FacadeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpFallbackSource {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path`; a 404 comes back as None.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, FacadeError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "fallback request");
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => status.to_string(),
            };
            warn!(%url, status = status.as_u16(), %message, "fallback request failed");
            return Err(FacadeError::Status(status.as_u16(), message));
        }
        Ok(Some(response.json::<T>().await?))
    }

    async fn get_required<T: DeserializeOwned>(&self, path: &str) -> Result<T, FacadeError> {
        self.get_json(path)
            .await?
            .ok_or_else(|| FacadeError::Status(404, format!("{} not found", path)))
    }
}

#[async_trait]
impl DiscoverySource for HttpFallbackSource {
    fn mode(&self) -> FacadeMode {
        FacadeMode::HttpFallback
    }

    async fn route_snapshot(&self) -> Result<Vec<PeerRoutes>, FacadeError> {
        self.get_required(PATH_CANDIDATES).await
    }

    async fn session_stats(&self) -> Result<SessionStats, FacadeError> {
        self.get_required(PATH_STATS).await
    }

    async fn peers(&self) -> Result<Vec<PeerInfo>, FacadeError> {
        self.get_required(PATH_PEERS).await
    }

    async fn peer(&self, asn: Asn) -> Result<Option<PeerInfo>, FacadeError> {
        self.get_json(&format!("{}/{}", PATH_PEERS, asn)).await
    }

    async fn peer_routes(&self, asn: Asn) -> Result<Vec<AgentRoute>, FacadeError> {
        Ok(self
            .get_json(&format!("{}/{}/routes", PATH_PEERS, asn))
            .await?
            .unwrap_or_default())
    }

    async fn local_agents(&self) -> Result<Vec<LocalAgentRecord>, FacadeError> {
        self.get_required(PATH_AGENTS).await
    }
}

/// Discovery queries over any source.
#[derive(Clone)]
pub struct DiscoveryFacade {
    source: Arc<dyn DiscoverySource>,
}

impl DiscoveryFacade {
    pub fn new(source: Arc<dyn DiscoverySource>) -> Self {
        DiscoveryFacade { source }
    }

    pub fn in_process(manager: SessionManager) -> Self {
        Self::new(Arc::new(manager))
    }

    pub fn http_fallback(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FacadeError> {
        Ok(Self::new(Arc::new(HttpFallbackSource::new(base_url, timeout)?)))
    }

    pub fn mode(&self) -> FacadeMode {
        self.source.mode()
    }

    async fn aggregator(&self) -> Result<DiscoveryAggregator, FacadeError> {
        Ok(DiscoveryAggregator::from_snapshot(self.source.route_snapshot().await?))
    }

    pub async fn network_view(&self) -> Result<NetworkView, FacadeError> {
        Ok(self.aggregator().await?.network_view())
    }

    pub async fn find_agent(&self, agent_id: &str) -> Result<Option<DiscoveredAgent>, FacadeError> {
        Ok(self.aggregator().await?.best_route(agent_id))
    }

    pub async fn candidates(&self, agent_id: &str) -> Result<Vec<CandidateRoute>, FacadeError> {
        Ok(self.aggregator().await?.candidates(agent_id).to_vec())
    }

    /// Agents advertising `capability`. With `reachable_only`, agents whose
    /// best route reports them unhealthy or unknown are left out.
    pub async fn agents_with_capability(
        &self,
        capability: &str,
        reachable_only: bool,
    ) -> Result<Vec<DiscoveredAgent>, FacadeError> {
        let view = self.network_view().await?;
        Ok(view
            .with_capability(capability)
            .filter(|agent| !reachable_only || agent.is_reachable())
            .cloned()
            .collect())
    }

    pub async fn conflicts(&self) -> Result<Vec<AgentConflict>, FacadeError> {
        Ok(self.aggregator().await?.conflicts())
    }

    pub async fn stats(&self) -> Result<SessionStats, FacadeError> {
        self.source.session_stats().await
    }

    pub async fn peers(&self) -> Result<Vec<PeerInfo>, FacadeError> {
        self.source.peers().await
    }

    pub async fn peer(&self, asn: Asn) -> Result<Option<PeerInfo>, FacadeError> {
        self.source.peer(asn).await
    }

    pub async fn peer_routes(&self, asn: Asn) -> Result<Vec<AgentRoute>, FacadeError> {
        self.source.peer_routes(asn).await
    }

    pub async fn local_agents(&self) -> Result<Vec<LocalAgentRecord>, FacadeError> {
        self.source.local_agents().await
    }
}
