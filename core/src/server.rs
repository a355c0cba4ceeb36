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

use crate::advertise::{AdvertisementManager, LocalAgentRecord};
use crate::bgp::community::HealthStatus;
use crate::bgp::msg_open::OpenMessage;
use crate::bgp::msg_update::UpdateMessage;
use crate::config::Config;
use crate::log::{debug, info};
use crate::peer::{PeerInfo, PeerOp, PeerState, SessionTimers, UpdateOutcome};
use crate::rib::AgentRoute;
use crate::transport::PeerTransport;
use crate::types::{AgentId, Asn, AutonomousSystem, SessionDownReason, SessionError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Capacity of the lifecycle event channel. Slow subscribers lag, they
/// never block the server.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

const MGMT_CHANNEL_CAPACITY: usize = 1024;

/// Management operations sent to the server actor.
pub enum MgmtOp {
    AddPeer {
        asn: Asn,
        address: String,
        response: oneshot::Sender<Result<(), SessionError>>,
    },
    RemovePeer {
        asn: Asn,
        response: oneshot::Sender<Result<(), SessionError>>,
    },
    GetPeer {
        asn: Asn,
        response: oneshot::Sender<Option<PeerInfo>>,
    },
    GetPeers {
        response: oneshot::Sender<Vec<PeerInfo>>,
    },
    GetRoutesFromPeer {
        asn: Asn,
        response: oneshot::Sender<Vec<AgentRoute>>,
    },
    GetRouteSnapshot {
        response: oneshot::Sender<Vec<PeerRoutes>>,
    },
    GetSessionStats {
        response: oneshot::Sender<SessionStats>,
    },
    ReceiveOpen {
        open: OpenMessage,
        response: oneshot::Sender<Result<OpenMessage, SessionError>>,
    },
    ReceiveUpdate {
        asn: Asn,
        update: UpdateMessage,
        response: oneshot::Sender<Result<UpdateOutcome, SessionError>>,
    },
    ReceiveKeepalive {
        asn: Asn,
        response: oneshot::Sender<Result<(), SessionError>>,
    },
    SendUpdate {
        asn: Asn,
        update: UpdateMessage,
        response: oneshot::Sender<Result<(), SessionError>>,
    },
    SetLocalAgents {
        agents: Vec<LocalAgentRecord>,
        response: oneshot::Sender<Result<(), SessionError>>,
    },
    UpsertLocalAgent {
        agent: LocalAgentRecord,
        response: oneshot::Sender<Result<(), SessionError>>,
    },
    RemoveLocalAgent {
        agent_id: AgentId,
        response: oneshot::Sender<Result<bool, SessionError>>,
    },
    SetLocalAgentHealth {
        agent_id: AgentId,
        health: HealthStatus,
        response: oneshot::Sender<Result<bool, SessionError>>,
    },
    GetLocalAgents {
        response: oneshot::Sender<Vec<LocalAgentRecord>>,
    },
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

/// Operations sent from peer tasks to the server.
#[derive(Debug)]
pub enum ServerOp {
    PeerStateChanged {
        peer_id: u64,
        asn: Asn,
        state: PeerState,
    },
    SessionDown {
        peer_id: u64,
        asn: Asn,
        reason: SessionDownReason,
    },
    KeepaliveSent {
        peer_id: u64,
        asn: Asn,
    },
    /// First KEEPALIVE or UPDATE from the remote since establishment
    SessionConfirmed {
        peer_id: u64,
        asn: Asn,
    },
    /// Remote reopened an established session; it holds none of our routes
    SessionReset {
        peer_id: u64,
        asn: Asn,
    },
}

/// Lifecycle notifications broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SessionEvent {
    SessionEstablished { asn: Asn },
    SessionFailed { asn: Asn },
    KeepaliveSent { asn: Asn },
    SessionDown { asn: Asn, reason: SessionDownReason },
    Shutdown,
}

/// Routes currently held for one peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRoutes {
    pub peer_asn: Asn,
    pub routes: Vec<AgentRoute>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub peer_count: usize,
    /// Number of peers per session state, every state present
    pub states: BTreeMap<String, usize>,
    /// Sum of all per-peer route tables
    pub total_routes: usize,
    pub local_agents: usize,
}

impl SessionStats {
    pub fn from_peers(peers: &[PeerInfo], local_agents: usize) -> Self {
        let mut states: BTreeMap<String, usize> = PeerState::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        for peer in peers {
            *states.entry(peer.state.as_str().to_string()).or_default() += 1;
        }
        SessionStats {
            peer_count: peers.len(),
            states,
            total_routes: peers.iter().map(|p| p.route_count).sum(),
            local_agents,
        }
    }

    pub fn in_state(&self, state: PeerState) -> usize {
        self.states.get(state.as_str()).copied().unwrap_or(0)
    }
}

/// Server-side view of a registered peer task.
pub(crate) struct PeerHandle {
    /// Registration generation, matches `Peer::id`
    pub id: u64,
    pub address: String,
    /// Last state reported by the task
    pub state: PeerState,
    /// Remote confirmed the session; deltas go out only after this
    pub confirmed: bool,
    pub peer_tx: mpsc::UnboundedSender<PeerOp>,
    pub task: JoinHandle<()>,
}

pub struct BgpServer {
    pub(crate) peers: HashMap<Asn, PeerHandle>,
    pub(crate) local: AutonomousSystem,
    pub(crate) hold_time_secs: u64,
    pub(crate) timers: SessionTimers,
    pub(crate) transport: Arc<dyn PeerTransport>,
    pub(crate) advertisements: AdvertisementManager,
    pub(crate) event_tx: broadcast::Sender<SessionEvent>,
    pub(crate) next_peer_id: u64,
    pub(crate) shut_down: bool,
    pub(crate) server_tx: mpsc::UnboundedSender<ServerOp>,
    mgmt_rx: mpsc::Receiver<MgmtOp>,
    server_rx: mpsc::UnboundedReceiver<ServerOp>,
}

impl BgpServer {
    /// Build the server actor and the handle used to drive it. Nothing runs
    /// until `run` is awaited or spawned.
    pub fn new(
        config: &Config,
        transport: Arc<dyn PeerTransport>,
    ) -> Result<(Self, SessionManager), SessionError> {
        config.validate().map_err(SessionError::InvalidConfig)?;

        let (mgmt_tx, mgmt_rx) = mpsc::channel(MGMT_CHANNEL_CAPACITY);
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let local = config.local_as();

        let server = BgpServer {
            peers: HashMap::new(),
            advertisements: AdvertisementManager::new(local.clone(), config.advertise_address()),
            local: local.clone(),
            hold_time_secs: config.hold_time_secs,
            timers: config.timers(),
            transport,
            event_tx: event_tx.clone(),
            next_peer_id: 1,
            shut_down: false,
            server_tx,
            mgmt_rx,
            server_rx,
        };
        let manager = SessionManager {
            mgmt_tx,
            event_tx,
            local,
        };
        Ok((server, manager))
    }

    /// Main loop. Ends once every `SessionManager` handle is dropped.
    pub async fn run(mut self) {
        info!(asn = self.local.asn, router_id = %self.local.router_id, "session manager starting");

        loop {
            tokio::select! {
                op = self.mgmt_rx.recv() => {
                    match op {
                        Some(op) => self.handle_mgmt_op(op).await,
                        None => break,
                    }
                }
                Some(op) = self.server_rx.recv() => {
                    self.handle_server_op(op);
                }
            }
        }

        if !self.shut_down {
            self.shutdown().await;
        }
        debug!(asn = self.local.asn, "session manager stopped");
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        if self.shut_down {
            return;
        }
        // Zero subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}

/// Cloneable handle to a running session manager.
#[derive(Clone)]
pub struct SessionManager {
    mgmt_tx: mpsc::Sender<MgmtOp>,
    event_tx: broadcast::Sender<SessionEvent>,
    local: AutonomousSystem,
}

impl SessionManager {
    /// Validate `config`, spawn the server actor and return its handle.
    /// Peers and local agents from the config are not registered here.
    pub fn start(
        config: &Config,
        transport: Arc<dyn PeerTransport>,
    ) -> Result<SessionManager, SessionError> {
        let (server, manager) = BgpServer::new(config, transport)?;
        tokio::spawn(server.run());
        Ok(manager)
    }

    pub fn local_as(&self) -> &AutonomousSystem {
        &self.local
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> MgmtOp,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.mgmt_tx
            .send(build(tx))
            .await
            .map_err(|_| SessionError::ServerGone)?;
        rx.await.map_err(|_| SessionError::ServerGone)
    }

    /// Register a peer, or update the address of an already registered one.
    pub async fn add_peer(&self, asn: Asn, address: impl Into<String>) -> Result<(), SessionError> {
        let address = address.into();
        self.request(|response| MgmtOp::AddPeer {
            asn,
            address,
            response,
        })
        .await?
    }

    pub async fn remove_peer(&self, asn: Asn) -> Result<(), SessionError> {
        self.request(|response| MgmtOp::RemovePeer { asn, response })
            .await?
    }

    pub async fn get_peer(&self, asn: Asn) -> Result<Option<PeerInfo>, SessionError> {
        self.request(|response| MgmtOp::GetPeer { asn, response })
            .await
    }

    pub async fn get_peers(&self) -> Result<Vec<PeerInfo>, SessionError> {
        self.request(|response| MgmtOp::GetPeers { response }).await
    }

    /// Routes learned from `asn`. Empty when the peer is unknown.
    pub async fn get_routes_from_peer(&self, asn: Asn) -> Result<Vec<AgentRoute>, SessionError> {
        self.request(|response| MgmtOp::GetRoutesFromPeer { asn, response })
            .await
    }

    /// Every peer's route table, ordered by peer ASN.
    pub async fn get_route_snapshot(&self) -> Result<Vec<PeerRoutes>, SessionError> {
        self.request(|response| MgmtOp::GetRouteSnapshot { response })
            .await
    }

    pub async fn get_session_stats(&self) -> Result<SessionStats, SessionError> {
        self.request(|response| MgmtOp::GetSessionStats { response })
            .await
    }

    /// Inbound open exchange. Returns the local OPEN to answer with.
    pub async fn receive_open(&self, open: OpenMessage) -> Result<OpenMessage, SessionError> {
        self.request(|response| MgmtOp::ReceiveOpen { open, response })
            .await?
    }

    pub async fn receive_update(
        &self,
        asn: Asn,
        update: UpdateMessage,
    ) -> Result<UpdateOutcome, SessionError> {
        self.request(|response| MgmtOp::ReceiveUpdate {
            asn,
            update,
            response,
        })
        .await?
    }

    pub async fn receive_keepalive(&self, asn: Asn) -> Result<(), SessionError> {
        self.request(|response| MgmtOp::ReceiveKeepalive { asn, response })
            .await?
    }

    /// Queue an UPDATE towards `asn`. Dropped by the peer task unless the
    /// session is established.
    pub async fn send_update(&self, asn: Asn, update: UpdateMessage) -> Result<(), SessionError> {
        self.request(|response| MgmtOp::SendUpdate {
            asn,
            update,
            response,
        })
        .await?
    }

    /// Replace the local inventory and advertise the difference.
    pub async fn set_local_agents(&self, agents: Vec<LocalAgentRecord>) -> Result<(), SessionError> {
        self.request(|response| MgmtOp::SetLocalAgents { agents, response })
            .await?
    }

    pub async fn upsert_local_agent(&self, agent: LocalAgentRecord) -> Result<(), SessionError> {
        self.request(|response| MgmtOp::UpsertLocalAgent { agent, response })
            .await?
    }

    /// Returns false when no such agent was registered.
    pub async fn remove_local_agent(&self, agent_id: impl Into<AgentId>) -> Result<bool, SessionError> {
        let agent_id = agent_id.into();
        self.request(|response| MgmtOp::RemoveLocalAgent { agent_id, response })
            .await?
    }

    /// Change the health of one local agent and re-advertise it. Returns
    /// false when the agent is unknown or already has that health.
    pub async fn set_local_agent_health(
        &self,
        agent_id: impl Into<AgentId>,
        health: HealthStatus,
    ) -> Result<bool, SessionError> {
        let agent_id = agent_id.into();
        self.request(|response| MgmtOp::SetLocalAgentHealth {
            agent_id,
            health,
            response,
        })
        .await?
    }

    pub async fn get_local_agents(&self) -> Result<Vec<LocalAgentRecord>, SessionError> {
        self.request(|response| MgmtOp::GetLocalAgents { response })
            .await
    }

    /// Stop every peer task and clear the registry. Safe to call repeatedly.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.request(|response| MgmtOp::Shutdown { response })
            .await
    }
}
