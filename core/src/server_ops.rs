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

use crate::advertise::{should_advertise_to_peer, LocalAgentRecord};
use crate::bgp::msg_open::OpenMessage;
use crate::bgp::msg_update::UpdateMessage;
use crate::log::{debug, info, warn};
use crate::peer::{Peer, PeerInfo, PeerOp, PeerState};
use crate::server::{
    BgpServer, MgmtOp, PeerHandle, PeerRoutes, ServerOp, SessionEvent, SessionStats,
};
use crate::types::{AgentId, Asn, SessionDownReason, SessionError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// How long shutdown waits for a peer task before aborting it.
const PEER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

impl BgpServer {
    pub(crate) async fn handle_mgmt_op(&mut self, op: MgmtOp) {
        match op {
            MgmtOp::AddPeer {
                asn,
                address,
                response,
            } => {
                let _ = response.send(self.handle_add_peer(asn, address));
            }
            MgmtOp::RemovePeer { asn, response } => {
                self.handle_remove_peer(asn);
                let _ = response.send(Ok(()));
            }
            MgmtOp::GetPeer { asn, response } => {
                self.handle_get_peer(asn, response);
            }
            MgmtOp::GetPeers { response } => {
                let peers = self.peer_senders();
                tokio::spawn(async move {
                    let _ = response.send(collect_peer_info(peers).await);
                });
            }
            MgmtOp::GetRoutesFromPeer { asn, response } => {
                self.handle_get_routes_from_peer(asn, response);
            }
            MgmtOp::GetRouteSnapshot { response } => {
                let peers = self.peer_senders();
                tokio::spawn(async move {
                    let _ = response.send(collect_peer_routes(peers).await);
                });
            }
            MgmtOp::GetSessionStats { response } => {
                let peers = self.peer_senders();
                let local_agents = self.advertisements.len();
                tokio::spawn(async move {
                    let infos = collect_peer_info(peers).await;
                    let _ = response.send(SessionStats::from_peers(&infos, local_agents));
                });
            }
            MgmtOp::ReceiveOpen { open, response } => {
                let _ = response.send(self.handle_receive_open(open));
            }
            MgmtOp::ReceiveUpdate {
                asn,
                update,
                response,
            } => {
                self.handle_receive_update(asn, update, response);
            }
            MgmtOp::ReceiveKeepalive { asn, response } => {
                let _ = response.send(self.send_to_peer(asn, PeerOp::ReceiveKeepalive));
            }
            MgmtOp::SendUpdate {
                asn,
                update,
                response,
            } => {
                let _ = response.send(self.send_to_peer(asn, PeerOp::SendUpdate(update)));
            }
            MgmtOp::SetLocalAgents { agents, response } => {
                let result = self.ensure_running().map(|()| {
                    let update = self.advertisements.set_local_agents(agents);
                    self.advertise(update);
                });
                let _ = response.send(result);
            }
            MgmtOp::UpsertLocalAgent { agent, response } => {
                let _ = response.send(self.handle_upsert_local_agent(agent));
            }
            MgmtOp::RemoveLocalAgent { agent_id, response } => {
                let _ = response.send(self.handle_remove_local_agent(agent_id));
            }
            MgmtOp::SetLocalAgentHealth {
                agent_id,
                health,
                response,
            } => {
                let result = self.ensure_running().map(|()| {
                    let update = self.advertisements.set_health(&agent_id, health);
                    let changed = update.is_some();
                    self.advertise(update);
                    changed
                });
                let _ = response.send(result);
            }
            MgmtOp::GetLocalAgents { response } => {
                let _ = response.send(self.advertisements.get_local_agents());
            }
            MgmtOp::Shutdown { response } => {
                if !self.shut_down {
                    self.shutdown().await;
                }
                let _ = response.send(());
            }
        }
    }

    pub(crate) fn handle_server_op(&mut self, op: ServerOp) {
        if self.shut_down {
            return;
        }
        match op {
            ServerOp::PeerStateChanged {
                peer_id,
                asn,
                state,
            } => {
                let Some(handle) = self.current_peer_mut(asn, peer_id) else {
                    return;
                };
                handle.state = state;
                handle.confirmed = false;
                info!(peer_asn = asn, %state, "peer state changed");

                match state {
                    // The inventory follows once the remote confirms.
                    PeerState::Established => {
                        self.emit(SessionEvent::SessionEstablished { asn });
                    }
                    PeerState::Failed => {
                        self.emit(SessionEvent::SessionFailed { asn });
                    }
                    PeerState::Idle | PeerState::Connect => {}
                }
            }
            ServerOp::SessionConfirmed { peer_id, asn } => {
                let Some(handle) = self.current_peer_mut(asn, peer_id) else {
                    return;
                };
                handle.confirmed = true;
                debug!(peer_asn = asn, "session confirmed by remote");
                self.send_full_inventory(asn);
            }
            ServerOp::SessionReset { peer_id, asn } => {
                if let Some(handle) = self.current_peer_mut(asn, peer_id) {
                    handle.confirmed = false;
                }
            }
            ServerOp::SessionDown {
                peer_id: _,
                asn,
                reason,
            } => {
                // Reported even for a peer that was just removed.
                info!(peer_asn = asn, %reason, "session down");
                self.emit(SessionEvent::SessionDown { asn, reason });
            }
            ServerOp::KeepaliveSent { peer_id, asn } => {
                if self.current_peer_mut(asn, peer_id).is_some() {
                    self.emit(SessionEvent::KeepaliveSent { asn });
                }
            }
        }
    }

    /// Handle for `asn`, only if it still belongs to registration `peer_id`.
    fn current_peer_mut(&mut self, asn: Asn, peer_id: u64) -> Option<&mut PeerHandle> {
        self.peers.get_mut(&asn).filter(|h| h.id == peer_id)
    }

    fn ensure_running(&self) -> Result<(), SessionError> {
        if self.shut_down {
            Err(SessionError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn handle_add_peer(&mut self, asn: Asn, address: String) -> Result<(), SessionError> {
        self.ensure_running()?;

        if asn == 0 {
            return Err(SessionError::InvalidPeer("ASN 0 is reserved".to_string()));
        }
        if asn == self.local.asn {
            return Err(SessionError::InvalidPeer(format!(
                "AS{} is the local ASN",
                asn
            )));
        }
        let address = address.trim().trim_end_matches('/').to_string();
        if address.is_empty() {
            return Err(SessionError::InvalidPeer(format!(
                "AS{} has an empty address",
                asn
            )));
        }

        if let Some(handle) = self.peers.get_mut(&asn) {
            info!(peer_asn = asn, %address, "peer already registered, updating address");
            handle.address = address.clone();
            let _ = handle.peer_tx.send(PeerOp::UpdateAddress(address));
            // Nudges an idle session, ignored in every other state.
            let _ = handle.peer_tx.send(PeerOp::AutomaticStart);
            return Ok(());
        }

        let id = self.next_peer_id;
        self.next_peer_id += 1;

        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let peer = Peer::new(
            id,
            asn,
            address.clone(),
            self.local.clone(),
            self.timers,
            self.transport.clone(),
            peer_rx,
            self.server_tx.clone(),
        );
        let task = tokio::spawn(peer.run());
        let _ = peer_tx.send(PeerOp::ManualStart);

        info!(peer_asn = asn, %address, "peer added");
        self.peers.insert(
            asn,
            PeerHandle {
                id,
                address,
                state: PeerState::Idle,
                confirmed: false,
                peer_tx,
                task,
            },
        );
        Ok(())
    }

    fn handle_remove_peer(&mut self, asn: Asn) {
        let Some(handle) = self.peers.remove(&asn) else {
            debug!(peer_asn = asn, "remove for unknown peer");
            return;
        };
        info!(peer_asn = asn, address = %handle.address, "removing peer");
        // The task stops on Shutdown; dropping the handle does not abort it.
        let _ = handle.peer_tx.send(PeerOp::Shutdown);
    }

    fn handle_get_peer(&self, asn: Asn, response: oneshot::Sender<Option<PeerInfo>>) {
        let Some(handle) = self.peers.get(&asn) else {
            let _ = response.send(None);
            return;
        };
        let (tx, rx) = oneshot::channel();
        let _ = handle.peer_tx.send(PeerOp::GetInfo(tx));
        tokio::spawn(async move {
            let _ = response.send(rx.await.ok());
        });
    }

    fn handle_get_routes_from_peer(
        &self,
        asn: Asn,
        response: oneshot::Sender<Vec<crate::rib::AgentRoute>>,
    ) {
        let Some(handle) = self.peers.get(&asn) else {
            let _ = response.send(Vec::new());
            return;
        };
        let (tx, rx) = oneshot::channel();
        let _ = handle.peer_tx.send(PeerOp::GetRoutes(tx));
        tokio::spawn(async move {
            let _ = response.send(rx.await.unwrap_or_default());
        });
    }

    fn handle_receive_open(&self, open: OpenMessage) -> Result<OpenMessage, SessionError> {
        self.ensure_running()?;

        let asn = open.asn;
        let Some(handle) = self.peers.get(&asn) else {
            warn!(peer_asn = asn, router_id = %open.router_id, "open from unregistered peer");
            return Err(SessionError::PeerNotFound(asn));
        };
        open.validate(asn).map_err(SessionError::HandshakeFailed)?;

        // The peer task decides from its own state: start, or reset a
        // session the remote has lost.
        debug!(peer_asn = asn, router_id = %open.router_id, "open received");
        let _ = handle.peer_tx.send(PeerOp::RemoteOpened);

        Ok(OpenMessage::new(&self.local, self.hold_time_secs))
    }

    fn handle_receive_update(
        &self,
        asn: Asn,
        update: UpdateMessage,
        response: oneshot::Sender<Result<crate::peer::UpdateOutcome, SessionError>>,
    ) {
        let (tx, rx) = oneshot::channel();
        if let Err(e) = self.send_to_peer(asn, PeerOp::ReceiveUpdate { update, response: tx }) {
            let _ = response.send(Err(e));
            return;
        }
        tokio::spawn(async move {
            let result = rx.await.map_err(|_| SessionError::PeerNotFound(asn));
            let _ = response.send(result);
        });
    }

    fn handle_upsert_local_agent(&mut self, agent: LocalAgentRecord) -> Result<(), SessionError> {
        self.ensure_running()?;
        if agent.agent_id.is_empty() {
            return Err(SessionError::InvalidConfig(
                "local agent without agent id".to_string(),
            ));
        }
        let update = self.advertisements.upsert_agent(agent);
        self.advertise(update);
        Ok(())
    }

    fn handle_remove_local_agent(&mut self, agent_id: AgentId) -> Result<bool, SessionError> {
        self.ensure_running()?;
        let update = self.advertisements.remove_agent(&agent_id);
        let removed = update.is_some();
        self.advertise(update);
        Ok(removed)
    }

    fn send_to_peer(&self, asn: Asn, op: PeerOp) -> Result<(), SessionError> {
        let handle = self.peers.get(&asn).ok_or(SessionError::PeerNotFound(asn))?;
        handle
            .peer_tx
            .send(op)
            .map_err(|_| SessionError::PeerNotFound(asn))
    }

    /// Push a local delta to every established peer.
    fn advertise(&self, update: Option<UpdateMessage>) {
        let Some(update) = update else {
            return;
        };
        for (asn, handle) in &self.peers {
            if !should_advertise_to_peer(handle.state, handle.confirmed) {
                continue;
            }
            debug!(peer_asn = asn, advertised = update.advertised_routes.len(),
                withdrawn = update.withdrawn_routes.len(), "advertising local delta");
            let _ = handle.peer_tx.send(PeerOp::SendUpdate(update.clone()));
        }
    }

    /// Everything we originate, for a session the remote just confirmed.
    fn send_full_inventory(&self, asn: Asn) {
        let Some(update) = self.advertisements.full_update() else {
            return;
        };
        if let Some(handle) = self.peers.get(&asn) {
            debug!(peer_asn = asn, routes = update.advertised_routes.len(),
                "sending full inventory");
            let _ = handle.peer_tx.send(PeerOp::SendUpdate(update));
        }
    }

    fn peer_senders(&self) -> Vec<(Asn, mpsc::UnboundedSender<PeerOp>)> {
        let mut peers: Vec<_> = self
            .peers
            .iter()
            .map(|(asn, handle)| (*asn, handle.peer_tx.clone()))
            .collect();
        peers.sort_by_key(|(asn, _)| *asn);
        peers
    }

    /// Stop every peer task, wait for them, then announce the shutdown.
    pub(crate) async fn shutdown(&mut self) {
        info!(asn = self.local.asn, peers = self.peers.len(), "shutting down session manager");

        for (asn, handle) in &self.peers {
            if handle.state == PeerState::Established {
                self.emit(SessionEvent::SessionDown {
                    asn: *asn,
                    reason: SessionDownReason::Shutdown,
                });
            }
        }

        let peers: Vec<(Asn, PeerHandle)> = self.peers.drain().collect();
        for (_, handle) in &peers {
            let _ = handle.peer_tx.send(PeerOp::Shutdown);
        }
        for (asn, handle) in peers {
            let abort = handle.task.abort_handle();
            if tokio::time::timeout(PEER_STOP_TIMEOUT, handle.task).await.is_err() {
                warn!(peer_asn = asn, "peer task did not stop in time, aborting");
                abort.abort();
            }
        }

        // Ops the stopped tasks queued on the way out are dropped from here on.
        self.emit(SessionEvent::Shutdown);
        self.shut_down = true;
        info!(asn = self.local.asn, "session manager shut down");
    }
}

async fn collect_peer_info(peers: Vec<(Asn, mpsc::UnboundedSender<PeerOp>)>) -> Vec<PeerInfo> {
    let mut infos = Vec::with_capacity(peers.len());
    for (_, peer_tx) in peers {
        let (tx, rx) = oneshot::channel();
        if peer_tx.send(PeerOp::GetInfo(tx)).is_err() {
            continue;
        }
        if let Ok(info) = rx.await {
            infos.push(info);
        }
    }
    infos
}

async fn collect_peer_routes(
    peers: Vec<(Asn, mpsc::UnboundedSender<PeerOp>)>,
) -> Vec<PeerRoutes> {
    let mut snapshot = Vec::with_capacity(peers.len());
    for (peer_asn, peer_tx) in peers {
        let (tx, rx) = oneshot::channel();
        if peer_tx.send(PeerOp::GetRoutes(tx)).is_err() {
            continue;
        }
        if let Ok(routes) = rx.await {
            snapshot.push(PeerRoutes { peer_asn, routes });
        }
    }
    snapshot
}
