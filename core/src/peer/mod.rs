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

use crate::bgp::msg::Message;
use crate::bgp::msg_open::OpenMessage;
use crate::bgp::msg_update::UpdateMessage;
use crate::log::debug;
use crate::rib::rib_in::RouteTable;
use crate::rib::AgentRoute;
use crate::server::ServerOp;
use crate::transport::{PeerEndpoint, PeerTransport, TransportError};
use crate::types::{Asn, AutonomousSystem, SessionDownReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

mod fsm;
mod incoming;
mod messages;
mod state_connect;
mod state_established;
mod state_idle;
mod states;

// Re-export FSM types so they can be used from outside the peer module
pub use fsm::{Fsm, FsmEvent, FsmTimers, PeerState, SessionTimers};

/// Errors that can occur during peer FSM event processing
#[derive(Debug)]
pub enum PeerError {
    /// Session is not established, nothing can be sent
    NotConnected,
    /// The writer task for this session is gone
    ConnectionClosed,
    Transport(TransportError),
}

impl fmt::Display for PeerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerError::NotConnected => write!(f, "session not established"),
            PeerError::ConnectionClosed => write!(f, "connection closed"),
            PeerError::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

impl std::error::Error for PeerError {}

impl From<TransportError> for PeerError {
    fn from(e: TransportError) -> Self {
        PeerError::Transport(e)
    }
}

/// Operations that can be sent to a peer task
pub enum PeerOp {
    /// Peer was registered, connect now
    ManualStart,
    /// Re-registration nudge; connect now if idle
    AutomaticStart,
    /// Remote sent us an OPEN. Starts an idle session and resets an
    /// established one, since the remote has lost its side of it.
    RemoteOpened,
    /// Stop the session and end the task
    Shutdown,
    /// Re-registration with a new address. Does not reset the session.
    UpdateAddress(String),
    ReceiveUpdate {
        update: UpdateMessage,
        response: oneshot::Sender<UpdateOutcome>,
    },
    ReceiveKeepalive,
    SendUpdate(UpdateMessage),
    GetInfo(oneshot::Sender<PeerInfo>),
    GetRoutes(oneshot::Sender<Vec<AgentRoute>>),
    GetStatistics(oneshot::Sender<PeerStatistics>),
}

/// Per-peer counters. Never decrease while the peer is registered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerStatistics {
    pub handshake_attempts: u64,
    pub handshake_failures: u64,
    pub keepalive_sent: u64,
    pub keepalive_received: u64,
    pub update_sent: u64,
    pub update_received: u64,
    /// UPDATEs that arrived while the session was not established
    pub updates_ignored: u64,
    pub routes_received: u64,
    pub routes_sent: u64,
    pub routes_withdrawn: u64,
    /// Routes dropped because the AS path contained the local ASN
    pub loops_detected: u64,
    /// Routes dropped for carrying no agent id
    pub routes_rejected: u64,
}

/// Result of applying one UPDATE to a peer's route table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub accepted: usize,
    pub withdrawn: usize,
    pub loops_detected: usize,
    pub rejected: usize,
    /// True when the session was not established and nothing was applied
    pub ignored: bool,
}

impl UpdateOutcome {
    pub fn ignored() -> Self {
        UpdateOutcome {
            ignored: true,
            ..Default::default()
        }
    }
}

/// Read-only snapshot of a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub asn: Asn,
    pub address: String,
    pub state: PeerState,
    pub route_count: usize,
    pub routes_received: u64,
    pub routes_sent: u64,
    pub remote_router_id: Option<String>,
    #[serde(default)]
    pub remote_capabilities: Vec<String>,
    pub established_since: Option<DateTime<Utc>>,
    /// Remote has sent a KEEPALIVE or UPDATE since the session came up
    #[serde(default)]
    pub session_confirmed: bool,
    pub statistics: PeerStatistics,
}

/// Outbound side of an established session. Messages are written in order
/// by a dedicated task so a slow remote never blocks the peer loop.
struct Connection {
    msg_tx: mpsc::UnboundedSender<(PeerEndpoint, Message)>,
    writer: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.writer.abort();
    }
}

pub struct Peer {
    /// Registration generation, lets the server discard ops from a removed task
    pub id: u64,
    pub asn: Asn,
    pub address: String,
    pub fsm: Fsm,
    pub rib_in: RouteTable,
    pub statistics: PeerStatistics,
    local: AutonomousSystem,
    transport: Arc<dyn PeerTransport>,
    /// OPEN received from the remote - None until the first handshake
    remote_open: Option<OpenMessage>,
    established_at: Option<DateTime<Utc>>,
    /// Remote is known to be established too; UPDATEs we send are applied
    confirmed: bool,
    /// Outbound connection - None when not established
    conn: Option<Connection>,
    peer_rx: mpsc::UnboundedReceiver<PeerOp>,
    server_tx: mpsc::UnboundedSender<ServerOp>,
}

impl Peer {
    /// Create a new Peer in Idle state. Use ManualStart to begin connecting.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        asn: Asn,
        address: String,
        local: AutonomousSystem,
        timers: SessionTimers,
        transport: Arc<dyn PeerTransport>,
        peer_rx: mpsc::UnboundedReceiver<PeerOp>,
        server_tx: mpsc::UnboundedSender<ServerOp>,
    ) -> Self {
        Peer {
            id,
            asn,
            address,
            fsm: Fsm::new(timers),
            rib_in: RouteTable::new(),
            statistics: PeerStatistics::default(),
            local,
            transport,
            remote_open: None,
            established_at: None,
            confirmed: false,
            conn: None,
            peer_rx,
            server_tx,
        }
    }

    /// Main peer task - handles the full lifecycle of a peer session.
    /// Runs until Shutdown or until the server drops its handle.
    pub async fn run(mut self) {
        debug!(peer_asn = self.asn, address = %self.address, "starting peer task");

        loop {
            let shutdown = match self.fsm.state() {
                PeerState::Idle => self.handle_idle_state().await,
                PeerState::Connect => self.handle_connect_state().await,
                PeerState::Established => self.handle_established().await,
                PeerState::Failed => self.handle_failed_state(),
            };
            if shutdown {
                self.disconnect(None);
                debug!(peer_asn = self.asn, "peer task stopped");
                return;
            }
        }
    }

    pub fn endpoint(&self) -> PeerEndpoint {
        PeerEndpoint {
            asn: self.asn,
            address: self.address.clone(),
        }
    }

    pub fn state(&self) -> PeerState {
        self.fsm.state()
    }

    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            asn: self.asn,
            address: self.address.clone(),
            state: self.fsm.state(),
            route_count: self.rib_in.route_count(),
            routes_received: self.statistics.routes_received,
            routes_sent: self.statistics.routes_sent,
            remote_router_id: self.remote_open.as_ref().map(|o| o.router_id.clone()),
            remote_capabilities: self
                .remote_open
                .as_ref()
                .map(|o| o.capabilities.clone())
                .unwrap_or_default(),
            established_since: self.established_at,
            session_confirmed: self.confirmed,
            statistics: self.statistics.clone(),
        }
    }

    /// Tear down the outbound side and forget everything learned from the
    /// peer. Reports the session going down when a reason is given.
    fn disconnect(&mut self, reason: Option<SessionDownReason>) {
        let had_connection = self.conn.take().is_some();
        self.established_at = None;
        self.confirmed = false;
        self.fsm.timers.stop_hold_timer();
        self.fsm.timers.stop_keepalive_timer();
        self.rib_in.clear();
        if let (true, Some(reason)) = (had_connection, reason) {
            let _ = self.server_tx.send(ServerOp::SessionDown {
                peer_id: self.id,
                asn: self.asn,
                reason,
            });
        }
    }

    /// Notify server of state change.
    fn notify_state_change(&self) {
        let _ = self.server_tx.send(ServerOp::PeerStateChanged {
            peer_id: self.id,
            asn: self.asn,
            state: self.fsm.state(),
        });
    }
}

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use crate::transport::{ChannelTransport, OutboundMessage};
    use std::time::Duration;

    pub const TEST_LOCAL_ASN: Asn = 65000;
    pub const TEST_PEER_ASN: Asn = 65001;

    pub struct TestPeer {
        pub peer: Peer,
        pub transport: Arc<ChannelTransport>,
        pub outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
        pub server_rx: mpsc::UnboundedReceiver<ServerOp>,
        pub peer_tx: mpsc::UnboundedSender<PeerOp>,
    }

    pub fn test_timers() -> SessionTimers {
        SessionTimers {
            keepalive_time: Duration::from_secs(30),
            hold_time: Duration::from_secs(90),
            connect_retry_time: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(1),
        }
    }

    /// Build a peer directly in `state`. Established peers get a live
    /// outbound connection backed by a ChannelTransport.
    pub fn create_test_peer_with_state(state: PeerState) -> TestPeer {
        let (transport, outbound_rx) = ChannelTransport::new();
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();

        let mut peer = Peer::new(
            1,
            TEST_PEER_ASN,
            "http://peer.test".to_string(),
            AutonomousSystem::new(TEST_LOCAL_ASN, "10.0.0.1"),
            test_timers(),
            transport.clone(),
            peer_rx,
            server_tx,
        );
        peer.fsm = Fsm::with_state(state, test_timers());
        if state == PeerState::Established {
            peer.open_connection();
            peer.fsm.timers.start_hold_timer();
            peer.fsm.timers.start_keepalive_timer();
        }

        TestPeer {
            peer,
            transport,
            outbound_rx,
            server_rx,
            peer_tx,
        }
    }
}
