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

use super::fsm::{FsmEvent, PeerState};
use super::{Connection, Peer, PeerError, PeerOp};
use crate::bgp::msg::Message;
use crate::bgp::msg_keepalive::KeepaliveMessage;
use crate::bgp::msg_update::UpdateMessage;
use crate::log::{debug, info, warn};
use crate::server::ServerOp;
use crate::transport::PeerEndpoint;
use std::sync::Arc;
use tokio::sync::mpsc;

impl Peer {
    /// Spawn the writer task for a freshly established session.
    pub(super) fn open_connection(&mut self) {
        let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<(PeerEndpoint, Message)>();
        let transport = Arc::clone(&self.transport);
        let writer = tokio::spawn(async move {
            while let Some((endpoint, message)) = msg_rx.recv().await {
                if let Err(e) = transport.send(&endpoint, &message).await {
                    warn!(peer_asn = endpoint.asn, kind = %message.kind(), error = %e,
                        "failed to deliver message");
                }
            }
        });
        self.conn = Some(Connection { msg_tx, writer });
    }

    fn send_message(&self, message: Message) -> Result<(), PeerError> {
        let conn = self.conn.as_ref().ok_or(PeerError::NotConnected)?;
        conn.msg_tx
            .send((self.endpoint(), message))
            .map_err(|_| PeerError::ConnectionClosed)
    }

    pub(super) fn send_keepalive(&mut self) -> Result<(), PeerError> {
        self.send_message(Message::Keepalive(KeepaliveMessage::new(self.local.asn)))?;
        self.statistics.keepalive_sent += 1;
        self.fsm.timers.reset_keepalive_timer();
        let _ = self.server_tx.send(ServerOp::KeepaliveSent {
            peer_id: self.id,
            asn: self.asn,
        });
        Ok(())
    }

    pub(super) fn send_update(&mut self, mut update: UpdateMessage) -> Result<(), PeerError> {
        update.sender_asn = self.local.asn;
        let routes = update.advertised_routes.len() as u64;
        self.send_message(Message::Update(update))?;
        self.statistics.update_sent += 1;
        self.statistics.routes_sent += routes;
        Ok(())
    }

    /// First KEEPALIVE or UPDATE from the remote since establishment. Its side
    /// of the session is up, so from here on our UPDATEs are applied. Answers
    /// with a KEEPALIVE so the remote can confirm us in turn.
    pub(super) fn confirm_session(&mut self) {
        if self.confirmed || !self.fsm.is_established() {
            return;
        }
        self.confirmed = true;
        info!(peer_asn = self.asn, "session confirmed by remote");
        let _ = self.server_tx.send(ServerOp::SessionConfirmed {
            peer_id: self.id,
            asn: self.asn,
        });
        if let Err(e) = self.send_keepalive() {
            warn!(peer_asn = self.asn, error = %e, "failed to queue KEEPALIVE");
        }
    }

    /// The remote sent us an OPEN.
    fn handle_remote_open(&mut self) {
        match self.fsm.state() {
            PeerState::Idle => self.try_process_event(&FsmEvent::AutomaticStart),
            // Our own open exchange is in flight.
            PeerState::Connect | PeerState::Failed => {}
            PeerState::Established => {
                info!(peer_asn = self.asn, routes = self.rib_in.route_count(),
                    "remote reopened the session, dropping its routes");
                self.rib_in.clear();
                self.fsm.timers.reset_hold_timer();
                if self.confirmed {
                    self.confirmed = false;
                    let _ = self.server_tx.send(ServerOp::SessionReset {
                        peer_id: self.id,
                        asn: self.asn,
                    });
                }
            }
        }
    }

    /// Handle an operation that behaves the same in every state.
    /// Returns true if the peer task should stop.
    pub(super) fn handle_peer_op(&mut self, op: PeerOp) -> bool {
        match op {
            PeerOp::Shutdown => {
                self.try_process_event(&FsmEvent::ManualStop);
                return true;
            }
            PeerOp::ManualStart => {
                self.try_process_event(&FsmEvent::ManualStart);
            }
            PeerOp::AutomaticStart => {
                self.try_process_event(&FsmEvent::AutomaticStart);
            }
            PeerOp::RemoteOpened => self.handle_remote_open(),
            PeerOp::UpdateAddress(address) => {
                if address != self.address {
                    info!(peer_asn = self.asn, old = %self.address, new = %address,
                        "peer address updated");
                    self.address = address;
                }
            }
            PeerOp::ReceiveUpdate { update, response } => {
                let outcome = self.handle_update(update);
                let _ = response.send(outcome);
            }
            PeerOp::ReceiveKeepalive => {
                self.statistics.keepalive_received += 1;
                self.try_process_event(&FsmEvent::KeepaliveReceived);
                self.confirm_session();
            }
            PeerOp::SendUpdate(update) => {
                if self.fsm.state() != PeerState::Established {
                    debug!(peer_asn = self.asn, state = %self.fsm.state(),
                        "dropping outbound UPDATE, session not established");
                } else if let Err(e) = self.send_update(update) {
                    warn!(peer_asn = self.asn, error = %e, "failed to queue UPDATE");
                }
            }
            PeerOp::GetInfo(response) => {
                let _ = response.send(self.info());
            }
            PeerOp::GetRoutes(response) => {
                let _ = response.send(self.rib_in.get_all_routes());
            }
            PeerOp::GetStatistics(response) => {
                let _ = response.send(self.statistics.clone());
            }
        }
        false
    }
}
