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
use super::Peer;
use crate::bgp::msg_open::OpenMessage;
use crate::log::{info, warn};
use std::sync::Arc;

impl Peer {
    /// Handle Connect state - run the open exchange while still serving ops.
    /// Returns true if shutdown requested.
    pub(super) async fn handle_connect_state(&mut self) -> bool {
        self.statistics.handshake_attempts += 1;

        let endpoint = self.endpoint();
        let open = OpenMessage::new(&self.local, self.fsm.timers.hold_time.as_secs());
        let transport = Arc::clone(&self.transport);
        let handshake = tokio::time::timeout(self.fsm.timers.handshake_timeout, async move {
            transport.open(&endpoint, &open).await
        });
        tokio::pin!(handshake);

        loop {
            tokio::select! {
                // A finished handshake wins over an UPDATE racing in behind it.
                biased;

                result = &mut handshake => {
                    let event = match result {
                        Ok(Ok(remote)) => match remote.validate(self.asn) {
                            Ok(()) => {
                                info!(peer_asn = self.asn, router_id = %remote.router_id,
                                    "open exchange complete");
                                self.remote_open = Some(remote);
                                FsmEvent::HandshakeSucceeded
                            }
                            Err(reason) => {
                                warn!(peer_asn = self.asn, %reason, "open rejected");
                                FsmEvent::HandshakeFailed
                            }
                        },
                        Ok(Err(e)) => {
                            warn!(peer_asn = self.asn, address = %self.address, error = %e,
                                "open exchange failed");
                            FsmEvent::HandshakeFailed
                        }
                        Err(_) => {
                            warn!(peer_asn = self.asn, address = %self.address,
                                timeout = ?self.fsm.timers.handshake_timeout,
                                "open exchange timed out");
                            FsmEvent::HandshakeFailed
                        }
                    };
                    self.try_process_event(&event);
                    if self.fsm.is_established() {
                        // The remote confirms the session by answering this.
                        if let Err(e) = self.send_keepalive() {
                            warn!(peer_asn = self.asn, error = %e, "failed to queue KEEPALIVE");
                        }
                    }
                    return false;
                }

                op = self.peer_rx.recv() => {
                    let Some(op) = op else {
                        return true;
                    };
                    if self.handle_peer_op(op) {
                        return true;
                    }
                    if self.fsm.state() != PeerState::Connect {
                        return false;
                    }
                }
            }
        }
    }
}
