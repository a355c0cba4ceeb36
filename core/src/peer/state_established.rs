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
use crate::log::warn;
use crate::types::SessionError;

impl Peer {
    /// Handle Established state - serve ops and watch hold/keepalive timers.
    /// Returns true if shutdown requested.
    pub(super) async fn handle_established(&mut self) -> bool {
        let mut timer_interval = tokio::time::interval(self.fsm.timers.tick_interval());

        loop {
            tokio::select! {
                op = self.peer_rx.recv() => {
                    let Some(op) = op else {
                        return true;
                    };
                    if self.handle_peer_op(op) {
                        return true;
                    }
                }

                _ = timer_interval.tick() => {
                    if self.fsm.timers.hold_timer_expired() {
                        warn!(peer_asn = self.asn, error = %SessionError::HoldTimerExpired,
                            "no KEEPALIVE or UPDATE within hold time");
                        self.try_process_event(&FsmEvent::HoldTimerExpires);
                    } else if self.fsm.timers.keepalive_timer_expired() {
                        self.try_process_event(&FsmEvent::KeepaliveTimerExpires);
                    }
                }
            }

            if self.fsm.state() != PeerState::Established {
                return false;
            }
        }
    }
}
