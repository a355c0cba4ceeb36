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
use super::{Peer, PeerError};
use crate::log::{debug, error, info, warn};
use crate::types::SessionDownReason;
use chrono::Utc;

impl Peer {
    /// Process an FSM event and apply the side effects of the transition.
    pub(super) fn process_event(&mut self, event: &FsmEvent) -> Result<(), PeerError> {
        let old_state = self.fsm.state();
        let new_state = self.fsm.handle_event(event);

        if old_state != new_state {
            debug!(peer_asn = self.asn, from = %old_state, to = %new_state, ?event,
                "state transition");
        }

        let result = match old_state {
            PeerState::Idle => {
                self.handle_idle_transitions(new_state, event);
                Ok(())
            }
            PeerState::Connect => {
                self.handle_connect_transitions(new_state, event);
                Ok(())
            }
            PeerState::Failed => {
                self.handle_failed_transitions(new_state, event);
                Ok(())
            }
            PeerState::Established => self.handle_established_transitions(new_state, event),
        };

        if old_state != new_state {
            self.notify_state_change();
        }
        result
    }

    /// Process an event, logging instead of propagating errors.
    pub(super) fn try_process_event(&mut self, event: &FsmEvent) {
        if let Err(e) = self.process_event(event) {
            error!(peer_asn = self.asn, ?event, error = %e, "error processing FSM event");
        }
    }

    fn handle_idle_transitions(&mut self, new_state: PeerState, event: &FsmEvent) {
        if new_state == PeerState::Connect {
            debug!(peer_asn = self.asn, ?event, "starting open exchange");
            self.fsm.timers.stop_connect_retry();
        }
    }

    fn handle_connect_transitions(&mut self, new_state: PeerState, event: &FsmEvent) {
        match (new_state, event) {
            (PeerState::Established, FsmEvent::HandshakeSucceeded) => {
                self.fsm.reset_connect_retry_counter();
                self.fsm.timers.start_hold_timer();
                self.fsm.timers.start_keepalive_timer();
                self.established_at = Some(Utc::now());
                self.open_connection();
                info!(peer_asn = self.asn, address = %self.address, "session established");
            }
            (PeerState::Failed, FsmEvent::HandshakeFailed) => {
                self.fsm.increment_connect_retry_counter();
                self.statistics.handshake_failures += 1;
            }
            _ => {}
        }
    }

    fn handle_failed_transitions(&mut self, new_state: PeerState, event: &FsmEvent) {
        if let (PeerState::Idle, FsmEvent::RetryArmed) = (new_state, event) {
            self.fsm.timers.start_connect_retry();
            debug!(peer_asn = self.asn, retry_in = ?self.fsm.timers.connect_retry_time,
                attempts = self.fsm.connect_retry_counter, "connect retry armed");
        }
    }

    fn handle_established_transitions(
        &mut self,
        new_state: PeerState,
        event: &FsmEvent,
    ) -> Result<(), PeerError> {
        match (new_state, event) {
            (PeerState::Idle, FsmEvent::ManualStop) => {
                self.disconnect(Some(SessionDownReason::PeerDeConfigured));
            }
            (PeerState::Idle, FsmEvent::HoldTimerExpires) => {
                warn!(peer_asn = self.asn, hold_time = ?self.fsm.timers.hold_time,
                    "hold timer expired, dropping session");
                self.disconnect(Some(SessionDownReason::HoldTimerExpired));
                self.fsm.timers.start_connect_retry();
            }
            (PeerState::Established, FsmEvent::KeepaliveTimerExpires) => {
                self.send_keepalive()?;
            }
            (PeerState::Established, FsmEvent::KeepaliveReceived)
            | (PeerState::Established, FsmEvent::UpdateReceived) => {
                self.fsm.timers.reset_hold_timer();
            }
            _ => {}
        }
        Ok(())
    }

    /// Failed is transient: record the failure and go back to Idle with the
    /// connect retry timer running.
    pub(super) fn handle_failed_state(&mut self) -> bool {
        self.try_process_event(&FsmEvent::RetryArmed);
        false
    }
}
