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

use super::fsm::FsmEvent;
use super::Peer;
use crate::log::debug;
use std::time::Duration;

impl Peer {
    /// Handle Idle state - wait for a start op or the connect retry timer.
    /// Returns true if shutdown requested.
    pub(super) async fn handle_idle_state(&mut self) -> bool {
        let retry_in = self.fsm.timers.connect_retry_remaining();

        tokio::select! {
            op = self.peer_rx.recv() => {
                match op {
                    Some(op) => return self.handle_peer_op(op),
                    None => return true,
                }
            }
            _ = tokio::time::sleep(retry_in.unwrap_or(Duration::ZERO)), if retry_in.is_some() => {
                debug!(peer_asn = self.asn, "connect retry timer expired");
                self.try_process_event(&FsmEvent::ConnectRetryTimerExpires);
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::super::fsm::PeerState;
    use super::super::test_helpers::*;
    use super::super::PeerOp;
    use super::*;

    #[tokio::test]
    async fn test_idle_manual_start() {
        let mut test = create_test_peer_with_state(PeerState::Idle);
        test.peer_tx.send(PeerOp::ManualStart).unwrap();
        assert!(!test.peer.handle_idle_state().await);
        assert_eq!(test.peer.state(), PeerState::Connect);
    }

    #[tokio::test]
    async fn test_idle_retry_timer() {
        let mut test = create_test_peer_with_state(PeerState::Idle);
        test.peer.fsm.timers.connect_retry_time = Duration::from_millis(20);
        test.peer.fsm.timers.start_connect_retry();
        assert!(!test.peer.handle_idle_state().await);
        assert_eq!(test.peer.state(), PeerState::Connect);
    }

    #[tokio::test]
    async fn test_idle_shutdown() {
        let mut test = create_test_peer_with_state(PeerState::Idle);
        test.peer_tx.send(PeerOp::Shutdown).unwrap();
        assert!(test.peer.handle_idle_state().await);

        let mut test = create_test_peer_with_state(PeerState::Idle);
        drop(test.peer_tx);
        assert!(test.peer.handle_idle_state().await);
    }
}
