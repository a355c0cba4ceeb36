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
use super::{Peer, UpdateOutcome};
use crate::bgp::msg_update::UpdateMessage;
use crate::log::{debug, info, warn};
use crate::rib::AgentRoute;
use crate::types::{AgentId, SessionError};

impl Peer {
    /// Handle an UPDATE from this peer. Only an established session mutates
    /// the route table; anything else is counted and ignored.
    pub(super) fn handle_update(&mut self, update: UpdateMessage) -> UpdateOutcome {
        self.statistics.update_received += 1;

        if !self.fsm.is_established() {
            self.statistics.updates_ignored += 1;
            debug!(peer_asn = self.asn, state = %self.fsm.state(),
                "ignoring UPDATE, session not established");
            return UpdateOutcome::ignored();
        }

        self.try_process_event(&FsmEvent::UpdateReceived);
        self.confirm_session();

        let mut outcome = self.process_announcements(update.advertised_routes);
        outcome.withdrawn = self.process_withdrawals(&update.withdrawn_routes);
        outcome
    }

    /// Process withdrawn agent ids. Unknown ids are not an error.
    fn process_withdrawals(&mut self, withdrawn: &[AgentId]) -> usize {
        let mut count = 0;
        for agent_id in withdrawn {
            if self.rib_in.remove_route(agent_id).is_some() {
                info!(peer_asn = self.asn, %agent_id, "withdrawing route");
                count += 1;
            } else {
                debug!(peer_asn = self.asn, %agent_id, "withdrawal for unknown route");
            }
        }
        self.statistics.routes_withdrawn += count as u64;
        count
    }

    fn process_announcements(&mut self, routes: Vec<AgentRoute>) -> UpdateOutcome {
        let mut outcome = UpdateOutcome::default();
        let local_asn = self.local.asn;

        for route in routes {
            if route.agent_id.is_empty() {
                warn!(peer_asn = self.asn, "rejecting route without agent id");
                self.statistics.routes_rejected += 1;
                outcome.rejected += 1;
                continue;
            }

            if route.contains_asn(local_asn) {
                let error = SessionError::LoopDetected {
                    agent_id: route.agent_id.clone(),
                    asn: local_asn,
                };
                warn!(peer_asn = self.asn, as_path = ?route.as_path, %error, "dropping route");
                self.statistics.loops_detected += 1;
                outcome.loops_detected += 1;
                continue;
            }

            info!(peer_asn = self.asn, agent_id = %route.agent_id, as_path = ?route.as_path,
                local_pref = route.local_pref, "adding route to route table");
            self.rib_in.add_route(route);
            self.statistics.routes_received += 1;
            outcome.accepted += 1;
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::super::fsm::PeerState;
    use super::super::test_helpers::*;
    use crate::bgp::msg_update::UpdateMessage;
    use crate::test_helpers::create_test_route;

    #[tokio::test]
    async fn test_update_ignored_outside_established() {
        for state in [PeerState::Idle, PeerState::Connect, PeerState::Failed] {
            let mut test = create_test_peer_with_state(state);
            let update = UpdateMessage::new(
                TEST_PEER_ASN,
                vec![create_test_route("search", &[TEST_PEER_ASN])],
                vec![],
            );
            let outcome = test.peer.handle_update(update);
            assert!(outcome.ignored, "state {:?}", state);
            assert!(test.peer.rib_in.is_empty());
            assert_eq!(test.peer.statistics.updates_ignored, 1);
            assert_eq!(test.peer.statistics.routes_received, 0);
        }
    }

    #[tokio::test]
    async fn test_handle_update() {
        // (advertised (agent, as_path), withdrawn, expected table, accepted, withdrawn, loops)
        type Case<'a> = (Vec<(&'a str, Vec<u32>)>, Vec<&'a str>, Vec<&'a str>, usize, usize, usize);
        let cases: Vec<Case> = vec![
            (vec![("a", vec![TEST_PEER_ASN])], vec![], vec!["a"], 1, 0, 0),
            (vec![("a", vec![TEST_PEER_ASN]), ("b", vec![TEST_PEER_ASN, 65010])], vec![], vec!["a", "b"], 2, 0, 0),
            // Local ASN in path
            (vec![("a", vec![TEST_PEER_ASN, TEST_LOCAL_ASN])], vec![], vec![], 0, 0, 1),
            // Withdrawal of an unknown id is not an error
            (vec![], vec!["ghost"], vec![], 0, 0, 0),
            // Advertise then withdraw in the same message
            (vec![("a", vec![TEST_PEER_ASN])], vec!["a"], vec![], 1, 1, 0),
            // Empty agent id
            (vec![("", vec![TEST_PEER_ASN])], vec![], vec![], 0, 0, 0),
        ];

        for (advertised, withdrawn, expected, accepted, withdrawn_count, loops) in cases {
            let mut test = create_test_peer_with_state(PeerState::Established);
            let routes = advertised
                .iter()
                .map(|(id, path)| create_test_route(id, path))
                .collect();
            let update = UpdateMessage::new(
                TEST_PEER_ASN,
                routes,
                withdrawn.iter().map(|s| s.to_string()).collect(),
            );

            let outcome = test.peer.handle_update(update);
            let ids: Vec<String> = test
                .peer
                .rib_in
                .get_all_routes()
                .into_iter()
                .map(|r| r.agent_id)
                .collect();
            assert_eq!(ids, expected, "advertised {:?}", advertised);
            assert_eq!(outcome.accepted, accepted);
            assert_eq!(outcome.withdrawn, withdrawn_count);
            assert_eq!(outcome.loops_detected, loops);
            assert_eq!(test.peer.statistics.loops_detected, loops as u64);
            assert!(!outcome.ignored);
        }
    }

    #[tokio::test]
    async fn test_readvertise_replaces() {
        let mut test = create_test_peer_with_state(PeerState::Established);
        for path in [vec![TEST_PEER_ASN, 65010], vec![TEST_PEER_ASN]] {
            let update = UpdateMessage::new(TEST_PEER_ASN, vec![create_test_route("a", &path)], vec![]);
            test.peer.handle_update(update);
        }
        let routes = test.peer.rib_in.get_all_routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].as_path, vec![TEST_PEER_ASN]);
        assert_eq!(test.peer.statistics.routes_received, 2);
    }
}
