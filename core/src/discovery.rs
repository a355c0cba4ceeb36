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

//! Network-wide view of reachable agents.
//!
//! Built from a snapshot of every peer's route table. The best route for an
//! agent is chosen on demand with the path selector.

use crate::bgp::community::HealthStatus;
use crate::rib::{select_best_index, AgentRoute};
use crate::server::PeerRoutes;
use crate::types::{AgentId, Asn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A route together with the peer it was learned from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRoute {
    pub learned_from: Asn,
    pub route: AgentRoute,
}

impl CandidateRoute {
    /// Originating AS, falling back to the peer for an empty path.
    pub fn source_asn(&self) -> Asn {
        self.route.origin_asn().unwrap_or(self.learned_from)
    }
}

/// Best route for one agent plus annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredAgent {
    pub agent_id: AgentId,
    pub route: AgentRoute,
    pub source_asn: Asn,
    pub learned_from: Asn,
    pub candidate_count: usize,
    /// Candidates disagree on the originating AS
    pub conflict: bool,
    pub health: HealthStatus,
}

impl DiscoveredAgent {
    pub fn has_capability(&self, capability: &str) -> bool {
        self.route.has_capability(capability)
    }

    pub fn is_reachable(&self) -> bool {
        self.health.is_reachable()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkView {
    pub agents: BTreeMap<AgentId, DiscoveredAgent>,
    pub computed_at: DateTime<Utc>,
}

impl NetworkView {
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn get(&self, agent_id: &str) -> Option<&DiscoveredAgent> {
        self.agents.get(agent_id)
    }

    /// Agents advertising `capability`, ordered by agent id.
    pub fn with_capability<'a>(
        &'a self,
        capability: &'a str,
    ) -> impl Iterator<Item = &'a DiscoveredAgent> + 'a {
        self.agents
            .values()
            .filter(move |agent| agent.has_capability(capability))
    }
}

/// The same agent originated by more than one AS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConflict {
    pub agent_id: AgentId,
    pub origins: BTreeSet<Asn>,
}

pub struct DiscoveryAggregator {
    /// Candidates per agent, in peer ASN order
    candidates: BTreeMap<AgentId, Vec<CandidateRoute>>,
}

impl DiscoveryAggregator {
    pub fn from_snapshot(mut snapshot: Vec<PeerRoutes>) -> Self {
        snapshot.sort_by_key(|p| p.peer_asn);

        let mut candidates: BTreeMap<AgentId, Vec<CandidateRoute>> = BTreeMap::new();
        for peer in snapshot {
            for route in peer.routes {
                candidates
                    .entry(route.agent_id.clone())
                    .or_default()
                    .push(CandidateRoute {
                        learned_from: peer.peer_asn,
                        route,
                    });
            }
        }
        DiscoveryAggregator { candidates }
    }

    pub fn network_view(&self) -> NetworkView {
        let agents = self
            .candidates
            .iter()
            .filter_map(|(agent_id, candidates)| {
                discover(candidates).map(|agent| (agent_id.clone(), agent))
            })
            .collect();
        NetworkView {
            agents,
            computed_at: Utc::now(),
        }
    }

    pub fn best_route(&self, agent_id: &str) -> Option<DiscoveredAgent> {
        self.candidates.get(agent_id).and_then(|c| discover(c))
    }

    /// Every route known for `agent_id`, in peer ASN order.
    pub fn candidates(&self, agent_id: &str) -> &[CandidateRoute] {
        self.candidates
            .get(agent_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn all_candidates(&self) -> &BTreeMap<AgentId, Vec<CandidateRoute>> {
        &self.candidates
    }

    pub fn conflicts(&self) -> Vec<AgentConflict> {
        self.candidates
            .iter()
            .filter_map(|(agent_id, candidates)| {
                let origins = origins(candidates);
                (origins.len() > 1).then(|| AgentConflict {
                    agent_id: agent_id.clone(),
                    origins,
                })
            })
            .collect()
    }
}

fn origins(candidates: &[CandidateRoute]) -> BTreeSet<Asn> {
    candidates.iter().map(CandidateRoute::source_asn).collect()
}

fn discover(candidates: &[CandidateRoute]) -> Option<DiscoveredAgent> {
    let idx = select_best_index(candidates.iter().map(|c| &c.route))?;
    let best = &candidates[idx];
    Some(DiscoveredAgent {
        agent_id: best.route.agent_id.clone(),
        source_asn: best.source_asn(),
        learned_from: best.learned_from,
        candidate_count: candidates.len(),
        conflict: origins(candidates).len() > 1,
        health: best.route.health(),
        route: best.route.clone(),
    })
}
