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

//! Local agent inventory and the UPDATEs it produces.
//!
//! The manager only computes deltas. Fan-out to established peers is done by
//! the server, which owns the peer registry.

use crate::bgp::community::HealthStatus;
use crate::bgp::msg_update::UpdateMessage;
use crate::log::{debug, info};
use crate::peer::PeerState;
use crate::rib::{AgentRoute, DEFAULT_LOCAL_PREF};
use crate::types::{AgentId, AutonomousSystem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// An agent hosted on this speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalAgentRecord {
    #[serde(alias = "agent_id")]
    pub agent_id: AgentId,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default, alias = "health_status")]
    pub health_status: HealthStatus,
    /// Extra attributes copied onto the advertised route.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl LocalAgentRecord {
    pub fn new<I, S>(agent_id: impl Into<AgentId>, capabilities: I, health_status: HealthStatus) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LocalAgentRecord {
            agent_id: agent_id.into(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            health_status,
            attributes: BTreeMap::new(),
        }
    }
}

struct LocalEntry {
    record: LocalAgentRecord,
    /// When this version of the record was originated
    origin_time: DateTime<Utc>,
}

pub struct AdvertisementManager {
    local: AutonomousSystem,
    next_hop: String,
    agents: BTreeMap<AgentId, LocalEntry>,
}

/// Only established sessions the remote has confirmed receive UPDATEs.
/// Before confirmation the remote may still be connecting and would drop them.
pub fn should_advertise_to_peer(peer_state: PeerState, confirmed: bool) -> bool {
    peer_state == PeerState::Established && confirmed
}

impl AdvertisementManager {
    pub fn new(local: AutonomousSystem, next_hop: impl Into<String>) -> Self {
        AdvertisementManager {
            local,
            next_hop: next_hop.into(),
            agents: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Current inventory, ordered by agent id.
    pub fn get_local_agents(&self) -> Vec<LocalAgentRecord> {
        self.agents.values().map(|e| e.record.clone()).collect()
    }

    /// Replace the whole inventory. Returns the delta, or None when nothing
    /// changed. Duplicate ids in `records`: the last one wins.
    pub fn set_local_agents(&mut self, records: Vec<LocalAgentRecord>) -> Option<UpdateMessage> {
        let mut incoming: BTreeMap<AgentId, LocalAgentRecord> = BTreeMap::new();
        for record in records {
            incoming.insert(record.agent_id.clone(), record);
        }

        let withdrawn: Vec<AgentId> = self
            .agents
            .keys()
            .filter(|id| !incoming.contains_key(*id))
            .cloned()
            .collect();
        for agent_id in &withdrawn {
            self.agents.remove(agent_id);
        }

        let mut advertised = Vec::new();
        for (_, record) in incoming {
            if let Some(route) = self.apply(record) {
                advertised.push(route);
            }
        }

        self.build_update(advertised, withdrawn)
    }

    /// Add or change one agent. Any change re-advertises the whole record.
    pub fn upsert_agent(&mut self, record: LocalAgentRecord) -> Option<UpdateMessage> {
        let route = self.apply(record)?;
        self.build_update(vec![route], Vec::new())
    }

    /// Convenience for health transitions reported by a backend.
    pub fn set_health(&mut self, agent_id: &str, health: HealthStatus) -> Option<UpdateMessage> {
        let mut record = self.agents.get(agent_id)?.record.clone();
        record.health_status = health;
        self.upsert_agent(record)
    }

    pub fn remove_agent(&mut self, agent_id: &str) -> Option<UpdateMessage> {
        self.agents.remove(agent_id)?;
        Some(UpdateMessage::new_withdraw(
            self.local.asn,
            vec![agent_id.to_string()],
        ))
    }

    /// Everything we originate, for a session that just came up.
    pub fn full_update(&self) -> Option<UpdateMessage> {
        let routes = self
            .agents
            .values()
            .map(|entry| self.build_route(entry))
            .collect();
        self.build_update(routes, Vec::new())
    }

    /// Store `record` if it differs from what we have. Returns the route to
    /// advertise for it.
    fn apply(&mut self, record: LocalAgentRecord) -> Option<AgentRoute> {
        if let Some(existing) = self.agents.get(&record.agent_id) {
            if existing.record == record {
                debug!(agent_id = %record.agent_id, "local agent unchanged");
                return None;
            }
        }
        info!(agent_id = %record.agent_id, health = %record.health_status,
            "local agent changed, re-advertising");
        let entry = LocalEntry {
            record,
            origin_time: Utc::now(),
        };
        let route = self.build_route(&entry);
        self.agents.insert(entry.record.agent_id.clone(), entry);
        Some(route)
    }

    fn build_route(&self, entry: &LocalEntry) -> AgentRoute {
        let record = &entry.record;
        let mut communities = BTreeSet::new();
        communities.insert(record.health_status.to_community());
        AgentRoute {
            agent_id: record.agent_id.clone(),
            capabilities: record.capabilities.clone(),
            as_path: vec![self.local.asn],
            next_hop: self.next_hop.clone(),
            local_pref: DEFAULT_LOCAL_PREF,
            med: 0,
            communities,
            origin_time: entry.origin_time,
            path_attributes: record.attributes.clone(),
        }
    }

    fn build_update(
        &self,
        advertised: Vec<AgentRoute>,
        withdrawn: Vec<AgentId>,
    ) -> Option<UpdateMessage> {
        let update = UpdateMessage::new(self.local.asn, advertised, withdrawn);
        if update.is_empty() {
            None
        } else {
            Some(update)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> AdvertisementManager {
        AdvertisementManager::new(AutonomousSystem::new(65000, "10.0.0.1"), "http://local:8179")
    }

    fn record(id: &str, health: HealthStatus) -> LocalAgentRecord {
        LocalAgentRecord::new(id, ["search"], health)
    }

    fn ids(update: &UpdateMessage) -> Vec<&str> {
        update.advertised_ids().collect()
    }

    #[test]
    fn test_set_local_agents_delta() {
        let mut mgr = manager();
        let update = mgr
            .set_local_agents(vec![
                record("a", HealthStatus::Healthy),
                record("b", HealthStatus::Healthy),
            ])
            .unwrap();
        assert_eq!(ids(&update), vec!["a", "b"]);
        assert!(update.withdrawn_routes.is_empty());
        assert_eq!(update.sender_asn, 65000);

        // b removed, c added, a unchanged
        let update = mgr
            .set_local_agents(vec![
                record("a", HealthStatus::Healthy),
                record("c", HealthStatus::Healthy),
            ])
            .unwrap();
        assert_eq!(ids(&update), vec!["c"]);
        assert_eq!(update.withdrawn_routes, vec!["b".to_string()]);

        // Nothing changed
        assert!(mgr
            .set_local_agents(vec![
                record("a", HealthStatus::Healthy),
                record("c", HealthStatus::Healthy),
            ])
            .is_none());
        assert_eq!(mgr.len(), 2);
    }

    #[test]
    fn test_health_change_readvertises_record() {
        let mut mgr = manager();
        mgr.upsert_agent(record("a", HealthStatus::Healthy)).unwrap();

        let update = mgr.set_health("a", HealthStatus::Unhealthy).unwrap();
        let route = &update.advertised_routes[0];
        assert_eq!(route.agent_id, "a");
        assert!(route.has_capability("search"));
        assert_eq!(route.health(), HealthStatus::Unhealthy);

        assert!(mgr.set_health("a", HealthStatus::Unhealthy).is_none());
        assert!(mgr.set_health("missing", HealthStatus::Healthy).is_none());
    }

    #[test]
    fn test_capability_change_readvertises_record() {
        let mut mgr = manager();
        mgr.upsert_agent(record("a", HealthStatus::Healthy)).unwrap();
        let changed = LocalAgentRecord::new("a", ["search", "summarize"], HealthStatus::Healthy);
        let update = mgr.upsert_agent(changed).unwrap();
        assert_eq!(update.advertised_routes[0].capabilities.len(), 2);
    }

    #[test]
    fn test_remove_agent() {
        let mut mgr = manager();
        mgr.upsert_agent(record("a", HealthStatus::Healthy));
        let update = mgr.remove_agent("a").unwrap();
        assert!(update.advertised_routes.is_empty());
        assert_eq!(update.withdrawn_routes, vec!["a".to_string()]);
        assert!(mgr.remove_agent("a").is_none());
        assert!(mgr.full_update().is_none());
    }

    #[test]
    fn test_originated_route_shape() {
        let mut mgr = manager();
        mgr.upsert_agent(record("a", HealthStatus::Degraded));
        let update = mgr.full_update().unwrap();
        let route = &update.advertised_routes[0];
        assert_eq!(route.as_path, vec![65000]);
        assert_eq!(route.next_hop, "http://local:8179");
        assert_eq!(route.local_pref, DEFAULT_LOCAL_PREF);
        assert_eq!(route.med, 0);
        assert!(route.communities.contains("health:degraded"));
    }

    #[test]
    fn test_should_advertise_to_peer() {
        for state in PeerState::ALL {
            assert!(!should_advertise_to_peer(state, false));
            assert_eq!(
                should_advertise_to_peer(state, true),
                state == PeerState::Established
            );
        }
    }
}
