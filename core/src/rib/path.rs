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

use crate::bgp::community::HealthStatus;
use crate::types::{AgentId, Asn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// LOCAL_PREF given to locally originated routes and assumed when absent.
pub const DEFAULT_LOCAL_PREF: u32 = 100;

/// Reachability record for one agent as advertised by one peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRoute {
    pub agent_id: AgentId,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// ASNs traversed, the originating AS last.
    pub as_path: Vec<Asn>,
    /// Where to reach the agent, typically the origin's HTTP endpoint.
    pub next_hop: String,
    #[serde(default = "default_local_pref")]
    pub local_pref: u32,
    #[serde(default)]
    pub med: u32,
    #[serde(default)]
    pub communities: BTreeSet<String>,
    #[serde(default = "Utc::now")]
    pub origin_time: DateTime<Utc>,
    /// Opaque extension attributes, passed through untouched.
    #[serde(default)]
    pub path_attributes: BTreeMap<String, serde_json::Value>,
}

fn default_local_pref() -> u32 {
    DEFAULT_LOCAL_PREF
}

impl AgentRoute {
    /// ASN that originated the route (last entry of the AS path).
    pub fn origin_asn(&self) -> Option<Asn> {
        self.as_path.last().copied()
    }

    pub fn as_path_len(&self) -> usize {
        self.as_path.len()
    }

    pub fn contains_asn(&self, asn: Asn) -> bool {
        self.as_path.contains(&asn)
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus::from_communities(&self.communities)
    }

    /// Compare routes for best path selection.
    /// Returns Ordering::Greater if self is better (higher preference).
    pub fn best_path_cmp(&self, other: &Self) -> Ordering {
        // Step 1: highest LOCAL_PREF
        match self.local_pref.cmp(&other.local_pref) {
            Ordering::Equal => {}
            ord => return ord,
        }

        // Step 2: shortest AS path
        match other.as_path_len().cmp(&self.as_path_len()) {
            Ordering::Equal => {}
            ord => return ord,
        }

        // Step 3: lowest MED
        match other.med.cmp(&self.med) {
            Ordering::Equal => {}
            ord => return ord,
        }

        // Step 4: most recently originated
        self.origin_time.cmp(&other.origin_time)
    }
}

/// Index of the best route among `routes`, or None when empty.
///
/// Routes equal on every criterion keep the earliest one, so the result is a
/// pure function of the input order.
pub fn select_best_index<'a, I>(routes: I) -> Option<usize>
where
    I: IntoIterator<Item = &'a AgentRoute>,
{
    let mut best: Option<(usize, &AgentRoute)> = None;
    for (idx, route) in routes.into_iter().enumerate() {
        match best {
            Some((_, current)) if route.best_path_cmp(current) != Ordering::Greater => {}
            _ => best = Some((idx, route)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Best route among `routes`. See [`select_best_index`].
pub fn select_best_route(routes: &[AgentRoute]) -> Option<&AgentRoute> {
    select_best_index(routes).map(|idx| &routes[idx])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::create_test_route;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn route_with(f: impl FnOnce(&mut AgentRoute)) -> AgentRoute {
        let mut route = create_test_route("agent", &[65001]);
        route.origin_time = at(1_000);
        f(&mut route);
        route
    }

    #[test]
    fn test_local_pref_ordering() {
        let high = route_with(|r| r.local_pref = 200);
        let low = route_with(|r| r.local_pref = 100);
        assert_eq!(high.best_path_cmp(&low), Ordering::Greater);
        assert_eq!(low.best_path_cmp(&high), Ordering::Less);
    }

    #[test]
    fn test_as_path_length_ordering() {
        let short = route_with(|r| r.as_path = vec![65001]);
        let long = route_with(|r| r.as_path = vec![65002, 65001]);
        assert_eq!(short.best_path_cmp(&long), Ordering::Greater);
    }

    #[test]
    fn test_med_ordering() {
        let low = route_with(|r| r.med = 5);
        let high = route_with(|r| r.med = 50);
        assert_eq!(low.best_path_cmp(&high), Ordering::Greater);
    }

    #[test]
    fn test_origin_time_ordering() {
        let newer = route_with(|r| r.origin_time = at(2_000));
        let older = route_with(|r| r.origin_time = at(1_000));
        assert_eq!(newer.best_path_cmp(&older), Ordering::Greater);
    }

    #[test]
    fn test_local_pref_beats_path_length() {
        let preferred = route_with(|r| {
            r.local_pref = 200;
            r.as_path = vec![65003, 65002, 65001];
        });
        let short = route_with(|r| r.as_path = vec![65001]);
        assert_eq!(preferred.best_path_cmp(&short), Ordering::Greater);
    }

    #[test]
    fn test_select_best_route() {
        // Three candidates with local_pref [100, 200, 200]; the last two tie on
        // everything else, so the first of them wins.
        let candidates: Vec<AgentRoute> = [100, 200, 200]
            .iter()
            .enumerate()
            .map(|(i, pref)| {
                route_with(|r| {
                    r.local_pref = *pref;
                    r.next_hop = format!("http://peer{}", i);
                })
            })
            .collect();

        assert_eq!(select_best_index(&candidates), Some(1));
        let best = select_best_route(&candidates).unwrap();
        assert_eq!(best.local_pref, 200);
        assert_eq!(best.next_hop, "http://peer1");

        // Determinism: same input, same answer.
        for _ in 0..10 {
            assert_eq!(select_best_index(&candidates), Some(1));
        }
    }

    #[test]
    fn test_select_best_cases() {
        // (local_pref, as_path_len, med, origin_secs) per candidate, expected index
        let cases: Vec<(Vec<(u32, usize, u32, i64)>, Option<usize>)> = vec![
            (vec![], None),
            (vec![(100, 1, 0, 0)], Some(0)),
            (vec![(100, 2, 0, 0), (100, 1, 0, 0)], Some(1)),
            (vec![(100, 1, 10, 0), (100, 1, 5, 0), (100, 1, 5, 0)], Some(1)),
            (vec![(100, 1, 0, 10), (100, 1, 0, 30), (100, 1, 0, 20)], Some(1)),
            (vec![(100, 1, 0, 0), (100, 1, 0, 0)], Some(0)),
        ];
        for (specs, expected) in cases {
            let routes: Vec<AgentRoute> = specs
                .iter()
                .map(|(pref, len, med, secs)| {
                    route_with(|r| {
                        r.local_pref = *pref;
                        r.as_path = (0..*len as u32).map(|i| 65100 + i).collect();
                        r.med = *med;
                        r.origin_time = at(*secs);
                    })
                })
                .collect();
            assert_eq!(select_best_index(&routes), expected, "specs: {:?}", specs);
        }
    }

    #[test]
    fn test_route_accessors() {
        let route = route_with(|r| {
            r.as_path = vec![65003, 65002];
            r.communities.insert("health:degraded".to_string());
            r.capabilities.insert("search".to_string());
        });
        assert_eq!(route.origin_asn(), Some(65002));
        assert!(route.contains_asn(65002));
        assert!(!route.contains_asn(65001));
        assert!(route.has_capability("search"));
        assert_eq!(route.health(), HealthStatus::Degraded);
    }
}
