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

use agentbgp::discovery::DiscoveredAgent;
use agentbgp::rib::AgentRoute;

pub mod global;
pub mod peer;

fn format_as_path(as_path: &[u32]) -> String {
    if as_path.is_empty() {
        return String::from("-");
    }
    as_path
        .iter()
        .map(|asn| asn.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn join_or_dash<'a>(items: impl Iterator<Item = &'a String>) -> String {
    let joined = items.map(String::as_str).collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        String::from("-")
    } else {
        joined
    }
}

pub(crate) fn format_route(route: &AgentRoute) {
    println!("    Agent:        {}", route.agent_id);
    println!("    AS Path:      {}", format_as_path(&route.as_path));
    println!("    Next Hop:     {}", route.next_hop);
    println!("    Local Pref:   {}", route.local_pref);
    println!("    MED:          {}", route.med);
    println!("    Originated:   {}", route.origin_time.to_rfc3339());
    println!("    Capabilities: {}", join_or_dash(route.capabilities.iter()));
    println!("    Communities:  {}", join_or_dash(route.communities.iter()));
}

pub(crate) fn format_agent(agent: &DiscoveredAgent) {
    println!("Agent: {}", agent.agent_id);
    println!("  Source:     AS{}", agent.source_asn);
    println!("  Via:        AS{}", agent.learned_from);
    println!("  Health:     {}", agent.health);
    println!("  Candidates: {}", agent.candidate_count);
    if agent.conflict {
        println!("  Conflict:   origins disagree");
    }
    format_route(&agent.route);
}
