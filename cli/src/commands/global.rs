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

use agentbgp::facade::DiscoveryFacade;
use agentbgp::peer::PeerState;

use crate::Commands;

use super::{format_agent, format_route};

pub async fn handle(facade: &DiscoveryFacade, cmd: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        Commands::Peer(peer_cmd) => super::peer::handle(facade, peer_cmd).await?,

        Commands::Stats => {
            let stats = facade.stats().await?;
            println!("Peers:        {}", stats.peer_count);
            for state in PeerState::ALL {
                println!("  {:<11} {}", format!("{}:", state.as_str()), stats.in_state(state));
            }
            println!("Routes:       {}", stats.total_routes);
            println!("Local agents: {}", stats.local_agents);
        }

        Commands::Routes => {
            let view = facade.network_view().await?;

            if view.is_empty() {
                println!("No reachable agents");
            } else {
                for agent in view.agents.values() {
                    format_agent(agent);
                    println!();
                }
            }

            let conflicts = facade.conflicts().await?;
            for conflict in conflicts {
                let origins: Vec<String> = conflict.origins.iter().map(|a| format!("AS{}", a)).collect();
                println!("Conflict: {} originated by {}", conflict.agent_id, origins.join(", "));
            }
        }

        Commands::Agents => {
            let agents = facade.local_agents().await?;

            if agents.is_empty() {
                println!("No local agents");
            } else {
                println!("{:<30} {:<10} {}", "Agent", "Health", "Capabilities");
                println!("{}", "-".repeat(72));
                for agent in agents {
                    let caps: Vec<&str> = agent.capabilities.iter().map(String::as_str).collect();
                    println!("{:<30} {:<10} {}", agent.agent_id, agent.health_status.as_str(), caps.join(","));
                }
            }
        }

        Commands::Find { agent_id } => match facade.find_agent(&agent_id).await? {
            Some(agent) => {
                format_agent(&agent);
                let candidates = facade.candidates(&agent_id).await?;
                println!();
                println!("Candidates:");
                for (idx, candidate) in candidates.iter().enumerate() {
                    println!("  #{} via AS{}:", idx + 1, candidate.learned_from);
                    format_route(&candidate.route);
                }
            }
            None => eprintln!("Agent not found: {}", agent_id),
        },

        Commands::Discover { capability, all } => {
            let agents = facade.agents_with_capability(&capability, !all).await?;

            if agents.is_empty() {
                println!("No agents offer {}", capability);
            } else {
                for agent in agents {
                    println!(
                        "{:<30} AS{:<10} {:<10} {}",
                        agent.agent_id, agent.source_asn, agent.health.as_str(), agent.route.next_hop
                    );
                }
            }
        }
    }

    Ok(())
}
