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
use agentbgp::peer::PeerInfo;

use crate::PeerCommands;

use super::format_route;

pub async fn handle(
    facade: &DiscoveryFacade,
    cmd: PeerCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        PeerCommands::List => {
            let peers = facade.peers().await?;

            if peers.is_empty() {
                println!("No peers configured");
            } else {
                println!("{:<10} {:<40} {:<12} {:<8}", "ASN", "Address", "State", "Routes");
                println!("{}", "-".repeat(72));

                for peer in peers {
                    println!(
                        "{:<10} {:<40} {:<12} {:<8}",
                        peer.asn, peer.address, peer.state.as_str(), peer.route_count
                    );
                }
            }
        }

        PeerCommands::Show { asn } => match facade.peer(asn).await? {
            Some(peer) => print_peer(&peer),
            None => eprintln!("Peer not found: AS{}", asn),
        },

        PeerCommands::Routes { asn } => {
            let routes = facade.peer_routes(asn).await?;

            if routes.is_empty() {
                println!("No routes from AS{}", asn);
            } else {
                for route in routes {
                    format_route(&route);
                    println!();
                }
            }
        }
    }

    Ok(())
}

fn print_peer(peer: &PeerInfo) {
    let stats = &peer.statistics;
    println!("Peer: AS{}", peer.asn);
    println!("  Address:     {}", peer.address);
    println!("  State:       {}", peer.state);
    println!(
        "  Router ID:   {}",
        peer.remote_router_id.as_deref().unwrap_or("-")
    );
    if let Some(since) = peer.established_since {
        println!("  Up Since:    {}", since.to_rfc3339());
    }
    println!("  Confirmed:   {}", if peer.session_confirmed { "yes" } else { "no" });
    println!("  Routes:      {}", peer.route_count);
    println!();
    println!("Statistics:");
    println!("  Handshakes:   {} ({} failed)", stats.handshake_attempts, stats.handshake_failures);
    println!("  Messages Sent:");
    println!("    KEEPALIVE:  {}", stats.keepalive_sent);
    println!("    UPDATE:     {}", stats.update_sent);
    println!("  Messages Received:");
    println!("    KEEPALIVE:  {}", stats.keepalive_received);
    println!("    UPDATE:     {} ({} ignored)", stats.update_received, stats.updates_ignored);
    println!("  Routes:");
    println!("    Received:   {}", stats.routes_received);
    println!("    Sent:       {}", stats.routes_sent);
    println!("    Withdrawn:  {}", stats.routes_withdrawn);
    println!("    Looped:     {}", stats.loops_detected);
    println!("    Rejected:   {}", stats.routes_rejected);
}
