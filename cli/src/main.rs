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
use clap::{Parser, Subcommand};
use std::time::Duration;

mod commands;

#[derive(Parser)]
#[command(name = "agentbgp")]
#[command(about = "Agent route distribution CLI", version)]
struct Cli {
    /// HTTP address of the daemon
    #[arg(long, default_value = "http://127.0.0.1:8179")]
    addr: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Peer session commands
    #[command(subcommand)]
    Peer(PeerCommands),

    /// Show session statistics
    Stats,

    /// Show the best route to every reachable agent
    Routes,

    /// List agents hosted by the daemon
    Agents,

    /// Show the best route and all candidates for one agent
    Find {
        /// Agent identifier
        agent_id: String,
    },

    /// List agents offering a capability
    Discover {
        /// Capability to look for
        #[arg(long)]
        capability: String,
        /// Include agents reported unhealthy or of unknown health
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum PeerCommands {
    /// List all peers
    List,

    /// Show one peer and its statistics
    Show {
        /// Peer ASN
        asn: u32,
    },

    /// List routes learned from a peer
    Routes {
        /// Peer ASN
        asn: u32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let facade = DiscoveryFacade::http_fallback(cli.addr.clone(), Duration::from_secs(cli.timeout))
        .map_err(|e| format!("Failed to create client for {}: {}", cli.addr, e))?;

    // Dispatch to command handlers
    commands::global::handle(&facade, cli.command)
        .await
        .map_err(|e| format!("Failed to execute command against {}: {}", cli.addr, e))?;

    Ok(())
}
