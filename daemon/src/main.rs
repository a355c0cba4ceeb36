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

use agentbgp::api;
use agentbgp::config::Config;
use agentbgp::log::{self, error, info, warn};
use agentbgp::server::SessionManager;
use agentbgp::transport::HttpTransport;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "agentbgpd")]
#[command(about = "Agent route distribution daemon", version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let (config, load_error) = match Config::from_file(&args.config) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e.to_string())),
    };

    log::init_logging(&config.log_level);
    if let Some(e) = load_error {
        warn!(path = %args.config, error = %e, "failed to load config, using defaults");
    }

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(listen_addr = %config.listen_addr, asn = config.asn, router_id = %config.router_id,
        advertise_address = %config.advertise_address(), "starting agentbgp daemon");

    let transport = HttpTransport::new(config.request_timeout())?;
    let manager = SessionManager::start(&config, Arc::new(transport))?;

    for peer in &config.peers {
        if let Err(e) = manager.add_peer(peer.asn, peer.address.clone()).await {
            error!(peer_asn = peer.asn, address = %peer.address, error = %e, "failed to add peer");
        }
    }
    if !config.local_agents.is_empty() {
        manager.set_local_agents(config.local_agents.clone()).await?;
    }

    tokio::select! {
        result = api::serve(listener, manager.clone()) => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }

    manager.shutdown().await?;
    Ok(())
}
