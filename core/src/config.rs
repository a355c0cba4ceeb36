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

use crate::advertise::LocalAgentRecord;
use crate::peer::SessionTimers;
use crate::types::{Asn, AutonomousSystem};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Peer configuration in YAML config file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    pub asn: Asn,
    /// Base URL of the remote speaker, e.g. `http://10.0.0.2:8179`.
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub asn: Asn,
    #[serde(default = "default_router_id")]
    pub router_id: String,
    /// HTTP listen address for the protocol endpoints and the fallback surface.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// URL remote speakers use to reach agents hosted here. Defaults to
    /// `http://{listen_addr}`.
    #[serde(default)]
    pub advertise_address: Option<String>,
    #[serde(default = "default_hold_time")]
    pub hold_time_secs: u64,
    #[serde(default = "default_keepalive_time")]
    pub keepalive_secs: u64,
    #[serde(default = "default_connect_retry_time")]
    pub connect_retry_secs: u64,
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
    /// Timeout for a single outbound HTTP request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
    #[serde(default)]
    pub local_agents: Vec<LocalAgentRecord>,
    /// Log level: "error", "warn", "info" (default), "debug"
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_router_id() -> String {
    "127.0.0.1".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8179".to_string()
}

fn default_hold_time() -> u64 {
    90
}

fn default_keepalive_time() -> u64 {
    30
}

fn default_connect_retry_time() -> u64 {
    30
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Create a new configuration
    pub fn new(asn: Asn, router_id: &str, listen_addr: &str) -> Self {
        Config {
            asn,
            router_id: router_id.to_string(),
            listen_addr: listen_addr.to_string(),
            ..Config::default()
        }
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the session manager cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.asn == 0 {
            return Err("asn must be non-zero".to_string());
        }
        if self.router_id.is_empty() {
            return Err("router_id must not be empty".to_string());
        }
        if self.hold_time_secs == 0 || self.keepalive_secs == 0 {
            return Err("hold_time_secs and keepalive_secs must be non-zero".to_string());
        }
        if self.keepalive_secs >= self.hold_time_secs {
            return Err(format!(
                "keepalive_secs ({}) must be less than hold_time_secs ({})",
                self.keepalive_secs, self.hold_time_secs
            ));
        }
        if let Some(peer) = self.peers.iter().find(|p| p.asn == self.asn) {
            return Err(format!("peer {} uses the local ASN", peer.address));
        }
        Ok(())
    }

    pub fn local_as(&self) -> AutonomousSystem {
        AutonomousSystem::new(self.asn, self.router_id.clone())
    }

    /// Next hop put on locally originated routes.
    pub fn advertise_address(&self) -> String {
        self.advertise_address
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.listen_addr))
    }

    pub fn timers(&self) -> SessionTimers {
        SessionTimers {
            keepalive_time: Duration::from_secs(self.keepalive_secs),
            hold_time: Duration::from_secs(self.hold_time_secs),
            connect_retry_time: Duration::from_secs(self.connect_retry_secs),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            asn: 65000,
            router_id: default_router_id(),
            listen_addr: default_listen_addr(),
            advertise_address: None,
            hold_time_secs: default_hold_time(),
            keepalive_secs: default_keepalive_time(),
            connect_retry_secs: default_connect_retry_time(),
            handshake_timeout_secs: default_handshake_timeout(),
            request_timeout_secs: default_request_timeout(),
            peers: Vec::new(),
            local_agents: Vec::new(),
            log_level: default_log_level(),
        }
    }
}
