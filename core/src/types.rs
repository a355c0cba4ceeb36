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

//! Shared types used across modules

use serde::{Deserialize, Serialize};
use std::fmt;

/// Autonomous system number.
pub type Asn = u32;

/// Identifier of an agent advertised through the route exchange.
pub type AgentId = String;

/// The local speaker: one server or cluster of agents. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutonomousSystem {
    pub asn: Asn,
    pub router_id: String,
}

impl AutonomousSystem {
    pub fn new(asn: Asn, router_id: impl Into<String>) -> Self {
        AutonomousSystem {
            asn,
            router_id: router_id.into(),
        }
    }
}

/// Why an established session went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionDownReason {
    /// No KEEPALIVE or UPDATE arrived within the hold time.
    HoldTimerExpired,
    /// The peer was removed from the session manager.
    PeerDeConfigured,
    /// The session manager is shutting down.
    Shutdown,
}

impl fmt::Display for SessionDownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionDownReason::HoldTimerExpired => write!(f, "hold timer expired"),
            SessionDownReason::PeerDeConfigured => write!(f, "peer de-configured"),
            SessionDownReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Errors raised by the session manager and peer sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No peer is registered under the ASN.
    PeerNotFound(Asn),
    /// Peer registration was rejected.
    InvalidPeer(String),
    /// Local configuration cannot be used to start a speaker.
    InvalidConfig(String),
    /// Open exchange failed, timed out, or answered with the wrong ASN.
    HandshakeFailed(String),
    /// A route carried the local ASN in its path.
    LoopDetected { agent_id: AgentId, asn: Asn },
    /// Nothing arrived from the peer within the hold time.
    HoldTimerExpired,
    /// The session manager was shut down.
    ShutDown,
    /// The session manager task is no longer running.
    ServerGone,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::PeerNotFound(asn) => write!(f, "peer AS{} not found", asn),
            SessionError::InvalidPeer(msg) => write!(f, "invalid peer: {}", msg),
            SessionError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            SessionError::HandshakeFailed(msg) => write!(f, "handshake failed: {}", msg),
            SessionError::LoopDetected { agent_id, asn } => {
                write!(f, "loop detected: route for {} contains AS{}", agent_id, asn)
            }
            SessionError::HoldTimerExpired => write!(f, "hold timer expired"),
            SessionError::ShutDown => write!(f, "session manager is shut down"),
            SessionError::ServerGone => write!(f, "session manager is not running"),
        }
    }
}

impl std::error::Error for SessionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        let cases = [
            (SessionError::PeerNotFound(65001), "peer AS65001 not found"),
            (
                SessionError::LoopDetected {
                    agent_id: "weather".to_string(),
                    asn: 65000,
                },
                "loop detected: route for weather contains AS65000",
            ),
            (SessionError::HoldTimerExpired, "hold timer expired"),
            (SessionError::ShutDown, "session manager is shut down"),
        ];
        for (err, expected) in cases {
            assert_eq!(err.to_string(), expected);
        }
    }
}
