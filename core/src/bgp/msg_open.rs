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

use crate::types::{Asn, AutonomousSystem};
use serde::{Deserialize, Serialize};

/// Capability advertised by every speaker built from this crate.
pub const CAP_AGENT_ROUTES: &str = "agent-routes";
/// Routes carry `health:<status>` communities.
pub const CAP_HEALTH_COMMUNITIES: &str = "health-communities";

/// Open exchange payload. Sent by the connecting side, answered by the
/// remote with its own OPEN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenMessage {
    pub asn: Asn,
    pub router_id: String,
    pub hold_time_secs: u64,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl OpenMessage {
    pub fn new(local: &AutonomousSystem, hold_time_secs: u64) -> Self {
        OpenMessage {
            asn: local.asn,
            router_id: local.router_id.clone(),
            hold_time_secs,
            capabilities: vec![
                CAP_AGENT_ROUTES.to_string(),
                CAP_HEALTH_COMMUNITIES.to_string(),
            ],
        }
    }

    /// Check a received OPEN against the ASN we expect on the other end.
    pub fn validate(&self, expected_asn: Asn) -> Result<(), String> {
        if self.asn == 0 {
            return Err("peer announced ASN 0".to_string());
        }
        if self.asn != expected_asn {
            return Err(format!(
                "peer announced AS{}, expected AS{}",
                self.asn, expected_asn
            ));
        }
        if self.router_id.is_empty() {
            return Err("peer announced an empty router id".to_string());
        }
        Ok(())
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}
