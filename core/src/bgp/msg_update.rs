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

use crate::rib::AgentRoute;
use crate::types::{AgentId, Asn};
use serde::{Deserialize, Serialize};

/// Route exchange message: zero or more advertisements plus zero or more
/// withdrawals, applied advertisements first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessage {
    pub sender_asn: Asn,
    #[serde(default)]
    pub advertised_routes: Vec<AgentRoute>,
    #[serde(default)]
    pub withdrawn_routes: Vec<AgentId>,
}

impl UpdateMessage {
    pub fn new(
        sender_asn: Asn,
        advertised_routes: Vec<AgentRoute>,
        withdrawn_routes: Vec<AgentId>,
    ) -> Self {
        UpdateMessage {
            sender_asn,
            advertised_routes,
            withdrawn_routes,
        }
    }

    pub fn new_withdraw(sender_asn: Asn, withdrawn_routes: Vec<AgentId>) -> Self {
        Self::new(sender_asn, Vec::new(), withdrawn_routes)
    }

    pub fn is_empty(&self) -> bool {
        self.advertised_routes.is_empty() && self.withdrawn_routes.is_empty()
    }

    pub fn advertised_ids(&self) -> impl Iterator<Item = &str> {
        self.advertised_routes.iter().map(|r| r.agent_id.as_str())
    }
}
