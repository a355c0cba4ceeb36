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
use crate::types::AgentId;
use std::collections::HashMap;

/// Per-peer route table.
///
/// Stores routes received from a specific peer, one per agent id. A new
/// advertisement for an agent replaces the previous one.
pub struct RouteTable {
    routes: HashMap<AgentId, AgentRoute>,
}

impl RouteTable {
    pub fn new() -> Self {
        RouteTable {
            routes: HashMap::new(),
        }
    }

    /// Insert or replace. Returns the route it replaced, if any.
    pub fn add_route(&mut self, route: AgentRoute) -> Option<AgentRoute> {
        self.routes.insert(route.agent_id.clone(), route)
    }

    /// Remove a route. Absence is not an error.
    pub fn remove_route(&mut self, agent_id: &str) -> Option<AgentRoute> {
        self.routes.remove(agent_id)
    }

    pub fn get_route(&self, agent_id: &str) -> Option<&AgentRoute> {
        self.routes.get(agent_id)
    }

    /// All routes, ordered by agent id.
    pub fn get_all_routes(&self) -> Vec<AgentRoute> {
        let mut routes: Vec<AgentRoute> = self.routes.values().cloned().collect();
        routes.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        routes
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn clear(&mut self) {
        self.routes.clear();
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}
