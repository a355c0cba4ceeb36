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

//! Route tables and best path selection.
//!
//! - RouteTable: per-peer input table of agent routes (owned by Peer)
//! - Path selection: stateless, run on demand over candidates from all peers

mod path;
pub mod rib_in;

pub use path::{select_best_index, select_best_route, AgentRoute, DEFAULT_LOCAL_PREF};
