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

pub mod advertise;
pub mod api;
pub mod bgp;
pub mod config;
pub mod discovery;
pub mod facade;
pub mod log;
pub mod peer;
pub mod rib;
pub mod server;
pub mod server_ops;
pub mod transport;
pub mod types;
