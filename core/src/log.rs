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

//! Logging helpers. Modules log through the `tracing` macros re-exported here
//! so that call sites read `use crate::log::{debug, info};`.

pub use tracing::{debug, error, info, trace, warn};

use tracing_subscriber::EnvFilter;

/// Default filter directive when neither `RUST_LOG` nor a level is configured.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Builds the filter used by the daemon. `RUST_LOG` wins over the configured level.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if level.is_empty() {
            DEFAULT_LOG_LEVEL
        } else {
            level
        };
        EnvFilter::new(format!("agentbgp={level},agentbgpd={level},warn"))
    })
}

/// Install a JSON subscriber on stdout. Returns false if a global subscriber
/// was already installed.
pub fn init_logging(level: &str) -> bool {
    tracing_subscriber::fmt()
        .json()
        .with_current_span(false)
        .with_target(true)
        .with_env_filter(env_filter(level))
        .try_init()
        .is_ok()
}
