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

//! Helper functions for route communities.
//!
//! Communities are free-form `key:value` tags attached to a route. The
//! `health` key carries the advertising agent's health so that receivers can
//! annotate discovered agents without an extra round trip.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const HEALTH_PREFIX: &str = "health:";

/// Health of a locally hosted agent as reported by its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    #[default]
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }

    /// The community string carried on routes, e.g. `health:healthy`.
    pub fn to_community(self) -> String {
        format!("{}{}", HEALTH_PREFIX, self.as_str())
    }

    /// First `health:` community wins; routes without one are `Unknown`.
    pub fn from_communities<'a, I>(communities: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        communities
            .into_iter()
            .find_map(|c| c.strip_prefix(HEALTH_PREFIX))
            .and_then(|status| status.parse().ok())
            .unwrap_or_default()
    }

    /// Whether an agent in this state should be offered to callers.
    pub fn is_reachable(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "healthy" => Ok(HealthStatus::Healthy),
            "degraded" => Ok(HealthStatus::Degraded),
            "unhealthy" => Ok(HealthStatus::Unhealthy),
            "unknown" => Ok(HealthStatus::Unknown),
            other => Err(format!("unknown health status: {}", other)),
        }
    }
}

/// True for communities this crate interprets itself.
pub fn is_well_known(community: &str) -> bool {
    community.starts_with(HEALTH_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_from_communities() {
        let cases: Vec<(Vec<&str>, HealthStatus)> = vec![
            (vec!["health:healthy"], HealthStatus::Healthy),
            (vec!["region:eu", "health:degraded"], HealthStatus::Degraded),
            (vec!["health:UNHEALTHY"], HealthStatus::Unhealthy),
            (vec!["health:bogus"], HealthStatus::Unknown),
            (vec!["region:eu"], HealthStatus::Unknown),
            (vec![], HealthStatus::Unknown),
        ];
        for (communities, expected) in cases {
            let owned: Vec<String> = communities.iter().map(|c| c.to_string()).collect();
            assert_eq!(
                HealthStatus::from_communities(&owned),
                expected,
                "communities: {:?}",
                communities
            );
        }
    }

    #[test]
    fn test_health_community_string() {
        assert_eq!(HealthStatus::Healthy.to_community(), "health:healthy");
        assert!(is_well_known(&HealthStatus::Degraded.to_community()));
        assert!(!is_well_known("region:eu"));
    }

    #[test]
    fn test_reachable() {
        assert!(HealthStatus::Healthy.is_reachable());
        assert!(HealthStatus::Degraded.is_reachable());
        assert!(!HealthStatus::Unhealthy.is_reachable());
        assert!(!HealthStatus::Unknown.is_reachable());
    }
}
