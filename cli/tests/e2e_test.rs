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

//! End-to-end tests that execute the compiled CLI binary

use agentbgp::advertise::LocalAgentRecord;
use agentbgp::bgp::community::HealthStatus;
use agentbgp::config::Config;
use agentbgp::server::SessionManager;
use agentbgp::transport::ChannelTransport;
use std::process::{Command, Output};

fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_agentbgp"))
        .args(args)
        .output()
        .expect("Failed to execute command")
}

#[test]
fn test_cli_help() {
    let output = run_cli(&["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Agent route distribution CLI"));
    assert!(stdout.contains("peer"));
    assert!(stdout.contains("discover"));
}

#[test]
fn test_cli_version() {
    let output = run_cli(&["--version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("agentbgp"));
}

#[test]
fn test_peer_help() {
    let output = run_cli(&["peer", "--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Peer session commands"));
    assert!(stdout.contains("list"));
    assert!(stdout.contains("show"));
    assert!(stdout.contains("routes"));
}

#[test]
fn test_unreachable_daemon_fails() {
    let output = run_cli(&["--addr", "http://127.0.0.1:9", "--timeout", "1", "stats"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to execute command"), "{}", stderr);
}

#[tokio::test]
async fn test_commands_against_running_daemon() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("http://{}", listener.local_addr().unwrap());

    let config = Config::new(65000, "10.0.0.1", "127.0.0.1:0");
    let (transport, _outbound_rx) = ChannelTransport::new();
    let manager = SessionManager::start(&config, transport).unwrap();
    manager
        .set_local_agents(vec![LocalAgentRecord::new(
            "search",
            ["web"],
            HealthStatus::Healthy,
        )])
        .await
        .unwrap();
    tokio::spawn(agentbgp::api::serve(listener, manager.clone()));

    let cases: Vec<(Vec<&str>, &str)> = vec![
        (vec!["stats"], "Local agents: 1"),
        (vec!["agents"], "search"),
        (vec!["peer", "list"], "No peers configured"),
        (vec!["routes"], "No reachable agents"),
        (vec!["discover", "--capability", "web"], "No agents offer web"),
    ];
    for (args, expected) in cases {
        let mut full = vec!["--addr", addr.as_str()];
        full.extend(args.iter().copied());
        let full: Vec<String> = full.into_iter().map(String::from).collect();

        let output = tokio::task::spawn_blocking(move || {
            Command::new(env!("CARGO_BIN_EXE_agentbgp"))
                .args(&full)
                .output()
                .expect("Failed to execute command")
        })
        .await
        .unwrap();

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(output.status.success(), "{:?}: {}", args, String::from_utf8_lossy(&output.stderr));
        assert!(stdout.contains(expected), "{:?}: {}", args, stdout);
    }
}
