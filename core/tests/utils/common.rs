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

//! Common test utilities for session manager testing

#![allow(dead_code)]

use agentbgp::advertise::LocalAgentRecord;
use agentbgp::bgp::community::HealthStatus;
use agentbgp::bgp::msg::Message;
use agentbgp::bgp::msg_update::UpdateMessage;
use agentbgp::config::Config;
use agentbgp::peer::PeerState;
use agentbgp::rib::AgentRoute;
use agentbgp::server::{SessionEvent, SessionManager};
use agentbgp::transport::{ChannelTransport, HttpTransport, OutboundMessage};
use agentbgp::types::Asn;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tracing_subscriber::EnvFilter;

pub const LOCAL_ASN: Asn = 65000;

/// Initialize tracing for tests. Call at the start of each test.
/// Uses RUST_LOG env var, defaulting to debug for agentbgp only.
/// Safe to call multiple times - only first call takes effect.
pub fn init_test_logging() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "agentbgp=debug".to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// Config with timers short enough for tests. The hold time is long enough
/// that a session without inbound keepalives stays up for the test.
pub fn test_config(asn: Asn) -> Config {
    let mut config = Config::new(asn, &format!("10.0.0.{}", asn % 250), "127.0.0.1:0");
    config.hold_time_secs = 30;
    config.keepalive_secs = 10;
    config.connect_retry_secs = 1;
    config.handshake_timeout_secs = 1;
    config.request_timeout_secs = 2;
    config
}

/// A session manager whose peers talk through a ChannelTransport.
pub struct TestSpeaker {
    pub manager: SessionManager,
    pub transport: Arc<ChannelTransport>,
    pub outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

pub fn start_channel_speaker(config: Config) -> TestSpeaker {
    init_test_logging();
    let (transport, outbound_rx) = ChannelTransport::new();
    let manager = SessionManager::start(&config, transport.clone()).expect("valid config");
    TestSpeaker {
        manager,
        transport,
        outbound_rx,
    }
}

pub fn peer_address(asn: Asn) -> String {
    format!("http://as{}.test", asn)
}

/// A session manager serving its HTTP surface on an ephemeral port.
pub struct TestServer {
    pub manager: SessionManager,
    pub asn: Asn,
    /// Base URL of the HTTP surface
    pub address: String,
    api: JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.api.abort();
    }
}

pub async fn start_http_server(mut config: Config) -> TestServer {
    init_test_logging();

    // Bind first so the advertised address carries the real port.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    config.listen_addr = listener.local_addr().unwrap().to_string();
    config.advertise_address = Some(address.clone());

    let transport = HttpTransport::new(config.request_timeout()).unwrap();
    let manager = SessionManager::start(&config, Arc::new(transport)).expect("valid config");

    let api_manager = manager.clone();
    let api = tokio::spawn(async move {
        let _ = agentbgp::api::serve(listener, api_manager).await;
    });

    TestServer {
        manager,
        asn: config.asn,
        address,
        api,
    }
}

/// Register each server as the other's peer.
pub async fn peer_servers(a: &TestServer, b: &TestServer) {
    a.manager.add_peer(b.asn, b.address.clone()).await.unwrap();
    b.manager.add_peer(a.asn, a.address.clone()).await.unwrap();
}

pub fn agent(agent_id: &str, capabilities: &[&str], health: HealthStatus) -> LocalAgentRecord {
    LocalAgentRecord::new(agent_id, capabilities.iter().copied(), health)
}

/// A route originated by the last AS in `as_path`.
pub fn route(agent_id: &str, as_path: &[Asn]) -> AgentRoute {
    AgentRoute {
        agent_id: agent_id.to_string(),
        capabilities: BTreeSet::new(),
        as_path: as_path.to_vec(),
        next_hop: format!("http://as{}.test", as_path.last().copied().unwrap_or_default()),
        local_pref: 100,
        med: 0,
        communities: BTreeSet::new(),
        origin_time: Utc::now(),
        path_attributes: BTreeMap::new(),
    }
}

/// UPDATE from `sender` advertising `ids` as its own agents.
pub fn advertise(sender: Asn, ids: &[&str]) -> UpdateMessage {
    UpdateMessage::new(sender, ids.iter().map(|id| route(id, &[sender])).collect(), vec![])
}

/// Generic polling helper that retries until a condition is met
///
/// # Arguments
/// * `check` - Async function that returns true when condition is met
/// * `timeout_message` - Message to display if timeout occurs
/// * `max_iterations` - Maximum number of polling attempts
pub async fn poll_until_with_timeout<F, Fut>(check: F, timeout_message: &str, max_iterations: usize)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..max_iterations {
        if check().await {
            return;
        }
        sleep(Duration::from_millis(100)).await;
    }

    panic!("{}", timeout_message);
}

/// Generic polling helper that retries until a condition is met (default 10s timeout)
pub async fn poll_until<F, Fut>(check: F, timeout_message: &str)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    poll_until_with_timeout(check, timeout_message, 100).await;
}

/// Poll to verify a condition stays true for a duration.
/// Panics immediately if condition becomes false.
pub async fn poll_while<F, Fut>(check: F, duration: Duration, fail_message: &str)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < duration {
        assert!(check().await, "{}", fail_message);
        sleep(Duration::from_millis(100)).await;
    }
}

pub async fn peer_state(manager: &SessionManager, asn: Asn) -> Option<PeerState> {
    manager.get_peer(asn).await.unwrap().map(|p| p.state)
}

pub async fn poll_peer_state(manager: &SessionManager, asn: Asn, state: PeerState) {
    poll_until(
        || async { peer_state(manager, asn).await == Some(state) },
        &format!("timeout waiting for AS{} to reach {}", asn, state),
    )
    .await;
}

/// Register a channel peer and play the remote's part of the session: wait
/// for establishment, then confirm it with a KEEPALIVE.
pub async fn establish_peer(manager: &SessionManager, asn: Asn) {
    manager.add_peer(asn, peer_address(asn)).await.unwrap();
    poll_peer_state(manager, asn, PeerState::Established).await;
    manager.receive_keepalive(asn).await.unwrap();
    poll_until(
        || async {
            manager
                .get_peer(asn)
                .await
                .unwrap()
                .is_some_and(|p| p.session_confirmed)
        },
        &format!("timeout waiting for AS{} to confirm the session", asn),
    )
    .await;
}

pub async fn poll_route_ids(manager: &SessionManager, asn: Asn, expected: &[&str]) {
    poll_until(
        || async {
            let routes = manager.get_routes_from_peer(asn).await.unwrap();
            let mut ids: Vec<&str> = routes.iter().map(|r| r.agent_id.as_str()).collect();
            ids.sort();
            ids == expected
        },
        &format!("timeout waiting for routes {:?} from AS{}", expected, asn),
    )
    .await;
}

/// Next UPDATE handed to the transport, skipping keepalives.
pub async fn next_update(rx: &mut mpsc::UnboundedReceiver<OutboundMessage>) -> (Asn, UpdateMessage) {
    loop {
        let out = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout waiting for UPDATE")
            .expect("transport channel closed");
        if let Message::Update(update) = out.message {
            return (out.peer.asn, update);
        }
    }
}

/// Wait for the first event matching `pred`, skipping others.
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<SessionEvent>,
    wait: Duration,
    pred: F,
) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    timeout(wait, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timeout waiting for event")
}
