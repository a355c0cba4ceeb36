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

//! Wire seam between peer sessions and remote speakers.
//!
//! The session engine never opens sockets itself. Each peer task hands its
//! open exchange and outbound messages to a [`PeerTransport`].

use crate::bgp::msg::{Message, MessageType};
use crate::bgp::msg_open::OpenMessage;
use crate::log::debug;
use crate::peer::UpdateOutcome;
use crate::types::Asn;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Where a peer lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEndpoint {
    pub asn: Asn,
    pub address: String,
}

#[derive(Debug)]
pub enum TransportError {
    Http(reqwest::Error),
    /// Remote answered with a non-success status.
    Status(u16),
    /// Remote refused the open exchange.
    Refused(String),
    /// Outbound channel is gone.
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Http(e) => write!(f, "http error: {}", e),
            TransportError::Status(code) => write!(f, "remote answered with status {}", code),
            TransportError::Refused(reason) => write!(f, "open refused: {}", reason),
            TransportError::Closed => write!(f, "transport closed"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Http(e)
    }
}

#[async_trait]
pub trait PeerTransport: Send + Sync + 'static {
    /// Run the open exchange: deliver our OPEN, return the remote's.
    async fn open(
        &self,
        peer: &PeerEndpoint,
        open: &OpenMessage,
    ) -> Result<OpenMessage, TransportError>;

    /// Deliver an UPDATE or KEEPALIVE.
    async fn send(&self, peer: &PeerEndpoint, message: &Message) -> Result<(), TransportError>;
}

/// JSON over HTTP. Messages are POSTed to `{address}/bgp/{open,update,keepalive}`.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(HttpTransport { client })
    }

    fn url(peer: &PeerEndpoint, path: &str) -> String {
        format!("{}{}", peer.address.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn open(
        &self,
        peer: &PeerEndpoint,
        open: &OpenMessage,
    ) -> Result<OpenMessage, TransportError> {
        let url = Self::url(peer, MessageType::Open.path());
        let response = self.client.post(url).json(open).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(response.json::<OpenMessage>().await?)
    }

    async fn send(&self, peer: &PeerEndpoint, message: &Message) -> Result<(), TransportError> {
        let url = Self::url(peer, message.kind().path());
        let request = match message {
            Message::Open(open) => self.client.post(url).json(open),
            Message::Update(update) => self.client.post(url).json(update),
            Message::Keepalive(keepalive) => self.client.post(url).json(keepalive),
        };
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        if let Message::Update(_) = message {
            match response.json::<UpdateOutcome>().await {
                Ok(outcome) if outcome.ignored => {
                    debug!(peer_asn = peer.asn, "remote ignored UPDATE, its session is not up yet");
                }
                Ok(outcome) if outcome.loops_detected > 0 => {
                    debug!(peer_asn = peer.asn, loops = outcome.loops_detected,
                        "remote dropped looped routes");
                }
                Ok(_) => {}
                Err(e) => debug!(peer_asn = peer.asn, error = %e, "unreadable UPDATE outcome"),
            }
        }
        Ok(())
    }
}

/// A message handed to [`ChannelTransport`].
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub peer: PeerEndpoint,
    pub message: Message,
}

/// How [`ChannelTransport`] answers open exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpenBehavior {
    /// Answer with an OPEN carrying the peer's configured ASN.
    Accept = 0,
    Refuse = 1,
    /// Never answer; the handshake timeout fires.
    Stall = 2,
}

impl OpenBehavior {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => OpenBehavior::Accept,
            1 => OpenBehavior::Refuse,
            _ => OpenBehavior::Stall,
        }
    }
}

/// Hands outbound messages to an mpsc channel, for hosts that carry the wire
/// themselves and for tests.
pub struct ChannelTransport {
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    open_behavior: AtomicU8,
}

impl ChannelTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let transport = ChannelTransport {
            outbound_tx,
            open_behavior: AtomicU8::new(OpenBehavior::Accept as u8),
        };
        (Arc::new(transport), outbound_rx)
    }

    pub fn set_open_behavior(&self, behavior: OpenBehavior) {
        self.open_behavior.store(behavior as u8, Ordering::SeqCst);
    }

    pub fn open_behavior(&self) -> OpenBehavior {
        OpenBehavior::from_u8(self.open_behavior.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl PeerTransport for ChannelTransport {
    async fn open(
        &self,
        peer: &PeerEndpoint,
        open: &OpenMessage,
    ) -> Result<OpenMessage, TransportError> {
        match self.open_behavior() {
            OpenBehavior::Accept => Ok(OpenMessage {
                asn: peer.asn,
                router_id: format!("as{}", peer.asn),
                hold_time_secs: open.hold_time_secs,
                capabilities: open.capabilities.clone(),
            }),
            OpenBehavior::Refuse => Err(TransportError::Refused(format!(
                "AS{} refused the session",
                peer.asn
            ))),
            OpenBehavior::Stall => std::future::pending().await,
        }
    }

    async fn send(&self, peer: &PeerEndpoint, message: &Message) -> Result<(), TransportError> {
        self.outbound_tx
            .send(OutboundMessage {
                peer: peer.clone(),
                message: message.clone(),
            })
            .map_err(|_| TransportError::Closed)
    }
}
