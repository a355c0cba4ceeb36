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

use super::msg_keepalive::KeepaliveMessage;
use super::msg_open::OpenMessage;
use super::msg_update::UpdateMessage;
use crate::types::Asn;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Open,
    Update,
    Keepalive,
}

impl MessageType {
    /// Path the message is POSTed to on the remote speaker.
    pub fn path(&self) -> &'static str {
        match self {
            MessageType::Open => "/bgp/open",
            MessageType::Update => "/bgp/update",
            MessageType::Keepalive => "/bgp/keepalive",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Open => write!(f, "OPEN"),
            MessageType::Update => write!(f, "UPDATE"),
            MessageType::Keepalive => write!(f, "KEEPALIVE"),
        }
    }
}

/// A protocol message exchanged between speakers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Open(OpenMessage),
    Update(UpdateMessage),
    Keepalive(KeepaliveMessage),
}

impl Message {
    pub fn kind(&self) -> MessageType {
        match self {
            Message::Open(_) => MessageType::Open,
            Message::Update(_) => MessageType::Update,
            Message::Keepalive(_) => MessageType::Keepalive,
        }
    }

    pub fn sender_asn(&self) -> Asn {
        match self {
            Message::Open(open) => open.asn,
            Message::Update(update) => update.sender_asn,
            Message::Keepalive(keepalive) => keepalive.sender_asn,
        }
    }
}
