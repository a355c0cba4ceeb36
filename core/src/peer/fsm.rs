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

//! This module implements the peer session FSM.
//!
//! The FSM is pure: `handle_event` only computes the next state. Timers,
//! route table cleanup and notifications are applied by the peer task based
//! on the transition.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Peer session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerState {
    Idle,
    Connect,
    Established,
    Failed,
}

impl PeerState {
    pub const ALL: [PeerState; 4] = [
        PeerState::Idle,
        PeerState::Connect,
        PeerState::Established,
        PeerState::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PeerState::Idle => "idle",
            PeerState::Connect => "connect",
            PeerState::Established => "established",
            PeerState::Failed => "failed",
        }
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session FSM events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmEvent {
    /// Peer was registered, start connecting now
    ManualStart,
    /// Peer was removed or the manager is stopping
    ManualStop,
    /// Remote opened towards us while we were idle
    AutomaticStart,
    ConnectRetryTimerExpires,
    /// Open exchange completed and the remote ASN matched
    HandshakeSucceeded,
    /// Open exchange failed, timed out or answered with the wrong ASN
    HandshakeFailed,
    /// Failure was recorded and the retry timer armed
    RetryArmed,
    HoldTimerExpires,
    KeepaliveTimerExpires,
    KeepaliveReceived,
    UpdateReceived,
}

/// Timer values shared by every session. Configuration constants, not
/// negotiated per peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimers {
    pub keepalive_time: Duration,
    pub hold_time: Duration,
    pub connect_retry_time: Duration,
    pub handshake_timeout: Duration,
}

impl Default for SessionTimers {
    fn default() -> Self {
        SessionTimers {
            keepalive_time: Duration::from_secs(30),
            hold_time: Duration::from_secs(90),
            connect_retry_time: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Session FSM timers
#[derive(Debug, Clone)]
pub struct FsmTimers {
    pub connect_retry_time: Duration,
    pub hold_time: Duration,
    pub keepalive_time: Duration,
    pub handshake_timeout: Duration,

    /// Last time ConnectRetry timer was started
    pub connect_retry_started: Option<Instant>,

    /// Last time Hold timer was started/reset
    pub hold_timer_started: Option<Instant>,

    /// Last time Keepalive timer was started/reset
    pub keepalive_timer_started: Option<Instant>,
}

impl FsmTimers {
    pub fn new(timers: SessionTimers) -> Self {
        FsmTimers {
            connect_retry_time: timers.connect_retry_time,
            hold_time: timers.hold_time,
            keepalive_time: timers.keepalive_time,
            handshake_timeout: timers.handshake_timeout,
            connect_retry_started: None,
            hold_timer_started: None,
            keepalive_timer_started: None,
        }
    }

    /// Check if ConnectRetry timer has expired
    pub fn connect_retry_expired(&self) -> bool {
        self.connect_retry_remaining() == Some(Duration::ZERO)
    }

    /// Time left on the ConnectRetry timer, None if it is not running.
    pub fn connect_retry_remaining(&self) -> Option<Duration> {
        self.connect_retry_started
            .map(|started| self.connect_retry_time.saturating_sub(started.elapsed()))
    }

    /// Check if Hold timer has expired
    pub fn hold_timer_expired(&self) -> bool {
        match self.hold_timer_started {
            Some(started) => started.elapsed() >= self.hold_time,
            None => false,
        }
    }

    /// Check if Keepalive timer has expired
    pub fn keepalive_timer_expired(&self) -> bool {
        match self.keepalive_timer_started {
            Some(started) => started.elapsed() >= self.keepalive_time,
            None => false,
        }
    }

    pub fn start_connect_retry(&mut self) {
        self.connect_retry_started = Some(Instant::now());
    }

    pub fn stop_connect_retry(&mut self) {
        self.connect_retry_started = None;
    }

    pub fn start_hold_timer(&mut self) {
        self.hold_timer_started = Some(Instant::now());
    }

    pub fn reset_hold_timer(&mut self) {
        self.hold_timer_started = Some(Instant::now());
    }

    pub fn stop_hold_timer(&mut self) {
        self.hold_timer_started = None;
    }

    pub fn start_keepalive_timer(&mut self) {
        self.keepalive_timer_started = Some(Instant::now());
    }

    pub fn reset_keepalive_timer(&mut self) {
        self.keepalive_timer_started = Some(Instant::now());
    }

    pub fn stop_keepalive_timer(&mut self) {
        self.keepalive_timer_started = None;
    }

    /// Poll interval for the hold/keepalive checks in Established. Short
    /// timers get a proportionally finer tick.
    pub fn tick_interval(&self) -> Duration {
        let finest = self.keepalive_time.min(self.hold_time) / 4;
        finest.clamp(Duration::from_millis(10), Duration::from_millis(500))
    }
}

impl Default for FsmTimers {
    fn default() -> Self {
        Self::new(SessionTimers::default())
    }
}

/// Peer session finite state machine
pub struct Fsm {
    state: PeerState,

    pub timers: FsmTimers,

    /// Consecutive failed handshakes since the last established session
    pub connect_retry_counter: u32,
}

impl Fsm {
    /// Create a new FSM in Idle state.
    pub fn new(timers: SessionTimers) -> Self {
        Fsm {
            state: PeerState::Idle,
            timers: FsmTimers::new(timers),
            connect_retry_counter: 0,
        }
    }

    /// Create a new FSM with a specific initial state (for testing)
    #[cfg(test)]
    pub fn with_state(state: PeerState, timers: SessionTimers) -> Self {
        Fsm {
            state,
            timers: FsmTimers::new(timers),
            connect_retry_counter: 0,
        }
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn reset_connect_retry_counter(&mut self) {
        self.connect_retry_counter = 0;
    }

    pub fn increment_connect_retry_counter(&mut self) {
        self.connect_retry_counter += 1;
    }

    /// Handle an event and return new state.
    pub fn handle_event(&mut self, event: &FsmEvent) -> PeerState {
        let new_state = match (&self.state, event) {
            // ===== Idle State =====
            (PeerState::Idle, FsmEvent::ManualStart)
            | (PeerState::Idle, FsmEvent::AutomaticStart)
            | (PeerState::Idle, FsmEvent::ConnectRetryTimerExpires) => PeerState::Connect,

            // ===== Connect State =====
            (PeerState::Connect, FsmEvent::HandshakeSucceeded) => PeerState::Established,
            (PeerState::Connect, FsmEvent::HandshakeFailed) => PeerState::Failed,
            (PeerState::Connect, FsmEvent::ManualStop) => PeerState::Idle,

            // ===== Failed State =====
            (PeerState::Failed, FsmEvent::RetryArmed)
            | (PeerState::Failed, FsmEvent::ManualStop) => PeerState::Idle,

            // ===== Established State =====
            (PeerState::Established, FsmEvent::ManualStop)
            | (PeerState::Established, FsmEvent::HoldTimerExpires) => PeerState::Idle,
            (PeerState::Established, FsmEvent::KeepaliveTimerExpires)
            | (PeerState::Established, FsmEvent::KeepaliveReceived)
            | (PeerState::Established, FsmEvent::UpdateReceived) => PeerState::Established,

            // Default: Invalid event for current state, stay in same state
            _ => self.state,
        };

        self.state = new_state;
        new_state
    }

    pub fn is_established(&self) -> bool {
        self.state == PeerState::Established
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fsm_in(state: PeerState) -> Fsm {
        Fsm::with_state(state, SessionTimers::default())
    }

    #[test]
    fn test_initial_state() {
        let fsm = Fsm::new(SessionTimers::default());
        assert_eq!(fsm.state(), PeerState::Idle);
        assert!(!fsm.is_established());
    }

    #[test]
    fn test_successful_session_establishment() {
        let mut fsm = Fsm::new(SessionTimers::default());
        assert_eq!(fsm.handle_event(&FsmEvent::ManualStart), PeerState::Connect);
        assert_eq!(
            fsm.handle_event(&FsmEvent::HandshakeSucceeded),
            PeerState::Established
        );
        assert!(fsm.is_established());
    }

    #[test]
    fn test_handshake_failure_handling() {
        let mut fsm = fsm_in(PeerState::Connect);
        assert_eq!(fsm.handle_event(&FsmEvent::HandshakeFailed), PeerState::Failed);
        assert_eq!(fsm.handle_event(&FsmEvent::RetryArmed), PeerState::Idle);
        assert_eq!(
            fsm.handle_event(&FsmEvent::ConnectRetryTimerExpires),
            PeerState::Connect
        );
    }

    #[test]
    fn test_hold_timer_expiry() {
        let mut fsm = fsm_in(PeerState::Established);
        assert_eq!(fsm.handle_event(&FsmEvent::HoldTimerExpires), PeerState::Idle);
    }

    #[test]
    fn test_all_valid_state_transitions() {
        let cases = [
            (PeerState::Idle, FsmEvent::ManualStart, PeerState::Connect),
            (PeerState::Idle, FsmEvent::AutomaticStart, PeerState::Connect),
            (PeerState::Idle, FsmEvent::ConnectRetryTimerExpires, PeerState::Connect),
            (PeerState::Connect, FsmEvent::HandshakeSucceeded, PeerState::Established),
            (PeerState::Connect, FsmEvent::HandshakeFailed, PeerState::Failed),
            (PeerState::Connect, FsmEvent::ManualStop, PeerState::Idle),
            (PeerState::Failed, FsmEvent::RetryArmed, PeerState::Idle),
            (PeerState::Failed, FsmEvent::ManualStop, PeerState::Idle),
            (PeerState::Established, FsmEvent::ManualStop, PeerState::Idle),
            (PeerState::Established, FsmEvent::HoldTimerExpires, PeerState::Idle),
            (PeerState::Established, FsmEvent::KeepaliveTimerExpires, PeerState::Established),
            (PeerState::Established, FsmEvent::KeepaliveReceived, PeerState::Established),
            (PeerState::Established, FsmEvent::UpdateReceived, PeerState::Established),
        ];
        for (from, event, to) in cases {
            let mut fsm = fsm_in(from);
            assert_eq!(fsm.handle_event(&event), to, "{:?} + {:?}", from, event);
            assert_eq!(fsm.state(), to);
        }
    }

    #[test]
    fn test_invalid_events_keep_state() {
        let cases = [
            (PeerState::Idle, FsmEvent::HandshakeSucceeded),
            (PeerState::Idle, FsmEvent::UpdateReceived),
            (PeerState::Idle, FsmEvent::HoldTimerExpires),
            (PeerState::Connect, FsmEvent::ManualStart),
            (PeerState::Connect, FsmEvent::UpdateReceived),
            (PeerState::Established, FsmEvent::ManualStart),
            (PeerState::Established, FsmEvent::AutomaticStart),
            (PeerState::Established, FsmEvent::HandshakeFailed),
            (PeerState::Failed, FsmEvent::HandshakeSucceeded),
        ];
        for (state, event) in cases {
            let mut fsm = fsm_in(state);
            assert_eq!(fsm.handle_event(&event), state, "{:?} + {:?}", state, event);
        }
    }

    #[test]
    fn test_connect_retry_counter() {
        let mut fsm = Fsm::new(SessionTimers::default());
        fsm.increment_connect_retry_counter();
        fsm.increment_connect_retry_counter();
        assert_eq!(fsm.connect_retry_counter, 2);
        fsm.reset_connect_retry_counter();
        assert_eq!(fsm.connect_retry_counter, 0);
    }

    #[test]
    fn test_timers() {
        let mut timers = FsmTimers::new(SessionTimers {
            keepalive_time: Duration::ZERO,
            hold_time: Duration::from_secs(3600),
            connect_retry_time: Duration::ZERO,
            handshake_timeout: Duration::from_secs(1),
        });
        assert!(!timers.hold_timer_expired());
        assert!(!timers.keepalive_timer_expired());
        assert_eq!(timers.connect_retry_remaining(), None);

        timers.start_hold_timer();
        timers.start_keepalive_timer();
        timers.start_connect_retry();
        assert!(!timers.hold_timer_expired());
        assert!(timers.keepalive_timer_expired());
        assert!(timers.connect_retry_expired());

        timers.stop_keepalive_timer();
        timers.stop_connect_retry();
        assert!(!timers.keepalive_timer_expired());
        assert!(!timers.connect_retry_expired());
    }

    #[test]
    fn test_tick_interval() {
        let timers = FsmTimers::default();
        assert_eq!(timers.tick_interval(), Duration::from_millis(500));

        let timers = FsmTimers::new(SessionTimers {
            keepalive_time: Duration::from_millis(100),
            hold_time: Duration::from_millis(300),
            ..SessionTimers::default()
        });
        assert_eq!(timers.tick_interval(), Duration::from_millis(25));
    }
}
