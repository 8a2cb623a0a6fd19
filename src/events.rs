// Copyright 2025 Eric Jingryd (tidynest@proton.me)
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

//! Ban and block notifications
//!
//! Ledgers publish a [`SecurityEvent`] after every state change a session
//! layer must act on (disconnect a banned address, refuse a blocked user).
//! Observers register an [`EventSink`] on the shared [`EventBus`]; delivery
//! is synchronous, in publish order, before the mutating call returns.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

/// State change published by the ban ledger or the threat monitor
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SecurityEvent {
    /// An address was banned; its sessions must be disconnected
    #[serde(rename_all = "camelCase")]
    IpBanned {
        address: String,
        reason: String,
        permanent: bool,
        ban_count: u32,
        duration_hours: u32,
        banned_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    IpUnbanned { address: String, at: DateTime<Utc> },
    /// A violation was stored without reaching the ban threshold
    #[serde(rename_all = "camelCase")]
    ViolationRecorded {
        address: String,
        violations: usize,
        threshold: usize,
    },
    /// A user was blocked, automatically or by an administrator
    #[serde(rename_all = "camelCase")]
    UserBlocked {
        user_id: String,
        reason: String,
        at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    UserUnblocked { user_id: String, at: DateTime<Utc> },
}

/// Receives published events
pub trait EventSink: Send + Sync {
    fn handle(&self, event: &SecurityEvent);
}

impl<F> EventSink for F
where
    F: Fn(&SecurityEvent) + Send + Sync,
{
    fn handle(&self, event: &SecurityEvent) {
        self(event)
    }
}

/// Forwards events into an mpsc channel
///
/// A dropped receiver is not an error; the event is discarded.
pub struct ChannelSink {
    tx: Sender<SecurityEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<SecurityEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn handle(&self, event: &SecurityEvent) {
        let _ = self.tx.send(event.clone());
    }
}

/// Fan-out of events to every registered sink
#[derive(Clone, Default)]
pub struct EventBus {
    sinks: Arc<RwLock<Vec<Arc<dyn EventSink>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        self.sinks.write().push(sink);
    }

    /// Subscribes a channel and returns its receiving end
    ///
    /// ```
    /// use shellwarden::events::{EventBus, SecurityEvent};
    ///
    /// let bus = EventBus::new();
    /// let rx = bus.channel();
    /// bus.publish(SecurityEvent::ViolationRecorded {
    ///     address: "198.51.100.7".into(),
    ///     violations: 1,
    ///     threshold: 3,
    /// });
    /// assert!(matches!(rx.try_recv(), Ok(SecurityEvent::ViolationRecorded { .. })));
    /// ```
    pub fn channel(&self) -> Receiver<SecurityEvent> {
        let (tx, rx) = channel();
        self.subscribe(Arc::new(ChannelSink::new(tx)));
        rx
    }

    /// Delivers `event` to every sink in subscription order
    pub fn publish(&self, event: SecurityEvent) {
        // Sinks may subscribe further sinks; don't hold the lock while calling out
        let sinks: Vec<Arc<dyn EventSink>> = self.sinks.read().clone();
        for sink in sinks {
            sink.handle(&event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sinks.read().len()
    }
}
