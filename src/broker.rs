//! Subscriber Broker (spec §4.6): one-to-many fan-out of Hub events to
//! display clients.
//!
//! Each subscriber gets its own `tokio::sync::broadcast` channel. That
//! gives us the "bounded per-subscriber buffer, overflow drops the oldest,
//! never blocks the broadcast path" requirement from spec §5 for free —
//! a lagged subscriber is told how many messages it missed and resumes
//! from the oldest still-retained one, and `send` on the broker side never
//! awaits a slow reader.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::events::HubEvent;

const SUBSCRIBER_BUFFER: usize = 256;

struct Subscriber {
    id: Uuid,
    tx: broadcast::Sender<Arc<str>>,
    platform_filter: Option<String>,
    type_filter: Option<HashSet<String>>,
}

fn admits(sub: &Subscriber, event_platform: Option<&str>, event_type: &str) -> bool {
    let type_ok = sub.type_filter.as_ref().is_none_or(|f| f.contains(event_type));
    if !type_ok {
        return false;
    }
    match event_platform {
        None => true,
        Some(p) => sub.platform_filter.as_deref() == Some(p),
    }
}

/// Subscriber registration order is preserved in `subscribers` (a `Vec`,
/// not a map) so dispatch iterates in broker-registration order per spec
/// §4.6.
#[derive(Default)]
pub struct Broker {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Registers a new subscriber and, if given, replays a synthetic
    /// initial event to it before returning — so a late joiner never sees
    /// a gap before the live stream attaches (spec §9).
    pub fn subscribe(
        &self,
        platform_filter: Option<String>,
        type_filter: Option<HashSet<String>>,
        initial: Option<&HubEvent>,
    ) -> (Uuid, broadcast::Receiver<Arc<str>>) {
        let id = Uuid::new_v4();
        let (tx, rx) = broadcast::channel(SUBSCRIBER_BUFFER);
        if let Some(event) = initial {
            let json: Arc<str> = Arc::from(serde_json::to_string(event).unwrap_or_default());
            let _ = tx.send(json);
        }
        self.subscribers.lock().unwrap().push(Subscriber {
            id,
            tx,
            platform_filter,
            type_filter,
        });
        (id, rx)
    }

    pub fn unsubscribe(&self, id: Uuid) {
        self.subscribers.lock().unwrap().retain(|s| s.id != id);
    }

    /// Serializes the event once and writes to every matching subscriber,
    /// in registration order. A send failure (no live receiver) removes
    /// that subscriber.
    pub fn dispatch(&self, event: &HubEvent) {
        let json: Arc<str> = Arc::from(serde_json::to_string(event).unwrap_or_default());
        let event_type = event.event_type();
        let platform = event.platform();

        let mut subs = self.subscribers.lock().unwrap();
        subs.retain(|sub| {
            if !admits(sub, platform, event_type) {
                return true;
            }
            match sub.tx.send(json.clone()) {
                Ok(_) => true,
                Err(_) => {
                    debug!(subscriber = %sub.id, "dropping subscriber with no live receiver");
                    false
                }
            }
        });
    }
}
