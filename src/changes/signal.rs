//! Cross-process wake-up signaling.
//!
//! Independent processes sharing a source name wake each other through a
//! shared namespace: publishing flips a sentinel value stored under the
//! name, and every other process watching that name re-runs its local
//! subscriptions. The value carries no data; only the mutation matters.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Called with the channel name when another process publishes on it.
pub type SignalHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Identifies one `subscribe` call so it can be undone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SignalToken(pub u64);

/// A best-effort wake-up channel between processes.
pub trait CrossProcessSignal: Send + Sync {
    /// Announce a mutation under `channel`.
    fn publish(&self, channel: &str);

    /// Watch `channel` for mutations published elsewhere.
    fn subscribe(&self, channel: &str, handler: SignalHandler) -> SignalToken;

    fn unsubscribe(&self, token: SignalToken);
}

/// Used when no shared namespace exists.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSignal;

impl CrossProcessSignal for NoopSignal {
    fn publish(&self, _channel: &str) {}

    fn subscribe(&self, _channel: &str, _handler: SignalHandler) -> SignalToken {
        SignalToken(0)
    }

    fn unsubscribe(&self, _token: SignalToken) {}
}

const SENTINEL_A: &str = "a";
const SENTINEL_B: &str = "b";

struct Listener {
    endpoint: u64,
    channel: String,
    handler: SignalHandler,
}

#[derive(Default)]
struct NamespaceInner {
    values: HashMap<String, &'static str>,
    listeners: HashMap<SignalToken, Listener>,
    next_token: u64,
    next_endpoint: u64,
}

/// In-memory shared namespace.
///
/// Each participating process takes its own [`NamespaceEndpoint`]. A publish
/// toggles the entry for the channel and wakes the listeners of every other
/// endpoint; the publisher's own listeners are not called.
#[derive(Clone, Default)]
pub struct SharedNamespace {
    inner: Arc<Mutex<NamespaceInner>>,
}

impl SharedNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the namespace as a new process.
    pub fn endpoint(&self) -> NamespaceEndpoint {
        let mut inner = self.inner.lock();
        inner.next_endpoint += 1;
        NamespaceEndpoint {
            id: inner.next_endpoint,
            inner: self.inner.clone(),
        }
    }

    /// Current sentinel stored under `channel`.
    pub fn value(&self, channel: &str) -> Option<&'static str> {
        self.inner.lock().values.get(channel).copied()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }
}

/// One process's view of a [`SharedNamespace`].
pub struct NamespaceEndpoint {
    id: u64,
    inner: Arc<Mutex<NamespaceInner>>,
}

impl CrossProcessSignal for NamespaceEndpoint {
    fn publish(&self, channel: &str) {
        let handlers: Vec<SignalHandler> = {
            let mut inner = self.inner.lock();
            let next = match inner.values.get(channel) {
                Some(&SENTINEL_A) => SENTINEL_B,
                _ => SENTINEL_A,
            };
            inner.values.insert(channel.to_string(), next);

            inner
                .listeners
                .values()
                .filter(|l| l.endpoint != self.id && l.channel == channel)
                .map(|l| l.handler.clone())
                .collect()
        };

        for handler in handlers {
            handler(channel);
        }
    }

    fn subscribe(&self, channel: &str, handler: SignalHandler) -> SignalToken {
        let mut inner = self.inner.lock();
        inner.next_token += 1;
        let token = SignalToken(inner.next_token);
        inner.listeners.insert(
            token,
            Listener {
                endpoint: self.id,
                channel: channel.to_string(),
                handler,
            },
        );
        token
    }

    fn unsubscribe(&self, token: SignalToken) {
        self.inner.lock().listeners.remove(&token);
    }
}
