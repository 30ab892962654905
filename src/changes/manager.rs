//! Change-feed multiplexer: single-flight, coalesced runs per subscription.

use crate::error::RelayError;
use crate::store::DocumentStore;
use crate::types::{stub_attachments, ChangeEvent, ChangesOptions, Document};
use futures::StreamExt;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use super::signal::{CrossProcessSignal, NoopSignal, SignalHandler, SignalToken};
use super::types::{
    FilterRequest, RunState, SubscriptionConfig, SubscriptionHandle, SubscriptionShared,
};

/// Internal subscription state.
struct Subscription {
    id: String,
    store: Arc<dyn DocumentStore>,
    config: SubscriptionConfig,
    request: FilterRequest,
    shared: Arc<SubscriptionShared>,
}

impl Subscription {
    /// Start a run, or coalesce into the one in flight.
    fn trigger(self: &Arc<Self>) {
        if self.shared.is_cancelled() {
            return;
        }

        {
            let mut state = self.shared.run_state.lock();
            match *state {
                RunState::Idle => *state = RunState::Running,
                RunState::Running | RunState::RunningPending => {
                    *state = RunState::RunningPending;
                    return;
                }
            }
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(self.clone().run());
            }
            Err(_) => {
                warn!(subscription = %self.id, "no async runtime, change feed trigger ignored");
                *self.shared.run_state.lock() = RunState::Idle;
            }
        }
    }

    async fn run(self: Arc<Self>) {
        loop {
            if self.shared.is_cancelled() {
                *self.shared.run_state.lock() = RunState::Idle;
                return;
            }

            let options = self.upstream_options();
            debug!(subscription = %self.id, since = %options.since, "change feed run");

            let mut failed = None;
            {
                let mut changes = self.store.changes(options);
                while let Some(item) = changes.next().await {
                    match item {
                        Ok(event) => self.handle_event(event),
                        Err(err) => {
                            failed = Some(err);
                            break;
                        }
                    }
                }
            }

            let again = {
                let mut state = self.shared.run_state.lock();
                match (*state, &failed) {
                    (_, Some(_)) => {
                        *state = RunState::Idle;
                        false
                    }
                    (RunState::RunningPending, None) => {
                        *state = RunState::Running;
                        true
                    }
                    _ => {
                        *state = RunState::Idle;
                        false
                    }
                }
            };

            if let Some(err) = failed {
                warn!(subscription = %self.id, error = %err, "change feed request failed");
                return;
            }
            if !again {
                return;
            }
        }
    }

    /// Options sent upstream, resuming from the watermark.
    fn upstream_options(&self) -> ChangesOptions {
        let mut options = self.config.options.clone();
        options.since = *self.shared.watermark.lock();
        options
    }

    fn handle_event(&self, event: ChangeEvent) {
        let Some(event) = self.process(event) else {
            return;
        };

        {
            let mut watermark = self.shared.watermark.lock();
            if event.seq <= *watermark || self.shared.is_cancelled() {
                return;
            }
            *watermark = event.seq;
        }

        (self.config.on_change)(event);
    }

    /// Apply the filter and document shaping. None = drop the event.
    fn process(&self, mut event: ChangeEvent) -> Option<ChangeEvent> {
        if let Some(filter) = &self.config.filter {
            let empty = Document::Object(Default::default());
            let doc = event.doc.as_ref().unwrap_or(&empty);
            match filter(doc, &self.request) {
                Ok(true) => {}
                Ok(false) => return None,
                Err(message) => event.error = Some(RelayError::BadRequest(message)),
            }
        }

        let options = &self.config.options;
        if !options.include_docs {
            event.doc = None;
        } else if !options.attachments {
            if let Some(doc) = event.doc.as_mut() {
                stub_attachments(doc);
            }
        }

        Some(event)
    }
}

#[derive(Default)]
struct Registry {
    /// Active subscriptions by id.
    subscriptions: HashMap<String, Arc<Subscription>>,
    /// Subscription ids bound to each source name.
    channels: HashMap<String, HashSet<String>>,
    /// Cross-process listeners, one per source name with subscriptions.
    signal_tokens: HashMap<String, SignalToken>,
}

impl Registry {
    fn bound_to(&self, source: &str) -> Vec<Arc<Subscription>> {
        self.channels
            .get(source)
            .into_iter()
            .flatten()
            .filter_map(|id| self.subscriptions.get(id).cloned())
            .collect()
    }
}

/// Fan-out of store change feeds to many subscribers.
///
/// Subscriptions bind to a source name. [`notify`](Self::notify) wakes every
/// subscription on that name; each one keeps at most one change-feed request
/// in flight and folds triggers that arrive meanwhile into a single follow-up
/// run.
pub struct ChangesMultiplexer {
    registry: Arc<RwLock<Registry>>,
    signal: Arc<dyn CrossProcessSignal>,
}

impl ChangesMultiplexer {
    /// Multiplexer without cross-process signaling.
    pub fn new() -> Self {
        Self::with_signal(Arc::new(NoopSignal))
    }

    /// Multiplexer that also wakes, and is woken by, other processes.
    pub fn with_signal(signal: Arc<dyn CrossProcessSignal>) -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::default())),
            signal,
        }
    }

    /// Register a subscription under `source`.
    ///
    /// Returns None, changing nothing, if `id` is already registered.
    pub fn register(
        &self,
        source: &str,
        id: &str,
        store: Arc<dyn DocumentStore>,
        config: SubscriptionConfig,
    ) -> Option<SubscriptionHandle> {
        let mut registry = self.registry.write();
        if registry.subscriptions.contains_key(id) {
            debug!(subscription = id, "already registered");
            return None;
        }

        let shared = Arc::new(SubscriptionShared::new(config.options.since));
        let subscription = Subscription {
            id: id.to_string(),
            store,
            request: FilterRequest {
                query: config.options.query_params.clone(),
            },
            config,
            shared: shared.clone(),
        };
        registry
            .subscriptions
            .insert(id.to_string(), Arc::new(subscription));
        registry
            .channels
            .entry(source.to_string())
            .or_default()
            .insert(id.to_string());

        if !registry.signal_tokens.contains_key(source) {
            let token = self.signal.subscribe(source, self.wake_handler());
            registry.signal_tokens.insert(source.to_string(), token);
        }

        debug!(subscription = id, source, "registered");
        Some(SubscriptionHandle {
            id: id.to_string(),
            source: source.to_string(),
            shared,
        })
    }

    /// Detach a subscription. Unknown ids are ignored.
    pub fn unregister(&self, source: &str, id: &str) {
        let token = {
            let mut registry = self.registry.write();
            let bound = registry
                .channels
                .get_mut(source)
                .is_some_and(|ids| ids.remove(id));
            if !bound {
                return;
            }

            if let Some(subscription) = registry.subscriptions.remove(id) {
                subscription.shared.cancelled.store(true, Ordering::SeqCst);
            }

            let empty = registry
                .channels
                .get(source)
                .is_some_and(|ids| ids.is_empty());
            if empty {
                registry.channels.remove(source);
                registry.signal_tokens.remove(source)
            } else {
                None
            }
        };

        if let Some(token) = token {
            self.signal.unsubscribe(token);
        }
        debug!(subscription = id, source, "unregistered");
    }

    /// Wake every subscription on `source`, here and in other processes.
    pub fn notify(&self, source: &str) {
        trigger_source(&self.registry, source);
        self.signal.publish(source);
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.registry.read().subscriptions.contains_key(id)
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.read().subscriptions.len()
    }

    fn wake_handler(&self) -> SignalHandler {
        let registry: Weak<RwLock<Registry>> = Arc::downgrade(&self.registry);
        Arc::new(move |source: &str| {
            if let Some(registry) = registry.upgrade() {
                trigger_source(&registry, source);
            }
        })
    }
}

impl Default for ChangesMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ChangesMultiplexer {
    /// Cancel every live subscription and release its cross-process listener.
    fn drop(&mut self) {
        let (subscriptions, tokens) = {
            let mut registry = self.registry.write();
            registry.channels.clear();
            let subscriptions: Vec<_> = registry.subscriptions.drain().map(|(_, s)| s).collect();
            let tokens: Vec<_> = registry.signal_tokens.drain().map(|(_, t)| t).collect();
            (subscriptions, tokens)
        };

        for subscription in &subscriptions {
            subscription.shared.cancelled.store(true, Ordering::SeqCst);
        }
        for token in tokens {
            self.signal.unsubscribe(token);
        }
        if !subscriptions.is_empty() {
            debug!(subscriptions = subscriptions.len(), "multiplexer dropped");
        }
    }
}

fn trigger_source(registry: &RwLock<Registry>, source: &str) {
    let subscriptions = registry.read().bound_to(source);
    for subscription in subscriptions {
        subscription.trigger();
    }
}
