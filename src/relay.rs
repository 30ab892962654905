//! Relay facade tying the queue, bulk-get and change feeds together.

use crate::bulk_get::{BulkGetConfig, BulkGetCoordinator, BulkGetResponse};
use crate::changes::{ChangesMultiplexer, CrossProcessSignal, SubscriptionConfig, SubscriptionHandle};
use crate::error::{RelayError, Result};
use crate::queue::TaskQueue;
use crate::store::DocumentStore;
use crate::types::{validate_id, BulkGetOptions, GetOptions, GetResponse, Request};
use std::future::Future;
use std::sync::Arc;

/// Relay configuration.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Source name subscriptions bind to and notifications are published on.
    pub name: String,

    /// Bulk-get settings.
    pub bulk_get: BulkGetConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            bulk_get: BulkGetConfig::default(),
        }
    }
}

impl RelayConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Coordinates access to one document store.
///
/// Calls made before [`ready`](Self::ready) are parked and replayed in call
/// order. Id validation happens when the call is made, before anything is
/// queued, so invalid ids fail without waiting for the store.
pub struct Relay {
    config: RelayConfig,
    queue: TaskQueue<Arc<dyn DocumentStore>>,
    bulk_get: BulkGetCoordinator,
    changes: ChangesMultiplexer,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        Self::build(config, ChangesMultiplexer::new())
    }

    /// Relay whose notifications also reach other processes.
    pub fn with_signal(config: RelayConfig, signal: Arc<dyn CrossProcessSignal>) -> Self {
        Self::build(config, ChangesMultiplexer::with_signal(signal))
    }

    fn build(config: RelayConfig, changes: ChangesMultiplexer) -> Self {
        Self {
            bulk_get: BulkGetCoordinator::new(config.bulk_get.clone()),
            queue: TaskQueue::new(),
            changes,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The store finished initializing.
    pub fn ready(&self, store: Arc<dyn DocumentStore>) {
        self.queue.ready(store);
    }

    /// The store failed to initialize; parked and future calls get `err`.
    pub fn fail(&self, err: RelayError) {
        self.queue.fail(err);
    }

    pub fn is_ready(&self) -> bool {
        self.queue.is_ready()
    }

    pub fn queue(&self) -> &TaskQueue<Arc<dyn DocumentStore>> {
        &self.queue
    }

    pub fn changes(&self) -> &ChangesMultiplexer {
        &self.changes
    }

    /// Fetch one document.
    pub fn get<'a>(
        &'a self,
        id: &'a str,
        opts: GetOptions,
    ) -> impl Future<Output = Result<GetResponse>> + 'a {
        let store = validate_id(id).map(|()| self.queue.wait_ready());
        async move {
            let store = store?.await?;
            store.get(id, opts).await
        }
    }

    /// Fetch many documents; see [`BulkGetCoordinator::bulk_get`].
    pub fn bulk_get<'a>(
        &'a self,
        requests: &'a [Request],
        opts: &'a BulkGetOptions,
    ) -> impl Future<Output = Result<BulkGetResponse>> + 'a {
        let store = BulkGetCoordinator::validate(requests).map(|()| self.queue.wait_ready());
        async move {
            let store = store?.await?;
            Ok(self.bulk_get.bulk_get(store.as_ref(), requests, opts).await)
        }
    }

    /// Subscribe to this relay's change feed.
    ///
    /// Resolves to None if `id` is already subscribed.
    pub fn subscribe<'a>(
        &'a self,
        id: &'a str,
        config: SubscriptionConfig,
    ) -> impl Future<Output = Result<Option<SubscriptionHandle>>> + 'a {
        let store = self.queue.wait_ready();
        async move {
            let store = store.await?;
            Ok(self.changes.register(&self.config.name, id, store, config))
        }
    }

    pub fn unsubscribe(&self, id: &str) {
        self.changes.unregister(&self.config.name, id);
    }

    /// Wake this relay's subscriptions after a write.
    pub fn notify(&self) {
        self.changes.notify(&self.config.name);
    }
}
