//! # Doc Relay
//!
//! Coordination layer between application code and a document store. The
//! relay does not store anything itself; it decides how and when operations
//! reach the store.
//!
//! ## Core Concepts
//!
//! - **Task queue**: calls made before the store is ready are parked and
//!   replayed in order, or all rejected if initialization fails
//! - **Bulk-get**: multi-document, multi-revision fetches with at most six
//!   per-document requests in flight
//! - **Change feeds**: single-flight, coalesced change delivery to many
//!   subscribers, with optional cross-process wake-ups
//! - **Backoff**: randomized, capped retry delays for callers that retry
//!
//! ## Example
//!
//! ```ignore
//! use docrelay::{Relay, RelayConfig, Request, BulkGetOptions, SubscriptionConfig};
//!
//! let relay = Relay::new(RelayConfig::named("mydb"));
//!
//! // Parked until the store is ready
//! let pending = relay.bulk_get(&requests, &BulkGetOptions::default());
//! relay.ready(store);
//! let response = pending.await?;
//!
//! // Live updates
//! relay
//!     .subscribe("sub1", SubscriptionConfig::new(|change| println!("{}", change.id)))
//!     .await?;
//! relay.notify();
//! ```

pub mod backoff;
pub mod bulk_get;
pub mod changes;
pub mod error;
pub mod queue;
pub mod relay;
pub mod store;
pub mod types;

// Re-exports
pub use backoff::{default_backoff, random_delay, BackoffWindow, MAX_TIMEOUT_MS};
pub use bulk_get::{
    BulkGetConfig, BulkGetCoordinator, BulkGetResponse, BulkGetResult, MAX_CONCURRENT_REQUESTS,
};
pub use changes::{
    ChangeCallback, ChangesMultiplexer, CrossProcessSignal, FilterFn, FilterRequest,
    NamespaceEndpoint, NoopSignal, RunState, SharedNamespace, SignalHandler, SignalToken,
    SubscriptionConfig, SubscriptionHandle,
};
pub use error::{RelayError, Result};
pub use queue::{TaskOutcome, TaskQueue};
pub use relay::{Relay, RelayConfig};
pub use store::DocumentStore;
pub use types::*;
