//! Change-feed multiplexing for live updates.
//!
//! Many logical subscribers observe one store's change feed through a
//! [`ChangesMultiplexer`]:
//! - Subscriptions bind to a source name and are woken by `notify`
//! - Each subscription keeps at most one upstream request in flight;
//!   triggers arriving meanwhile coalesce into one follow-up run
//! - Delivery is gated by a per-subscription seq watermark
//! - An optional [`CrossProcessSignal`] wakes other processes sharing the name
//!
//! # Example
//!
//! ```ignore
//! let mux = ChangesMultiplexer::new();
//!
//! let config = SubscriptionConfig::new(|event| println!("changed: {}", event.id))
//!     .with_options(ChangesOptions::default().include_docs(true));
//! let handle = mux.register("mydb", "sub1", store.clone(), config);
//!
//! // After writing to the store:
//! mux.notify("mydb");
//! ```

mod manager;
mod signal;
mod types;

pub use manager::ChangesMultiplexer;
pub use signal::{
    CrossProcessSignal, NamespaceEndpoint, NoopSignal, SharedNamespace, SignalHandler, SignalToken,
};
pub use types::{
    ChangeCallback, FilterFn, FilterRequest, RunState, SubscriptionConfig, SubscriptionHandle,
};
