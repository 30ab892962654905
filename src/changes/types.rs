//! Subscription types for change-feed multiplexing.

use crate::types::{ChangeEvent, ChangesOptions, Document, Seq};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Client-side filter evaluated against each change's document.
///
/// `Ok(true)` keeps the event, `Ok(false)` drops it and `Err` marks it with
/// the failure message while still delivering it.
pub type FilterFn =
    Arc<dyn Fn(&Document, &FilterRequest) -> std::result::Result<bool, String> + Send + Sync>;

/// Consumer callback receiving delivered change events.
pub type ChangeCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Request context passed to filters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterRequest {
    /// The subscription's `query_params`.
    pub query: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Configuration for a subscription.
#[derive(Clone)]
pub struct SubscriptionConfig {
    /// Options forwarded to the store on every run.
    /// `since` is the starting watermark.
    pub options: ChangesOptions,

    /// Client-side filter (None = deliver everything).
    pub filter: Option<FilterFn>,

    /// Receives every delivered event.
    pub on_change: ChangeCallback,
}

impl SubscriptionConfig {
    pub fn new<F>(on_change: F) -> Self
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        Self {
            options: ChangesOptions::default(),
            filter: None,
            on_change: Arc::new(on_change),
        }
    }

    pub fn with_options(mut self, options: ChangesOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Document, &FilterRequest) -> std::result::Result<bool, String>
            + Send
            + Sync
            + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }
}

impl fmt::Debug for SubscriptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionConfig")
            .field("options", &self.options)
            .field("filter", &self.filter.is_some())
            .finish_non_exhaustive()
    }
}

/// Single-flight state of a subscription's runner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    /// One upstream request in flight.
    Running,
    /// In flight, and at least one trigger arrived meanwhile.
    RunningPending,
}

/// State shared between the multiplexer and a subscription handle.
#[derive(Debug)]
pub(crate) struct SubscriptionShared {
    pub(crate) cancelled: AtomicBool,
    pub(crate) watermark: Mutex<Seq>,
    pub(crate) run_state: Mutex<RunState>,
}

impl SubscriptionShared {
    pub(crate) fn new(since: Seq) -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            watermark: Mutex::new(since),
            run_state: Mutex::new(RunState::Idle),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Handle to a registered subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionHandle {
    pub id: String,
    pub source: String,
    pub(crate) shared: Arc<SubscriptionShared>,
}

impl SubscriptionHandle {
    /// Stop delivery. Events already fetched but not yet delivered are dropped.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Seq of the last delivered event (or the starting `since`).
    pub fn last_seq(&self) -> Seq {
        *self.shared.watermark.lock()
    }

    pub fn run_state(&self) -> RunState {
        *self.shared.run_state.lock()
    }
}
