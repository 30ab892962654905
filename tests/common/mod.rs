//! In-memory document store for integration tests.

#![allow(dead_code)]

use docrelay::{
    ChangeEvent, ChangesOptions, DocOutcome, Document, DocumentStore, GetOptions, GetResponse,
    RelayError, Result, Seq,
};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Store keeping every revision of every document in memory.
#[derive(Default)]
pub struct MemoryStore {
    /// Revisions per id, oldest first; the last one wins.
    docs: Mutex<HashMap<String, Vec<Document>>>,
    log: Mutex<Vec<ChangeEvent>>,
    failing: Mutex<HashSet<String>>,

    /// Per-id number of scheduler yields before a fetch completes.
    delays: Mutex<HashMap<String, usize>>,

    /// "start:<id>" / "end:<id>" in the order fetches began and finished.
    pub timeline: Mutex<Vec<String>>,
    pub get_calls: Mutex<Vec<(String, GetOptions)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,

    pub changes_calls: Mutex<Vec<ChangesOptions>>,
    gate: Option<Arc<Semaphore>>,
    fail_changes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store whose change-feed requests block until `release` is called.
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Default::default()
        })
    }

    pub fn release(&self, runs: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(runs);
        }
    }

    /// Write a new revision and append it to the change log.
    pub fn put(&self, id: &str, body: Document) -> String {
        let mut docs = self.docs.lock();
        let revs = docs.entry(id.to_string()).or_default();
        let rev = format!("{}-{}", revs.len() + 1, id);

        let mut doc = body;
        doc["_id"] = json!(id);
        doc["_rev"] = json!(rev);
        revs.push(doc.clone());

        let mut log = self.log.lock();
        let seq = log.len() as u64 + 1;
        log.push(ChangeEvent::new(id, seq).with_rev(rev.clone()).with_doc(doc));
        rev
    }

    pub fn fail_get(&self, id: &str) {
        self.failing.lock().insert(id.to_string());
    }

    pub fn fail_changes(&self, fail: bool) {
        self.fail_changes.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, id: &str, yields: usize) {
        self.delays.lock().insert(id.to_string(), yields);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn changes_count(&self) -> usize {
        self.changes_calls.lock().len()
    }

    fn lookup(&self, id: &str, opts: &GetOptions) -> Result<GetResponse> {
        if self.failing.lock().contains(id) {
            return Err(RelayError::Store {
                status: 500,
                message: format!("cannot read {id}"),
            });
        }

        let docs = self.docs.lock();
        let revs = docs.get(id);

        match &opts.open_revs {
            Some(open_revs) => {
                let found = open_revs
                    .iter()
                    .map(|rev| {
                        revs.and_then(|revs| revs.iter().find(|d| d["_rev"] == rev.as_str()))
                            .map(|d| DocOutcome::Ok(d.clone()))
                            .unwrap_or_else(|| DocOutcome::Missing(rev.clone()))
                    })
                    .collect();
                Ok(GetResponse::Revisions(found))
            }
            None => revs
                .and_then(|revs| revs.last())
                .map(|d| GetResponse::Doc(d.clone()))
                .ok_or_else(|| RelayError::missing(id)),
        }
    }
}

impl DocumentStore for MemoryStore {
    fn get<'a>(&'a self, id: &'a str, opts: GetOptions) -> BoxFuture<'a, Result<GetResponse>> {
        Box::pin(async move {
            self.get_calls.lock().push((id.to_string(), opts.clone()));
            self.timeline.lock().push(format!("start:{id}"));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let yields = self.delays.lock().get(id).copied().unwrap_or(3);
            for _ in 0..yields {
                tokio::task::yield_now().await;
            }

            let result = self.lookup(id, &opts);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.timeline.lock().push(format!("end:{id}"));
            result
        })
    }

    fn changes(&self, opts: ChangesOptions) -> BoxStream<'_, Result<ChangeEvent>> {
        self.changes_calls.lock().push(opts.clone());

        let items: Vec<Result<ChangeEvent>> = if self.fail_changes.load(Ordering::SeqCst) {
            vec![Err(RelayError::Store {
                status: 503,
                message: "feed unavailable".to_string(),
            })]
        } else {
            self.log
                .lock()
                .iter()
                .filter(|e| e.seq > opts.since)
                .filter(|e| {
                    opts.doc_ids
                        .as_ref()
                        .map_or(true, |ids| ids.contains(&e.id))
                })
                .cloned()
                .map(Ok)
                .collect()
        };

        let gate = self.gate.clone();
        let wait = async move {
            if let Some(gate) = gate {
                if let Ok(permit) = gate.acquire_owned().await {
                    permit.forget();
                }
            }
            stream::iter(items)
        };
        stream::once(wait).flatten().boxed()
    }
}

/// Route relay logs to the test harness output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Let spawned change-feed runs make progress.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Collects delivered events.
pub fn collector() -> (Arc<Mutex<Vec<ChangeEvent>>>, impl Fn(ChangeEvent) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |event: ChangeEvent| sink.lock().push(event))
}

pub fn seqs(events: &[ChangeEvent]) -> Vec<Seq> {
    events.iter().map(|e| e.seq).collect()
}
