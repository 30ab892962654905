//! Performance benchmarks for the relay.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use docrelay::{
    backoff, BulkGetCoordinator, BulkGetOptions, ChangeEvent, ChangesOptions, DocumentStore,
    GetOptions, GetResponse, Request, Result,
};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::json;

/// Store answering every fetch after one scheduler yield.
struct EchoStore;

impl DocumentStore for EchoStore {
    fn get<'a>(&'a self, id: &'a str, opts: GetOptions) -> BoxFuture<'a, Result<GetResponse>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            Ok(match opts.open_revs {
                Some(revs) => GetResponse::Revisions(
                    revs.into_iter()
                        .map(|rev| docrelay::DocOutcome::Ok(json!({"_id": id, "_rev": rev})))
                        .collect(),
                ),
                None => GetResponse::Doc(json!({"_id": id, "_rev": "1-a"})),
            })
        })
    }

    fn changes(&self, _opts: ChangesOptions) -> BoxStream<'_, Result<ChangeEvent>> {
        stream::empty().boxed()
    }
}

/// Benchmark bulk-get with varying numbers of distinct ids
fn bench_bulk_get(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let coordinator = BulkGetCoordinator::default();
    let mut group = c.benchmark_group("bulk_get");

    for ids in [10, 100, 1000] {
        let requests: Vec<Request> = (0..ids)
            .flat_map(|i| {
                let id = format!("doc{i}");
                [
                    Request::new(id.clone()).with_rev("1-a"),
                    Request::new(id).with_rev("2-b"),
                ]
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("distinct_ids", ids), &requests, |b, requests| {
            b.iter(|| {
                runtime.block_on(coordinator.bulk_get(
                    &EchoStore,
                    black_box(requests),
                    &BulkGetOptions::default(),
                ))
            });
        });
    }

    group.finish();
}

/// Benchmark delay generation
fn bench_backoff(c: &mut Criterion) {
    c.bench_function("default_backoff", |b| {
        let mut prev = None;
        b.iter(|| {
            let next = backoff::default_backoff(black_box(prev));
            prev = Some(next);
            next
        });
    });
}

criterion_group!(benches, bench_bulk_get, bench_backoff);
criterion_main!(benches);
