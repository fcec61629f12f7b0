//! Tree walk benchmarks
//!
//! Measures how much of the per-load latency the prefetch window hides.

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use snapwalk_core::{Id, LoadError, MemoryStore, Node, Tree, TreeLoader, TreeWriter};
use snapwalk_walk::{walk_tree, CancelToken, TreeWalkOptions};
use std::sync::Arc;
use std::time::Duration;

/// Memory store behind a fixed per-load delay
struct SlowStore {
    store: MemoryStore,
    delay: Duration,
}

#[async_trait]
impl TreeLoader for SlowStore {
    async fn load_tree(&self, id: Id) -> Result<Tree, LoadError> {
        tokio::time::sleep(self.delay).await;
        self.store.load_tree(id).await
    }
}

fn build(store: &MemoryStore, depth: usize, breadth: usize) -> Id {
    let mut tree = Tree::new();
    for i in 0..breadth {
        let node = if depth == 0 {
            Node::file(format!("f{}", i), 1024)
        } else {
            Node::dir(format!("d{}_{}", depth, i), build(store, depth - 1, breadth))
        };
        tree.insert(node).unwrap();
    }
    store.save_tree(&tree).unwrap()
}

fn bench_prefetch_window(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    let store = MemoryStore::new();
    let root = build(&store, 3, 4);
    let loader = Arc::new(SlowStore {
        store,
        delay: Duration::from_micros(200),
    });

    let mut group = c.benchmark_group("tree_walk");
    group.sample_size(20);
    for window in [1usize, 4, 16] {
        group.bench_with_input(BenchmarkId::new("prefetch_window", window), &window, |b, &window| {
            b.iter(|| {
                let options = TreeWalkOptions {
                    prefetch_window: window,
                    ..Default::default()
                };
                let jobs = runtime.block_on(async {
                    walk_tree(Arc::clone(&loader), root, options, CancelToken::new())
                        .unwrap()
                        .collect_all()
                        .await
                });
                black_box(jobs.len())
            });
        });
    }
    group.finish();
}

fn bench_in_memory_walk(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let store = Arc::new(MemoryStore::new());
    let root = build(&store, 4, 6);

    c.bench_function("tree_walk_in_memory", |b| {
        b.iter(|| {
            let jobs = runtime.block_on(async {
                walk_tree(Arc::clone(&store), root, TreeWalkOptions::default(), CancelToken::new())
                    .unwrap()
                    .collect_all()
                    .await
            });
            black_box(jobs.len())
        });
    });
}

criterion_group!(benches, bench_prefetch_window, bench_in_memory_walk);
criterion_main!(benches);
