//! # Block Sync Benchmarks
//!
//! | Operation | Expectation |
//! |-----------|-------------|
//! | `add_pending` of a linear chain | O(log n) per block |
//! | `merge_branches` of forks delivered child-first | one splice per block |
//! | `executable_run` over a full pending set | linear in run length |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use qc_18_block_sync::adapters::state_root_for;
use qc_18_block_sync::{BlockCollection, PendingBlock};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use shared_types::{Block, BlockBody, BlockHeader, Hash, GENESIS_PARENT_HASH};

fn chain(len: u64, salt: u64) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(len as usize);
    let mut previous: Hash = GENESIS_PARENT_HASH;
    for height in 1..=len {
        let block = Block::new(
            BlockHeader {
                height,
                previous_hash: previous,
                state_root: state_root_for(height, &[]),
                timestamp: salt,
                ..Default::default()
            },
            BlockBody::new(Vec::new()),
        );
        previous = block.hash();
        blocks.push(block);
    }
    blocks
}

fn pending(block: &Block) -> PendingBlock {
    PendingBlock::new(block.clone(), Vec::new(), None)
}

fn bench_add_pending(c: &mut Criterion) {
    let mut group = c.benchmark_group("qc-18-add-pending");
    for size in [100u64, 1_000] {
        let blocks = chain(size, 0);
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::new("linear", size), &blocks, |b, blocks| {
            b.iter(|| {
                let mut store = BlockCollection::new();
                for block in blocks {
                    store.add_pending(pending(block));
                }
                black_box(store.pending_count())
            })
        });
    }
    group.finish();
}

fn bench_merge_branches(c: &mut Criterion) {
    let mut group = c.benchmark_group("qc-18-merge-branches");
    for size in [100u64, 1_000] {
        let mut blocks = chain(size, 1);
        blocks.shuffle(&mut rand::rngs::StdRng::seed_from_u64(size));
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::new("shuffled", size), &blocks, |b, blocks| {
            b.iter(|| {
                let mut store = BlockCollection::new();
                for block in blocks {
                    store.merge_branches(pending(block));
                }
                black_box(store.branch_count())
            })
        });
    }
    group.finish();
}

fn bench_executable_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("qc-18-executable-run");
    let mut store = BlockCollection::new();
    for block in &chain(1_000, 2) {
        store.add_pending(pending(block));
    }
    group.bench_function("run_1000", |b| {
        b.iter(|| black_box(store.executable_run(0, false).len()))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_add_pending,
    bench_merge_branches,
    bench_executable_run
);
criterion_main!(benches);
