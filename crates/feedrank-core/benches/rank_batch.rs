use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use feedrank_core::builtins;
use feedrank_core::{Algorithm, ExecutionOptions, FunctionRegistry, Item};

const BATCH_SIZES: [usize; 3] = [100, 1_000, 10_000];
const WORDS: [&str; 8] = [
    "great", "talk", "about", "rust", "not", "boring", "at", "all",
];

fn synthetic_batch(size: usize) -> Vec<Item> {
    (0..size)
        .map(|i| {
            let words = 3 + i % 40;
            let text = (0..words)
                .map(|w| WORDS[(i + w * 7) % WORDS.len()])
                .collect::<Vec<_>>()
                .join(" ");
            Item::new()
                .with("id", format!("item-{i}"))
                .with("url", format!("https://example.com/{i}"))
                .with("text", text)
        })
        .collect()
}

fn simple_algorithm() -> Algorithm {
    let registry = FunctionRegistry::new();
    builtins::register_all(&registry);
    builtins::simple_algorithm(&registry).expect("built-ins registered")
}

fn bench_rank_batch(c: &mut Criterion) {
    let algorithm = simple_algorithm();
    let mut group = c.benchmark_group("rank_batch.simple");

    for size in BATCH_SIZES {
        let items = synthetic_batch(size);
        group.throughput(Throughput::Elements(size as u64));

        for workers in [1_usize, 4] {
            let options = ExecutionOptions::default().with_workers(workers);
            group.bench_with_input(
                BenchmarkId::new(format!("workers={workers}"), size),
                &items,
                |b, items| {
                    b.iter(|| {
                        black_box(
                            algorithm
                                .rank_batch(items, &options)
                                .expect("ranking succeeds"),
                        )
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_rank_batch);
criterion_main!(benches);
