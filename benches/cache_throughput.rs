//! Benchmarks for the response cache hot path
//!
//! This benchmark measures:
//! - Cache key generation (text and multimodal)
//! - Cache hits under the shared read lock
//! - Inserts that force eviction at capacity

use ai_gate::cache::{CacheConfig, CacheKeyGenerator, CacheManager};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

fn bench_key_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_generation");
    let keys = CacheKeyGenerator::new();
    let image = vec![0u8; 64 * 1024];

    for len in [64usize, 1024, 16 * 1024] {
        let prompt = "a".repeat(len);
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(BenchmarkId::new("text", len), &prompt, |b, p| {
            b.iter(|| keys.generate(black_box(p), None))
        });
    }
    group.bench_function("multimodal_64k", |b| {
        b.iter(|| keys.generate(black_box("describe this"), Some(black_box(image.as_slice()))))
    });
    group.finish();
}

fn bench_cache_ops(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();

    let mut group = c.benchmark_group("cache_ops");
    let keys = CacheKeyGenerator::new();

    let cache = CacheManager::new(
        CacheConfig::new()
            .with_max_size(1000)
            .with_ttl(Duration::from_secs(3600)),
    )
    .unwrap();
    let hot: Vec<_> = (0..1000)
        .map(|i| keys.generate(&format!("prompt {i}"), None))
        .collect();
    for k in &hot {
        cache.set(k, None, "cached response").unwrap();
    }

    group.bench_function("get_hit", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 1) % hot.len();
            black_box(cache.get(&hot[i], None))
        })
    });

    group.bench_function("get_miss", |b| {
        let miss = keys.generate("never stored", None);
        b.iter(|| black_box(cache.get(&miss, None)))
    });

    group.bench_function("set_with_eviction", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            let k = keys.generate(&format!("new prompt {i}"), None);
            cache.set(&k, None, "fresh").unwrap();
        })
    });

    group.finish();
    rt.block_on(cache.close());
}

criterion_group!(benches, bench_key_generation, bench_cache_ops);
criterion_main!(benches);
