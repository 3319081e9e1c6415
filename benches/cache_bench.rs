//! Benchmarks for tier resolution and the tier cache.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use image_tier_cache::cache::degradation::DegradationChain;
use image_tier_cache::cache::resolver::QualityResolver;
use image_tier_cache::cache::tier::Tier;
use image_tier_cache::cache::tier_cache::PersistentTierCache;
use image_tier_cache::config::TierCacheConfig;
use image_tier_cache::storage::MemoryStore;

fn bench_resolve(c: &mut Criterion) {
    let resolver = QualityResolver::default();

    // Mixed list: transform CDN, generic host, pre-sized, video.
    let uris: Vec<String> = (0..1_000)
        .map(|i| match i % 4 {
            0 => format!("https://res.cloudinary.com/demo/image/upload/v1/p{i}.jpg"),
            1 => format!("https://img.test/thumbs/{i}.jpg"),
            2 => format!("https://img.test/thumbs/{i}.jpg?w=320"),
            _ => format!("https://img.test/clips/{i}.mp4"),
        })
        .collect();

    c.bench_function("resolve_1k_mixed_optimized", |b| {
        b.iter(|| {
            for uri in &uris {
                black_box(resolver.resolve(black_box(uri), Tier::Optimized));
            }
        })
    });
}

fn bench_degradation_chain(c: &mut Criterion) {
    let resolver = Arc::new(QualityResolver::default());

    c.bench_function("degradation_chain_exhaust", |b| {
        b.iter(|| {
            let mut chain = DegradationChain::new(
                resolver.clone(),
                black_box("https://res.cloudinary.com/demo/image/upload/v1/poster.jpg"),
                None,
            );
            while let Some(candidate) = chain.next_candidate() {
                black_box(candidate);
            }
        })
    });
}

fn bench_tier_cache_roundtrip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cache = PersistentTierCache::new(Arc::new(MemoryStore::new()), &TierCacheConfig::default());

    c.bench_function("tier_cache_put_get_memory", |b| {
        b.iter(|| {
            rt.block_on(async {
                cache
                    .put("poster-1", "https://img.test/p1.jpg?w=800&q=90", Some(Tier::Optimized))
                    .await;
                black_box(cache.get("poster-1").await);
            })
        })
    });
}

criterion_group!(
    benches,
    bench_resolve,
    bench_degradation_chain,
    bench_tier_cache_roundtrip,
);
criterion_main!(benches);
