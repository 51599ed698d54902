//! Benchmarks for keyword ranking over a realistic paint and tire catalog.
//!
//! Color and free-text searches rank the whole category on every message,
//! so `rank` has to stay well under a millisecond for a few thousand items.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use partsbot_chat::keywords::{expand_keywords, rank, score};
use partsbot_core::types::{CatalogItem, Category};

const COLORS: &[&str] = &[
    "Navy Blue", "Merah Maroon", "Hijau Lime", "Hitam Doff", "Putih Susu", "Silver Metalik",
    "Kuning Gold", "Biru Muda", "Abu Abu", "Orange Terang",
];

/// Generate a paint catalog of `n` items with varied names.
fn generate_paints(n: usize) -> Vec<CatalogItem> {
    (0..n)
        .map(|i| CatalogItem {
            id: format!("P{i:05}"),
            name: format!("Cat {} {}L", COLORS[i % COLORS.len()], 1 + i % 5),
            brand: Some(if i % 2 == 0 { "Nippon" } else { "Pylox" }.to_string()),
            category: Category::Paint,
            size_spec: None,
            price: Some(50_000 + (i as u64 % 20) * 5_000),
            list_price: None,
            image_ref: None,
            specifications: None,
        })
        .collect()
}

fn bench_expand(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyword_expansion");

    group.bench_function("single_family", |b| {
        b.iter(|| expand_keywords(black_box("biru")))
    });

    group.bench_function("multi_family", |b| {
        b.iter(|| expand_keywords(black_box("cat biru merah hitam doff metalik")))
    });

    group.finish();
}

fn bench_rank(c: &mut Criterion) {
    let small = generate_paints(200);
    let large = generate_paints(5_000);
    let keywords = expand_keywords("biru");

    let mut group = c.benchmark_group("keyword_rank");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("score_one_name", |b| {
        b.iter(|| score(black_box("Cat Navy Blue 1L"), black_box(&keywords)))
    });

    group.bench_function("rank_200", |b| {
        b.iter(|| rank(black_box("biru"), black_box(&small), 50))
    });

    group.bench_function("rank_5000", |b| {
        b.iter(|| rank(black_box("biru"), black_box(&large), 50))
    });

    group.bench_function("rank_5000_no_match", |b| {
        b.iter(|| rank(black_box("ungu"), black_box(&large), 50))
    });

    group.finish();
}

criterion_group!(benches, bench_expand, bench_rank);
criterion_main!(benches);
