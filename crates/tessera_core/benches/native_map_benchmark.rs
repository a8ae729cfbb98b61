//! # NativeMap Benchmark
//!
//! Insert, lookup and remove throughput of the Robin-Hood map, with
//! `std::collections::HashMap` as the baseline.

#![allow(missing_docs)]

use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tessera_core::NativeMap;

const SIZES: [u32; 3] = [1_000, 100_000, 1_000_000];

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_insert");

    for &size in &SIZES {
        group.bench_with_input(BenchmarkId::new("native_map", size), &size, |b, &size| {
            b.iter(|| {
                let mut map: NativeMap<u32, u32> = NativeMap::new();
                for key in 0..size {
                    map.insert(key, key);
                }
                black_box(map.len())
            });
        });

        group.bench_with_input(BenchmarkId::new("std_hash_map", size), &size, |b, &size| {
            b.iter(|| {
                let mut map: HashMap<u32, u32> = HashMap::new();
                for key in 0..size {
                    map.insert(key, key);
                }
                black_box(map.len())
            });
        });
    }

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_get");

    for &size in &SIZES {
        let mut map: NativeMap<u32, u32> = NativeMap::with_capacity(size as usize);
        for key in 0..size {
            map.insert(key, key);
        }

        group.bench_with_input(BenchmarkId::new("native_map_hit", size), &size, |b, &size| {
            b.iter(|| {
                let mut sum = 0u64;
                for key in 0..size {
                    if let Some(&value) = map.get(&key) {
                        sum += u64::from(value);
                    }
                }
                black_box(sum)
            });
        });

        group.bench_with_input(BenchmarkId::new("native_map_miss", size), &size, |b, &size| {
            b.iter(|| {
                let mut found = 0usize;
                for key in size..size * 2 {
                    found += usize::from(map.contains_key(&key));
                }
                black_box(found)
            });
        });
    }

    group.finish();
}

fn bench_churn(c: &mut Criterion) {
    let mut map: NativeMap<u32, u32> = NativeMap::with_capacity(1 << 17);
    for key in 0..100_000 {
        map.insert(key, key);
    }

    c.bench_function("map_remove_reinsert_100k", |b| {
        b.iter(|| {
            for key in (0..100_000).step_by(3) {
                map.remove(&key);
            }
            for key in (0..100_000).step_by(3) {
                map.insert(key, key);
            }
            black_box(map.max_probe_length())
        });
    });
}

criterion_group!(benches, bench_insert, bench_get, bench_churn);
criterion_main!(benches);
