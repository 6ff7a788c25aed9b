use chashmap::CHashMap;
use concurrent_containers::structures::ConcurrentHashtable;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::thread;
use std::thread::JoinHandle;

const KEYS_PER_THREAD: usize = 2_000;

/// Each thread writes its own keys, then reads every key it wrote twice.
fn bench_hashtable(num_threads: usize, buckets: usize) {
    let map = Arc::new(ConcurrentHashtable::with_buckets(buckets));
    let mut wait_vec: Vec<JoinHandle<()>> = Vec::new();

    for id in 0..num_threads {
        let map_clone = map.clone();
        wait_vec.push(thread::spawn(move || {
            let keys = id * KEYS_PER_THREAD..(id + 1) * KEYS_PER_THREAD;
            for key in keys.clone() {
                map_clone.set(key, key);
            }
            for _ in 0..2 {
                for key in keys.clone() {
                    assert_eq!(map_clone.get(&key), Some(key));
                }
            }
        }));
    }

    for handle in wait_vec {
        handle.join().unwrap();
    }
}

fn bench_locked_map(num_threads: usize) {
    let map = Arc::new(RwLock::new(HashMap::new()));
    let mut wait_vec: Vec<JoinHandle<()>> = Vec::new();

    for id in 0..num_threads {
        let map_clone = map.clone();
        wait_vec.push(thread::spawn(move || {
            let keys = id * KEYS_PER_THREAD..(id + 1) * KEYS_PER_THREAD;
            for key in keys.clone() {
                map_clone.write().unwrap().insert(key, key);
            }
            for _ in 0..2 {
                for key in keys.clone() {
                    assert_eq!(map_clone.read().unwrap().get(&key).cloned(), Some(key));
                }
            }
        }));
    }

    for handle in wait_vec {
        handle.join().unwrap();
    }
}

fn bench_chashmap(num_threads: usize) {
    let map = Arc::new(CHashMap::new());
    let mut wait_vec: Vec<JoinHandle<()>> = Vec::new();

    for id in 0..num_threads {
        let map_clone = map.clone();
        wait_vec.push(thread::spawn(move || {
            let keys = id * KEYS_PER_THREAD..(id + 1) * KEYS_PER_THREAD;
            for key in keys.clone() {
                map_clone.insert(key, key);
            }
            for _ in 0..2 {
                for key in keys.clone() {
                    assert_eq!(map_clone.get(&key).map(|val| *val), Some(key));
                }
            }
        }));
    }

    for handle in wait_vec {
        handle.join().unwrap();
    }
}

fn bench_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("map");
    group.sample_size(20);
    for num_threads in [2, 4, 8] {
        for buckets in [5, 64, 1024] {
            group.bench_with_input(
                BenchmarkId::new(format!("hashtable_{}_buckets", buckets), num_threads),
                &num_threads,
                |b, &n| b.iter(|| bench_hashtable(n, buckets)),
            );
        }
        group.bench_with_input(BenchmarkId::new("rwlock_hashmap", num_threads), &num_threads, |b, &n| {
            b.iter(|| bench_locked_map(n))
        });
        group.bench_with_input(BenchmarkId::new("chashmap", num_threads), &num_threads, |b, &n| {
            b.iter(|| bench_chashmap(n))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_map);
criterion_main!(benches);
