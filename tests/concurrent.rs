//! Concurrency and async-surface tests
//!
//! Async callbacks fire on worker threads in completion order; results are
//! collected through atomics and checked after a full drain.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use oxikv::{EngineConfig, KvEngine};
use tempfile::TempDir;

fn create_engine(dir: &TempDir, threads: usize, capacity: usize, segments: usize) -> KvEngine {
    let config = EngineConfig::new(dir.path().join("test_db.dat"))
        .with_thread_pool_size(threads)
        .with_cache_capacity(capacity)
        .with_cache_num_segments(segments);
    KvEngine::open(config).expect("engine open failed")
}

#[test]
fn test_async_put_get_del() {
    let dir = TempDir::new().unwrap();
    let engine = create_engine(&dir, 4, 100, 8);

    let put_ok = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&put_ok);
    engine.async_put(10, b"async_val".to_vec(), move |ok| {
        assert!(ok);
        flag.fetch_add(1, Ordering::SeqCst);
    });
    engine.wait_all();
    assert_eq!(put_ok.load(Ordering::SeqCst), 1);

    let got = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&got);
    engine.async_get(10, move |value| {
        assert_eq!(value, Some(b"async_val".to_vec()));
        flag.fetch_add(1, Ordering::SeqCst);
    });
    engine.wait_all();
    assert_eq!(got.load(Ordering::SeqCst), 1);

    let del_ok = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&del_ok);
    engine.async_del(10, move |ok| {
        assert!(ok);
        flag.fetch_add(1, Ordering::SeqCst);
    });
    engine.wait_all();
    assert_eq!(del_ok.load(Ordering::SeqCst), 1);

    assert_eq!(engine.get(10), None);
}

#[test]
fn test_concurrent_disjoint_writers() {
    const WRITERS: usize = 16;
    const KEYS_PER_WRITER: usize = 250;
    const TOTAL: usize = WRITERS * KEYS_PER_WRITER;

    let dir = TempDir::new().unwrap();
    // Cache large enough to hold every key, so reads may all be hits.
    let engine = Arc::new(create_engine(&dir, 8, TOTAL, 16));

    // 16 submitters, each issuing async puts for a disjoint key range.
    let completed_puts = Arc::new(AtomicUsize::new(0));
    let submitters: Vec<_> = (0..WRITERS)
        .map(|w| {
            let engine = Arc::clone(&engine);
            let completed_puts = Arc::clone(&completed_puts);
            thread::spawn(move || {
                for i in 0..KEYS_PER_WRITER {
                    let key = (w * KEYS_PER_WRITER + i) as i32;
                    let completed = Arc::clone(&completed_puts);
                    engine.async_put(key, format!("val_{key}").into_bytes(), move |ok| {
                        assert!(ok);
                        completed.fetch_add(1, Ordering::SeqCst);
                    });
                }
            })
        })
        .collect();
    for handle in submitters {
        handle.join().unwrap();
    }
    engine.wait_all();
    assert_eq!(completed_puts.load(Ordering::SeqCst), TOTAL);

    // Read every key back asynchronously and verify the matching value.
    let completed_gets = Arc::new(AtomicUsize::new(0));
    for key in 0..TOTAL as i32 {
        let completed = Arc::clone(&completed_gets);
        engine.async_get(key, move |value| {
            assert_eq!(value, Some(format!("val_{key}").into_bytes()));
            completed.fetch_add(1, Ordering::SeqCst);
        });
    }
    engine.wait_all();
    assert_eq!(completed_gets.load(Ordering::SeqCst), TOTAL);

    // Every value was written through, so at most one file read per key.
    assert!(engine.file_store_read_count() <= TOTAL as u64);
}

#[test]
fn test_concurrent_sync_readers_and_writers() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(create_engine(&dir, 4, 64, 8));

    for key in 0..64 {
        engine.put(key, b"initial");
    }

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for round in 0..50 {
                    let key = (t * 8 + round % 8) as i32;
                    if t % 2 == 0 {
                        assert!(engine.put(key, format!("t{t}_r{round}").as_bytes()));
                    } else {
                        // Value is either the initial one or some writer's.
                        assert!(engine.get(key).is_some());
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_gc_under_concurrent_traffic() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(create_engine(&dir, 4, 32, 4));

    for key in 0..100 {
        engine.put(key, b"round_zero");
    }

    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for key in 0..100 {
                engine.put(key, format!("round_one_{key}").as_bytes());
                if key % 10 == 0 {
                    engine.del(key);
                }
            }
        })
    };
    for _ in 0..5 {
        engine.garbage_collect();
    }
    writer.join().unwrap();
    engine.garbage_collect();

    for key in 0..100 {
        if key % 10 == 0 {
            assert_eq!(engine.get(key), None);
        } else {
            assert_eq!(engine.get(key), Some(format!("round_one_{key}").into_bytes()));
        }
    }
}

#[test]
fn test_async_after_stop_short_circuits() {
    let dir = TempDir::new().unwrap();
    let engine = create_engine(&dir, 2, 16, 2);

    engine.put(1, b"before_stop");
    engine.stop();

    let fired = Arc::new(AtomicUsize::new(0));

    let flag = Arc::clone(&fired);
    engine.async_put(2, b"rejected".to_vec(), move |ok| {
        assert!(!ok);
        flag.fetch_add(1, Ordering::SeqCst);
    });

    let flag = Arc::clone(&fired);
    engine.async_del(1, move |ok| {
        assert!(!ok);
        flag.fetch_add(1, Ordering::SeqCst);
    });

    let flag = Arc::clone(&fired);
    engine.async_get(1, move |value| {
        assert_eq!(value, None);
        flag.fetch_add(1, Ordering::SeqCst);
    });

    // The short-circuit callbacks run inline, no drain needed.
    assert_eq!(fired.load(Ordering::SeqCst), 3);

    // The synchronous surface still works after stop.
    assert_eq!(engine.get(1), Some(b"before_stop".to_vec()));
}

#[test]
fn test_callbacks_see_prior_writes() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(create_engine(&dir, 4, 100, 8));

    // An async get chained behind a completed async put observes it.
    let observed = Arc::new(AtomicUsize::new(0));
    let chained = Arc::clone(&engine);
    let flag = Arc::clone(&observed);
    engine.async_put(5, b"chained".to_vec(), move |ok| {
        assert!(ok);
        chained.async_get(5, move |value| {
            assert_eq!(value, Some(b"chained".to_vec()));
            flag.fetch_add(1, Ordering::SeqCst);
        });
    });

    engine.wait_all();
    assert_eq!(observed.load(Ordering::SeqCst), 1);
}
