//! Loom-based concurrency tests
//!
//! These tests use the `loom` library to exhaustively check thread
//! interleavings of the epoch announcement protocol, the list head CAS and
//! the segment rotation race.
//!
//! Run with: `cargo test --test loom_tests --features loom --release`

#![cfg(feature = "loom")]

use loom::model::Builder;
use loom::sync::Arc;
use loom::thread;
use swmr_reclaim::{AtomicList, BoundedList, MemoryUsage, ResourceManager};

/// Test: a read racing an update observes either the old or the new value,
/// and the writer only regains ownership after the reader released its slot.
#[test]
fn loom_read_races_update() {
    loom::model(|| {
        let manager = Arc::new(ResourceManager::new(1u64));

        let m = Arc::clone(&manager);
        let reader = thread::spawn(move || m.read(|v| *v));

        let retired = manager.update(Some(Box::new(2u64)));
        // into_inner spins until no announced reader could still see the
        // displaced value; under loom the yield lets the reader finish.
        let old = retired.into_inner();
        assert_eq!(old.as_deref(), Some(&1));

        let value = reader.join().unwrap();
        assert!(value == 1 || value == 2, "value = {}", value);
    });
}

/// Test: two readers starting at the same preferred slot (the loom build
/// seeds every thread at slot 0) collide, probe forward and both complete.
#[test]
fn loom_colliding_readers_probe_forward() {
    let mut builder = Builder::new();
    builder.preemption_bound = Some(3);
    builder.check(|| {
        let manager = Arc::new(ResourceManager::new(7u64));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let m = Arc::clone(&manager);
                thread::spawn(move || m.read(|v| *v))
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 7);
        }

        let retired = manager.update(Some(Box::new(8u64)));
        assert!(manager.can_reclaim(retired.epoch()));
        drop(retired);
    });
}

/// Test: a reader that announced before the epoch advance blocks reclamation
/// of the displaced resource until it leaves.
#[test]
fn loom_reclaim_waits_for_reader() {
    let mut builder = Builder::new();
    builder.preemption_bound = Some(3);
    builder.check(|| {
        let manager = Arc::new(ResourceManager::new(1u64));

        let m = Arc::clone(&manager);
        let reader = thread::spawn(move || m.read(|v| *v));

        let retired = manager.update(None);
        let old = retired.into_inner();
        assert_eq!(old.as_deref(), Some(&1));

        let value = reader.join().unwrap();
        // The read may run before or after the null update.
        assert!(value == 1 || value == 0, "value = {}", value);
    });
}

/// Test: concurrent prepends both land and stay reachable.
#[test]
fn loom_concurrent_list_prepends() {
    loom::model(|| {
        let list = Arc::new(AtomicList::new());

        let l1 = Arc::clone(&list);
        let h1 = thread::spawn(move || l1.prepend(1i32));
        let l2 = Arc::clone(&list);
        let h2 = thread::spawn(move || l2.prepend(2i32));

        h1.join().unwrap();
        h2.join().unwrap();

        let mut values: Vec<i32> = list.iter().copied().collect();
        values.sort_unstable();
        assert_eq!(values, vec![1, 2]);
    });
}

/// Test: a snapshot taken while another thread prepends sees a prefix-free
/// subset of the final list, never a torn node.
#[test]
fn loom_snapshot_during_prepend() {
    loom::model(|| {
        let list = Arc::new(AtomicList::new());
        list.prepend(1i32);

        let l = Arc::clone(&list);
        let writer = thread::spawn(move || l.prepend(2i32));

        for &value in list.iter() {
            assert!(value == 1 || value == 2);
        }

        writer.join().unwrap();
        assert_eq!(list.iter().count(), 2);
    });
}

struct Byte(#[allow(dead_code)] u64);

impl MemoryUsage for Byte {
    fn memory_usage(&self) -> usize {
        1
    }
}

/// Test: the rotation race loses no items; with two slots in the ring and
/// three prepends nothing can reach the trash, so every item stays visible.
#[test]
fn loom_rotation_races_prepend() {
    let mut builder = Builder::new();
    builder.preemption_bound = Some(3);
    builder.check(|| {
        let list = Arc::new(BoundedList::new(2, 2).unwrap());

        let l = Arc::clone(&list);
        let writer = thread::spawn(move || {
            l.prepend(Byte(1));
            l.prepend(Byte(2));
        });

        list.prepend(Byte(3));
        writer.join().unwrap();

        let mut visited = 0;
        list.for_items(|_| visited += 1);
        assert_eq!(visited, 3);
        assert_eq!(list.trash_len(), 0);
    });
}
