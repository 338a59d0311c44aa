#![cfg(not(loom))]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use nexus_ring::indexed::{self, Inline};
use nexus_ring::{CapacityError, Full};

#[test]
fn fifo_order() {
    let (mut tx, mut rx) = indexed::heap::<i32>(16).unwrap();

    for i in 0..10 {
        tx.push(i);
    }
    for i in 0..10 {
        assert_eq!(rx.pop(), i);
    }
    assert_eq!(rx.try_pop(), None);
}

#[test]
fn full_then_one_pop_frees_one_slot() {
    let (mut tx, mut rx) = indexed::heap::<u32>(4).unwrap();

    for i in 0..4 {
        tx.try_push(i).unwrap();
    }
    assert!(matches!(tx.try_push(4), Err(Full(4))));
    assert_eq!(tx.len(), 4);

    assert_eq!(rx.pop(), 0);
    tx.try_push(4).unwrap();
    assert!(tx.try_push(5).is_err());

    let drained: Vec<_> = std::iter::from_fn(|| rx.try_pop()).collect();
    assert_eq!(drained, [1, 2, 3, 4]);
}

#[test]
fn zero_capacity_rejected() {
    assert_eq!(indexed::heap::<u8>(0).err(), Some(CapacityError::Zero));
}

#[test]
fn inline_matches_heap_behavior() {
    let (mut tx, mut rx) = indexed::inline::<u64, 8>().unwrap();
    assert_eq!(tx.capacity(), 8);

    for round in 0..5u64 {
        for i in 0..8 {
            tx.try_push(round * 8 + i).unwrap();
        }
        assert!(tx.try_push(0).is_err());
        for i in 0..8 {
            assert_eq!(rx.pop(), round * 8 + i);
        }
        assert!(rx.is_empty());
    }
}

#[test]
fn inline_rejects_runtime_capacity() {
    assert_eq!(
        indexed::channel::<u64, Inline<u64, 8>>(8).err(),
        Some(CapacityError::RuntimeCapacity(8))
    );
}

#[test]
fn strings_move_through() {
    let (mut tx, mut rx) = indexed::heap::<String>(2).unwrap();
    tx.push("hello".to_owned());
    tx.emplace(|| "world".to_owned());

    assert_eq!(rx.pop(), "hello");
    assert_eq!(rx.pop(), "world");
}

/// Many more items than slots: nothing lost, duplicated or reordered.
fn stress<S>(mut tx: indexed::Producer<u64, S>, mut rx: indexed::Consumer<u64, S>, count: u64)
where
    S: indexed::Storage<u64> + Send + 'static,
{
    let producer = thread::spawn(move || {
        for i in 0..count {
            tx.push(i);
        }
    });

    for expected in 0..count {
        assert_eq!(rx.pop(), expected);
    }
    assert_eq!(rx.try_pop(), None);

    producer.join().unwrap();
}

#[test]
fn cross_thread_heap() {
    let (tx, rx) = indexed::heap::<u64>(128).unwrap();
    stress(tx, rx, 1_000_000);
}

#[test]
fn cross_thread_inline() {
    let (tx, rx) = indexed::inline::<u64, 32>().unwrap();
    stress(tx, rx, 500_000);
}

#[test]
fn cross_thread_capacity_one() {
    let (tx, rx) = indexed::heap::<u64>(1).unwrap();
    stress(tx, rx, 100_000);
}

#[test]
fn len_never_exceeds_capacity() {
    const COUNT: u64 = 200_000;
    let (mut tx, mut rx) = indexed::heap::<u64>(16).unwrap();
    let done = Arc::new(AtomicBool::new(false));
    let done_producer = Arc::clone(&done);

    let producer = thread::spawn(move || {
        for i in 0..COUNT {
            tx.push(i);
            assert!(tx.len() <= tx.capacity());
        }
        done_producer.store(true, Ordering::Release);
    });

    let mut received = 0;
    while received < COUNT {
        assert!(rx.len() <= rx.capacity());
        if rx.try_pop().is_some() {
            received += 1;
        }
    }

    producer.join().unwrap();
    assert!(done.load(Ordering::Acquire));
    assert!(rx.is_empty());
}

#[test]
fn producer_sees_consumer_drop() {
    let (mut tx, rx) = indexed::heap::<u64>(4).unwrap();
    assert!(!tx.is_disconnected());

    let consumer = thread::spawn(move || drop(rx));
    consumer.join().unwrap();

    assert!(tx.is_disconnected());
    // Pushing into a disconnected queue still succeeds while there is room
    tx.try_push(1).unwrap();
}
