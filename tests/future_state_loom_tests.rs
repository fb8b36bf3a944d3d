//! Concurrency tests for the `Promise`/`Future` rendezvous's lock-free
//! CAS state machine.
//!
//! # Note on loom integration
//!
//! Full loom model checking would require `FutureState` to use loom's
//! atomic types conditionally instead of `std::sync::atomic`. Currently,
//! these tests use standard thread-based stress testing, run many times,
//! which gives good coverage of the common interleavings (result-then-
//! continuation, continuation-then-result, and racing producers) without
//! a true exhaustive model check. They drive the rendezvous only through
//! `Promise`/`Future`'s public API, since the underlying state machine's
//! `set_result`/`set_continuation` are crate-private and single-writer by
//! contract, not meant to be called concurrently from outside it.
//!
//! # Running these tests
//!
//! ```bash
//! cargo test --test future_state_loom_tests --features loom
//! ```

#![cfg(feature = "loom")]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use lazy_rt::Promise;

const ITERATIONS: usize = 200;

#[test]
fn producer_and_continuation_race_dispatch_exactly_once() {
    for _ in 0..ITERATIONS {
        let promise: Promise<i32> = Promise::new();
        let future = promise.get_future();
        let dispatched = Arc::new(AtomicUsize::new(0));

        let producer = thread::spawn(move || {
            promise.set_value(42).unwrap();
        });

        let dispatched_for_consumer = Arc::clone(&dispatched);
        let consumer = thread::spawn(move || {
            let result = future.then_value(move |value| {
                dispatched_for_consumer.fetch_add(1, Ordering::SeqCst);
                value
            });
            result.get()
        });

        producer.join().unwrap();
        let result = consumer.join().unwrap();

        assert_eq!(result.value().unwrap(), 42);
        assert_eq!(dispatched.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn many_racing_pairs_each_dispatch_exactly_once() {
    for _ in 0..ITERATIONS {
        let dispatched = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8i32)
            .flat_map(|value| {
                let promise: Promise<i32> = Promise::new();
                let future = promise.get_future();
                let dispatched = Arc::clone(&dispatched);
                vec![
                    thread::spawn(move || {
                        promise.set_value(value).unwrap();
                    }),
                    thread::spawn(move || {
                        let mapped = future.then_value(move |n| {
                            dispatched.fetch_add(1, Ordering::SeqCst);
                            n
                        });
                        assert_eq!(mapped.get().value().unwrap(), value);
                    }),
                ]
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(dispatched.load(Ordering::SeqCst), 8);
    }
}

#[test]
fn racing_promise_clones_only_one_fulfills_the_future() {
    // Two clones of the same logical Promise race `set_value`; only one
    // should win the `claimed` guard and actually reach the shared state.
    for _ in 0..ITERATIONS {
        let promise: Promise<i32> = Promise::new();
        let future = promise.get_future();
        let first = promise.clone();
        let second = promise;

        let first_handle = thread::spawn(move || first.set_value(1));
        let second_handle = thread::spawn(move || second.set_value(2));

        let first_ok = first_handle.join().unwrap().is_ok();
        let second_ok = second_handle.join().unwrap().is_ok();

        assert_ne!(first_ok, second_ok);
        assert!(future.get().is_value());
    }
}
