#![allow(unsafe_code)]
//! The lock-free rendezvous shared between a [`crate::Promise`] and a
//! [`crate::Future`].
//!
//! An `AtomicU8`-encoded state machine guarding `UnsafeCell<MaybeUninit<_>>`
//! storage that is written exactly once and read only after the CAS that
//! publishes it has been observed. Unlike a single-field, single-producer
//! cell, `FutureState` rendezvouses two independently-arriving writes —
//! the result and the continuation — and dispatches the continuation
//! through an optional executor once both have arrived.
//!
//! # Safety
//!
//! - `result` is only read after a CAS has been observed to transition
//!   into `ONLY_RESULT` or `DONE`; it is written before that CAS.
//! - `continuation` is only read after a CAS has been observed to
//!   transition into `ONLY_CONTINUATION` or `DONE`; it is written before
//!   that CAS.
//! - Exactly one of the two CAS operations that reach `DONE` "wins" (the
//!   other observes `DONE` already set and treats it as a usage error),
//!   so `dispatch` runs exactly once per `FutureState`.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use parking_lot::Mutex;

use crate::executor::{Executor, ExecutorContext, Work};
use crate::try_value::Try;

const START: u8 = 0;
const ONLY_RESULT: u8 = 1;
const ONLY_CONTINUATION: u8 = 2;
const DONE: u8 = 3;

/// The continuation installed by a [`crate::Future`]'s consumer: invoked
/// exactly once, with the final [`Try<T>`].
pub type Continuation<T> = Box<dyn FnOnce(Try<T>) + Send + 'static>;

/// Outcome of a `set_result`/`set_continuation` call: whether this call
/// was the one that drove the state machine to `DONE` and is therefore
/// responsible for running `dispatch`.
enum Transition {
    /// The peer has not arrived yet; nothing to dispatch.
    Deferred,
    /// This call completed the rendezvous. `trigger_by_continuation` is
    /// `true` when `set_continuation` performed the winning CAS (meaning
    /// the result was already present).
    Ready { trigger_by_continuation: bool },
}

/// The shared rendezvous between exactly one [`crate::Promise`] (plus any
/// clones of it) and exactly one [`crate::Future`].
pub struct FutureState<T> {
    state: AtomicU8,
    result: UnsafeCell<MaybeUninit<Try<T>>>,
    continuation: UnsafeCell<MaybeUninit<Continuation<T>>>,
    executor: Option<Arc<dyn Executor>>,
    context: Mutex<Option<ExecutorContext>>,
    force_sched: AtomicBool,
    /// Number of live `Promise` handles pointing at this state (a clone
    /// of `Promise<T>` increments this; a drop decrements it).
    promise_count: AtomicU8,
    /// `true` once `get_future` has been called once.
    future_retrieved: AtomicBool,
}

// SAFETY: `T` crosses thread boundaries only through the CAS-guarded
// cells above, which is exactly the access pattern `ConcurrentLazy`
// documents as sound for `T: Send`.
unsafe impl<T: Send> Send for FutureState<T> {}
unsafe impl<T: Send> Sync for FutureState<T> {}

impl<T> FutureState<T> {
    /// Builds a fresh, unsatisfied state with one promise attached and no
    /// executor.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(START),
            result: UnsafeCell::new(MaybeUninit::uninit()),
            continuation: UnsafeCell::new(MaybeUninit::uninit()),
            executor: None,
            context: Mutex::new(None),
            force_sched: AtomicBool::new(false),
            promise_count: AtomicU8::new(1),
            future_retrieved: AtomicBool::new(false),
        })
    }

    pub(crate) fn promise_count_increment(&self) {
        self.promise_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements the promise refcount; returns `true` if this was the
    /// last Promise handle.
    pub(crate) fn promise_count_decrement(&self) -> bool {
        self.promise_count.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub(crate) fn mark_future_retrieved(&self) -> bool {
        !self.future_retrieved.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn set_force_sched(&self) {
        self.force_sched.store(true, Ordering::Relaxed);
    }

    pub(crate) fn set_checkout_context(&self, context: ExecutorContext) {
        *self.context.lock() = Some(context);
    }

    pub(crate) fn executor(&self) -> Option<&Arc<dyn Executor>> {
        self.executor.as_ref()
    }

    pub(crate) fn has_result(&self) -> bool {
        matches!(self.state.load(Ordering::Acquire), ONLY_RESULT | DONE)
    }

    /// Writes `value` into the result slot and advances the state
    /// machine. If this call completes the rendezvous, runs `dispatch`.
    ///
    /// # Panics
    ///
    /// Panics if a result has already been set (the state was already
    /// `ONLY_RESULT` or `DONE`).
    pub(crate) fn set_result(self: &Arc<Self>, value: Try<T>) {
        // SAFETY: only reachable from START or ONLY_CONTINUATION, neither
        // of which has had `result` written yet.
        unsafe { (*self.result.get()).write(value) };

        let mut state = self.state.load(Ordering::Acquire);
        let transition = loop {
            match state {
                START => {
                    match self.state.compare_exchange(
                        START,
                        ONLY_RESULT,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => break Transition::Deferred,
                        Err(current) => state = current,
                    }
                }
                ONLY_CONTINUATION => {
                    match self.state.compare_exchange(
                        ONLY_CONTINUATION,
                        DONE,
                        Ordering::Release,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            break Transition::Ready {
                                trigger_by_continuation: false,
                            };
                        }
                        Err(current) => state = current,
                    }
                }
                ONLY_RESULT | DONE => {
                    panic!(
                        "FutureState::set_result invariant violation: \
                         set_value/set_exception called twice on the same Promise"
                    );
                }
                _ => unreachable!("invalid FutureState state"),
            }
        };

        if let Transition::Ready {
            trigger_by_continuation,
        } = transition
        {
            self.dispatch(trigger_by_continuation);
        }
    }

    /// Installs `continuation` and advances the state machine. If this
    /// call completes the rendezvous, runs `dispatch`.
    ///
    /// # Panics
    ///
    /// Panics if a continuation has already been installed.
    pub(crate) fn set_continuation(self: &Arc<Self>, continuation: Continuation<T>) {
        // SAFETY: only reachable from START or ONLY_RESULT, neither of
        // which has had `continuation` written yet.
        unsafe { (*self.continuation.get()).write(continuation) };

        let mut state = self.state.load(Ordering::Acquire);
        let transition = loop {
            match state {
                START => {
                    match self.state.compare_exchange(
                        START,
                        ONLY_CONTINUATION,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => break Transition::Deferred,
                        Err(current) => state = current,
                    }
                }
                ONLY_RESULT => {
                    match self.state.compare_exchange(
                        ONLY_RESULT,
                        DONE,
                        Ordering::Release,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            break Transition::Ready {
                                trigger_by_continuation: true,
                            };
                        }
                        Err(current) => state = current,
                    }
                }
                ONLY_CONTINUATION | DONE => {
                    panic!(
                        "FutureState::set_continuation invariant violation: \
                         a continuation was already installed for this Future"
                    );
                }
                _ => unreachable!("invalid FutureState state"),
            }
        };

        if let Transition::Ready {
            trigger_by_continuation,
        } = transition
        {
            self.dispatch(trigger_by_continuation);
        }
    }

    /// Runs the continuation dispatch table, exactly once.
    fn dispatch(self: &Arc<Self>, trigger_by_continuation: bool)
    where
        T: Send + 'static,
    {
        // SAFETY: DONE has just been reached, so both cells were written
        // (one by this call, one by the peer call that lost the race),
        // and neither will be written again (panics guard re-entry).
        let continuation = unsafe { (*self.continuation.get()).as_mut_ptr().read() };
        let result = unsafe { (*self.result.get()).as_mut_ptr().read() };

        let on_executor_thread = self
            .executor
            .as_ref()
            .is_some_and(|executor| executor.current_thread_in_executor());
        let force_sched = self.force_sched.load(Ordering::Relaxed);

        let run_inline = match &self.executor {
            None => true,
            Some(_) if force_sched => false,
            Some(_) if trigger_by_continuation => true,
            Some(_) => on_executor_thread,
        };

        if run_inline {
            tracing::trace!(trigger_by_continuation, "running continuation inline");
            continuation(result);
            return;
        }

        tracing::trace!(trigger_by_continuation, "posting continuation to executor");
        let executor = self
            .executor
            .clone()
            .expect("run_inline is false only when an executor is attached");
        let context = self.context.lock().clone();

        // Recoverable in case the executor refuses the work item: §4.1
        // requires falling back to inline execution rather than dropping
        // the continuation.
        let payload = Arc::new(Mutex::new(Some((continuation, result))));
        let payload_for_work = Arc::clone(&payload);
        let work: Work = Box::new(move || {
            if let Some((continuation, result)) = payload_for_work.lock().take() {
                continuation(result);
            }
        });

        let posted = match context.as_ref() {
            Some(context) => executor.checkin(work, context),
            None => executor.schedule(work),
        };

        if !posted {
            tracing::warn!("executor refused continuation, falling back to inline execution");
            if let Some((continuation, result)) = payload.lock().take() {
                continuation(result);
            }
        }
    }
}

impl<T> Drop for FutureState<T> {
    /// Drops whichever of `result`/`continuation` was actually written,
    /// based on the final `state`.
    ///
    /// # Safety
    ///
    /// `&mut self` here means exclusive access (no other reference to
    /// this `FutureState` can exist), so reading `state` via `get_mut`
    /// needs no atomic synchronization. In `ONLY_RESULT`, only `result`
    /// was ever written, so only it is dropped; in `ONLY_CONTINUATION`,
    /// only `continuation`. In `DONE`, `dispatch` has already read both
    /// cells out by value (`as_mut_ptr().read()`) and handed them to the
    /// continuation call, so dropping them again here would double-drop
    /// — `DONE` and the unreachable `START`-with-nothing-written case
    /// both drop nothing.
    fn drop(&mut self) {
        match *self.state.get_mut() {
            START | DONE => {}
            ONLY_RESULT => unsafe { (*self.result.get()).assume_init_drop() },
            ONLY_CONTINUATION => unsafe { (*self.continuation.get()).assume_init_drop() },
            _ => unreachable!("invalid FutureState state"),
        }
    }
}

impl<T> FutureState<T> {
    /// Attaches an executor at construction time (builder-style, used by
    /// `Promise::new_with_executor`).
    pub(crate) fn with_executor(executor: Arc<dyn Executor>) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(START),
            result: UnsafeCell::new(MaybeUninit::uninit()),
            continuation: UnsafeCell::new(MaybeUninit::uninit()),
            executor: Some(executor),
            context: Mutex::new(None),
            force_sched: AtomicBool::new(false),
            promise_count: AtomicU8::new(1),
            future_retrieved: AtomicBool::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::mpsc;

    #[rstest]
    fn result_then_continuation_dispatches_inline() {
        let state: Arc<FutureState<i32>> = FutureState::new();
        let (tx, rx) = mpsc::channel();
        state.set_result(Try::Value(42));
        state.set_continuation(Box::new(move |result| {
            tx.send(result.value().unwrap()).unwrap();
        }));
        assert_eq!(rx.recv().unwrap(), 42);
    }

    #[rstest]
    fn continuation_then_result_dispatches_inline() {
        let state: Arc<FutureState<i32>> = FutureState::new();
        let (tx, rx) = mpsc::channel();
        state.set_continuation(Box::new(move |result| {
            tx.send(result.value().unwrap()).unwrap();
        }));
        state.set_result(Try::Value(7));
        assert_eq!(rx.recv().unwrap(), 7);
    }

    #[rstest]
    #[should_panic(expected = "set_value/set_exception called twice")]
    fn double_set_result_panics() {
        let state: Arc<FutureState<i32>> = FutureState::new();
        state.set_result(Try::Value(1));
        state.set_result(Try::Value(2));
    }

    #[rstest]
    #[should_panic(expected = "a continuation was already installed")]
    fn double_set_continuation_panics() {
        let state: Arc<FutureState<i32>> = FutureState::new();
        state.set_continuation(Box::new(|_| {}));
        state.set_continuation(Box::new(|_| {}));
    }

    /// Drops on a value held by a `Try<T>` written into `result` must run
    /// even when the rendezvous never reaches `DONE` (no continuation was
    /// ever installed), proving `Drop for FutureState` reclaims the
    /// `ONLY_RESULT` case instead of leaking it.
    struct DropCounter(Arc<AtomicU8>);
    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[rstest]
    fn dropping_an_only_result_state_drops_the_held_value() {
        let drops = Arc::new(AtomicU8::new(0));
        let state: Arc<FutureState<DropCounter>> = FutureState::new();
        state.set_result(Try::Value(DropCounter(Arc::clone(&drops))));
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(state);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn dropping_an_only_continuation_state_drops_the_closure() {
        let drops = Arc::new(AtomicU8::new(0));
        let drops_for_continuation = Arc::clone(&drops);
        let guard = DropCounter(drops_for_continuation);
        let state: Arc<FutureState<i32>> = FutureState::new();
        state.set_continuation(Box::new(move |_| {
            let _keep_alive = &guard;
        }));
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(state);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
