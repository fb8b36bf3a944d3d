//! [`Future<T>`] — the consumer side of a [`crate::FutureState`] rendezvous,
//! plus the degenerate [`LocalState`]-backed variant for already-ready
//! values.
//!
//! Blocking waits (`get`/`wait`) use a private, dedicated
//! `parking_lot::{Mutex, Condvar}` pair rather than reusing the
//! continuation machinery's internals directly — per the open design
//! question which steers away from overloading the
//! Promise/Future state transitions for synchronous blocking.
//!
//! `then_value`/`then_try` (and their flattening `_future` counterparts)
//! are provided as two concrete continuation methods rather than a single
//! polymorphic `then` that picks between them by callback arity — Rust
//! has no stable way to dispatch on "is this closure callable with `T`
//! or with `Try<T>`" the way overload resolution does in the source
//! language, so callers name the behavior they want directly.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::DeadlockAvoided;
use crate::executor::Executor;
use crate::future_state::FutureState;
use crate::try_value::Try;

/// The degenerate variant of a Future that was never paired with a live
/// Promise — e.g. the product of [`crate::make_ready_future`].
enum Repr<T> {
    Shared(Arc<FutureState<T>>),
    Local(Try<T>),
}

/// The consumer half of a Promise/Future pair, or a pre-satisfied, local
/// result.
///
/// There is at most one `Future` per [`FutureState`] at any moment: the
/// consumer role is exclusively owned.
pub struct Future<T> {
    repr: Repr<T>,
    /// Executor installed by [`Future::via`], taking priority over any
    /// executor attached to the backing [`FutureState`] (if one exists)
    /// for this Future's *own* continuation dispatch and deadlock checks
    /// — `get`/`wait`/`then_*` all consult this field, not just the one
    /// `dispatch()` in `future_state.rs` uses for a Promise's own
    /// continuation-dispatch table.
    executor_override: Option<Arc<dyn Executor>>,
}

impl<T> Future<T> {
    pub(crate) fn from_state(state: Arc<FutureState<T>>) -> Self {
        Self {
            repr: Repr::Shared(state),
            executor_override: None,
        }
    }

    /// Builds a Future that is already satisfied with `value`, with no
    /// backing [`FutureState`] at all.
    #[must_use]
    pub fn ready(value: Try<T>) -> Self {
        Self {
            repr: Repr::Local(value),
            executor_override: None,
        }
    }

    /// The executor that should dispatch this Future's own continuations
    /// and gate its blocking-wait deadlock check: the `via`-installed
    /// override if present, otherwise (for a Promise-backed Future) the
    /// executor attached to the shared state.
    fn dispatch_executor(&self) -> Option<Arc<dyn Executor>> {
        self.executor_override.clone().or_else(|| match &self.repr {
            Repr::Local(_) => None,
            Repr::Shared(state) => state.executor().cloned(),
        })
    }

    /// Returns whether this Future can still produce a result: always
    /// `true` in this implementation, since Rust's ownership model rules
    /// out the moved-from/default-constructed state Rust's ownership
    /// `FutureInvalid` error guards against (consuming methods take
    /// `self` by value, so a used-up Future cannot be observed again).
    #[must_use]
    pub const fn valid(&self) -> bool {
        true
    }

    /// Reports whether a result is already available without blocking.
    #[must_use]
    pub fn has_result(&self) -> bool {
        match &self.repr {
            Repr::Local(..) => true,
            Repr::Shared(state) => state.has_result(),
        }
    }

    /// Associates an executor with this Future, consuming it. The
    /// continuation installed by a later `then_*`/`get`/`wait` call is
    /// dispatched through this executor, taking priority over any
    /// executor already attached to a backing Promise's state.
    #[must_use]
    pub fn via(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor_override = Some(executor);
        self
    }

    /// Blocks the calling thread until a result is available and returns
    /// it.
    ///
    /// # Panics
    ///
    /// Panics with [`DeadlockAvoided`] if called from a thread that
    /// belongs to this Future's own executor.
    #[must_use]
    pub fn get(self) -> Try<T>
    where
        T: Send + 'static,
    {
        self.try_get().unwrap_or_else(|error| panic!("{error}"))
    }

    /// Fallible counterpart to [`Future::get`].
    ///
    /// # Errors
    ///
    /// Returns [`DeadlockAvoided`] if called from a thread that belongs
    /// to this Future's own executor.
    pub fn try_get(self) -> Result<Try<T>, DeadlockAvoided>
    where
        T: Send + 'static,
    {
        if self
            .dispatch_executor()
            .is_some_and(|executor| executor.current_thread_in_executor())
        {
            return Err(DeadlockAvoided);
        }

        match self.repr {
            Repr::Local(value) => Ok(value),
            Repr::Shared(state) => {
                let pair: Arc<(Mutex<Option<Try<T>>>, Condvar)> =
                    Arc::new((Mutex::new(None), Condvar::new()));
                let pair_for_continuation = Arc::clone(&pair);
                state.set_continuation(Box::new(move |result| {
                    let (lock, condvar) = &*pair_for_continuation;
                    *lock.lock() = Some(result);
                    condvar.notify_one();
                }));

                let (lock, condvar) = &*pair;
                let mut guard = lock.lock();
                while guard.is_none() {
                    condvar.wait(&mut guard);
                }
                Ok(guard.take().expect("condvar woke with no result set"))
            }
        }
    }

    /// Blocking helper equivalent to discarding [`Future::get`]'s value;
    /// waits for the result without requiring the caller to bind it.
    ///
    /// # Panics
    ///
    /// Panics under the same condition as [`Future::get`].
    pub fn wait(self)
    where
        T: Send + 'static,
    {
        let _ = self.get();
    }

    /// Installs `callback` as the continuation, always invoked regardless
    /// of whether the input holds a value or an error.
    #[must_use]
    pub fn then_try<R, F>(self, callback: F) -> Future<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: FnOnce(Try<T>) -> Try<R> + Send + 'static,
    {
        let promise = crate::promise::Promise::<R>::new();
        let future = promise.get_future();
        self.install(Box::new(move |result| {
            let _ = promise.set_try(callback(result));
        }));
        future
    }

    /// Flattening counterpart to [`Future::then_try`]: `callback` returns
    /// a `Future<R>`, whose eventual result becomes the outer Future's
    /// result directly (not nested).
    #[must_use]
    pub fn then_try_future<R, F>(self, callback: F) -> Future<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: FnOnce(Try<T>) -> Future<R> + Send + 'static,
    {
        let promise = crate::promise::Promise::<R>::new();
        let future = promise.get_future();
        self.install(Box::new(move |result| {
            let inner = callback(result);
            inner.install(Box::new(move |inner_result| {
                let _ = promise.set_try(inner_result);
            }));
        }));
        future
    }

    /// Installs `callback` over the value only; an `Error` input is
    /// propagated without invoking `callback`.
    #[must_use]
    pub fn then_value<R, F>(self, callback: F) -> Future<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        self.then_try(move |result| match result {
            Try::Value(value) => Try::Value(callback(value)),
            Try::Error(error) => Try::Error(error),
            Try::Empty => Try::Empty,
        })
    }

    /// Flattening counterpart to [`Future::then_value`].
    #[must_use]
    pub fn then_value_future<R, F>(self, callback: F) -> Future<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: FnOnce(T) -> Future<R> + Send + 'static,
    {
        self.then_try_future(move |result| match result {
            Try::Value(value) => callback(value),
            Try::Error(error) => Future::ready(Try::Error(error)),
            Try::Empty => Future::ready(Try::Empty),
        })
    }

    fn install(self, continuation: crate::future_state::Continuation<T>)
    where
        T: Send + 'static,
    {
        let override_executor = self.executor_override.clone();
        let continuation: crate::future_state::Continuation<T> = match override_executor {
            // A `via`-installed override takes priority over the state's
            // own executor: post the continuation through it instead of
            // letting `FutureState::dispatch` decide, falling back to
            // inline execution if the executor refuses the work item
            // (same recoverable-failure rule as §4.1's dispatch table).
            Some(executor) => Box::new(move |result| {
                let payload = Arc::new(Mutex::new(Some((continuation, result))));
                let payload_for_work = Arc::clone(&payload);
                let posted = executor.schedule(Box::new(move || {
                    if let Some((continuation, result)) = payload_for_work.lock().take() {
                        continuation(result);
                    }
                }));
                if !posted {
                    tracing::warn!("Future::via executor refused continuation, running inline");
                    if let Some((continuation, result)) = payload.lock().take() {
                        continuation(result);
                    }
                }
            }),
            None => continuation,
        };

        match self.repr {
            Repr::Local(value) => continuation(value),
            Repr::Shared(state) => state.set_continuation(continuation),
        }
    }
}

/// Builds an already-satisfied [`Future<T>`] with no associated Promise.
#[must_use]
pub fn make_ready_future<T>(value: T) -> Future<T> {
    Future::ready(Try::Value(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn ready_future_value_roundtrips() {
        let future = make_ready_future(42);
        assert_eq!(future.get().value().unwrap(), 42);
    }

    #[rstest]
    fn then_value_transforms_value() {
        let future = make_ready_future(21).then_value(|n| n * 2);
        assert_eq!(future.get().value().unwrap(), 42);
    }

    #[rstest]
    fn then_value_skips_callback_on_error() {
        let future: Future<i32> = Future::ready(Try::Error(crate::error::BrokenPromise.into()));
        let mapped = future.then_value(|n: i32| n * 2);
        assert!(mapped.get().has_error());
    }

    #[rstest]
    fn then_value_future_flattens() {
        let future = make_ready_future(1).then_value_future(|n| make_ready_future(n + 1));
        assert_eq!(future.get().value().unwrap(), 2);
    }

    #[rstest]
    fn via_dispatches_then_continuation_through_the_override_executor() {
        use crate::executor::Work;
        use std::sync::atomic::{AtomicBool, Ordering};

        struct RecordingExecutor(Arc<AtomicBool>);
        impl Executor for RecordingExecutor {
            fn schedule(&self, work: Work) -> bool {
                self.0.store(true, Ordering::SeqCst);
                work();
                true
            }
        }

        let used = Arc::new(AtomicBool::new(false));
        let executor: Arc<dyn Executor> = Arc::new(RecordingExecutor(Arc::clone(&used)));

        let future = make_ready_future(1).via(executor).then_value(|n| n + 1);
        assert_eq!(future.get().value().unwrap(), 2);
        assert!(used.load(Ordering::SeqCst));
    }

    #[rstest]
    fn via_dispatches_a_promise_backed_future_through_the_override_executor() {
        use crate::executor::Work;
        use std::sync::atomic::{AtomicBool, Ordering};

        struct RecordingExecutor(Arc<AtomicBool>);
        impl Executor for RecordingExecutor {
            fn schedule(&self, work: Work) -> bool {
                self.0.store(true, Ordering::SeqCst);
                work();
                true
            }
        }

        let used = Arc::new(AtomicBool::new(false));
        let executor: Arc<dyn Executor> = Arc::new(RecordingExecutor(Arc::clone(&used)));

        let promise = crate::promise::Promise::<i32>::new();
        let future = promise.get_future().via(executor);
        promise.set_value(10).unwrap();
        let mapped = future.then_value(|n| n * 2);
        assert_eq!(mapped.get().value().unwrap(), 20);
        assert!(used.load(Ordering::SeqCst));
    }

    #[rstest]
    fn promise_future_blocking_get() {
        let promise = crate::promise::Promise::<i32>::new();
        let future = promise.get_future();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            promise.set_value(42).unwrap();
        });
        assert_eq!(future.get().value().unwrap(), 42);
        handle.join().unwrap();
    }
}
