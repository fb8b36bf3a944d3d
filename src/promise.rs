//! [`Promise<T>`] — the producer side of a [`crate::FutureState`] rendezvous.
//!
//! `Promise` exposes both a blunt, panicking convenience method and a
//! `Result`-returning one (mirroring `spawn` vs `try_spawn` pairs elsewhere
//! in this crate) wherever the contract calls for "fail loudly at the API
//! boundary".

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{FutureAlreadyRetrieved, PromiseAlreadySatisfied};
use crate::executor::{Executor, ExecutorContext};
use crate::future::Future;
use crate::future_state::FutureState;
use crate::try_value::Try;

/// The producer half of a Promise/Future pair.
///
/// Cloning a `Promise` duplicates the producer-side attachment: every
/// clone must eventually be dropped or satisfied, but only one should
/// actually fulfill the state — the rest are expected to be abandoned.
pub struct Promise<T> {
    state: Arc<FutureState<T>>,
    claimed: Arc<AtomicBool>,
}

impl<T> Promise<T> {
    /// Creates a fresh, unpaired Promise with no attached executor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: FutureState::new(),
            claimed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a fresh Promise whose continuation will always be
    /// dispatched through `executor`.
    #[must_use]
    pub fn with_executor(executor: Arc<dyn Executor>) -> Self {
        Self {
            state: FutureState::with_executor(executor),
            claimed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Produces the single [`Future`] for this Promise.
    ///
    /// # Errors
    ///
    /// Returns [`FutureAlreadyRetrieved`] if called twice on any clone of
    /// the same logical Promise.
    pub fn try_get_future(&self) -> Result<Future<T>, FutureAlreadyRetrieved> {
        if self.state.mark_future_retrieved() {
            Ok(Future::from_state(Arc::clone(&self.state)))
        } else {
            Err(FutureAlreadyRetrieved)
        }
    }

    /// Convenience wrapper over [`Promise::try_get_future`] that panics on
    /// failure.
    ///
    /// # Panics
    ///
    /// Panics if a Future was already retrieved from this Promise.
    #[must_use]
    pub fn get_future(&self) -> Future<T> {
        self.try_get_future()
            .expect("get_future() called twice on the same Promise")
    }

    /// Snapshots the current execution context via the attached
    /// executor's `checkout()`, so the eventual continuation can be
    /// re-entered on the same context. No-op if no executor is attached.
    pub fn checkout(&self) {
        if let Some(executor) = self.state.executor() {
            let context: ExecutorContext = executor.checkout();
            self.state.set_checkout_context(context);
        }
    }

    /// Sets `force_sched`: the continuation will never be invoked inline,
    /// always posted to the executor.
    pub fn force_sched(&self) {
        self.state.set_force_sched();
    }

    fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }

    /// Writes `value` into the state and advances the rendezvous.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseAlreadySatisfied`] if this logical Promise (or a
    /// clone of it) already set a result.
    pub fn set_value(&self, value: T) -> Result<(), PromiseAlreadySatisfied> {
        self.set_try(Try::Value(value))
    }

    /// Writes a captured error into the state, per [`Promise::set_value`].
    ///
    /// # Errors
    ///
    /// Returns [`PromiseAlreadySatisfied`] under the same condition as
    /// [`Promise::set_value`].
    pub fn set_exception<E>(&self, error: E) -> Result<(), PromiseAlreadySatisfied>
    where
        E: Into<crate::try_value::TryError>,
    {
        self.set_try(Try::Error(error.into()))
    }

    /// Writes a pre-built [`Try<T>`] into the state.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseAlreadySatisfied`] under the same condition as
    /// [`Promise::set_value`].
    pub fn set_try(&self, value: Try<T>) -> Result<(), PromiseAlreadySatisfied>
    where
        T: Send + 'static,
    {
        if !self.claim() {
            return Err(PromiseAlreadySatisfied);
        }
        self.state.set_result(value);
        Ok(())
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        self.state.promise_count_increment();
        Self {
            state: Arc::clone(&self.state),
            claimed: Arc::clone(&self.claimed),
        }
    }
}

impl<T> Drop for Promise<T>
where
    T: Send + 'static,
{
    fn drop(&mut self) {
        if self.state.promise_count_decrement() && !self.claimed.load(Ordering::Acquire) {
            // Last Promise handle dropped without ever setting a result:
            // inject BrokenPromise as if set_value had been called.
            if self.claim() {
                self.state
                    .set_result(Try::Error(crate::error::BrokenPromise.into()));
            }
        }
    }
}
