//! # lazy-rt
//!
//! A lazily-started, executor-agnostic asynchronous execution core: a
//! [`Try<T>`] sum type, a minimal [`Executor`] trait, a lock-free
//! Promise/Future rendezvous, single-shot [`Lazy<T>`] coroutine tasks
//! with symmetric-transfer resumption, and the combinators
//! (`collect_all`, `collect_any`, windowed variants, `dispatch`,
//! `sleep`) built on top of them.
//!
//! ## Overview
//!
//! Rust's own `async`/`.await` already provides symmetric transfer for
//! free: when a `Future` being polled from inside another `async fn`
//! resolves, control returns directly into the enclosing poll without
//! growing the call stack or going through an executor. [`Lazy<T>`] is
//! a thin coroutine wrapper around that — initial-suspend (nothing runs
//! until awaited), inheriting the ambient executor of whoever awaits it
//! unless explicitly bound via [`Lazy::via`]/[`Lazy::set_ex`].
//!
//! The Promise/Future half is independent of `Lazy`: a [`Promise<T>`]
//! can be handed across threads and satisfied from anywhere, and its
//! paired [`Future<T>`] resumes whoever installed a continuation on it
//! (another `Lazy` awaiting it, or a blocking [`Future::get`] call)
//! through the same dispatch-table logic either way.
//!
//! ## Feature Flags
//!
//! - `generator` (default-on): the synchronous, pull-style
//!   [`generator::Generator`], independent of the async core above.
//! - `loom`: gates `tests/future_state_loom_tests.rs`, a thread-stress
//!   suite that exercises the Promise/Future rendezvous's CAS state
//!   machine under real concurrent producers and consumers; not built by
//!   default. See that file's module doc for why this isn't (yet) true
//!   loom model checking.
//!
//! ## Example
//!
//! ```rust
//! use lazy_rt::prelude::*;
//!
//! let lazy = Lazy::from_value(async { 1 + 1 });
//! assert_eq!(sync_await(lazy).value().unwrap(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Note: Disabling redundant_closure_for_method_calls due to clippy 0.1.92 panic bug
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::module_name_repetitions)]

pub mod combinators;
pub mod error;
pub mod executor;
pub mod future;
pub mod future_state;
#[cfg(feature = "generator")]
pub mod generator;
pub mod lazy;
pub mod promise;
pub mod try_value;

pub use error::{
    BrokenPromise, DeadlockAvoided, DispatchFailed, FutureAlreadyRetrieved, FutureInvalid,
    PromiseAlreadySatisfied,
};
pub use executor::{Executor, ExecutorContext, TokioExecutor, Work};
pub use future::{Future, make_ready_future};
pub use future_state::FutureState;
pub use lazy::{Lazy, RescheduleLazy, sync_await, via_coroutine};
pub use promise::Promise;
pub use try_value::{Try, TryError};

/// Prelude module for convenient imports.
///
/// Re-exports the public API surface: [`Lazy`], [`RescheduleLazy`],
/// [`Future`], [`Promise`], [`Try`], the combinators, and
/// [`sync_await`].
///
/// # Usage
///
/// ```rust
/// use lazy_rt::prelude::*;
/// ```
pub mod prelude {
    pub use crate::combinators::{
        CountEvent, CurrentExecutor, Yield, collect_all, collect_all_para, collect_all_windowed,
        collect_all_windowed_para, collect_any, dispatch, sleep,
    };
    pub use crate::executor::{Executor, TokioExecutor};
    pub use crate::future::{Future, make_ready_future};
    pub use crate::lazy::{Lazy, RescheduleLazy, sync_await, via_coroutine};
    pub use crate::promise::Promise;
    pub use crate::try_value::Try;

    #[cfg(feature = "generator")]
    pub use crate::generator::Generator;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn library_compiles() {
        let lazy = Lazy::from_value(async { 21 * 2 });
        assert_eq!(sync_await(lazy).value().unwrap(), 42);
    }
}
