//! Error kinds surfaced by the Promise/Future rendezvous, the dispatch
//! boundary, and the combinators.
//!
//! Every error here is a plain struct or enum implementing
//! [`std::error::Error`] by hand — no `thiserror`.

use std::fmt;

/// A [`crate::Promise`] was dropped before its [`crate::Future`] received a
/// value, leaving the pairing unsatisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokenPromise;

impl fmt::Display for BrokenPromise {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "broken promise: the last Promise handle was dropped before a result was set"
        )
    }
}

impl std::error::Error for BrokenPromise {}

/// `Promise::get_future` was called more than once against the same shared
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FutureAlreadyRetrieved;

impl fmt::Display for FutureAlreadyRetrieved {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "get_future() was already called once for this Promise"
        )
    }
}

impl std::error::Error for FutureAlreadyRetrieved {}

/// `set_value` / `set_exception` was called after the state already held a
/// result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromiseAlreadySatisfied;

impl fmt::Display for PromiseAlreadySatisfied {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "Promise already satisfied: set_value/set_exception called twice"
        )
    }
}

impl std::error::Error for PromiseAlreadySatisfied {}

/// An operation was attempted on a moved-from / default-constructed Future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FutureInvalid;

impl fmt::Display for FutureInvalid {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "operation attempted on an invalid Future")
    }
}

impl std::error::Error for FutureInvalid {}

/// `Future::get()` / `Future::wait()` was called from a thread the Future's
/// executor itself owns, which would deadlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlockAvoided;

impl fmt::Display for DeadlockAvoided {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "blocking wait refused: calling thread belongs to the Future's own executor"
        )
    }
}

impl std::error::Error for DeadlockAvoided {}

/// `dispatch(ex)` failed to post the hop to the requested executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchFailed;

impl fmt::Display for DispatchFailed {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "dispatch() target executor refused the work item")
    }
}

impl std::error::Error for DispatchFailed {}
