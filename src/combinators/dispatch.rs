//! `dispatch`, `Yield`, and `CurrentExecutor` — the small awaitables
//! that let a [`crate::Lazy`] body move itself onto a different
//! executor or cooperatively give up its turn.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::error::DispatchFailed;
use crate::executor::Executor;
use crate::lazy::ambient_executor;

/// An awaitable that resolves immediately the first time it's polled but
/// forces one cooperative yield: it wakes its own waker and returns
/// `Pending` once before returning `Ready` on the next poll.
///
/// Used internally between windowed-collect batches, and exported for
/// callers who want to yield control inside a hand-written loop without
/// an executor hop.
pub struct Yield {
    executor: Option<Arc<dyn Executor>>,
    yielded: bool,
}

impl Yield {
    /// Builds a `Yield` that, if `executor` is `Some`, posts the resume
    /// through it; otherwise just re-wakes the waker on the current
    /// task, matching `std::task::Poll`'s usual cooperative-yield idiom.
    #[must_use]
    pub fn new(executor: Option<Arc<dyn Executor>>) -> Self {
        Self {
            executor,
            yielded: false,
        }
    }
}

impl Future for Yield {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        let waker = cx.waker().clone();
        let posted = self
            .executor
            .as_ref()
            .is_some_and(|executor| executor.schedule(Box::new(move || waker.wake())));
        if !posted {
            cx.waker().wake_by_ref();
        }
        Poll::Pending
    }
}

/// An awaitable that posts exactly one resume of the current task onto a
/// target executor, and — unlike [`Yield`] — surfaces the executor's
/// refusal as an error instead of silently running inline.
struct Dispatch {
    executor: Arc<dyn Executor>,
    posted: bool,
    failed: bool,
}

impl Future for Dispatch {
    type Output = Result<(), DispatchFailed>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.failed {
            return Poll::Ready(Err(DispatchFailed));
        }
        if self.posted {
            return Poll::Ready(Ok(()));
        }
        self.posted = true;
        let waker = cx.waker().clone();
        if self.executor.schedule(Box::new(move || waker.wake())) {
            Poll::Pending
        } else {
            // No state was moved before the refusal was observed, so
            // nothing needs rolling back: the caller stays on whatever
            // executor it already had.
            self.failed = true;
            Poll::Ready(Err(DispatchFailed))
        }
    }
}

/// Moves the currently-executing `Lazy` onto `executor`: equivalent to
/// `.via(executor)` on a trivial `Lazy<()>`, but usable directly with
/// `.await` inside an existing async body without restructuring it into
/// a separate `Lazy`.
///
/// If the current `Lazy`'s executor is already `executor`, this is a
/// no-op and resumes immediately without ever posting a work item.
///
/// # Errors
///
/// Returns [`DispatchFailed`] if `executor` refuses the work item; the
/// caller remains on its current executor, unmoved.
pub async fn dispatch(executor: Arc<dyn Executor>) -> Result<(), DispatchFailed> {
    if ambient_executor().is_some_and(|current| Arc::ptr_eq(&current, &executor)) {
        return Ok(());
    }
    Dispatch {
        executor,
        posted: false,
        failed: false,
    }
    .await
}

/// An awaitable that resolves with the executor bound to the innermost
/// `Lazy` currently being polled on this call stack, or `None` outside
/// of one.
pub struct CurrentExecutor;

impl Future for CurrentExecutor {
    type Output = Option<Arc<dyn Executor>>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        Poll::Ready(ambient_executor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TokioExecutor;
    use crate::lazy::Lazy;
    use rstest::rstest;

    #[rstest]
    fn dispatch_moves_onto_the_named_executor() {
        let executor = TokioExecutor::global();
        let target = Arc::clone(&executor) as Arc<dyn Executor>;
        TokioExecutor::block_on(async move {
            assert!(dispatch(target).await.is_ok());
        });
    }

    #[rstest]
    fn dispatch_surfaces_dispatch_failed_when_the_executor_refuses() {
        struct RefusingExecutor;
        impl Executor for RefusingExecutor {
            fn schedule(&self, _work: crate::executor::Work) -> bool {
                false
            }
        }
        let target: Arc<dyn Executor> = Arc::new(RefusingExecutor);
        TokioExecutor::block_on(async move {
            assert_eq!(dispatch(target).await, Err(crate::error::DispatchFailed));
        });
    }

    #[rstest]
    fn current_executor_reports_the_enclosing_lazy_executor() {
        let executor = TokioExecutor::global();
        let bound = Arc::clone(&executor) as Arc<dyn Executor>;
        let lazy = Lazy::new(async { crate::try_value::Try::Value(CurrentExecutor.await.is_some()) })
            .via(bound);
        let result = TokioExecutor::block_on(lazy);
        assert!(result.value().unwrap());
    }

    #[rstest]
    fn current_executor_is_none_outside_a_lazy() {
        TokioExecutor::block_on(async {
            assert!(CurrentExecutor.await.is_none());
        });
    }
}
