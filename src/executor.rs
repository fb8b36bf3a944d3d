//! The external scheduling surface and the bundled tokio-backed
//! implementation.
//!
//! `Executor` is deliberately small and object-safe: the runtime delegates
//! scheduling to whatever the caller supplies, mirroring the "no thread-pool
//! implementation in the core" non-goal. [`TokioExecutor`] is the one
//! concrete implementation this crate ships, built on a global-runtime-plus-
//! cached-handle idiom.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};

/// An opaque execution context captured by [`Executor::checkout`] and later
/// replayed by [`Executor::checkin`].
///
/// The default (`None`) context means "no thread-affinity to preserve" —
/// `checkin` degrades to a plain `schedule`.
#[derive(Clone, Default)]
pub struct ExecutorContext(Option<Handle>);

/// A unit of deferred work, boxed so it can cross an `Arc<dyn Executor>`
/// trait-object boundary.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// External scheduling surface.
///
/// Accepts zero-argument work items, optionally schedules after a delay,
/// and optionally reports whether the calling thread already belongs to
/// it. Every method has a default so implementors only need to provide
/// `schedule`.
pub trait Executor: Send + Sync {
    /// Enqueues a work item. Returns `false` if the executor refused it.
    fn schedule(&self, work: Work) -> bool;

    /// Schedules `work` to run after `delay`. The default spawns a
    /// dedicated thread that sleeps then calls [`Executor::schedule`].
    fn schedule_after(&self, work: Work, delay: Duration) -> bool {
        let this = self.self_arc();
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            if let Some(executor) = this {
                executor.schedule(work);
            } else {
                work();
            }
        });
        true
    }

    /// Snapshots the current execution context. Default: no context.
    fn checkout(&self) -> ExecutorContext {
        ExecutorContext::default()
    }

    /// Resumes `work` on the context captured by `checkout`. Default
    /// delegates to [`Executor::schedule`].
    fn checkin(&self, work: Work, _context: &ExecutorContext) -> bool {
        self.schedule(work)
    }

    /// Reports whether the calling thread already belongs to this
    /// executor. Default: conservatively `false` (always post).
    fn current_thread_in_executor(&self) -> bool {
        false
    }

    /// Hook allowing implementors that need to re-dispatch through an
    /// `Arc` (e.g. for `schedule_after`'s spawned thread) to supply one.
    /// Default: `None`, meaning the work runs inline when the hook needs
    /// an owned handle it cannot obtain.
    fn self_arc(&self) -> Option<Arc<dyn Executor>> {
        None
    }
}

/// An awaitable returned by [`Executor::after`]-style helpers: resolves
/// once the wrapped delay has elapsed, scheduled through whatever executor
/// produced it.
pub struct After {
    inner: Pin<Box<dyn Future<Output = ()> + Send>>,
}

impl After {
    /// Builds an `After` that resolves once `delay` has elapsed according
    /// to `executor`.
    pub fn new(executor: Arc<dyn Executor>, delay: Duration) -> Self {
        let inner = Box::pin(async move {
            let (tx, rx) = tokio::sync::oneshot::channel();
            let posted = executor.schedule_after(
                Box::new(move || {
                    let _ = tx.send(());
                }),
                delay,
            );
            if posted {
                let _ = rx.await;
            }
        });
        Self { inner }
    }
}

impl Future for After {
    type Output = ();

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

// =============================================================================
// Global tokio runtime
// =============================================================================

static GLOBAL_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()
        .expect("failed to create lazy-rt's global tokio runtime")
});

/// Returns a handle usable from any thread: the current runtime's handle if
/// already inside one, otherwise the global runtime's handle.
pub(crate) fn ambient_handle() -> Handle {
    Handle::try_current().unwrap_or_else(|_| GLOBAL_RUNTIME.handle().clone())
}

/// Spawns `future` as a detached task on the ambient runtime: the current
/// runtime if called from inside one, otherwise the global runtime.
/// Dropping the returned `JoinHandle`-less task never cancels it — used
/// wherever a task must keep running independently of
/// whoever launched it (e.g. `Lazy::start`, `collect_any`'s branches).
pub(crate) fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    ambient_handle().spawn(future);
}

/// An [`Executor`] backed by a [`tokio::runtime::Handle`].
///
/// `checkout`/`checkin` are no-ops here: tokio's scheduler is not
/// context-affine, so there is no thread-local state to preserve across a
/// hop. `current_thread_in_executor` compares the calling thread's current
/// runtime handle (if any) against the one this executor wraps.
#[derive(Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    /// Wraps an explicit tokio [`Handle`].
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Returns an executor bound to the ambient runtime: the current
    /// runtime if called from inside one, otherwise the process-wide
    /// global multi-thread runtime.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::new(Self::new(ambient_handle()))
    }

    /// Blocks the calling thread running `future` to completion: outside any
    /// runtime it drives the global runtime directly; inside a
    /// multi-thread runtime it uses `block_in_place`; inside a
    /// current-thread runtime blocking is refused.
    ///
    /// # Panics
    ///
    /// Panics if called from within a current-thread tokio runtime, or if
    /// `block_in_place` itself panics (e.g. from within `LocalSet::run_until`).
    pub fn block_on<F: Future>(future: F) -> F::Output {
        if let Ok(current) = Handle::try_current() {
            match current.runtime_flavor() {
                RuntimeFlavor::MultiThread => {
                    tokio::task::block_in_place(|| current.block_on(future))
                }
                _ => panic!(
                    "TokioExecutor::block_on called from a current-thread runtime; \
                     this would deadlock"
                ),
            }
        } else {
            GLOBAL_RUNTIME.block_on(future)
        }
    }
}

impl Executor for TokioExecutor {
    fn schedule(&self, work: Work) -> bool {
        self.handle.spawn_blocking(work);
        true
    }

    fn schedule_after(&self, work: Work, delay: Duration) -> bool {
        let handle = self.handle.clone();
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            handle.spawn_blocking(work);
        });
        true
    }

    fn current_thread_in_executor(&self) -> bool {
        Handle::try_current().is_ok_and(|current| current.id() == self.handle.id())
    }

    fn self_arc(&self) -> Option<Arc<dyn Executor>> {
        Some(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[rstest]
    fn schedule_runs_the_work_item() {
        let executor = TokioExecutor::global();
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = Arc::clone(&flag);
        TokioExecutor::block_on(async move {
            let (tx, rx) = tokio::sync::oneshot::channel();
            executor.schedule(Box::new(move || {
                flag_clone.store(true, Ordering::SeqCst);
                let _ = tx.send(());
            }));
            let _ = rx.await;
        });
        assert!(flag.load(Ordering::SeqCst));
    }

    #[rstest]
    #[tokio::test]
    async fn current_thread_in_executor_detects_same_runtime() {
        let executor = TokioExecutor::new(Handle::current());
        assert!(executor.current_thread_in_executor());
    }
}
