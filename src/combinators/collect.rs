//! `collect_all`, `collect_all_para`, `collect_any`, the windowed
//! variants, and the [`CountEvent`] barrier they're built on.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::Poll;

use futures::task::AtomicWaker;
use parking_lot::Mutex;

use crate::executor::{ambient_handle, spawn_detached};
use crate::lazy::{Lazy, ambient_executor};
use crate::try_value::Try;

/// A multi-arrival barrier counting down from `n + 1`: `n` for the
/// expected arrivals, `+1` for the awaiter's own reservation. The last
/// arrival (whichever caller drives the count to zero) wakes whoever is
/// parked in [`CountEvent::wait`].
pub struct CountEvent {
    count: AtomicUsize,
    waker: AtomicWaker,
}

impl CountEvent {
    /// Creates a barrier expecting `n` arrivals plus the awaiter's own
    /// reservation.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            count: AtomicUsize::new(n + 1),
            waker: AtomicWaker::new(),
        }
    }

    /// Subtracts one from the count. Returns `true` if this call drove
    /// the count to zero (i.e. this was the last arrival).
    pub fn down(&self) -> bool {
        self.down_count() == 1
    }

    /// Subtracts one from the count, returning the value observed before
    /// the subtraction.
    pub fn down_count(&self) -> usize {
        let previous = self.count.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            self.waker.wake();
        }
        previous
    }

    /// Waits until the count reaches zero.
    pub async fn wait(&self) {
        futures::future::poll_fn(|cx| {
            self.waker.register(cx.waker());
            if self.count.load(Ordering::Acquire) == 0 {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
        .await;
    }
}

/// Collects `N` [`Lazy<T>`] into one `Lazy<Vec<Try<T>>>`, all driven
/// concurrently on the current task. Result order matches input order
/// regardless of completion order.
///
/// Resolves immediately with an empty `Vec` if `lazies` is empty.
pub fn collect_all<T>(lazies: Vec<Lazy<T>>) -> Lazy<Vec<Try<T>>>
where
    T: Send + 'static,
{
    Lazy::new(async move {
        let n = lazies.len();
        if n == 0 {
            return Try::Value(Vec::new());
        }

        let slots: Arc<Mutex<Vec<Option<Try<T>>>>> =
            Arc::new(Mutex::new((0..n).map(|_| None).collect()));
        let event = Arc::new(CountEvent::new(n));

        let drivers = lazies.into_iter().enumerate().map(|(index, lazy)| {
            let slots = Arc::clone(&slots);
            let event = Arc::clone(&event);
            async move {
                let result = lazy.await;
                slots.lock()[index] = Some(result);
                event.down();
            }
        });
        futures::future::join_all(drivers).await;
        event.down();

        let slots = Arc::try_unwrap(slots)
            .expect("no driver outlives join_all, so this is the last reference")
            .into_inner();
        Try::Value(
            slots
                .into_iter()
                .map(|slot| slot.expect("every slot written by its driver before join_all resolved"))
                .collect(),
        )
    })
}

/// Identical to [`collect_all`] except each input is scheduled onto the
/// ambient executor (a real concurrent task) rather than polled inline
/// on the combinator's own task.
pub fn collect_all_para<T>(lazies: Vec<Lazy<T>>) -> Lazy<Vec<Try<T>>>
where
    T: Send + 'static,
{
    Lazy::new(async move {
        let n = lazies.len();
        if n == 0 {
            return Try::Value(Vec::new());
        }

        let handle = ambient_handle();
        let propagated = ambient_executor();
        let handles: Vec<_> = lazies
            .into_iter()
            .map(|mut lazy| {
                if lazy.executor().is_none() {
                    if let Some(executor) = &propagated {
                        lazy.set_ex(Arc::clone(executor));
                    }
                }
                handle.spawn(lazy)
            })
            .collect();

        let mut results = Vec::with_capacity(n);
        for handle in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(join_error) => Try::Error(
                    std::io::Error::other(format!("collect_all_para task panicked: {join_error}"))
                        .into(),
                ),
            });
        }
        Try::Value(results)
    })
}

/// Races `N` [`Lazy<T>`], returning the winning index and its
/// [`Try<T>`]. Losing branches are **not** cancelled — they keep running
/// to completion on their own detached task; callers that need
/// cancellation must encode it inside their own tasks.
///
/// # Panics
///
/// Panics if `lazies` is empty.
pub fn collect_any<T>(lazies: Vec<Lazy<T>>) -> Lazy<(usize, Try<T>)>
where
    T: Send + 'static,
{
    assert!(!lazies.is_empty(), "collect_any requires at least one input");
    Lazy::new(async move {
        let n = lazies.len();
        let winner: Arc<Mutex<Option<(usize, Try<T>)>>> = Arc::new(Mutex::new(None));
        let event = Arc::new(CountEvent::new(n));

        for (index, lazy) in lazies.into_iter().enumerate() {
            let winner = Arc::clone(&winner);
            let event = Arc::clone(&event);
            spawn_detached(async move {
                let result = lazy.await;
                let mut guard = winner.lock();
                if guard.is_none() {
                    *guard = Some((index, result));
                }
                drop(guard);
                event.down();
            });
        }

        event.wait().await;
        Try::Value(
            Arc::try_unwrap(winner)
                .map(|mutex| mutex.into_inner())
                .unwrap_or_else(|shared| shared.lock().take())
                .expect("a winner must be recorded before the CountEvent fires"),
        )
    })
}

/// Variant of [`collect_any`] that also invokes `callback` with the
/// winning index and result before the combinator resumes its awaiter.
pub fn collect_any_with_callback<T, F>(lazies: Vec<Lazy<T>>, callback: F) -> Lazy<(usize, Try<T>)>
where
    T: Send + 'static,
    F: FnOnce(usize, &Try<T>) + Send + 'static,
{
    Lazy::new(async move {
        let result = collect_any(lazies).await;
        if let Try::Value((index, value)) = &result {
            callback(*index, value);
        }
        result
    })
}

fn window_bound(max_concurrency: usize, len: usize) -> bool {
    max_concurrency == 0 || len <= max_concurrency
}

/// Windowed [`collect_all`]: at most `max_concurrency` inputs are
/// in-flight at once. `max_concurrency == 0` or `>= lazies.len()`
/// degrades to plain [`collect_all`].
pub fn collect_all_windowed<T>(
    max_concurrency: usize,
    yield_between_batches: bool,
    lazies: Vec<Lazy<T>>,
) -> Lazy<Vec<Try<T>>>
where
    T: Send + 'static,
{
    windowed(max_concurrency, yield_between_batches, lazies, collect_all)
}

/// Windowed [`collect_all_para`]: at most `max_concurrency` inputs are
/// scheduled at once.
pub fn collect_all_windowed_para<T>(
    max_concurrency: usize,
    yield_between_batches: bool,
    lazies: Vec<Lazy<T>>,
) -> Lazy<Vec<Try<T>>>
where
    T: Send + 'static,
{
    windowed(
        max_concurrency,
        yield_between_batches,
        lazies,
        collect_all_para,
    )
}

fn windowed<T, F>(
    max_concurrency: usize,
    yield_between_batches: bool,
    lazies: Vec<Lazy<T>>,
    batch_of: F,
) -> Lazy<Vec<Try<T>>>
where
    T: Send + 'static,
    F: Fn(Vec<Lazy<T>>) -> Lazy<Vec<Try<T>>> + Send + 'static,
{
    Lazy::new(async move {
        if window_bound(max_concurrency, lazies.len()) {
            return batch_of(lazies).await;
        }

        let mut results = Vec::with_capacity(lazies.len());
        let mut remaining = lazies.into_iter();
        loop {
            let window: Vec<_> = remaining.by_ref().take(max_concurrency).collect();
            if window.is_empty() {
                break;
            }
            let batch = batch_of(window)
                .await
                .value()
                .expect("collect_all/_para never produce Try::Error");
            results.extend(batch);
            if yield_between_batches {
                super::dispatch::Yield::new(ambient_executor()).await;
            }
        }
        Try::Value(results)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TokioExecutor;
    use crate::lazy::sync_await;
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    fn count_event_wakes_on_last_arrival() {
        TokioExecutor::block_on(async {
            let event = CountEvent::new(2);
            assert!(!event.down());
            assert!(!event.down());
            assert!(event.down());
        });
    }

    #[rstest]
    fn collect_all_empty_resolves_immediately() {
        let result = sync_await(collect_all::<i32>(Vec::new()));
        assert_eq!(result.value().unwrap(), Vec::<Try<i32>>::new());
    }

    #[rstest]
    fn collect_all_preserves_input_order() {
        let lazies = vec![
            Lazy::new(async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Try::Value(0)
            }),
            Lazy::new(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Try::Value(1)
            }),
            Lazy::new(async {
                tokio::time::sleep(Duration::from_millis(15)).await;
                Try::Value(2)
            }),
        ];
        let result = TokioExecutor::block_on(collect_all(lazies));
        let values: Vec<i32> = result
            .value()
            .unwrap()
            .into_iter()
            .map(|try_value| try_value.value().unwrap())
            .collect();
        assert_eq!(values, vec![0, 1, 2]);
    }

    #[rstest]
    fn collect_any_returns_the_fastest_branch() {
        let lazies = vec![
            Lazy::new(async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Try::Value("a")
            }),
            Lazy::new(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Try::Value("b")
            }),
        ];
        let (index, result) = TokioExecutor::block_on(collect_any(lazies)).value().unwrap();
        assert_eq!(index, 1);
        assert_eq!(result.value().unwrap(), "b");
    }

    #[rstest]
    fn windowed_degrades_to_collect_all_under_the_limit() {
        let lazies = vec![
            Lazy::from_value(async { 1 }),
            Lazy::from_value(async { 2 }),
        ];
        let result = TokioExecutor::block_on(collect_all_windowed(0, false, lazies));
        let values: Vec<i32> = result
            .value()
            .unwrap()
            .into_iter()
            .map(|v| v.value().unwrap())
            .collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[rstest]
    fn windowed_runs_in_batches() {
        let lazies: Vec<_> = (0..5).map(|i| Lazy::from_value(async move { i })).collect();
        let result = TokioExecutor::block_on(collect_all_windowed(2, true, lazies));
        let values: Vec<i32> = result
            .value()
            .unwrap()
            .into_iter()
            .map(|v| v.value().unwrap())
            .collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }
}
