//! `sleep` — suspends the calling `Lazy` for a fixed duration, scheduled
//! through whichever executor it's currently bound to.

use std::time::Duration;

use crate::executor::{After, TokioExecutor};
use crate::lazy::ambient_executor;

/// Suspends for `duration`. If the calling `Lazy` has a bound executor,
/// the resume is scheduled through it (`Executor::schedule_after`);
/// otherwise blocks the calling thread for the duration, per spec.
pub async fn sleep(duration: Duration) {
    match ambient_executor() {
        Some(executor) => After::new(executor, duration).await,
        None => std::thread::sleep(duration),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lazy::Lazy;
    use crate::try_value::Try;
    use rstest::rstest;
    use std::time::Instant;

    #[rstest]
    fn sleep_suspends_for_roughly_the_requested_duration() {
        let start = TokioExecutor::block_on(async {
            let start = Instant::now();
            sleep(Duration::from_millis(20)).await;
            start
        });
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[rstest]
    fn sleep_works_inside_a_lazy_bound_to_an_executor() {
        let executor = TokioExecutor::global();
        let lazy = Lazy::new(async {
            sleep(Duration::from_millis(5)).await;
            Try::Value(())
        })
        .via(executor);
        let result = TokioExecutor::block_on(lazy);
        assert!(result.is_value());
    }
}
