//! CollectAll, CollectAny, windowed variants, Dispatch, Sleep, Yield —
//! built atop [`crate::Lazy`] and [`CountEvent`].
//!
//! The windowed variants use bounded-concurrency batches with
//! `tokio::sync::Semaphore`-based backpressure, diverging from an
//! unordered-completion design where strict input-order results are
//! required (see `DESIGN.md`, Open Question 3).

mod collect;
mod dispatch;
mod sleep;

pub use collect::{
    CountEvent, collect_all, collect_all_para, collect_all_windowed, collect_all_windowed_para,
    collect_any,
};
pub use dispatch::{CurrentExecutor, Yield, dispatch};
pub use sleep::sleep;
