//! Process-wide round-robin cursor over the backend set.

use core::num::NonZeroUsize;
use portable_atomic::{AtomicUsize, Ordering};

/// Hands out backend indices in strict round-robin order.
///
/// A single [`Dispatcher`] is shared by every `ParallelHash` call in the
/// process. The cursor always stays in `[0, backends)` and is advanced with a
/// compare-and-swap loop, so the read and the advance form one atomic step:
/// two buffers never observe the same cursor value, and the wrap at the end of
/// the backend list never skips or repeats an index.
#[derive(Debug)]
pub struct Dispatcher {
    cursor: AtomicUsize,
    backends: NonZeroUsize,
}

impl Dispatcher {
    /// Creates a dispatcher over `backends` endpoints, starting at index 0.
    pub const fn new(backends: NonZeroUsize) -> Self {
        Self {
            cursor: AtomicUsize::new(0),
            backends,
        }
    }

    /// Returns the backend index for the next buffer and advances the cursor
    /// by one position.
    ///
    /// The returned sequence, in the order callers win the compare-and-swap,
    /// is `0, 1, .., N-1, 0, 1, ..` across all threads.
    pub fn next(&self) -> usize {
        let backends = self.backends.get();
        match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some((current + 1) % backends)
            }) {
            Ok(previous) | Err(previous) => previous,
        }
    }

    /// Index the next call to [`Dispatcher::next`] would return if no other
    /// caller gets there first.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }
}
