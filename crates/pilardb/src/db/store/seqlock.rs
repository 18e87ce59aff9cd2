use crate::{db::store::page::PagedWords, error::StoreError};
use std::{
    hint,
    sync::atomic::Ordering,
    thread,
    time::Duration,
};

/// Optimistic read attempts before the pessimistic fallback.
const OPTIMISTIC_ATTEMPTS: u32 = 64;
/// Pessimistic wait-for-even iterations before reporting a torn read.
const PESSIMISTIC_ATTEMPTS: u32 = 4096;
/// Attempts spent purely spinning before yielding the thread.
const SPIN_ATTEMPTS: u32 = 16;
/// Attempts spent yielding before parking briefly.
const YIELD_ATTEMPTS: u32 = 48;

///
/// SeqLocks
///
/// One even/odd sequence counter per row. Even means stable, odd means a
/// writer is inside the multi-cell section. Readers that need several cells
/// of one row as a consistent tuple run their closure between two counter
/// reads and retry on movement; single-cell scans skip all of this and rely
/// on the column watermark.
///

pub(crate) struct SeqLocks {
    words: PagedWords,
}

impl SeqLocks {
    pub(crate) fn new(page_size: usize, max_pages: usize) -> Self {
        Self {
            words: PagedWords::new(page_size, max_pages),
        }
    }

    /// Transition the row even -> odd, spinning out concurrent writers.
    /// Returns the odd value to pass to `end_write`.
    pub(crate) fn begin_write(&self, row: u32) -> Result<u64, StoreError> {
        let cell = self.words.slot(row)?;
        let mut attempt = 0u32;
        loop {
            let v = cell.load(Ordering::Acquire);
            if v & 1 == 0
                && cell
                    .compare_exchange_weak(v, v + 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                return Ok(v + 1);
            }
            backoff(attempt);
            attempt = attempt.wrapping_add(1);
        }
    }

    /// Release the row with the next even value.
    pub(crate) fn end_write(&self, row: u32, odd: u64) {
        debug_assert!(odd & 1 == 1, "end_write without begin_write");
        // The slot was allocated by begin_write; a store cannot fail here.
        if let Ok(cell) = self.words.slot(row) {
            cell.store(odd + 1, Ordering::Release);
        }
    }

    /// Run `read` between two matching even counter observations.
    ///
    /// Bounded optimistic retries, then a pessimistic wait-for-even pass;
    /// exhausting both surfaces `TornRead` for the caller's retry loop.
    pub(crate) fn read_consistent<T>(
        &self,
        row: u32,
        mut read: impl FnMut() -> T,
    ) -> Result<T, StoreError> {
        for attempt in 0..OPTIMISTIC_ATTEMPTS {
            let v1 = self.words.load(row, Ordering::Acquire);
            if v1 & 1 == 1 {
                backoff(attempt);
                continue;
            }
            let out = read();
            let v2 = self.words.load(row, Ordering::Acquire);
            if v1 == v2 {
                return Ok(out);
            }
        }

        // Pessimistic variant: wait for an even counter, then try once per
        // observation.
        for attempt in 0..PESSIMISTIC_ATTEMPTS {
            let v1 = self.words.load(row, Ordering::Acquire);
            if v1 & 1 == 1 {
                backoff(SPIN_ATTEMPTS + attempt);
                continue;
            }
            let out = read();
            let v2 = self.words.load(row, Ordering::Acquire);
            if v1 == v2 {
                return Ok(out);
            }
        }

        Err(StoreError::TornRead { row })
    }
}

/// Spin, then yield, then park briefly.
fn backoff(attempt: u32) {
    if attempt < SPIN_ATTEMPTS {
        hint::spin_loop();
    } else if attempt < YIELD_ATTEMPTS {
        thread::yield_now();
    } else {
        thread::sleep(Duration::from_micros(10));
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, atomic::AtomicU64};

    #[test]
    fn write_cycle_returns_to_even() {
        let locks = SeqLocks::new(64, 4);
        let odd = locks.begin_write(3).unwrap();
        assert_eq!(odd, 1);
        locks.end_write(3, odd);
        let odd = locks.begin_write(3).unwrap();
        assert_eq!(odd, 3);
        locks.end_write(3, odd);
    }

    #[test]
    fn read_consistent_sees_stable_value() {
        let locks = SeqLocks::new(64, 4);
        let value = locks.read_consistent(7, || 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn concurrent_writers_serialize_per_row() {
        let locks = Arc::new(SeqLocks::new(64, 4));
        let cell = Arc::new(AtomicU64::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let locks = Arc::clone(&locks);
            let cell = Arc::clone(&cell);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let odd = locks.begin_write(0).unwrap();
                    let v = cell.load(Ordering::Relaxed);
                    cell.store(v + 1, Ordering::Relaxed);
                    locks.end_write(0, odd);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cell.load(Ordering::Relaxed), 4000);
    }
}
