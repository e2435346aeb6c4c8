//! Counting gate that bounds how many tries run at once
//!
//! Every node has its own worker, but a worker holds a slot only while
//! it checks or applies a step. Backoff sleeps and readiness waits happen
//! with no slot held, so other nodes keep going.

use std::sync::{Condvar, Mutex, PoisonError};

#[derive(Debug)]
pub(crate) struct WorkerSlots {
    free: Mutex<usize>,
    freed: Condvar,
}

impl WorkerSlots {
    pub(crate) fn new(slots: usize) -> Self {
        Self {
            free: Mutex::new(slots.max(1)),
            freed: Condvar::new(),
        }
    }

    /// Block until a slot is free; it is returned when the guard drops
    pub(crate) fn acquire(&self) -> SlotGuard<'_> {
        let free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        let mut free = self
            .freed
            .wait_while(free, |free| *free == 0)
            .unwrap_or_else(PoisonError::into_inner);
        *free -= 1;
        SlotGuard { slots: self }
    }

    fn release(&self) {
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        *free += 1;
        self.freed.notify_one();
    }
}

pub(crate) struct SlotGuard<'a> {
    slots: &'a WorkerSlots,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.slots.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_guard_returns_slot() {
        let slots = WorkerSlots::new(1);
        drop(slots.acquire());
        let _again = slots.acquire();
        assert_eq!(*slots.free.lock().unwrap(), 0);
    }

    #[test]
    fn test_zero_is_treated_as_one() {
        let slots = WorkerSlots::new(0);
        let _slot = slots.acquire();
    }

    #[test]
    fn test_holders_never_exceed_slots() {
        let slots = Arc::new(WorkerSlots::new(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let (slots, running, peak) =
                    (Arc::clone(&slots), Arc::clone(&running), Arc::clone(&peak));
                thread::spawn(move || {
                    let _slot = slots.acquire();
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(*slots.free.lock().unwrap(), 2);
    }
}
