//! Property-based tests for incremental page locking

use proptest::prelude::*;
use safetensors_mmap::diagnostics::RecordingSink;
use safetensors_mmap::memory::{align_up, LockState, MemoryLock, PageLocker};
use std::cell::Cell;
use std::io;
use std::rc::Rc;
use std::sync::Arc;

const GRANULARITY: usize = 4096;

#[derive(Default)]
struct Calls {
    locks: Cell<usize>,
    unlocks: Cell<usize>,
}

struct CountingLocker {
    budget: usize,
    pinned: usize,
    calls: Rc<Calls>,
}

impl PageLocker for CountingLocker {
    fn granularity(&self) -> usize {
        GRANULARITY
    }

    fn lock(&mut self, _addr: *const u8, len: usize) -> io::Result<()> {
        self.calls.locks.set(self.calls.locks.get() + 1);
        if self.pinned + len > self.budget {
            return Err(io::Error::new(io::ErrorKind::OutOfMemory, "over budget"));
        }
        self.pinned += len;
        Ok(())
    }

    fn unlock(&mut self, _addr: *const u8, _len: usize) -> io::Result<()> {
        self.calls.unlocks.set(self.calls.unlocks.get() + 1);
        self.pinned = 0;
        Ok(())
    }
}

proptest! {
    #[test]
    fn test_grow_to_is_monotonic_and_sticky(
        budget in 0usize..200_000,
        targets in prop::collection::vec(0usize..100_000, 1..24)
    ) {
        let calls = Rc::new(Calls::default());
        let locker = CountingLocker { budget, pinned: 0, calls: calls.clone() };
        let sink = Arc::new(RecordingSink::new());
        let mut lock = MemoryLock::with_locker(std::ptr::null(), locker, sink.clone());

        let mut high_water = 0usize;
        for target in targets {
            let before = lock.state();
            let locks_before = calls.locks.get();
            lock.grow_to(target);

            match before {
                LockState::Failed => {
                    prop_assert_eq!(lock.state(), LockState::Failed);
                    prop_assert_eq!(calls.locks.get(), locks_before);
                }
                _ => {
                    let wanted = align_up(target, GRANULARITY).unwrap();
                    high_water = high_water.max(wanted);
                    match lock.state() {
                        LockState::Locked(len) => {
                            prop_assert_eq!(len, high_water);
                            prop_assert!(len <= budget);
                        }
                        LockState::Failed => prop_assert!(high_water > budget),
                        LockState::Untried => prop_assert_eq!(high_water, 0),
                    }
                }
            }

            // A second call with the same target never locks again.
            let locks_after = calls.locks.get();
            lock.grow_to(target);
            prop_assert_eq!(calls.locks.get(), locks_after);
        }

        prop_assert!(sink.len() <= 1);
        let failed = lock.has_failed();
        let locked = lock.locked_len();
        let unlocks_before = calls.unlocks.get();
        drop(lock);
        let expected_unlocks = usize::from(!failed && locked > 0);
        prop_assert_eq!(calls.unlocks.get() - unlocks_before, expected_unlocks);
    }
}
