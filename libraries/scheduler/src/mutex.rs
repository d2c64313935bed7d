//! The kernel mutex: compare-and-swap lock with holder bookkeeping and
//! self-deadlock detection (component B), grounded on the spin-then-
//! reschedule loop of the reference kernel's `__kernel_mutex_lock`.

use core::panic::Location;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::task::TaskId;

/// Bounded spin count before `lock` gives up and panics rather than
/// spinning forever, matching the reference implementation's defensive
/// upper bound on a lock that should never legitimately take this long.
pub const MAX_LOCK_ATTEMPTS: u32 = 50_000_000;

pub struct KernelMutex {
    locked: AtomicBool,
    holder: AtomicU32,
    recursive_count: AtomicU32,
    from_func: spin::Mutex<&'static str>,
    from_line: AtomicU32,
}

const NO_HOLDER: u32 = u32::MAX;

impl KernelMutex {
    pub const fn new() -> Self {
        KernelMutex {
            locked: AtomicBool::new(false),
            holder: AtomicU32::new(NO_HOLDER),
            recursive_count: AtomicU32::new(0),
            from_func: spin::Mutex::new(""),
            from_line: AtomicU32::new(0),
        }
    }

    pub fn holder(&self) -> Option<TaskId> {
        let h = self.holder.load(Ordering::Acquire);
        if h == NO_HOLDER {
            None
        } else {
            Some(h as TaskId)
        }
    }

    /// Returns `0` (acquired) or `1` (contended) immediately, never
    /// spins. The caller is always the `current` task; re-entering a
    /// mutex already held by the caller panics the same as `lock` does.
    #[track_caller]
    pub fn try_lock(&self, current: TaskId) -> u32 {
        if self.holder() == Some(current) {
            panic!("mutex: task locked itself -- waiting forever");
        }
        match self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
        {
            Ok(_) => {
                self.record_acquisition(current);
                0
            }
            Err(_) => 1,
        }
    }

    fn record_acquisition(&self, current: TaskId) {
        self.holder.store(current as u32, Ordering::Release);
        let caller = Location::caller();
        *self.from_func.lock() = caller.file();
        self.from_line.store(caller.line(), Ordering::Relaxed);
    }

    /// Spins acquiring the lock, yielding to the scheduler between
    /// attempts via `reschedule`, up to [`MAX_LOCK_ATTEMPTS`] tries.
    /// Panics with the reference kernel's exact message on self-deadlock
    /// or on exhausting the spin bound (which, absent a bug, should
    /// never legitimately happen).
    #[track_caller]
    pub fn lock(&self, current: TaskId, mut reschedule: impl FnMut()) {
        if self.holder() == Some(current) {
            panic!("mutex: task locked itself -- waiting forever");
        }
        for _ in 0..MAX_LOCK_ATTEMPTS {
            if self
                .locked
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                self.record_acquisition(current);
                return;
            }
            reschedule();
        }
        panic!("mutex: deadlock -- spin bound exceeded");
    }

    /// Clears `holder`/diagnostic fields before releasing the lock with
    /// an atomic store. Callers are expected to have interrupts
    /// disabled across this call; this module has no interrupt
    /// controller to drive directly (HAL concern), so it only documents
    /// the ordering the caller must uphold.
    pub fn unlock(&self) {
        self.holder.store(NO_HOLDER, Ordering::Relaxed);
        self.recursive_count.store(0, Ordering::Relaxed);
        self.from_line.store(0, Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_lock_then_contended() {
        let m = KernelMutex::new();
        assert_eq!(m.try_lock(1), 0);
        assert_eq!(m.try_lock(2), 1);
        assert_eq!(m.holder(), Some(1));
    }

    #[test]
    fn unlock_clears_holder() {
        let m = KernelMutex::new();
        m.try_lock(1);
        m.unlock();
        assert_eq!(m.holder(), None);
        assert!(!m.is_locked());
    }

    #[test]
    #[should_panic(expected = "locked itself")]
    fn relock_by_holder_panics() {
        let m = KernelMutex::new();
        m.try_lock(7);
        m.try_lock(7);
    }

    #[test]
    fn lock_spins_until_released() {
        let m = KernelMutex::new();
        m.try_lock(1);
        let mut attempts = 0;
        let released = core::cell::Cell::new(false);
        // simulate: release the lock after a few reschedules
        for _ in 0..3 {
            attempts += 1;
            if attempts == 3 {
                m.unlock();
                released.set(true);
            }
        }
        m.lock(2, || {
            if !released.get() {
                m.unlock();
                released.set(true);
            }
        });
        assert_eq!(m.holder(), Some(2));
    }
}
