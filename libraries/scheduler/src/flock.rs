//! Advisory POSIX file locks (§3.4): a per-open-file list of byte
//! ranges, read locks composing freely and writers requiring exclusive
//! access to their range.

use alloc::vec::Vec;

use crate::error::{KernelError, KernelResult};
use crate::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockType {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy)]
pub struct FileLock {
    pub start: u64,
    pub end: u64, // exclusive; u64::MAX means "to EOF"
    pub kind: LockType,
    pub owner: TaskId,
}

impl FileLock {
    fn overlaps(&self, start: u64, end: u64) -> bool {
        self.start < end && start < self.end
    }
}

#[derive(Debug, Default)]
pub struct LockList {
    locks: Vec<FileLock>,
}

impl LockList {
    pub fn new() -> Self {
        LockList { locks: Vec::new() }
    }

    /// Checks whether `(start, end, kind)` requested by `owner` would
    /// conflict with any existing lock: two read locks never conflict;
    /// anything involving a write lock from a different owner does.
    fn conflicts(&self, start: u64, end: u64, kind: LockType, owner: TaskId) -> bool {
        self.locks.iter().any(|existing| {
            if existing.owner == owner {
                return false;
            }
            if !existing.overlaps(start, end) {
                return false;
            }
            matches!((existing.kind, kind), (_, LockType::Write) | (LockType::Write, _))
        })
    }

    /// `fcntl(F_SETLK)`-style non-blocking acquisition. On success,
    /// merges/replaces any of the owner's own overlapping ranges with
    /// the new one (POSIX locks from the same owner coalesce rather
    /// than stack).
    pub fn try_lock(&mut self, start: u64, end: u64, kind: LockType, owner: TaskId) -> KernelResult<()> {
        if self.conflicts(start, end, kind, owner) {
            return Err(KernelError::WouldBlock);
        }
        self.locks.retain(|l| !(l.owner == owner && l.overlaps(start, end)));
        self.locks.push(FileLock {
            start,
            end,
            kind,
            owner,
        });
        Ok(())
    }

    /// `fcntl(F_UNLCK)`: removes (or shrinks) the owner's locks
    /// intersecting the given range.
    pub fn unlock(&mut self, start: u64, end: u64, owner: TaskId) {
        let mut remaining = Vec::new();
        for l in self.locks.drain(..) {
            if l.owner != owner || !l.overlaps(start, end) {
                remaining.push(l);
                continue;
            }
            if l.start < start {
                remaining.push(FileLock { end: start, ..l });
            }
            if l.end > end {
                remaining.push(FileLock { start: end, ..l });
            }
        }
        self.locks = remaining;
    }

    pub fn unlock_all_for(&mut self, owner: TaskId) {
        self.locks.retain(|l| l.owner != owner);
    }

    pub fn locks_for(&self, owner: TaskId) -> impl Iterator<Item = &FileLock> {
        self.locks.iter().filter(move |l| l.owner == owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_locks_compose() {
        let mut locks = LockList::new();
        locks.try_lock(0, 100, LockType::Read, 1).unwrap();
        locks.try_lock(50, 150, LockType::Read, 2).unwrap();
    }

    #[test]
    fn writer_excludes_others() {
        let mut locks = LockList::new();
        locks.try_lock(0, 100, LockType::Write, 1).unwrap();
        assert_eq!(
            locks.try_lock(50, 60, LockType::Read, 2).unwrap_err(),
            KernelError::WouldBlock
        );
    }

    #[test]
    fn same_owner_does_not_conflict_with_self() {
        let mut locks = LockList::new();
        locks.try_lock(0, 100, LockType::Write, 1).unwrap();
        locks.try_lock(10, 20, LockType::Write, 1).unwrap();
    }

    #[test]
    fn unlock_splits_range() {
        let mut locks = LockList::new();
        locks.try_lock(0, 100, LockType::Write, 1).unwrap();
        locks.unlock(40, 60, 1);
        assert_eq!(locks.locks_for(1).count(), 2);
        // the hole is now free for another owner
        locks.try_lock(40, 60, LockType::Write, 2).unwrap();
    }
}
