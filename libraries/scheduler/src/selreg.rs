//! select/poll wakeup registry (component F): a process-wide hashtable
//! from channel pointer to its waiters, grounded on the reference
//! kernel's `seltab` hashtable and its lock-per-bucket design.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use spin::Mutex;

use crate::task::TaskId;

/// Opaque channel identity the same way `queue::block_task` uses one:
/// callers mint these from whatever address they consider a wait
/// channel (a socket's packet queue, a pipe buffer, ...).
pub type Channel = usize;

struct SeltabEntry {
    waiters: Vec<TaskId>,
}

/// `BTreeMap` stands in for the reference kernel's fixed-size open
/// hashtable (`INIT_HASHSZ = 256`); channel identities are sparse kernel
/// addresses either way, so a balanced tree gives the same amortized
/// lookup cost without a fixed bucket count to tune.
pub struct SelectRegistry {
    table: Mutex<BTreeMap<Channel, SeltabEntry>>,
}

impl SelectRegistry {
    pub const fn new() -> Self {
        SelectRegistry {
            table: Mutex::new(BTreeMap::new()),
        }
    }

    /// Registers the calling task on `channel` if it is not already
    /// present, creating the entry on first use.
    pub fn selrecord(&self, channel: Channel, task: TaskId) {
        let mut table = self.table.lock();
        let entry = table.entry(channel).or_insert_with(|| SeltabEntry {
            waiters: Vec::new(),
        });
        if !entry.waiters.contains(&task) {
            entry.waiters.push(task);
        }
    }

    /// Wakes every task recorded on `channel` and clears its waiter
    /// list. A channel with no entry (no intervening `selrecord`) is a
    /// no-op, matching the idempotence property required of
    /// back-to-back `selwakeup` calls.
    pub fn selwakeup(&self, channel: Channel) -> Vec<TaskId> {
        let mut table = self.table.lock();
        match table.get_mut(&channel) {
            Some(entry) => core::mem::take(&mut entry.waiters),
            None => Vec::new(),
        }
    }

    /// Scans every channel's waiter list and removes `task`, used when
    /// a task exits or is cancelled while still registered somewhere.
    pub fn cancel_select(&self, task: TaskId) {
        let mut table = self.table.lock();
        for entry in table.values_mut() {
            entry.waiters.retain(|&t| t != task);
        }
    }

    pub fn waiter_count(&self, channel: Channel) -> usize {
        self.table
            .lock()
            .get(&channel)
            .map(|e| e.waiters.len())
            .unwrap_or(0)
    }
}

pub static SELECT_REGISTRY: SelectRegistry = SelectRegistry::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selwakeup_drains_recorded_waiters() {
        let reg = SelectRegistry::new();
        reg.selrecord(1, 10);
        reg.selrecord(1, 11);
        let woken = reg.selwakeup(1);
        assert_eq!(woken.len(), 2);
        assert_eq!(reg.waiter_count(1), 0);
    }

    #[test]
    fn second_selwakeup_is_noop() {
        let reg = SelectRegistry::new();
        reg.selrecord(5, 1);
        reg.selwakeup(5);
        assert!(reg.selwakeup(5).is_empty());
    }

    #[test]
    fn selrecord_does_not_duplicate() {
        let reg = SelectRegistry::new();
        reg.selrecord(2, 1);
        reg.selrecord(2, 1);
        assert_eq!(reg.waiter_count(2), 1);
    }

    #[test]
    fn cancel_select_scans_all_channels() {
        let reg = SelectRegistry::new();
        reg.selrecord(1, 99);
        reg.selrecord(2, 99);
        reg.cancel_select(99);
        assert_eq!(reg.waiter_count(1), 0);
        assert_eq!(reg.waiter_count(2), 0);
    }
}
