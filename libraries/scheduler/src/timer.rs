//! Tick-driven timers: the `SIGALRM`/`setitimer` delta queue, POSIX
//! `timer_*` timers, and per-thread virtual/profiling timers (component D).

use alloc::vec::Vec;
use spin::Mutex;

use crate::task::TaskId;

/// One of the three per-thread interval timers a `Task` carries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItimerSet {
    pub value_ticks: u64,
    pub interval_ticks: u64,
}

impl ItimerSet {
    /// Decrements by one tick, returns `true` if it just fired, and
    /// reloads from `interval_ticks` when periodic.
    pub fn tick(&mut self) -> bool {
        if self.value_ticks == 0 {
            return false;
        }
        self.value_ticks -= 1;
        if self.value_ticks == 0 {
            if self.interval_ticks > 0 {
                self.value_ticks = self.interval_ticks;
            }
            true
        } else {
            false
        }
    }
}

/// A node in the delta queue: the relative tick count to the *next*
/// entry, not an absolute deadline, per the spec's delta-queue design.
struct DeltaNode {
    owner: TaskId,
    delta_ticks: u64,
    interval_ticks: u64,
    periodic: bool,
}

/// Singly-linked delta queue for `SIGALRM`/`setitimer(ITIMER_REAL, ...)`.
/// Insertion walks the list subtracting each node's delta from the
/// absolute deadline until the remainder fits before a node, at which
/// point that node's delta is reduced by the remainder (the classic
/// "rewrite successor deltas" scheme).
pub struct DeltaQueue {
    nodes: Mutex<Vec<DeltaNode>>,
}

impl DeltaQueue {
    pub const fn new() -> Self {
        DeltaQueue {
            nodes: Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, owner: TaskId, absolute_ticks: u64, interval_ticks: u64) {
        let mut nodes = self.nodes.lock();
        let mut remaining = absolute_ticks;
        let mut idx = 0;
        while idx < nodes.len() {
            if remaining < nodes[idx].delta_ticks {
                nodes[idx].delta_ticks -= remaining;
                break;
            }
            remaining -= nodes[idx].delta_ticks;
            idx += 1;
        }
        nodes.insert(
            idx,
            DeltaNode {
                owner,
                delta_ticks: remaining,
                interval_ticks,
                periodic: interval_ticks > 0,
            },
        );
    }

    /// Called once per timer interrupt. Decrements the head's delta;
    /// when it reaches zero, fires every due timer (there may be
    /// several with `delta_ticks == 0` chained together) and reinserts
    /// the periodic ones at their interval.
    pub fn tick(&self) -> Vec<TaskId> {
        let mut nodes = self.nodes.lock();
        let mut fired = Vec::new();
        if nodes.is_empty() {
            return fired;
        }
        nodes[0].delta_ticks = nodes[0].delta_ticks.saturating_sub(1);
        while let Some(front) = nodes.first() {
            if front.delta_ticks != 0 {
                break;
            }
            let node = nodes.remove(0);
            fired.push(node.owner);
            if node.periodic {
                drop(nodes);
                self.insert(node.owner, node.interval_ticks, node.interval_ticks);
                nodes = self.nodes.lock();
            }
        }
        fired
    }

    pub fn cancel(&self, owner: TaskId) {
        let mut nodes = self.nodes.lock();
        if let Some(pos) = nodes.iter().position(|n| n.owner == owner) {
            let removed = nodes.remove(pos);
            if let Some(next) = nodes.get_mut(pos) {
                next.delta_ticks += removed.delta_ticks;
            }
        }
    }
}

pub static REAL_TIMER_QUEUE: DeltaQueue = DeltaQueue::new();

pub static POSIX_TIMERS: PosixTimerList = PosixTimerList::new();

/// A POSIX `timer_t`, tracked per-process rather than folded into the
/// three fixed itimers.
pub struct PosixTimer {
    pub id: usize,
    pub owner: TaskId,
    pub armed: bool,
    pub absolute: bool,
    pub remaining_ticks: u64,
    pub interval_ticks: u64,
}

pub struct PosixTimerList {
    timers: Mutex<Vec<PosixTimer>>,
    next_id: Mutex<usize>,
}

impl PosixTimerList {
    pub const fn new() -> Self {
        PosixTimerList {
            timers: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
        }
    }

    pub fn create(&self, owner: TaskId) -> usize {
        let mut id_guard = self.next_id.lock();
        let id = *id_guard;
        *id_guard += 1;
        self.timers.lock().push(PosixTimer {
            id,
            owner,
            armed: false,
            absolute: false,
            remaining_ticks: 0,
            interval_ticks: 0,
        });
        id
    }

    pub fn arm(&self, id: usize, remaining_ticks: u64, interval_ticks: u64, absolute: bool) -> bool {
        let mut timers = self.timers.lock();
        if let Some(t) = timers.iter_mut().find(|t| t.id == id) {
            t.armed = true;
            t.absolute = absolute;
            t.remaining_ticks = remaining_ticks;
            t.interval_ticks = interval_ticks;
            true
        } else {
            false
        }
    }

    pub fn delete(&self, id: usize) -> bool {
        let mut timers = self.timers.lock();
        if let Some(pos) = timers.iter().position(|t| t.id == id) {
            timers.remove(pos);
            true
        } else {
            false
        }
    }

    /// Advances every armed timer by one tick, returning the ids that
    /// fired this tick (and auto-reloading periodic ones).
    pub fn tick(&self) -> Vec<usize> {
        let mut fired = Vec::new();
        let mut timers = self.timers.lock();
        for t in timers.iter_mut() {
            if !t.armed || t.remaining_ticks == 0 {
                continue;
            }
            t.remaining_ticks -= 1;
            if t.remaining_ticks == 0 {
                fired.push(t.id);
                if t.interval_ticks > 0 {
                    t.remaining_ticks = t.interval_ticks;
                } else {
                    t.armed = false;
                }
            }
        }
        fired
    }
}

/// Outcome of a `clock_nanosleep`/`nanosleep` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    Completed,
    /// Cancelled by a signal; carries remaining ticks to write back
    /// unless `TIMER_ABSTIME` was set on entry.
    Interrupted { remaining_ticks: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_queue_fires_in_order() {
        let q = DeltaQueue::new();
        q.insert(1, 5, 0);
        q.insert(2, 3, 0);
        q.insert(3, 10, 0);
        let mut fired_order = Vec::new();
        for _ in 0..10 {
            fired_order.extend(q.tick());
        }
        assert_eq!(fired_order, alloc::vec![2, 1, 3]);
    }

    #[test]
    fn periodic_delta_timer_reinserts() {
        let q = DeltaQueue::new();
        q.insert(7, 2, 2);
        assert!(q.tick().is_empty());
        assert_eq!(q.tick(), alloc::vec![7]);
        assert!(q.tick().is_empty());
        assert_eq!(q.tick(), alloc::vec![7]);
    }

    #[test]
    fn cancel_merges_delta_into_successor() {
        let q = DeltaQueue::new();
        q.insert(1, 5, 0);
        q.insert(2, 10, 0);
        q.cancel(1);
        assert_eq!(q.tick().is_empty(), true); // 9 ticks left for node 2
        for _ in 0..8 {
            q.tick();
        }
        assert_eq!(q.tick(), alloc::vec![2]);
    }

    #[test]
    fn itimer_reloads_when_periodic() {
        let mut t = ItimerSet {
            value_ticks: 1,
            interval_ticks: 3,
        };
        assert!(t.tick());
        assert_eq!(t.value_ticks, 3);
    }
}
