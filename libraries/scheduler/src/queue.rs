//! Multilevel ready queues, block/wakeup, and the scheduling contract
//! (component A).
//!
//! Queues are modeled as `VecDeque<TaskId>` rather than the original's
//! circular doubly linked list with a sentinel head — the two give the
//! same FIFO-within-level semantics, and a handle-addressed deque avoids
//! the raw intrusive pointers the design note explicitly steers away
//! from.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;

use crate::error::{KernelError, KernelResult};
use crate::task::{SchedPolicy, TaskId, TaskState, TASKS};

/// Number of distinct FIFO/RR priority levels, mirroring the historical
/// `MIN_RR_PRIO` banding: FIFO priorities sit strictly above the RR
/// band, RR below that, and OTHER is a single class under both.
pub const FIFO_PRIORITIES: usize = 32;
pub const RR_PRIORITIES: usize = 32;
pub const TOTAL_RT_PRIORITIES: usize = FIFO_PRIORITIES + RR_PRIORITIES;

pub const TIMESLICE_FIFO: u32 = 0;
pub const TIMESLICE_RR: u32 = 4;

pub fn timeslice_other(nice: i32) -> u32 {
    (2 + (nice >> 3).max(0)) as u32
}

/// `fifo_has_ready` / `rr_has_ready` / `user_has_ready` — the three
/// coarse-grained flags the scheduler consults before walking a class's
/// queues looking for ready work.
pub struct ReadyFlags {
    pub fifo: AtomicBool,
    pub rr: AtomicBool,
    pub user: AtomicBool,
}

impl ReadyFlags {
    pub const fn new() -> Self {
        ReadyFlags {
            fifo: AtomicBool::new(false),
            rr: AtomicBool::new(false),
            user: AtomicBool::new(false),
        }
    }
}

/// One queue per RT priority level, plus the single OTHER-class queue
/// and the waiters map used by `block_task`/`unblock`.
pub struct Scheduler {
    rt_queues: Mutex<[VecDeque<TaskId>; TOTAL_RT_PRIORITIES]>,
    other_queue: Mutex<VecDeque<TaskId>>,
    waiters: Mutex<Vec<(usize, TaskId)>>,
    flags: ReadyFlags,
    lock_depth: Mutex<u32>,
}

const EMPTY_DEQUE: VecDeque<TaskId> = VecDeque::new();

impl Scheduler {
    pub const fn new() -> Self {
        Scheduler {
            rt_queues: Mutex::new([EMPTY_DEQUE; TOTAL_RT_PRIORITIES]),
            other_queue: Mutex::new(VecDeque::new()),
            waiters: Mutex::new(Vec::new()),
            flags: ReadyFlags::new(),
            lock_depth: Mutex::new(0),
        }
    }

    /// Interrupt-safe critical section marker. Real interrupt masking is
    /// an external-collaborator concern (HAL); this tracks nesting so
    /// callers can assert they are inside one.
    pub fn lock_scheduler(&self) {
        *self.lock_depth.lock() += 1;
    }

    pub fn unlock_scheduler(&self) {
        let mut depth = self.lock_depth.lock();
        *depth = depth.saturating_sub(1);
    }

    /// FIFO sits strictly above RR, so the FIFO band occupies the upper
    /// half of the combined RT index space; `pick_next`'s reversed scan
    /// then naturally prefers FIFO over RR at equal `priority` values.
    fn class_of(priority: u32, policy: SchedPolicy) -> (bool /* is_rt */, usize) {
        match policy {
            SchedPolicy::Other => (false, 0),
            SchedPolicy::RoundRobin => (true, (priority as usize).min(RR_PRIORITIES - 1)),
            SchedPolicy::Fifo => (
                true,
                RR_PRIORITIES + (priority as usize).min(FIFO_PRIORITIES - 1),
            ),
        }
    }

    /// Appends to the tail of the task's priority queue and sets the
    /// corresponding `has_ready` flag. Called on task creation and
    /// every wakeup.
    pub fn enqueue_ready(&self, tid: TaskId, priority: u32, policy: SchedPolicy) {
        let (is_rt, idx) = Self::class_of(priority, policy);
        if is_rt {
            self.rt_queues.lock()[idx].push_back(tid);
            if idx >= RR_PRIORITIES {
                self.flags.fifo.store(true, Ordering::SeqCst);
            } else {
                self.flags.rr.store(true, Ordering::SeqCst);
            }
        } else {
            self.other_queue.lock().push_back(tid);
            self.flags.user.store(true, Ordering::SeqCst);
        }
    }

    fn remove_from(deque: &mut VecDeque<TaskId>, tid: TaskId) -> bool {
        if let Some(pos) = deque.iter().position(|&t| t == tid) {
            deque.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn remove_ready(&self, tid: TaskId, priority: u32, policy: SchedPolicy) {
        let (is_rt, idx) = Self::class_of(priority, policy);
        if is_rt {
            let mut queues = self.rt_queues.lock();
            Self::remove_from(&mut queues[idx], tid);
            if queues[idx].is_empty() {
                let any_rr = queues[..RR_PRIORITIES].iter().any(|q| !q.is_empty());
                let any_fifo = queues[RR_PRIORITIES..].iter().any(|q| !q.is_empty());
                self.flags.fifo.store(any_fifo, Ordering::SeqCst);
                self.flags.rr.store(any_rr, Ordering::SeqCst);
            }
        } else {
            let mut q = self.other_queue.lock();
            Self::remove_from(&mut q, tid);
            self.flags.user.store(!q.is_empty(), Ordering::SeqCst);
        }
    }

    /// Moves the task to the tail of its own class, used both for
    /// timeslice expiry and `sched_yield`.
    pub fn move_to_queue_end(&self, tid: TaskId, priority: u32, policy: SchedPolicy) {
        self.remove_ready(tid, priority, policy);
        self.enqueue_ready(tid, priority, policy);
    }

    /// Picks the next task to run: highest occupied priority level wins,
    /// FIFO/RR order within a level.
    pub fn pick_next(&self) -> Option<TaskId> {
        if self.flags.fifo.load(Ordering::SeqCst) || self.flags.rr.load(Ordering::SeqCst) {
            let queues = self.rt_queues.lock();
            for idx in (0..TOTAL_RT_PRIORITIES).rev() {
                if let Some(&tid) = queues[idx].front() {
                    return Some(tid);
                }
            }
        }
        if self.flags.user.load(Ordering::SeqCst) {
            if let Some(&tid) = self.other_queue.lock().front() {
                return Some(tid);
            }
        }
        None
    }

    /// `sched_yield`: FIFO/RR tail the caller; OTHER is a no-op that
    /// still forces a reschedule.
    pub fn sched_yield(&self, tid: TaskId, priority: u32, policy: SchedPolicy) {
        match policy {
            SchedPolicy::Fifo | SchedPolicy::RoundRobin => {
                self.move_to_queue_end(tid, priority, policy)
            }
            SchedPolicy::Other => {}
        }
    }

    /// Decrements the running task's `time_left`; when it reaches zero,
    /// the caller is responsible for moving it to its queue tail (the
    /// mechanical queue manipulation lives here; the time-left field
    /// itself lives on `Task` and is mutated by the caller holding the
    /// task lock).
    pub fn timeslice_expired(&self, tid: TaskId, priority: u32, policy: SchedPolicy) {
        if !matches!(policy, SchedPolicy::Fifo) {
            self.move_to_queue_end(tid, priority, policy);
        }
    }

    /// Removes the task from the ready queue, marks it `Sleeping` and
    /// links it on `channel`'s waiters list. The caller must actually
    /// invoke the context switch; this only performs the bookkeeping
    /// and returns the wake result policy for `interruptible` blocks.
    pub fn block_task(&self, tid: TaskId, channel: usize, priority: u32, policy: SchedPolicy) {
        self.remove_ready(tid, priority, policy);
        TASKS.with_task_mut(tid, |t| {
            t.state = TaskState::Sleeping;
            t.wait_channel = Some(channel);
        });
        self.waiters.lock().push((channel, tid));
    }

    /// Wakes every task waiting on `channel`, moving each back onto its
    /// ready queue. A `channel` with no waiters is a no-op.
    pub fn unblock(&self, channel: usize) {
        let mut waiters = self.waiters.lock();
        let mut woken = Vec::new();
        waiters.retain(|&(c, tid)| {
            if c == channel {
                woken.push(tid);
                false
            } else {
                true
            }
        });
        drop(waiters);
        for tid in woken {
            let info = TASKS.with_task_mut(tid, |t| {
                t.state = TaskState::Ready;
                t.wait_channel = None;
                (t.priority, t.policy)
            });
            if let Some((priority, policy)) = info {
                self.enqueue_ready(tid, priority, policy);
            }
        }
    }

    pub fn waiter_count(&self, channel: usize) -> usize {
        self.waiters
            .lock()
            .iter()
            .filter(|&&(c, _)| c == channel)
            .count()
    }
}

pub static SCHEDULER: Scheduler = Scheduler::new();

/// Result of a completed block, mirroring `block_task`'s three exit
/// paths: normal wake, signal interruption, and timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    Woken,
    Interrupted,
    TimedOut,
}

pub fn block_outcome_to_result(outcome: BlockOutcome) -> KernelResult<()> {
    match outcome {
        BlockOutcome::Woken => Ok(()),
        BlockOutcome::Interrupted => Err(KernelError::Interrupted),
        BlockOutcome::TimedOut => Err(KernelError::WouldBlock),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_beats_rr_beats_other() {
        let sched = Scheduler::new();
        sched.enqueue_ready(1, 1, SchedPolicy::Other); // OTHER
        sched.enqueue_ready(2, 20, SchedPolicy::RoundRobin); // RR
        sched.enqueue_ready(3, 60, SchedPolicy::Fifo); // FIFO (higher index)
        assert_eq!(sched.pick_next(), Some(3));
    }

    #[test]
    fn timeslice_expiry_requeues_rr_not_fifo() {
        let sched = Scheduler::new();
        sched.enqueue_ready(1, 50, SchedPolicy::Fifo);
        sched.enqueue_ready(2, 50, SchedPolicy::Fifo);
        // Same priority level: FIFO order preserved regardless of "expiry".
        sched.timeslice_expired(1, 50, SchedPolicy::Fifo);
        assert_eq!(sched.pick_next(), Some(1));
    }

    #[test]
    fn block_then_unblock_restores_readiness() {
        let sched = Scheduler::new();
        let tid = TASKS.spawn_leader(None);
        TASKS.with_task_mut(tid, |t| t.priority = 0);
        sched.enqueue_ready(tid, 0, SchedPolicy::Other);
        sched.block_task(tid, 42, 0, SchedPolicy::Other);
        assert_eq!(sched.waiter_count(42), 1);
        sched.unblock(42);
        assert_eq!(sched.waiter_count(42), 0);
        TASKS
            .with_task(tid, |t| assert_eq!(t.state, TaskState::Ready))
            .unwrap();
    }

    #[test]
    fn unblock_with_no_waiters_is_noop() {
        let sched = Scheduler::new();
        sched.unblock(999);
        assert_eq!(sched.waiter_count(999), 0);
    }
}
