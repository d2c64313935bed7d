//! The `Task` record and its arena.
//!
//! Per the shared-ownership design note, `Task` and its satellite
//! sub-objects are not linked by raw pointers. Each lives in an
//! arena-owned slot addressed by an index/handle (`TaskId`), and the
//! satellite objects (`FileTable`, `FsContext`, `SignalTable`,
//! `ThreadGroup`, `MemMap`) are reference-counted `Arc<Mutex<_>>`
//! handles that `fork` duplicates and `clone` may share.

use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use crate::rlimit::{RLimit, NLIMITS};
use crate::signal::SignalTable;
use crate::timer::ItimerSet;

/// Unique task id, stable for the task's lifetime. Index into [`TaskTable`].
pub type TaskId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Ready,
    Sleeping,
    Stopped,
    Zombie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchedPolicy {
    Fifo,
    RoundRobin,
    Other,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Credentials {
    pub uid: u32,
    pub euid: u32,
    pub suid: u32,
    pub gid: u32,
    pub egid: u32,
    pub sgid: u32,
}

/// Saved register context. Layout is intentionally architecture-neutral;
/// arch bring-up is out of scope here, only the save/restore contract
/// the scheduler and ptrace machinery depend on.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterContext {
    pub gpr: [u64; 16],
    pub pc: u64,
    pub sp: u64,
    pub flags: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PtraceState {
    pub tracer_tid: Option<TaskId>,
    pub options: u32,
    pub event_msg: u64,
    pub exit_status: i32,
    pub stopped: bool,
}

/// File-descriptor table. The filesystem crate owns the descriptor
/// contents; this crate only needs the sharing/refcounting shell so
/// `clone(CLONE_FILES)` and `fork` can express "share" vs "duplicate".
#[derive(Debug, Default)]
pub struct FileTable {
    pub close_on_exec: Vec<bool>,
}

#[derive(Debug, Default, Clone)]
pub struct FsContext {
    pub cwd_inode: Option<u32>,
    pub root_inode: Option<u32>,
    pub umask: u32,
}

#[derive(Debug, Default)]
pub struct ThreadGroup {
    pub tgid: TaskId,
    pub members: Vec<TaskId>,
    pub exiting: bool,
}

#[derive(Debug, Default)]
pub struct MemMap {
    pub end_data: usize,
    pub end_stack: usize,
    pub end_code: usize,
}

pub type Shared<T> = Arc<Mutex<T>>;

pub struct Task {
    pub tid: TaskId,
    pub tgid: TaskId,
    pub parent: Option<TaskId>,
    pub first_child: Option<TaskId>,
    pub first_sibling: Option<TaskId>,
    pub thread_group_next: Option<TaskId>,

    pub creds: Credentials,

    pub policy: SchedPolicy,
    pub priority: u32,
    pub nice: i32,
    pub time_left: u32,
    pub timeslice: u32,

    pub state: TaskState,
    /// Opaque identity of the channel this task is blocked on, if any.
    /// Never dereferenced by the scheduler — only compared for equality
    /// by the select/block registries.
    pub wait_channel: Option<usize>,

    pub files: Shared<FileTable>,
    pub fs: Shared<FsContext>,
    pub signals: Shared<SignalTable>,
    pub threads: Shared<ThreadGroup>,
    pub mem: Shared<MemMap>,

    pub rlimits: [RLimit; NLIMITS],
    pub context: RegisterContext,
    pub ptrace: PtraceState,

    pub itimer_real: ItimerSet,
    pub itimer_virtual: ItimerSet,
    pub itimer_prof: ItimerSet,

    pub user_time: u64,
    pub sys_time: u64,
    pub children_user_time: u64,
    pub children_sys_time: u64,
    pub page_faults: u64,

    pub lock_held: bool,
}

impl Task {
    fn new_leader(tid: TaskId, parent: Option<TaskId>) -> Self {
        Task {
            tid,
            tgid: tid,
            parent,
            first_child: None,
            first_sibling: None,
            thread_group_next: None,
            creds: Credentials::default(),
            policy: SchedPolicy::Other,
            priority: 0,
            nice: 0,
            time_left: 0,
            timeslice: 0,
            state: TaskState::Ready,
            wait_channel: None,
            files: Arc::new(Mutex::new(FileTable::default())),
            fs: Arc::new(Mutex::new(FsContext::default())),
            signals: Arc::new(Mutex::new(SignalTable::default())),
            threads: Arc::new(Mutex::new(ThreadGroup {
                tgid: tid,
                members: alloc::vec![tid],
                exiting: false,
            })),
            mem: Arc::new(Mutex::new(MemMap::default())),
            rlimits: RLimit::default_table(),
            context: RegisterContext::default(),
            ptrace: PtraceState::default(),
            itimer_real: ItimerSet::default(),
            itimer_virtual: ItimerSet::default(),
            itimer_prof: ItimerSet::default(),
            user_time: 0,
            sys_time: 0,
            children_user_time: 0,
            children_sys_time: 0,
            page_faults: 0,
            lock_held: false,
        }
    }
}

/// Process-wide arena of tasks, the only place a `Task` is actually
/// owned. Every other reference in the kernel is a `TaskId`.
pub struct TaskTable {
    slots: Mutex<Vec<Option<Task>>>,
    next_tid: Mutex<TaskId>,
}

impl TaskTable {
    pub const fn new() -> Self {
        TaskTable {
            slots: Mutex::new(Vec::new()),
            next_tid: Mutex::new(1),
        }
    }

    fn alloc_tid(&self) -> TaskId {
        let mut next = self.next_tid.lock();
        let tid = *next;
        *next += 1;
        tid
    }

    /// Creates a brand-new thread-group leader (used for the very first
    /// task and as the fallback shape for any process not derived from
    /// an existing one).
    pub fn spawn_leader(&self, parent: Option<TaskId>) -> TaskId {
        let tid = self.alloc_tid();
        let task = Task::new_leader(tid, parent);
        let mut slots = self.slots.lock();
        if tid >= slots.len() {
            slots.resize_with(tid + 1, || None);
        }
        slots[tid] = Some(task);
        tid
    }

    pub fn with_task<R>(&self, tid: TaskId, f: impl FnOnce(&Task) -> R) -> Option<R> {
        let slots = self.slots.lock();
        slots.get(tid).and_then(|t| t.as_ref()).map(f)
    }

    pub fn with_task_mut<R>(&self, tid: TaskId, f: impl FnOnce(&mut Task) -> R) -> Option<R> {
        let mut slots = self.slots.lock();
        slots.get_mut(tid).and_then(|t| t.as_mut()).map(f)
    }

    /// Removes a task from the arena. Only valid once the task is a
    /// reaped zombie — callers in `lifecycle` enforce that.
    pub fn remove(&self, tid: TaskId) -> Option<Task> {
        let mut slots = self.slots.lock();
        slots.get_mut(tid).and_then(|slot| slot.take())
    }

    pub fn exists(&self, tid: TaskId) -> bool {
        let slots = self.slots.lock();
        matches!(slots.get(tid), Some(Some(_)))
    }
}

pub static TASKS: TaskTable = TaskTable::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_leader_is_own_tgid() {
        let table = TaskTable::new();
        let tid = table.spawn_leader(None);
        table
            .with_task(tid, |t| assert_eq!(t.tid, t.tgid))
            .expect("task present");
    }

    #[test]
    fn remove_clears_slot() {
        let table = TaskTable::new();
        let tid = table.spawn_leader(None);
        assert!(table.exists(tid));
        table.remove(tid);
        assert!(!table.exists(tid));
    }
}
