//! Fork/vfork/clone/exit_group/wait (component E).

use alloc::sync::Arc;
use alloc::vec::Vec;
use bitflags::bitflags;

use crate::error::{KernelError, KernelResult};
use crate::queue::SCHEDULER;
use crate::task::{TaskId, TaskState, TASKS};

bitflags! {
    /// Subset of `clone(2)`'s flags this spec's sharing model cares
    /// about: which satellite sub-objects the new task shares with its
    /// creator rather than receiving a private copy of.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct CloneFlags: u32 {
        const FILES   = 0x0400;
        const FS      = 0x0200;
        const SIGHAND = 0x0800;
        const THREAD  = 0x00010000;
        const VM      = 0x0100;
        const VFORK   = 0x4000;
    }
}

/// `fork`: copy-on-write duplicate of the parent. This model does not
/// implement actual page-table COW (memory management is an external
/// collaborator); it duplicates the satellite objects by value, which
/// is the visible effect COW is an optimization of.
pub fn fork(parent_tid: TaskId) -> KernelResult<TaskId> {
    let parent_snapshot = TASKS
        .with_task(parent_tid, |p| {
            (
                p.creds,
                p.policy,
                p.priority,
                p.nice,
                p.rlimits,
                p.fs.lock().clone(),
            )
        })
        .ok_or(KernelError::NoSuchTask)?;

    let child_tid = TASKS.spawn_leader(Some(parent_tid));
    TASKS.with_task_mut(child_tid, |c| {
        c.creds = parent_snapshot.0;
        c.policy = parent_snapshot.1;
        c.priority = parent_snapshot.2;
        c.nice = parent_snapshot.3;
        c.rlimits = parent_snapshot.4;
        *c.fs.lock() = parent_snapshot.5;
        c.user_time = 0;
        c.sys_time = 0;
    });

    let old_first = TASKS
        .with_task_mut(parent_tid, |p| {
            let old_first = p.first_child;
            p.first_child = Some(child_tid);
            old_first
        })
        .ok_or(KernelError::NoSuchTask)?;
    TASKS.with_task_mut(child_tid, |c| c.first_sibling = old_first);

    let (prio, policy) = TASKS
        .with_task(child_tid, |c| (c.priority, c.policy))
        .unwrap();
    SCHEDULER.enqueue_ready(child_tid, prio, policy);
    Ok(child_tid)
}

/// `vfork`: like `fork` but the memory map is shared (not copied) and
/// the parent blocks until the child execs or exits. Blocking itself is
/// the caller's responsibility (it owns the scheduler's block channel
/// convention); this returns the channel the caller should block the
/// parent on — the child's tid, by convention.
pub fn vfork(parent_tid: TaskId) -> KernelResult<(TaskId, usize)> {
    let child_tid = fork(parent_tid)?;
    let shared_mem = TASKS.with_task(parent_tid, |p| p.mem.clone()).unwrap();
    TASKS.with_task_mut(child_tid, |c| c.mem = shared_mem);
    Ok((child_tid, child_tid))
}

/// `clone`: shares the sub-objects named in `flags` instead of copying
/// them, and — if `CloneFlags::THREAD` is set — joins the parent's
/// thread group rather than becoming a new one.
pub fn clone_task(parent_tid: TaskId, flags: CloneFlags) -> KernelResult<TaskId> {
    let child_tid = fork(parent_tid)?;

    let (files, fs, signals, threads, mem) = TASKS
        .with_task(parent_tid, |p| {
            (
                p.files.clone(),
                p.fs.clone(),
                p.signals.clone(),
                p.threads.clone(),
                p.mem.clone(),
            )
        })
        .ok_or(KernelError::NoSuchTask)?;

    let parent_tgid = TASKS
        .with_task(parent_tid, |p| p.tgid)
        .ok_or(KernelError::NoSuchTask)?;

    TASKS.with_task_mut(child_tid, |c| {
        if flags.contains(CloneFlags::FILES) {
            c.files = files;
        }
        if flags.contains(CloneFlags::FS) {
            c.fs = fs;
        }
        if flags.contains(CloneFlags::SIGHAND) {
            c.signals = signals;
        }
        if flags.contains(CloneFlags::VM) || flags.contains(CloneFlags::VFORK) {
            c.mem = mem;
        }
        if flags.contains(CloneFlags::THREAD) {
            c.tgid = parent_tgid;
            threads.lock().members.push(c.tid);
            c.threads = threads;
        }
    });

    Ok(child_tid)
}

/// `exit_group`: marks the thread group exiting and sends `SIGKILL`
/// (encoded here as a pending-signal insertion rather than full
/// delivery, since delivery is `signal`'s job) to every sibling thread;
/// once the last non-exiting member becomes a zombie the leader is
/// reapable.
pub fn exit_group(leader_tid: TaskId, exit_status: i32) -> KernelResult<()> {
    let group = TASKS
        .with_task(leader_tid, |t| t.threads.clone())
        .ok_or(KernelError::NoSuchTask)?;

    group.lock().exiting = true;
    let members: Vec<TaskId> = group.lock().members.clone();
    for member in members {
        TASKS.with_task_mut(member, |t| {
            t.state = TaskState::Zombie;
            t.ptrace.exit_status = exit_status;
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WaitOptions {
    pub nohang: bool,
    pub untraced: bool,
    pub continued: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct WaitResult {
    pub tid: TaskId,
    pub exit_status: i32,
}

/// `wait`/`waitid`: returns the first eligible zombie child of `parent`,
/// reaping it (removing from the arena) unless the caller only asked
/// about stopped/continued children.
pub fn wait_any(parent_tid: TaskId, opts: WaitOptions) -> KernelResult<Option<WaitResult>> {
    let mut cursor = TASKS.with_task(parent_tid, |p| p.first_child).flatten();
    while let Some(child) = cursor {
        let state = TASKS.with_task(child, |c| c.state);
        match state {
            Some(TaskState::Zombie) => {
                let exit_status = TASKS.with_task(child, |c| c.ptrace.exit_status).unwrap_or(0);
                let removed = TASKS.remove(child);
                drop(removed);
                return Ok(Some(WaitResult {
                    tid: child,
                    exit_status,
                }));
            }
            Some(TaskState::Stopped) if opts.untraced => {
                let exit_status = TASKS.with_task(child, |c| c.ptrace.exit_status).unwrap_or(0);
                return Ok(Some(WaitResult {
                    tid: child,
                    exit_status,
                }));
            }
            _ => {}
        }
        cursor = TASKS.with_task(child, |c| c.first_sibling).flatten();
    }
    if opts.nohang {
        Ok(None)
    } else {
        Err(KernelError::Again)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_creates_child_linked_to_parent() {
        let parent = TASKS.spawn_leader(None);
        let child = fork(parent).unwrap();
        TASKS
            .with_task(parent, |p| assert_eq!(p.first_child, Some(child)))
            .unwrap();
        TASKS
            .with_task(child, |c| assert_eq!(c.parent, Some(parent)))
            .unwrap();
    }

    #[test]
    fn clone_with_files_shares_table() {
        let parent = TASKS.spawn_leader(None);
        let child = clone_task(parent, CloneFlags::FILES).unwrap();
        let same = TASKS
            .with_task(parent, |p| p.files.clone())
            .zip(TASKS.with_task(child, |c| c.files.clone()))
            .map(|(a, b)| Arc::ptr_eq(&a, &b))
            .unwrap();
        assert!(same);
    }

    #[test]
    fn exit_group_marks_members_zombie() {
        let leader = TASKS.spawn_leader(None);
        exit_group(leader, 7).unwrap();
        TASKS
            .with_task(leader, |t| assert_eq!(t.state, TaskState::Zombie))
            .unwrap();
    }

    #[test]
    fn wait_any_reaps_zombie_child() {
        let parent = TASKS.spawn_leader(None);
        let child = fork(parent).unwrap();
        exit_group(child, 3).unwrap();
        let result = wait_any(parent, WaitOptions::default()).unwrap().unwrap();
        assert_eq!(result.tid, child);
        assert_eq!(result.exit_status, 3);
        assert!(!TASKS.exists(child));
    }

    #[test]
    fn wait_any_nohang_returns_none_without_children() {
        let parent = TASKS.spawn_leader(None);
        let opts = WaitOptions {
            nohang: true,
            ..Default::default()
        };
        assert!(wait_any(parent, opts).unwrap().is_none());
    }
}
