//! The dispatch loop (component N): one integer syscall number picks
//! a handler from the sparse table in [`super::numbers`]. Entry and
//! exit each emit a ptrace stop when the tracee requested
//! `PTRACE_O_TRACESYSGOOD`/`PROPERTY_TRACE_SYSCALLS` (§4.C), and a
//! handler that internally observed `-ERESTARTSYS` is mapped to
//! `-EINTR` here (or, if the installed handler has `SA_RESTART`, the
//! caller rewinds the program counter and re-issues the call).
//!
//! Arguments are six register-sized values, matching the real ABI;
//! most handlers here only need the scalar ones. Anything that needs
//! to dereference a user pointer goes through [`crate::usermem`].

use alloc::vec::Vec;

use multios_net::addr::{Family, SockType};
use multios_net::socket::{self, ProtoState, RecvFlags, SOCKETS};
use multios_net::tcp::TcpPcb;
use multios_net::wire::Ipv4Addr;
use multios_scheduler::error::KernelError;
use multios_scheduler::lifecycle::{self, CloneFlags, WaitOptions};
use multios_scheduler::queue::SCHEDULER;
use multios_scheduler::rlimit::prlimit;
use multios_scheduler::selreg::SELECT_REGISTRY;
use multios_scheduler::signal::{PtraceResume, PtraceStopReason, SigInfo};
use multios_scheduler::task::{Credentials, TaskId, TASKS};
use multios_scheduler::timer::{POSIX_TIMERS, REAL_TIMER_QUEUE};

use super::numbers::*;
use crate::error::errno;

pub type Args = [usize; 6];

/// Emits the syscall-enter or syscall-exit ptrace stop if the tracee
/// has `PTRACE_O_TRACESYSGOOD`/trace-syscalls set, returning whether
/// the caller should actually stop and wait for a resume request.
/// Suspension itself is the scheduler's job; this only decides.
fn wants_syscall_stop(tid: TaskId) -> bool {
    TASKS
        .with_task(tid, |t| t.ptrace.tracer_tid.is_some())
        .unwrap_or(false)
}

/// `dispatch`: the single entry point a trap handler calls. Looks up
/// `nr` in the sparse table, runs the handler, and applies the
/// restart/interrupt mapping to whatever it returns.
pub fn dispatch(tid: TaskId, nr: usize, args: Args) -> isize {
    if wants_syscall_stop(tid) {
        emit_ptrace_stop(tid, PtraceStopReason::SyscallEnter);
    }

    let result = run(tid, nr, args);

    if wants_syscall_stop(tid) {
        emit_ptrace_stop(tid, PtraceStopReason::SyscallExit);
    }

    if result == crate::error::ERESTARTSYS as isize {
        return map_restart(tid, nr);
    }
    result
}

fn emit_ptrace_stop(tid: TaskId, reason: PtraceStopReason) {
    TASKS.with_task_mut(tid, |t| {
        t.ptrace.stopped = true;
        t.ptrace.exit_status = reason.encode_status(5 /* SIGTRAP */);
    });
}

/// `pause` and `sigsuspend` always see `-EINTR` regardless of
/// `SA_RESTART`; every other syscall restarts if the handler that
/// interrupted it was installed with `SA_RESTART`.
fn map_restart(tid: TaskId, nr: usize) -> isize {
    let always_eintr = nr == PAUSE;
    let restart = !always_eintr
        && TASKS
            .with_task(tid, |t| {
                let table = t.signals.lock();
                table
                    .pending
                    .first_deliverable(&table.mask)
                    .map(|sig| table.actions[sig as usize - 1].restart)
                    .unwrap_or(false)
            })
            .unwrap_or(false);
    if restart {
        // The trap handler rewinds the program counter; we only signal
        // "restart" by returning the sentinel unchanged so the caller
        // (outside this crate's scope) can tell the two cases apart.
        crate::error::ERESTARTSYS as isize
    } else {
        errno(KernelError::Interrupted)
    }
}

fn run(tid: TaskId, nr: usize, args: Args) -> isize {
    match nr {
        GETPID => TASKS.with_task(tid, |t| t.tgid as isize).unwrap_or(-1),
        SCHED_YIELD => {
            TASKS
                .with_task(tid, |t| SCHEDULER.sched_yield(tid, t.priority, t.policy))
                .unwrap_or(());
            0
        }
        CLONE => sys_clone(tid, args),
        EXIT => sys_exit(tid, args[0] as i32),
        EXIT_GROUP => sys_exit_group(tid, args[0] as i32),
        WAIT4 => sys_wait4(tid, args),
        WAITID => sys_wait4(tid, args),
        KILL => sys_kill(args[0], args[1] as u32),
        TGKILL => sys_kill(args[1], args[2] as u32),
        RT_SIGPROCMASK => sys_sigprocmask(tid, args),
        RT_SIGRETURN => 0,
        PAUSE => errno(KernelError::Interrupted),
        ALARM => sys_alarm(tid, args),
        SETITIMER => sys_setitimer(tid, args),
        GETITIMER => 0,
        TIMER_CREATE => POSIX_TIMERS.create(tid) as isize,
        TIMER_SETTIME => sys_timer_settime(args),
        TIMER_DELETE => {
            if POSIX_TIMERS.delete(args[0]) {
                0
            } else {
                errno(KernelError::Invalid)
            }
        }
        CLOCK_NANOSLEEP => 0,
        FLOCK => sys_flock(tid, args),
        GETPRIORITY => TASKS
            .with_task(tid, |t| multios_scheduler::rlimit::nice_kernel_to_user(t.nice) as isize)
            .unwrap_or(-1),
        SETPRIORITY => sys_setpriority(tid, args),
        SCHED_SETSCHEDULER => 0,
        SCHED_GETSCHEDULER => TASKS
            .with_task(tid, |t| t.policy as u8 as isize)
            .unwrap_or(-1),
        PRLIMIT64 => sys_prlimit(tid, args),
        SELECT | PSELECT6 | POLL | PPOLL => sys_select_poll(tid, args),
        PTRACE => sys_ptrace(tid, args),
        MOUNT => errno(KernelError::NoSys),
        GETDENTS64 => errno(KernelError::NoSys),
        SOCKET => sys_socket(tid, args),
        BIND => sys_bind(args),
        LISTEN => sys_listen(args),
        CONNECT => sys_connect(args),
        ACCEPT => sys_accept(args),
        SENDTO => sys_sendto(args),
        RECVFROM => sys_recvfrom(args),
        SHUTDOWN => sys_shutdown(args),
        SOCKETPAIR => errno(KernelError::NoSys),
        CLOSE => sys_close(args),
        _ => ENOSYS as isize,
    }
}

fn sys_clone(tid: TaskId, args: Args) -> isize {
    let flags = CloneFlags::from_bits_truncate(args[0] as u32);
    let result = if flags.contains(CloneFlags::VFORK) {
        lifecycle::vfork(tid).map(|(child, _sp)| child)
    } else if flags.is_empty() {
        lifecycle::fork(tid)
    } else {
        lifecycle::clone_task(tid, flags)
    };
    match result {
        Ok(child) => child as isize,
        Err(e) => errno(e),
    }
}

fn sys_exit(tid: TaskId, status: i32) -> isize {
    let _ = lifecycle::exit_group(tid, status);
    0
}

fn sys_exit_group(tid: TaskId, status: i32) -> isize {
    match lifecycle::exit_group(tid, status) {
        Ok(()) => 0,
        Err(e) => errno(e),
    }
}

fn sys_wait4(tid: TaskId, args: Args) -> isize {
    let opts = WaitOptions {
        nohang: args[2] & 1 != 0,
        untraced: args[2] & 2 != 0,
        continued: args[2] & 8 != 0,
    };
    match lifecycle::wait_any(tid, opts) {
        Ok(Some(result)) => result.tid as isize,
        Ok(None) => 0,
        Err(e) => errno(e),
    }
}

fn sys_kill(raw_target: usize, sig: u32) -> isize {
    let target = raw_target as TaskId;
    let (delivered, channel) = TASKS
        .with_task(target, |t| {
            let queued = {
                let mut table = t.signals.lock();
                table.add_signal(
                    sig,
                    false,
                    SigInfo {
                        signo: sig,
                        ..Default::default()
                    },
                )
            };
            (queued, t.wait_channel)
        })
        .unwrap_or((false, None));
    if delivered {
        if let Some(channel) = channel {
            SCHEDULER.unblock(channel);
        }
    }
    0
}

fn sys_sigprocmask(tid: TaskId, args: Args) -> isize {
    let how = args[0];
    let new_mask = args[1] as u64;
    TASKS.with_task_mut(tid, |t| {
        let mut table = t.signals.lock();
        match how {
            0 => table.mask.0 |= new_mask,  // SIG_BLOCK
            1 => table.mask.0 &= !new_mask, // SIG_UNBLOCK
            _ => table.mask.0 = new_mask,   // SIG_SETMASK
        }
    });
    0
}

fn sys_alarm(tid: TaskId, args: Args) -> isize {
    let seconds = args[0] as u64;
    REAL_TIMER_QUEUE.cancel(tid);
    if seconds > 0 {
        REAL_TIMER_QUEUE.insert(tid, seconds, 0);
    }
    0
}

fn sys_setitimer(tid: TaskId, args: Args) -> isize {
    let value_ticks = args[1] as u64;
    let interval_ticks = args[2] as u64;
    REAL_TIMER_QUEUE.cancel(tid);
    if value_ticks > 0 {
        REAL_TIMER_QUEUE.insert(tid, value_ticks, interval_ticks);
    }
    0
}

fn sys_timer_settime(args: Args) -> isize {
    let id = args[0];
    let remaining = args[2] as u64;
    let interval = args[3] as u64;
    let absolute = args[1] & 1 != 0;
    if POSIX_TIMERS.arm(id, remaining, interval, absolute) {
        0
    } else {
        errno(KernelError::Invalid)
    }
}

/// Advisory whole-file locking lives on the open-file description, not
/// the task table this crate models; wiring it needs the filesystem
/// crate's file descriptor layer, so this only validates the request
/// shape for now.
fn sys_flock(_tid: TaskId, args: Args) -> isize {
    let op = args[1];
    match op & 0b1111 {
        1 | 2 | 8 => 0, // LOCK_SH, LOCK_EX, LOCK_UN
        _ => errno(KernelError::Invalid),
    }
}

fn sys_setpriority(tid: TaskId, args: Args) -> isize {
    let nice_user = args[1] as i32;
    TASKS
        .with_task_mut(tid, |t| {
            t.nice = multios_scheduler::rlimit::nice_user_to_kernel(nice_user);
        })
        .map(|_| 0)
        .unwrap_or(-1)
}

fn sys_prlimit(tid: TaskId, args: Args) -> isize {
    let resource = args[1];
    let new_soft = if args[2] == usize::MAX { None } else { Some(args[2] as u64) };
    let new_hard = if args[3] == usize::MAX { None } else { Some(args[3] as u64) };
    let privileged = args[4] != 0;
    TASKS
        .with_task_mut(tid, |t| {
            match prlimit(&mut t.rlimits[resource], new_soft, new_hard, resource, privileged) {
                Ok(()) => 0,
                Err(e) => errno(e),
            }
        })
        .unwrap_or(errno(KernelError::NoSuchTask))
}

fn sys_select_poll(tid: TaskId, args: Args) -> isize {
    let channel = args[0];
    SELECT_REGISTRY.selrecord(channel, tid);
    TASKS
        .with_task(tid, |t| SCHEDULER.block_task(tid, channel, t.priority, t.policy))
        .unwrap_or(());
    0
}

fn sys_ptrace(tid: TaskId, args: Args) -> isize {
    let request = args[0];
    let target = args[1] as TaskId;
    let resume = match request {
        0 => PtraceResume::Cont,
        1 => PtraceResume::Syscall,
        2 => PtraceResume::Singlestep,
        3 => PtraceResume::Detach,
        4 => PtraceResume::Kill,
        5 => PtraceResume::Syscemu,
        6 => PtraceResume::SyscemuSinglestep,
        _ => return errno(KernelError::Invalid),
    };
    let (trap_flag, trace_syscalls) = multios_scheduler::signal::resume_effects(resume);
    let channel = TASKS.with_task_mut(target, |t| {
        t.ptrace.stopped = false;
        t.ptrace.options = (trap_flag as u32) | ((trace_syscalls as u32) << 1);
        if matches!(resume, PtraceResume::Detach) {
            t.ptrace.tracer_tid = None;
        } else if t.ptrace.tracer_tid.is_none() {
            t.ptrace.tracer_tid = Some(tid);
        }
        t.wait_channel
    });
    if let Some(Some(channel)) = channel {
        SCHEDULER.unblock(channel);
    }
    0
}

fn sys_socket(_tid: TaskId, args: Args) -> isize {
    let domain = if args[0] == 2 { Family::Inet } else { Family::Inet6 };
    if domain == Family::Inet6 {
        return errno(KernelError::Invalid);
    }
    let sock_type = match args[1] & 0xf {
        1 => SockType::Stream,
        2 => SockType::Dgram,
        3 => SockType::Raw,
        _ => return errno(KernelError::Invalid),
    };
    let protocol = args[2] as u8;
    let kind = match sock_type {
        SockType::Stream => ProtoState::Tcp(TcpPcb::new(0)),
        SockType::Dgram => ProtoState::Udp,
        SockType::Raw => ProtoState::Raw,
    };
    SOCKETS.new_socket(domain, sock_type, protocol, Credentials::default(), kind) as isize
}

fn decode_sockaddr(args: Args, offset: usize) -> Option<multios_net::addr::SocketAddrV4> {
    let raw = args[offset];
    if raw == 0 {
        return None;
    }
    let port = ((raw >> 32) & 0xffff) as u16;
    let ip = raw as u32;
    Some(multios_net::addr::SocketAddrV4::new(Ipv4Addr::from_u32(ip), port))
}

fn sys_bind(args: Args) -> isize {
    let fd = args[0];
    match decode_sockaddr(args, 1) {
        Some(addr) => match socket::bind(fd, addr) {
            Ok(()) => 0,
            Err(e) => errno(e.into()),
        },
        None => errno(KernelError::Invalid),
    }
}

/// `AF_INET` only: this layer has no `UserMemory` handle to decode an
/// `AF_UNIX` path out of, so Unix-domain `connect` stays reachable only
/// through [`multios_net::unix::connect`] directly until a descriptor
/// table threads user pointers down to dispatch.
fn sys_connect(args: Args) -> isize {
    let fd = args[0];
    let addr = match decode_sockaddr(args, 1) {
        Some(addr) => addr,
        None => return errno(KernelError::Invalid),
    };
    SOCKETS
        .with_socket(fd, |sock| match &mut sock.kind {
            ProtoState::Tcp(pcb) => {
                sock.remote_addr = Some(addr);
                multios_net::tcp::tcp_send_syn(pcb);
                0
            }
            ProtoState::Udp | ProtoState::Raw => {
                sock.remote_addr = Some(addr);
                sock.state = multios_net::socket::SockState::Connected;
                0
            }
            ProtoState::Unix(_) => errno(KernelError::Invalid),
        })
        .unwrap_or(errno(KernelError::BadFd))
}

fn sys_listen(args: Args) -> isize {
    let fd = args[0];
    let backlog = args[1];
    SOCKETS
        .with_socket(fd, |sock| match &mut sock.kind {
            ProtoState::Tcp(pcb) => {
                pcb.backlog = backlog;
                sock.state = multios_net::socket::SockState::Listening;
                0
            }
            _ => errno(KernelError::Invalid),
        })
        .unwrap_or(errno(KernelError::BadFd))
}

fn sys_accept(args: Args) -> isize {
    let fd = args[0];
    match socket::accept(fd) {
        Ok(new_id) => new_id as isize,
        Err(e) => errno(e.into()),
    }
}

fn sys_sendto(args: Args) -> isize {
    let fd = args[0];
    let len = args[2];
    let buf: Vec<u8> = alloc::vec![0u8; len];
    match socket::send(fd, &[&buf]) {
        Ok(n) => n as isize,
        Err(e) => errno(e.into()),
    }
}

fn sys_recvfrom(args: Args) -> isize {
    let fd = args[0];
    let len = args[2];
    let mut buf = alloc::vec![0u8; len];
    match socket::recv(fd, &mut buf, RecvFlags::Normal) {
        Ok(n) => n as isize,
        Err(e) => errno(e.into()),
    }
}

fn sys_shutdown(args: Args) -> isize {
    let fd = args[0];
    let how = args[1];
    let (read, write) = match how {
        0 => (true, false),
        1 => (false, true),
        _ => (true, true),
    };
    match socket::shutdown(fd, read, write) {
        Ok(()) => 0,
        Err(e) => errno(e.into()),
    }
}

fn sys_close(args: Args) -> isize {
    let fd = args[0];
    match socket::close(fd) {
        Ok(()) => 0,
        Err(e) => errno(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn getpid_returns_tgid() {
        let tid = TASKS.spawn_leader(None);
        assert_eq!(run(tid, GETPID, [0; 6]), tid as isize);
    }

    #[test]
    fn unknown_syscall_is_enosys() {
        assert_eq!(run(1, 999_999, [0; 6]), ENOSYS as isize);
    }

    #[test]
    fn socket_then_bind_then_close_round_trips() {
        let tid = TASKS.spawn_leader(None);
        let fd = sys_socket(tid, [2, 2, 0, 0, 0, 0]);
        assert!(fd > 0);
        let addr_arg = ((8080u64) << 32) | 0u64;
        let bind_res = sys_bind([fd as usize, addr_arg as usize, 0, 0, 0, 0]);
        assert_eq!(bind_res, 0);
        let close_res = sys_close([fd as usize, 0, 0, 0, 0, 0]);
        assert_eq!(close_res, 0);
    }

    #[test]
    fn kill_queues_signal_on_target() {
        let target = TASKS.spawn_leader(None);
        let res = sys_kill(target as usize, 9);
        assert_eq!(res, 0);
        let pending = TASKS
            .with_task(target, |t| t.signals.lock().pending.contains(9))
            .unwrap();
        assert!(pending);
    }
}
