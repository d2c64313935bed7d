//! Syscall number table (§6.3): a single integer selects a handler
//! from a sparse table; numbers follow the common Linux x86_64
//! numbering so a ptrace consumer sees familiar values. Only the
//! numbers this kernel actually wires up are named here — everything
//! else falls through [`crate::syscall::dispatch::dispatch`]'s
//! default arm to `-ENOSYS`.
//!
//! `fork`, `vfork`, and `clone` share [`CLONE`] and are distinguished
//! by the flags argument (`0` behaves like `fork`, `CLONE_VFORK` like
//! `vfork`); `clone`'s second argument is the new user stack pointer.

pub type SyscallNo = usize;

pub const CLOSE: SyscallNo = 3;
pub const POLL: SyscallNo = 7;
pub const RT_SIGACTION: SyscallNo = 13;
pub const RT_SIGPROCMASK: SyscallNo = 14;
pub const RT_SIGRETURN: SyscallNo = 15;
pub const SELECT: SyscallNo = 23;
pub const SCHED_YIELD: SyscallNo = 24;
pub const GETITIMER: SyscallNo = 36;
pub const ALARM: SyscallNo = 37;
pub const SETITIMER: SyscallNo = 38;
pub const GETPID: SyscallNo = 39;
pub const SOCKET: SyscallNo = 41;
pub const CONNECT: SyscallNo = 42;
pub const ACCEPT: SyscallNo = 43;
pub const SENDTO: SyscallNo = 44;
pub const RECVFROM: SyscallNo = 45;
pub const SHUTDOWN: SyscallNo = 48;
pub const BIND: SyscallNo = 49;
pub const LISTEN: SyscallNo = 50;
pub const SOCKETPAIR: SyscallNo = 53;
pub const CLONE: SyscallNo = 56;
pub const EXIT: SyscallNo = 60;
pub const WAIT4: SyscallNo = 61;
pub const KILL: SyscallNo = 62;
pub const FLOCK: SyscallNo = 73;
pub const PAUSE: SyscallNo = 34;
pub const PTRACE: SyscallNo = 101;
pub const MOUNT: SyscallNo = 165;
pub const GETPRIORITY: SyscallNo = 140;
pub const SETPRIORITY: SyscallNo = 141;
pub const SCHED_SETSCHEDULER: SyscallNo = 144;
pub const SCHED_GETSCHEDULER: SyscallNo = 145;
pub const SIGALTSTACK: SyscallNo = 131;
pub const GETDENTS64: SyscallNo = 217;
pub const TIMER_CREATE: SyscallNo = 222;
pub const TIMER_SETTIME: SyscallNo = 223;
pub const TIMER_GETTIME: SyscallNo = 224;
pub const TIMER_DELETE: SyscallNo = 226;
pub const CLOCK_NANOSLEEP: SyscallNo = 230;
pub const EXIT_GROUP: SyscallNo = 231;
pub const TGKILL: SyscallNo = 234;
pub const WAITID: SyscallNo = 247;
pub const PSELECT6: SyscallNo = 270;
pub const PPOLL: SyscallNo = 271;
pub const PRLIMIT64: SyscallNo = 302;

pub const ENOSYS: i32 = -38;
