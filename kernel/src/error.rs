//! Re-export of the shared POSIX error taxonomy plus the syscall
//! return-value convention (§7): success or a domain value, otherwise
//! a negative errno the dispatcher writes into the return register.

pub use multios_scheduler::error::{KernelError, KernelResult};

/// Internal-only signal: a blocking routine was interrupted by a
/// signal while in an interruptible wait. Never crosses into
/// userland directly — [`crate::syscall::dispatch`] maps it to
/// `-EINTR` (or rewinds the PC to restart the syscall) per §4.C.
pub const ERESTARTSYS: i32 = -512;

pub fn errno(e: KernelError) -> isize {
    e.to_errno() as isize
}
