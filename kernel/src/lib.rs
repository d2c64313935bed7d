//! Syscall ABI layer (§6.3): turns a trapped syscall number and
//! register arguments into calls against the scheduler, filesystem,
//! and net libraries, and turns their results back into the POSIX
//! return-value convention (0/positive on success, negative errno on
//! failure). Process/thread lifecycle, signals, timers, select/poll,
//! rlimits, advisory locking, and sockets are all reachable through a
//! single [`syscall::dispatch`] entry point; everything else not named
//! in [`syscall::numbers`] falls through to `-ENOSYS`.
//!
//! Memory management, device drivers, and architecture bring-up are
//! external collaborators this crate never touches directly — the only
//! sanctioned user/kernel boundary crossing is [`usermem::UserMemory`].

#![no_std]

extern crate alloc;

pub mod error;
pub mod syscall;
pub mod usermem;

pub use error::{errno, KernelError, KernelResult, ERESTARTSYS};
pub use syscall::{dispatch, Args};
