//! Signal delivery and the ptrace stop state machine (component C).
//!
//! This module only models data and pure transition logic; the actual
//! suspend/resume of a task is the scheduler's `block_task`/wakeup pair
//! in [`crate::queue`], invoked by the caller with the `TaskId` this
//! module operates blind to.

pub const NSIG: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SigSet(pub u64);

impl SigSet {
    pub const fn empty() -> Self {
        SigSet(0)
    }

    pub fn add(&mut self, sig: u32) {
        if (1..=NSIG as u32).contains(&sig) {
            self.0 |= 1u64 << (sig - 1);
        }
    }

    pub fn remove(&mut self, sig: u32) {
        if (1..=NSIG as u32).contains(&sig) {
            self.0 &= !(1u64 << (sig - 1));
        }
    }

    pub fn contains(&self, sig: u32) -> bool {
        (1..=NSIG as u32).contains(&sig) && self.0 & (1u64 << (sig - 1)) != 0
    }

    /// Lowest-numbered pending signal not present in `mask`, if any.
    pub fn first_deliverable(&self, mask: &SigSet) -> Option<u32> {
        for sig in 1..=NSIG as u32 {
            if self.contains(sig) && !mask.contains(sig) {
                return Some(sig);
            }
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigDisposition {
    Default,
    Ignore,
    Handler(usize),
}

impl Default for SigDisposition {
    fn default() -> Self {
        SigDisposition::Default
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SigAction {
    pub disposition: SigDisposition,
    pub mask: SigSet,
    pub restart: bool,
    pub sa_siginfo: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SigInfo {
    pub signo: u32,
    pub code: i32,
    pub sender_pid: u32,
    pub value: i64,
}

/// POSIX default actions for a signal lacking an installed handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultAction {
    Terminate,
    Core,
    Stop,
    Continue,
    Ignore,
}

pub fn default_action(sig: u32) -> DefaultAction {
    match sig {
        9 | 15 | 1 | 2 => DefaultAction::Terminate, // KILL, TERM, HUP, INT
        4 | 6 | 8 | 11 => DefaultAction::Core,       // ILL, ABRT, FPE, SEGV
        19 | 20 | 21 | 22 => DefaultAction::Stop,    // STOP, TSTP, TTIN, TTOU
        18 => DefaultAction::Continue,               // CONT
        23 => DefaultAction::Ignore,                 // CHLD
        _ => DefaultAction::Terminate,
    }
}

/// Signals that cannot be caught, blocked, or ignored.
pub fn is_uncatchable(sig: u32) -> bool {
    sig == 9 || sig == 19 // SIGKILL, SIGSTOP
}

#[derive(Debug, Default)]
pub struct SignalTable {
    pub pending: SigSet,
    pub caught: SigSet,
    pub mask: SigSet,
    pub actions: [SigAction; NSIG],
    pub infos: [SigInfo; NSIG],
    pub alt_stack: Option<(usize, usize)>,
}

impl SignalTable {
    /// `user_add_task_signal(task, sig, force)`: adds `sig` to pending
    /// unless it is blocked and not forced. An ignored signal with no
    /// handler installed is discarded before insertion unless
    /// uncatchable (SIGKILL/SIGSTOP always take effect).
    ///
    /// Returns `true` if the task should be woken because the signal
    /// was actually queued against an interruptible sleep.
    pub fn add_signal(&mut self, sig: u32, force: bool, info: SigInfo) -> bool {
        if !is_uncatchable(sig) {
            if let SigDisposition::Ignore = self.actions[sig as usize - 1].disposition {
                return false;
            }
            if self.mask.contains(sig) && !force {
                self.pending.add(sig);
                self.infos[sig as usize - 1] = info;
                return false;
            }
        }
        self.pending.add(sig);
        self.caught.add(sig);
        self.infos[sig as usize - 1] = info;
        true
    }

    /// Picks the next signal to deliver on return to user mode, if any,
    /// and clears it from pending/caught.
    pub fn take_deliverable(&mut self) -> Option<(u32, SigAction, SigInfo)> {
        let sig = self.pending.first_deliverable(&self.mask)?;
        self.pending.remove(sig);
        self.caught.remove(sig);
        let action = self.actions[sig as usize - 1];
        let info = self.infos[sig as usize - 1];
        Some((sig, action, info))
    }
}

/// Syscall restart classification, applied by the dispatcher after a
/// blocking syscall observes `-ERESTARTSYS` internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Deliver `-EINTR` to userland.
    Interrupt,
    /// Rewind the program counter and re-issue the syscall.
    Restart,
}

pub fn classify_restart(action: &SigAction, always_eintr: bool) -> RestartDecision {
    if always_eintr {
        RestartDecision::Interrupt
    } else if action.restart {
        RestartDecision::Restart
    } else {
        RestartDecision::Interrupt
    }
}

// --- ptrace -----------------------------------------------------------

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, Default)]
    pub struct PtraceOptions: u32 {
        const TRACESYSGOOD = 0x01;
        const TRACEFORK    = 0x02;
        const TRACEVFORK   = 0x04;
        const TRACECLONE   = 0x08;
        const TRACEEXEC    = 0x10;
        const TRACEEXIT    = 0x20;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtraceStopReason {
    SyscallEnter,
    SyscallExit,
    SignalStop(u32),
    EventFork,
    EventVfork,
    EventClone,
    EventExec,
    EventExit,
}

impl PtraceStopReason {
    /// Encodes `__W_STOPCODE(sig) | (reason << 16)`.
    pub fn encode_status(self, sig: u32) -> i32 {
        let reason_tag: i32 = match self {
            PtraceStopReason::SyscallEnter => 1,
            PtraceStopReason::SyscallExit => 2,
            PtraceStopReason::SignalStop(_) => 3,
            PtraceStopReason::EventFork => 4,
            PtraceStopReason::EventVfork => 5,
            PtraceStopReason::EventClone => 6,
            PtraceStopReason::EventExec => 7,
            PtraceStopReason::EventExit => 8,
        };
        let w_stopcode = ((sig as i32) << 8) | 0x7f;
        w_stopcode | (reason_tag << 16)
    }

    /// Whether `PTRACE_O_TRACESYSGOOD` should OR `SIGTRAP|0x80` into the
    /// delivered stop signal for this reason.
    pub fn wants_trace_syscall_good(self) -> bool {
        matches!(self, PtraceStopReason::SyscallEnter | PtraceStopReason::SyscallExit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtraceResume {
    Cont,
    Syscall,
    Syscemu,
    Singlestep,
    SyscemuSinglestep,
    Detach,
    Kill,
}

/// Resolves a resumption request into the CPU trap-flag state and
/// whether syscalls should continue to be intercepted, matching
/// `PROPERTY_TRACE_SYSCALLS` in the design.
pub fn resume_effects(req: PtraceResume) -> (bool /* trap_flag */, bool /* trace_syscalls */) {
    match req {
        PtraceResume::Cont => (false, false),
        PtraceResume::Syscall => (false, true),
        PtraceResume::Syscemu => (false, true),
        PtraceResume::Singlestep => (true, false),
        PtraceResume::SyscemuSinglestep => (true, true),
        PtraceResume::Detach => (false, false),
        PtraceResume::Kill => (false, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kill_and_stop_bypass_mask() {
        let mut table = SignalTable::default();
        table.mask.add(9);
        assert!(table.add_signal(9, false, SigInfo::default()));
        assert!(table.pending.contains(9));
    }

    #[test]
    fn ignored_signal_is_discarded() {
        let mut table = SignalTable::default();
        table.actions[4].disposition = SigDisposition::Ignore; // SIGTRAP-ish slot
        assert!(!table.add_signal(5, false, SigInfo::default()));
        assert!(!table.pending.contains(5));
    }

    #[test]
    fn blocked_signal_queues_without_wake() {
        let mut table = SignalTable::default();
        table.mask.add(10);
        let woke = table.add_signal(10, false, SigInfo::default());
        assert!(!woke);
        assert!(table.pending.contains(10));
    }

    #[test]
    fn take_deliverable_skips_masked() {
        let mut table = SignalTable::default();
        table.pending.add(2);
        table.mask.add(2);
        assert!(table.take_deliverable().is_none());
        table.mask.remove(2);
        let (sig, _, _) = table.take_deliverable().unwrap();
        assert_eq!(sig, 2);
    }

    #[test]
    fn ptrace_status_encoding_carries_reason() {
        let status = PtraceStopReason::SyscallEnter.encode_status(5);
        assert_eq!(status & 0xff, 0x7f);
        assert_eq!((status >> 16) & 0xff, 1);
    }
}
