//! Resource limits, `nice`, and `sched_setscheduler` validation (component G).

use crate::error::{KernelError, KernelResult};
use crate::task::SchedPolicy;

pub const RLIMIT_CPU: usize = 0;
pub const RLIMIT_FSIZE: usize = 1;
pub const RLIMIT_DATA: usize = 2;
pub const RLIMIT_STACK: usize = 3;
pub const RLIMIT_CORE: usize = 4;
pub const RLIMIT_NOFILE: usize = 5;
pub const RLIMIT_AS: usize = 6;
pub const RLIMIT_NPROC: usize = 7;
pub const RLIMIT_RTPRIO: usize = 8;
pub const RLIMIT_NICE: usize = 9;
pub const NLIMITS: usize = 10;

/// Matches the historical `FOPEN_MAX` ceiling referenced by the design.
pub const FOPEN_MAX: u64 = 1024;

/// `RR`-band width used to bound `RLIMIT_RTPRIO`.
pub const RR_PRIORITY_BAND: u32 = 99;

pub const RLIM_INFINITY: u64 = u64::MAX;

#[derive(Debug, Clone, Copy)]
pub struct RLimit {
    pub soft: u64,
    pub hard: u64,
}

impl RLimit {
    pub const fn unlimited() -> Self {
        RLimit {
            soft: RLIM_INFINITY,
            hard: RLIM_INFINITY,
        }
    }

    pub fn default_table() -> [RLimit; NLIMITS] {
        let mut table = [RLimit::unlimited(); NLIMITS];
        table[RLIMIT_NOFILE] = RLimit {
            soft: 1024,
            hard: FOPEN_MAX,
        };
        table[RLIMIT_NICE] = RLimit { soft: 20, hard: 40 };
        table[RLIMIT_RTPRIO] = RLimit {
            soft: 0,
            hard: RR_PRIORITY_BAND as u64,
        };
        table
    }
}

/// `prlimit`: unprivileged callers may only raise the soft limit (bounded
/// by the current hard limit) or lower the hard limit; privileged callers
/// (`is_privileged`) may set either arbitrarily subject to `RLIMIT_NOFILE`
/// and `RLIMIT_NICE` bounds, which always apply.
pub fn prlimit(
    current: &mut RLimit,
    new_soft: Option<u64>,
    new_hard: Option<u64>,
    limit_kind: usize,
    is_privileged: bool,
) -> KernelResult<()> {
    let mut soft = new_soft.unwrap_or(current.soft);
    let mut hard = new_hard.unwrap_or(current.hard);

    if !is_privileged {
        if let Some(s) = new_soft {
            if s > current.hard {
                return Err(KernelError::NotPermitted);
            }
        }
        if let Some(h) = new_hard {
            if h > current.hard {
                return Err(KernelError::NotPermitted);
            }
        }
    }

    if limit_kind == RLIMIT_NOFILE && hard > FOPEN_MAX {
        hard = FOPEN_MAX;
        soft = soft.min(hard);
    }

    if limit_kind == RLIMIT_NICE {
        hard = hard.clamp(1, 40);
        soft = soft.clamp(1, hard);
    }

    if soft > hard {
        return Err(KernelError::Invalid);
    }

    current.soft = soft;
    current.hard = hard;
    Ok(())
}

/// Kernel-internal nice is inverted from the userland value:
/// `nice_user = 20 - nice_kernel`.
pub fn nice_user_to_kernel(nice_user: i32) -> i32 {
    20 - nice_user
}

pub fn nice_kernel_to_user(nice_kernel: i32) -> i32 {
    20 - nice_kernel
}

/// Validates a requested `(policy, priority)` pair against the caller's
/// `RLIMIT_RTPRIO` before `sched_setscheduler` commits it.
pub fn validate_sched_params(
    policy: SchedPolicy,
    priority: u32,
    rtprio_limit: &RLimit,
) -> KernelResult<()> {
    match policy {
        SchedPolicy::Fifo | SchedPolicy::RoundRobin => {
            if priority == 0 || priority as u64 > rtprio_limit.hard {
                return Err(KernelError::Invalid);
            }
            Ok(())
        }
        SchedPolicy::Other => {
            if priority != 0 {
                return Err(KernelError::Invalid);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unprivileged_cannot_raise_hard() {
        let mut lim = RLimit { soft: 10, hard: 10 };
        let err = prlimit(&mut lim, None, Some(20), RLIMIT_FSIZE, false).unwrap_err();
        assert_eq!(err, KernelError::NotPermitted);
    }

    #[test]
    fn privileged_may_raise_hard() {
        let mut lim = RLimit { soft: 10, hard: 10 };
        prlimit(&mut lim, None, Some(20), RLIMIT_FSIZE, true).unwrap();
        assert_eq!(lim.hard, 20);
    }

    #[test]
    fn nofile_is_capped() {
        let mut lim = RLimit {
            soft: 10,
            hard: 10,
        };
        prlimit(&mut lim, None, Some(RLIM_INFINITY), RLIMIT_NOFILE, true).unwrap();
        assert_eq!(lim.hard, FOPEN_MAX);
    }

    #[test]
    fn rtprio_rejects_zero_priority() {
        let limit = RLimit { soft: 50, hard: 50 };
        assert!(validate_sched_params(SchedPolicy::Fifo, 0, &limit).is_err());
        assert!(validate_sched_params(SchedPolicy::Fifo, 10, &limit).is_ok());
    }
}
