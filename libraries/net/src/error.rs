//! Net-specific error kinds, re-exporting the shared POSIX taxonomy
//! from `multios-scheduler` for routines that cross the syscall
//! boundary directly.

pub use multios_scheduler::error::{KernelError, KernelResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    Invalid,
    AddrInUse,
    AddrNotAvailable,
    ConnRefused,
    ConnReset,
    ConnAborted,
    NotConnected,
    WouldBlock,
    TimedOut,
    HostUnreachable,
    NetUnreachable,
    ProtoNotSupported,
    FamilyNotSupported,
    NoBuffers,
    BrokenPipe,
    Shutdown,
    NotFound,
    Again,
}

pub type NetResult<T> = Result<T, NetError>;

impl From<NetError> for KernelError {
    fn from(e: NetError) -> Self {
        match e {
            NetError::Invalid => KernelError::Invalid,
            NetError::AddrInUse => KernelError::AddrInUse,
            NetError::AddrNotAvailable => KernelError::AddrNotAvailable,
            NetError::ConnRefused => KernelError::ConnRefused,
            NetError::ConnReset => KernelError::ConnReset,
            NetError::ConnAborted => KernelError::ConnAborted,
            NetError::NotConnected => KernelError::NotConnected,
            NetError::WouldBlock => KernelError::WouldBlock,
            NetError::TimedOut => KernelError::TimedOut,
            NetError::HostUnreachable => KernelError::HostUnreachable,
            NetError::NetUnreachable => KernelError::NetUnreachable,
            NetError::ProtoNotSupported => KernelError::ProtoNotSupported,
            NetError::FamilyNotSupported => KernelError::Invalid,
            NetError::NoBuffers => KernelError::OutOfMemory,
            NetError::BrokenPipe => KernelError::BrokenPipe,
            NetError::Shutdown => KernelError::BrokenPipe,
            NetError::NotFound => KernelError::Invalid,
            NetError::Again => KernelError::Again,
        }
    }
}
