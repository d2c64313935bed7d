//! Filesystem-specific error kinds, re-exporting the shared POSIX
//! taxonomy from `multios-scheduler` for routines that cross the
//! syscall boundary directly.

pub use multios_scheduler::error::{KernelError, KernelResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    BadMagic,
    UnsupportedFeature,
    DirtyFilesystem,
    NoSpace,
    NoInodes,
    Io,
    NotADirectory,
    NotFound,
    NameTooLong,
    TooManyLinks,
    DirectoryNotEmpty,
    Corrupt,
}

pub type FsResult<T> = Result<T, FsError>;

impl From<FsError> for KernelError {
    fn from(e: FsError) -> Self {
        match e {
            FsError::BadMagic | FsError::Corrupt => KernelError::Io,
            FsError::UnsupportedFeature => KernelError::Invalid,
            FsError::DirtyFilesystem => KernelError::Io,
            FsError::NoSpace | FsError::NoInodes => KernelError::NoSpace,
            FsError::Io => KernelError::Io,
            FsError::NotADirectory => KernelError::Invalid,
            FsError::NotFound => KernelError::Invalid,
            FsError::NameTooLong => KernelError::NameTooLong,
            FsError::TooManyLinks => KernelError::TooManyLinks,
            FsError::DirectoryNotEmpty => KernelError::Invalid,
        }
    }
}
