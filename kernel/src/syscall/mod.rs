//! Syscall surface (component N): number table plus dispatch loop.

pub mod dispatch;
pub mod numbers;

pub use dispatch::{dispatch, Args};
