//! Userland copy primitives (§1 external collaborator): the only
//! legal way syscall handlers cross the user/kernel boundary. A real
//! page-table-aware implementation lives outside this crate; handlers
//! here only ever go through this trait, never a raw pointer deref.

use crate::error::KernelError;

pub trait UserMemory {
    fn copy_from_user(&self, user_ptr: usize, buf: &mut [u8]) -> Result<(), KernelError>;
    fn copy_to_user(&self, user_ptr: usize, buf: &[u8]) -> Result<(), KernelError>;
}

/// Fixed-size structure marshaling built on [`UserMemory`].
pub fn read_struct<T: Copy, U: UserMemory + ?Sized>(mem: &U, user_ptr: usize) -> Result<T, KernelError> {
    let mut storage = core::mem::MaybeUninit::<T>::uninit();
    let size = core::mem::size_of::<T>();
    let buf = unsafe { core::slice::from_raw_parts_mut(storage.as_mut_ptr() as *mut u8, size) };
    mem.copy_from_user(user_ptr, buf)?;
    Ok(unsafe { storage.assume_init() })
}

pub fn write_struct<T: Copy, U: UserMemory + ?Sized>(
    mem: &U,
    user_ptr: usize,
    value: &T,
) -> Result<(), KernelError> {
    let size = core::mem::size_of::<T>();
    let buf = unsafe { core::slice::from_raw_parts(value as *const T as *const u8, size) };
    mem.copy_to_user(user_ptr, buf)
}
