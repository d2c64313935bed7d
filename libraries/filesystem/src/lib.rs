//! Ext2-style filesystem core: superblock, block-group descriptor
//! table, bitmaps, `bmap`, directory records, symlinks and `getdents`
//! (component H).
//!
//! The block-device strategy routine, the page cache, and the VFS
//! mount/open surface are external collaborators (§1); this crate only
//! specifies the trait boundary in [`vfs`] and operates purely on
//! in-memory buffers otherwise, so it can be driven and tested without
//! a real device.

#![no_std]

extern crate alloc;

pub mod bgdt;
pub mod bitmap;
pub mod bmap;
pub mod dirent;
pub mod error;
pub mod getdents;
pub mod inode;
pub mod mount;
pub mod superblock;
pub mod symlink;
pub mod vfs;

pub use error::{FsError, FsResult};
