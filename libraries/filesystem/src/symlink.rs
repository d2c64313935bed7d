//! Symbolic link target storage: inline in the inode's block array for
//! short targets, spilled to a data block once the target outgrows the
//! space the 15 block pointers can hold inline (§4.H.6).

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{FsError, FsResult};
use crate::inode::{IncoreInode, BLOCK_POINTERS};

/// `blocks` is `[u32; 15]` = 60 bytes; targets at or under this length
/// are packed directly into the pointer array instead of costing a
/// whole data block.
pub const INLINE_SYMLINK_MAX: usize = BLOCK_POINTERS * 4;

pub enum SymlinkStorage {
    Inline,
    Block(u32),
}

/// Decides (without touching storage) whether `target` fits inline.
pub fn storage_for(target: &str) -> SymlinkStorage {
    if target.len() <= INLINE_SYMLINK_MAX {
        SymlinkStorage::Inline
    } else {
        // caller is responsible for allocating the block; this only
        // signals that inline storage is not usable.
        SymlinkStorage::Block(0)
    }
}

/// Packs a short target directly into the inode's block pointers,
/// reinterpreting the 15 `u32`s as 60 little-endian bytes.
pub fn write_inline(inode: &mut IncoreInode, target: &str) -> FsResult<()> {
    if target.len() > INLINE_SYMLINK_MAX {
        return Err(FsError::NameTooLong);
    }
    inode.zero_blocks();
    let bytes = target.as_bytes();
    let mut word_buf = [0u8; 4];
    for (i, chunk) in bytes.chunks(4).enumerate() {
        word_buf = [0u8; 4];
        word_buf[..chunk.len()].copy_from_slice(chunk);
        inode.blocks[i] = u32::from_le_bytes(word_buf);
    }
    inode.size = target.len() as u64;
    Ok(())
}

/// Reads an inline-stored target back out, trimming at the recorded
/// size rather than scanning for a NUL (the inode carries the exact
/// length, unlike a C string).
pub fn read_inline(inode: &IncoreInode) -> FsResult<String> {
    let len = inode.size as usize;
    if len > INLINE_SYMLINK_MAX {
        return Err(FsError::Corrupt);
    }
    let mut bytes = Vec::with_capacity(len);
    for word in inode.blocks.iter() {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes.truncate(len);
    String::from_utf8(bytes).map_err(|_| FsError::Corrupt)
}

/// Packs a target into a single data block, for targets too long to
/// inline. The block's first pointer slot records the allocated block.
pub fn write_block_target(inode: &mut IncoreInode, block_no: u32, block_buf: &mut [u8], target: &str) -> FsResult<()> {
    if target.len() > block_buf.len() {
        return Err(FsError::NameTooLong);
    }
    inode.zero_blocks();
    inode.blocks[0] = block_no;
    block_buf[..target.len()].copy_from_slice(target.as_bytes());
    inode.size = target.len() as u64;
    Ok(())
}

pub fn read_block_target(inode: &IncoreInode, block_buf: &[u8]) -> FsResult<String> {
    let len = inode.size as usize;
    if len > block_buf.len() {
        return Err(FsError::Corrupt);
    }
    String::from_utf8(block_buf[..len].to_vec()).map_err(|_| FsError::Corrupt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inode::S_IFLNK;

    fn fresh_link_inode() -> IncoreInode {
        IncoreInode {
            dev: 1,
            ino: 20,
            mode: S_IFLNK | 0o777,
            uid: 0,
            gid: 0,
            size: 0,
            links: 1,
            atime: 0,
            mtime: 0,
            ctime: 0,
            blocks: [0; BLOCK_POINTERS],
            disk_sectors: 0,
            dirty: false,
        }
    }

    #[test]
    fn short_target_round_trips_inline() {
        let mut inode = fresh_link_inode();
        write_inline(&mut inode, "/usr/bin/env").unwrap();
        assert_eq!(read_inline(&inode).unwrap(), "/usr/bin/env");
    }

    #[test]
    fn target_at_exact_inline_boundary_fits() {
        let mut inode = fresh_link_inode();
        let target = "a".repeat(INLINE_SYMLINK_MAX);
        write_inline(&mut inode, &target).unwrap();
        assert_eq!(read_inline(&inode).unwrap(), target);
    }

    #[test]
    fn oversized_target_is_rejected_for_inline_storage() {
        let mut inode = fresh_link_inode();
        let target = "a".repeat(INLINE_SYMLINK_MAX + 1);
        assert_eq!(write_inline(&mut inode, &target).unwrap_err(), FsError::NameTooLong);
        assert!(matches!(storage_for(&target), SymlinkStorage::Block(_)));
    }

    #[test]
    fn block_backed_target_round_trips() {
        let mut inode = fresh_link_inode();
        let mut block_buf = alloc::vec![0u8; 1024];
        let target = "a".repeat(INLINE_SYMLINK_MAX + 1);
        write_block_target(&mut inode, 500, &mut block_buf, &target).unwrap();
        assert_eq!(inode.blocks[0], 500);
        assert_eq!(read_block_target(&inode, &block_buf).unwrap(), target);
    }
}
