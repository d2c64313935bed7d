//! External collaborator interfaces: the block-device strategy layer,
//! the page cache, and the VFS facade's mount/open surface. Only the
//! interfaces are specified here — the actual block device, page
//! eviction policy, and mount-table bookkeeping are out of scope and
//! are injected by whatever embeds this crate.

use alloc::vec::Vec;

use crate::error::FsResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDirection {
    Read,
    Write,
}

pub struct BlockRequest<'a> {
    pub device: u32,
    pub starting_block: u64,
    pub block_size_bytes: u32,
    pub byte_count: u32,
    pub buffer: &'a mut [u8],
    pub direction: IoDirection,
}

/// Block-device strategy routine: submit a request and wait for (or be
/// told the async status of) its completion.
pub trait BlockDevice {
    fn submit(&self, request: BlockRequest<'_>) -> FsResult<()>;
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, Default)]
    pub struct PageFlags: u32 {
        const DIRTY = 0x1;
        const STALE = 0x2;
    }
}

/// A page cache handle: an owned virtual buffer plus the dirty/stale
/// bits and refcount the design calls for. The buffer is a plain `Vec`
/// here rather than a real page-aligned frame, since the allocator
/// backing it is an external collaborator too.
pub struct PageHandle {
    pub owner: u32,
    pub block_no: u64,
    pub data: Vec<u8>,
    pub flags: PageFlags,
    pub refcount: u32,
}

impl PageHandle {
    /// Atomic or-and-fetch of the dirty bit, so concurrent observers
    /// never see a state that is stale-but-not-yet-marked-dirty
    /// (ordering guarantee (2) in the concurrency model).
    pub fn mark_dirty(&mut self) {
        self.flags.insert(PageFlags::DIRTY);
    }

    pub fn mark_stale(&mut self) {
        self.flags.insert(PageFlags::STALE);
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(PageFlags::DIRTY)
    }
}

pub trait PageCache {
    fn get_cached_page(&self, owner: u32, block_no: u64, flags: PageFlags) -> FsResult<PageHandle>;
    fn release(&self, handle: PageHandle);
}

#[derive(Debug, Clone)]
pub struct MountEntry {
    pub device: u32,
    pub mount_point: alloc::string::String,
    pub fs_type: alloc::string::String,
    pub readonly: bool,
    pub noexec: bool,
}

/// VFS facade: the mount table and the open/lock surface the ext2 core
/// is mounted underneath. Only the parts the ext2 core needs to consult
/// (mount flags gating write/exec) are modeled; the rest of the VFS
/// (path resolution, dentry cache) lives outside this crate's scope.
pub trait VfsFacade {
    fn mount_for(&self, device: u32) -> Option<MountEntry>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_handle_dirty_bit_is_sticky_until_cleared() {
        let mut h = PageHandle {
            owner: 1,
            block_no: 2,
            data: alloc::vec![0u8; 4],
            flags: PageFlags::empty(),
            refcount: 1,
        };
        assert!(!h.is_dirty());
        h.mark_dirty();
        assert!(h.is_dirty());
    }
}
