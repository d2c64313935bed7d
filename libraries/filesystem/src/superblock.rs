//! On-disk superblock layout and mount-time validation (§4.H.1, §6.1).

use crate::error::{FsError, FsResult};

pub const EXT2_SUPER_MAGIC: u16 = 0xEF53;
pub const EXT2_VALID_FS: u16 = 1;
pub const EXT2_ERROR_FS: u16 = 2;

/// Required feature bits this implementation understands; anything else
/// set in `required_features` on mount is a hard failure.
pub const FEATURE_INCOMPAT_FILETYPE: u32 = 0x0002;
pub const REQUIRED_FEATURES_SUPPORTED: u32 = FEATURE_INCOMPAT_FILETYPE;

/// RO-compat feature bits understood for read-only mounts; anything
/// else present forces the mount read-only (not separately modeled
/// here — the spec's scope is "unsupported RO-compat" is a hard error
/// just like required features, which this crate treats uniformly).
pub const FEATURE_RO_SPARSE_SUPER: u32 = 0x0001;
pub const FEATURE_RO_LARGE_FILE: u32 = 0x0002;
pub const RO_FEATURES_SUPPORTED: u32 = FEATURE_RO_SPARSE_SUPER | FEATURE_RO_LARGE_FILE;

pub const DEFAULT_FIRST_NONRESERVED_INODE: u32 = 11;
pub const DEFAULT_INODE_SIZE: u16 = 128;

/// Byte offset of the superblock on the device, which depends on the
/// device sector size.
pub fn superblock_byte_offset(sector_size: u32) -> u64 {
    match sector_size {
        512 => 2 * 512,
        1024 => 1 * 1024,
        2048 | 4096 => 0,
        _ => 1024,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Superblock {
    pub total_inodes: u32,
    pub total_blocks: u32,
    pub reserved_blocks: u32,
    pub unalloc_blocks: u32,
    pub unalloc_inodes: u32,
    pub superblock_block: u32,
    pub log2_block_size: u32,
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,
    pub version_major: u32,
    pub signature: u16,
    pub filesystem_state: u16,
    pub required_features: u32,
    pub readonly_features: u32,
    /// Only meaningful when `version_major >= 1`; a v0 filesystem is
    /// treated as if this were [`DEFAULT_FIRST_NONRESERVED_INODE`].
    pub first_nonreserved_inode: u32,
    pub inode_size: u16,
    pub mounts_since_last_check: u16,
    pub last_mount_time: u32,
    pub last_written_time: u32,
}

impl Superblock {
    pub fn block_size(&self) -> u32 {
        1024u32 << self.log2_block_size
    }

    pub fn group_count(&self) -> u32 {
        let by_blocks = (self.total_blocks + self.blocks_per_group - 1) / self.blocks_per_group;
        let by_inodes = (self.total_inodes + self.inodes_per_group - 1) / self.inodes_per_group;
        debug_assert_eq!(by_blocks, by_inodes, "group counts must match");
        by_blocks
    }

    pub fn first_usable_inode(&self) -> u32 {
        if self.version_major >= 1 {
            self.first_nonreserved_inode
        } else {
            DEFAULT_FIRST_NONRESERVED_INODE
        }
    }

    pub fn effective_inode_size(&self) -> u16 {
        if self.version_major >= 1 {
            self.inode_size
        } else {
            DEFAULT_INODE_SIZE
        }
    }

    pub fn supports_filetype(&self) -> bool {
        self.required_features & FEATURE_INCOMPAT_FILETYPE != 0
    }

    /// Validates magic, feature bits, and clean-unmount state; this is
    /// the full set of checks `mount` performs before trusting a
    /// superblock.
    pub fn validate_for_mount(&self) -> FsResult<()> {
        if self.signature != EXT2_SUPER_MAGIC {
            return Err(FsError::BadMagic);
        }
        if self.required_features & !REQUIRED_FEATURES_SUPPORTED != 0 {
            return Err(FsError::UnsupportedFeature);
        }
        if self.readonly_features & !RO_FEATURES_SUPPORTED != 0 {
            return Err(FsError::UnsupportedFeature);
        }
        if self.filesystem_state != EXT2_VALID_FS {
            return Err(FsError::DirtyFilesystem);
        }
        Ok(())
    }

    /// `mount`'s bookkeeping update: bump the mount counters and flip
    /// the on-disk state to "error" until a clean unmount flips it back
    /// — so a crash between mount and unmount is visible on next boot.
    pub fn mark_mounted(&mut self, now: u32) {
        self.last_mount_time = now;
        self.mounts_since_last_check = self.mounts_since_last_check.saturating_add(1);
        self.filesystem_state = EXT2_ERROR_FS;
    }

    pub fn mark_unmounted_cleanly(&mut self, now: u32) {
        self.last_written_time = now;
        self.filesystem_state = EXT2_VALID_FS;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_super() -> Superblock {
        Superblock {
            total_inodes: 32,
            total_blocks: 16,
            reserved_blocks: 0,
            unalloc_blocks: 16,
            unalloc_inodes: 32,
            superblock_block: 0,
            log2_block_size: 2, // 4 KiB
            blocks_per_group: 16,
            inodes_per_group: 32,
            version_major: 1,
            signature: EXT2_SUPER_MAGIC,
            filesystem_state: EXT2_VALID_FS,
            required_features: FEATURE_INCOMPAT_FILETYPE,
            readonly_features: 0,
            first_nonreserved_inode: 11,
            inode_size: 128,
            mounts_since_last_check: 0,
            last_mount_time: 0,
            last_written_time: 0,
        }
    }

    #[test]
    fn rejects_bad_magic() {
        let mut sb = base_super();
        sb.signature = 0;
        assert_eq!(sb.validate_for_mount().unwrap_err(), FsError::BadMagic);
    }

    #[test]
    fn rejects_unsupported_required_feature() {
        let mut sb = base_super();
        sb.required_features |= 0x8000;
        assert_eq!(
            sb.validate_for_mount().unwrap_err(),
            FsError::UnsupportedFeature
        );
    }

    #[test]
    fn rejects_dirty_filesystem() {
        let mut sb = base_super();
        sb.filesystem_state = EXT2_ERROR_FS;
        assert_eq!(
            sb.validate_for_mount().unwrap_err(),
            FsError::DirtyFilesystem
        );
    }

    #[test]
    fn mount_then_clean_unmount_round_trips_state() {
        let mut sb = base_super();
        sb.mark_mounted(100);
        assert_eq!(sb.filesystem_state, EXT2_ERROR_FS);
        sb.mark_unmounted_cleanly(200);
        assert_eq!(sb.filesystem_state, EXT2_VALID_FS);
    }

    #[test]
    fn superblock_offset_depends_on_sector_size() {
        assert_eq!(superblock_byte_offset(512), 1024);
        assert_eq!(superblock_byte_offset(1024), 1024);
        assert_eq!(superblock_byte_offset(2048), 0);
        assert_eq!(superblock_byte_offset(4096), 0);
    }
}
