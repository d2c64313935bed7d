//! Mount orchestration: reads the superblock and BGDT off a block
//! device through the external collaborator traits, validates them,
//! and produces the resident [`Mount`] the rest of the core operates
//! against (§4.H.1).

use alloc::vec::Vec;

use crate::bgdt::{Bgdt, GroupDesc};
use crate::error::{FsError, FsResult};
use crate::superblock::{superblock_byte_offset, Superblock};
use crate::vfs::{BlockDevice, BlockRequest, IoDirection};

pub const SUPERBLOCK_SIZE: usize = 1024;
pub const GROUP_DESC_SIZE: usize = 32;

/// Resident per-mount state: the superblock, the BGDT, and the device
/// sector geometry needed to translate block numbers into device I/O.
pub struct Mount {
    pub device: u32,
    pub sector_size: u32,
    pub super_block: Superblock,
    pub bgdt: Bgdt,
}

fn parse_superblock(buf: &[u8]) -> FsResult<Superblock> {
    if buf.len() < SUPERBLOCK_SIZE {
        return Err(FsError::Io);
    }
    let u16_at = |off: usize| u16::from_le_bytes(buf[off..off + 2].try_into().unwrap());
    let u32_at = |off: usize| u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());

    let version_major = u32_at(76);
    let (first_nonreserved_inode, inode_size) = if version_major >= 1 {
        (u32_at(84), u16_at(88))
    } else {
        (11, 128)
    };

    Ok(Superblock {
        total_inodes: u32_at(0),
        total_blocks: u32_at(4),
        reserved_blocks: u32_at(8),
        unalloc_blocks: u32_at(12),
        unalloc_inodes: u32_at(16),
        superblock_block: u32_at(20),
        log2_block_size: u32_at(24),
        blocks_per_group: u32_at(32),
        inodes_per_group: u32_at(40),
        version_major,
        signature: u16_at(56),
        filesystem_state: u16_at(58),
        required_features: u32_at(96),
        readonly_features: u32_at(100),
        first_nonreserved_inode,
        inode_size,
        mounts_since_last_check: u16_at(54),
        last_mount_time: u32_at(44),
        last_written_time: u32_at(48),
    })
}

fn parse_group_desc(buf: &[u8]) -> GroupDesc {
    let u16_at = |off: usize| u16::from_le_bytes(buf[off..off + 2].try_into().unwrap());
    let u32_at = |off: usize| u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
    GroupDesc {
        block_bitmap_addr: u32_at(0),
        inode_bitmap_addr: u32_at(4),
        inode_table_addr: u32_at(8),
        unalloc_blocks: u16_at(12),
        unalloc_inodes: u16_at(14),
        dir_count: u16_at(16),
    }
}

/// Patches the on-disk fields `Superblock::mark_mounted` touches,
/// leaving every other byte of the 1024-byte image (including fields
/// this crate doesn't model) untouched.
fn write_mounted_fields(buf: &mut [u8], sb: &Superblock) {
    buf[44..48].copy_from_slice(&sb.last_mount_time.to_le_bytes());
    buf[54..56].copy_from_slice(&sb.mounts_since_last_check.to_le_bytes());
    buf[58..60].copy_from_slice(&sb.filesystem_state.to_le_bytes());
}

/// Reads the superblock and BGDT through `device` and validates both
/// before handing back a usable [`Mount`]. Per §4.H.1, a successful
/// mount also stamps `last_mount_time`, bumps `mounts_since_last_check`,
/// and flips `filesystem_state` to dirty on-disk — `now` is supplied by
/// the caller since this crate has no clock of its own.
pub fn mount(device: &dyn BlockDevice, device_id: u32, sector_size: u32, now: u32) -> FsResult<Mount> {
    let offset = superblock_byte_offset(sector_size);
    let sb_start_block = offset / sector_size as u64;
    let mut sb_buf = [0u8; SUPERBLOCK_SIZE];
    device
        .submit(BlockRequest {
            device: device_id,
            starting_block: sb_start_block,
            block_size_bytes: sector_size,
            byte_count: SUPERBLOCK_SIZE as u32,
            buffer: &mut sb_buf,
            direction: IoDirection::Read,
        })
        .map_err(|_| FsError::Io)?;

    let mut super_block = parse_superblock(&sb_buf)?;
    super_block.validate_for_mount()?;
    super_block.mark_mounted(now);
    write_mounted_fields(&mut sb_buf, &super_block);
    device
        .submit(BlockRequest {
            device: device_id,
            starting_block: sb_start_block,
            block_size_bytes: sector_size,
            byte_count: SUPERBLOCK_SIZE as u32,
            buffer: &mut sb_buf,
            direction: IoDirection::Write,
        })
        .map_err(|_| FsError::Io)?;

    let group_count = super_block.group_count();
    let block_size = super_block.block_size();
    let bgdt_start_block = super_block.superblock_block + 1;
    let bgdt_bytes = group_count as usize * GROUP_DESC_SIZE;
    let mut bgdt_buf = alloc::vec![0u8; bgdt_bytes];
    device
        .submit(BlockRequest {
            device: device_id,
            starting_block: (bgdt_start_block as u64 * block_size as u64) / sector_size as u64,
            block_size_bytes: sector_size,
            byte_count: bgdt_bytes as u32,
            buffer: &mut bgdt_buf,
            direction: IoDirection::Read,
        })
        .map_err(|_| FsError::Io)?;

    let mut groups = Vec::with_capacity(group_count as usize);
    for i in 0..group_count as usize {
        groups.push(parse_group_desc(&bgdt_buf[i * GROUP_DESC_SIZE..(i + 1) * GROUP_DESC_SIZE]));
    }

    Ok(Mount {
        device: device_id,
        sector_size,
        super_block,
        bgdt: Bgdt::new(groups),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::superblock::EXT2_SUPER_MAGIC;
    use core::cell::RefCell;

    struct FakeDevice {
        data: RefCell<Vec<u8>>,
    }

    impl BlockDevice for FakeDevice {
        fn submit(&self, request: BlockRequest<'_>) -> FsResult<()> {
            let start = (request.starting_block * request.block_size_bytes as u64) as usize;
            match request.direction {
                IoDirection::Read => {
                    let data = self.data.borrow();
                    request.buffer.copy_from_slice(&data[start..start + request.buffer.len()]);
                }
                IoDirection::Write => {
                    let mut data = self.data.borrow_mut();
                    data[start..start + request.buffer.len()].copy_from_slice(request.buffer);
                }
            }
            Ok(())
        }
    }

    fn build_fake_image() -> Vec<u8> {
        let mut buf = alloc::vec![0u8; 4096];
        let sb_off = 1024;
        buf[sb_off..sb_off + 4].copy_from_slice(&32u32.to_le_bytes()); // total_inodes
        buf[sb_off + 4..sb_off + 8].copy_from_slice(&16u32.to_le_bytes()); // total_blocks
        buf[sb_off + 24..sb_off + 28].copy_from_slice(&2u32.to_le_bytes()); // log2_block_size (4K)
        buf[sb_off + 32..sb_off + 36].copy_from_slice(&16u32.to_le_bytes()); // blocks_per_group
        buf[sb_off + 40..sb_off + 44].copy_from_slice(&32u32.to_le_bytes()); // inodes_per_group
        buf[sb_off + 56..sb_off + 58].copy_from_slice(&EXT2_SUPER_MAGIC.to_le_bytes());
        buf[sb_off + 58..sb_off + 60].copy_from_slice(&1u16.to_le_bytes()); // valid state
        buf[sb_off + 76..sb_off + 80].copy_from_slice(&0u32.to_le_bytes()); // version_major v0
        buf
    }

    #[test]
    fn mount_reads_superblock_and_bgdt() {
        let image = build_fake_image();
        let device = FakeDevice {
            data: RefCell::new(image),
        };
        let mount = mount(&device, 0, 1024, 500).unwrap();
        assert_eq!(mount.super_block.total_inodes, 32);
        assert_eq!(mount.super_block.total_blocks, 16);
        assert_eq!(mount.bgdt.groups.len(), 1);
    }

    #[test]
    fn mount_rejects_bad_magic() {
        let mut image = build_fake_image();
        image[1024 + 56..1024 + 58].copy_from_slice(&0u16.to_le_bytes());
        let device = FakeDevice {
            data: RefCell::new(image),
        };
        assert_eq!(mount(&device, 0, 1024, 500).unwrap_err(), FsError::BadMagic);
    }

    #[test]
    fn mount_stamps_dirty_state_back_to_device() {
        let image = build_fake_image();
        let device = FakeDevice {
            data: RefCell::new(image),
        };
        let mount = mount(&device, 0, 1024, 500).unwrap();
        assert_eq!(mount.super_block.last_mount_time, 500);
        assert_eq!(mount.super_block.mounts_since_last_check, 1);
        assert_eq!(mount.super_block.filesystem_state, crate::superblock::EXT2_ERROR_FS);

        let data = device.data.borrow();
        let sb_off = 1024;
        let written_state =
            u16::from_le_bytes(data[sb_off + 58..sb_off + 60].try_into().unwrap());
        let written_mount_time =
            u32::from_le_bytes(data[sb_off + 44..sb_off + 48].try_into().unwrap());
        assert_eq!(written_state, crate::superblock::EXT2_ERROR_FS);
        assert_eq!(written_mount_time, 500);
    }
}
