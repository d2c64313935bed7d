//! In-core inode representation and its on-disk round trip (§3.5, §6.1).

pub const S_IFLNK: u16 = 0xA000;
pub const S_IFMT: u16 = 0xF000;
pub const S_IFDIR: u16 = 0x4000;
pub const S_IFREG: u16 = 0x8000;

pub const DIRECT_BLOCKS: usize = 12;
/// Indices into `blocks`: direct 0..12, then single/double/triple.
pub const SINGLE_INDIRECT: usize = 12;
pub const DOUBLE_INDIRECT: usize = 13;
pub const TRIPLE_INDIRECT: usize = 14;
pub const BLOCK_POINTERS: usize = 15;

/// 128-byte (v0) or superblock-declared on-disk inode, laid out as
/// `§6.1` describes it.
#[derive(Debug, Clone, Copy)]
pub struct DiskInode {
    pub permissions: u16,
    pub user_id: u16,
    pub size_lsb: u32,
    pub last_access_time: u32,
    pub create_time: u32,
    pub last_mod_time: u32,
    pub group_id: u16,
    pub hard_links: u16,
    pub disk_sectors: u32,
    pub flags: u32,
    pub block_p: [u32; DIRECT_BLOCKS],
    pub single_indirect_pointer: u32,
    pub double_indirect_pointer: u32,
    pub triple_indirect_pointer: u32,
    pub size_msb: u32,
}

/// The in-core inode the rest of the filesystem core operates on.
#[derive(Debug, Clone, Copy)]
pub struct IncoreInode {
    pub dev: u32,
    pub ino: u32,
    pub mode: u16,
    pub uid: u16,
    pub gid: u16,
    pub size: u64,
    pub links: u16,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
    pub blocks: [u32; BLOCK_POINTERS],
    pub disk_sectors: u32,
    pub dirty: bool,
}

impl IncoreInode {
    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn zero_blocks(&mut self) {
        self.blocks = [0; BLOCK_POINTERS];
    }
}

/// `inode_to_incore`: unpacks the on-disk layout, splitting the 15
/// block pointers out of the three named fields plus the direct array.
pub fn inode_to_incore(dev: u32, ino: u32, disk: &DiskInode) -> IncoreInode {
    let mut blocks = [0u32; BLOCK_POINTERS];
    blocks[..DIRECT_BLOCKS].copy_from_slice(&disk.block_p);
    blocks[SINGLE_INDIRECT] = disk.single_indirect_pointer;
    blocks[DOUBLE_INDIRECT] = disk.double_indirect_pointer;
    blocks[TRIPLE_INDIRECT] = disk.triple_indirect_pointer;

    IncoreInode {
        dev,
        ino,
        mode: disk.permissions,
        uid: disk.user_id,
        gid: disk.group_id,
        size: ((disk.size_msb as u64) << 32) | disk.size_lsb as u64,
        links: disk.hard_links,
        atime: disk.last_access_time,
        mtime: disk.last_mod_time,
        ctime: disk.create_time,
        blocks,
        disk_sectors: disk.disk_sectors,
        dirty: false,
    }
}

/// `incore_to_inode`: the inverse packing. `incore_to_inode(inode_to_incore(x)) == x`
/// modulo the `dirty`/`dev` fields the on-disk layout has no room for.
pub fn incore_to_inode(node: &IncoreInode) -> DiskInode {
    let mut block_p = [0u32; DIRECT_BLOCKS];
    block_p.copy_from_slice(&node.blocks[..DIRECT_BLOCKS]);

    DiskInode {
        permissions: node.mode,
        user_id: node.uid,
        size_lsb: (node.size & 0xFFFF_FFFF) as u32,
        last_access_time: node.atime,
        create_time: node.ctime,
        last_mod_time: node.mtime,
        group_id: node.gid,
        hard_links: node.links,
        disk_sectors: node.disk_sectors,
        flags: 0,
        block_p,
        single_indirect_pointer: node.blocks[SINGLE_INDIRECT],
        double_indirect_pointer: node.blocks[DOUBLE_INDIRECT],
        triple_indirect_pointer: node.blocks[TRIPLE_INDIRECT],
        size_msb: (node.size >> 32) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_disk() -> DiskInode {
        let mut block_p = [0u32; DIRECT_BLOCKS];
        for (i, b) in block_p.iter_mut().enumerate() {
            *b = i as u32 + 100;
        }
        DiskInode {
            permissions: S_IFREG | 0o644,
            user_id: 1000,
            size_lsb: 4096,
            last_access_time: 1,
            create_time: 2,
            last_mod_time: 3,
            group_id: 1000,
            hard_links: 1,
            disk_sectors: 8,
            flags: 0,
            block_p,
            single_indirect_pointer: 200,
            double_indirect_pointer: 201,
            triple_indirect_pointer: 202,
            size_msb: 0,
        }
    }

    #[test]
    fn round_trip_preserves_fields() {
        let disk = sample_disk();
        let incore = inode_to_incore(1, 11, &disk);
        let back = incore_to_inode(&incore);
        assert_eq!(back.permissions, disk.permissions);
        assert_eq!(back.size_lsb, disk.size_lsb);
        assert_eq!(back.block_p, disk.block_p);
        assert_eq!(back.single_indirect_pointer, disk.single_indirect_pointer);
        assert_eq!(back.double_indirect_pointer, disk.double_indirect_pointer);
        assert_eq!(back.triple_indirect_pointer, disk.triple_indirect_pointer);
    }

    #[test]
    fn large_file_size_spans_both_halves() {
        let mut disk = sample_disk();
        disk.size_lsb = 0xFFFF_FFFF;
        disk.size_msb = 1;
        let incore = inode_to_incore(1, 11, &disk);
        assert_eq!(incore.size, 0x1_FFFF_FFFF);
    }
}
