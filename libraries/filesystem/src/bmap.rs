//! Logical-block-to-physical-block mapping (§4.H.3): walks the direct,
//! single-, double- and triple-indirect pointer tree, allocating nodes
//! lazily on `create` and shrinking the tree (freeing indirect blocks
//! that become fully empty) on `free`.
//!
//! Indirect-block pointer arrays are read and written through
//! [`IndirectBlockIo`] rather than a concrete page-cache type — the
//! page cache and the block allocator are both external collaborators
//! (§1), and this crate's own [`crate::bitmap::Ext2Allocator`] is one
//! concrete way to back `alloc_block`/`free_block`.

use alloc::vec::Vec;

use crate::error::FsResult;
use crate::inode::{
    IncoreInode, BLOCK_POINTERS, DIRECT_BLOCKS, DOUBLE_INDIRECT, SINGLE_INDIRECT, TRIPLE_INDIRECT,
};
use crate::symlink::INLINE_SYMLINK_MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BmapMode {
    MapOnly,
    Create,
    Free,
}

/// Seam between `bmap`'s pure tree-walking logic and the block
/// allocator / page cache that actually own storage. An indirect
/// block's content is always exactly `ppb` pointers; a data block's
/// content (leaf level) is opaque to `bmap` and only zeroed, never read
/// back, here.
pub trait IndirectBlockIo {
    fn read_pointers(&mut self, block_no: u32, ppb: usize) -> FsResult<Vec<u32>>;
    fn write_pointers(&mut self, block_no: u32, pointers: &[u32]) -> FsResult<()>;
    fn alloc_block(&mut self) -> FsResult<u32>;
    fn zero_data_block(&mut self, block_no: u32) -> FsResult<()>;
    fn free_block(&mut self, block_no: u32) -> FsResult<()>;
    fn now(&self) -> u32;
}

pub fn pointers_per_block(block_size: u32) -> usize {
    (block_size / 4) as usize
}

struct Geometry {
    ppb: usize,
    single_end: u64,
    double_end: u64,
    triple_end: u64,
}

impl Geometry {
    fn new(block_size: u32) -> Self {
        let ppb = pointers_per_block(block_size);
        let ppb2 = ppb as u64 * ppb as u64;
        let ppb3 = ppb2 * ppb as u64;
        let direct = DIRECT_BLOCKS as u64;
        Geometry {
            ppb,
            single_end: direct + ppb as u64,
            double_end: direct + ppb as u64 + ppb2,
            triple_end: direct + ppb as u64 + ppb2 + ppb3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    Direct,
    Single,
    Double,
    Triple,
    OutOfRange,
}

fn classify(lblock: u64, geo: &Geometry) -> Band {
    if lblock < DIRECT_BLOCKS as u64 {
        Band::Direct
    } else if lblock < geo.single_end {
        Band::Single
    } else if lblock < geo.double_end {
        Band::Double
    } else if lblock < geo.triple_end {
        Band::Triple
    } else {
        Band::OutOfRange
    }
}

/// Recursively walks one path of indices through nested indirect
/// blocks, `path[0]` being the outermost level. Returns the resolved
/// leaf value (a data block, or 0), the possibly-new physical block
/// number for the holder at this level (0 if it was just freed because
/// every pointer inside it became zero), and the count of newly
/// allocated blocks (pointer or data) for `disk_sectors` bookkeeping.
fn walk(
    io: &mut dyn IndirectBlockIo,
    holder_in: u32,
    ppb: usize,
    path: &[usize],
    mode: BmapMode,
) -> FsResult<(u32, u32, u32)> {
    let mut holder = holder_in;
    let mut allocated = 0u32;

    if holder == 0 {
        if mode != BmapMode::Create {
            return Ok((0, 0, 0));
        }
        holder = io.alloc_block()?;
        io.write_pointers(holder, &alloc::vec![0u32; ppb])?;
        allocated += 1;
    }

    let index = path[0];
    let mut pointers = io.read_pointers(holder, ppb)?;
    let mut entry = pointers[index];

    if path.len() == 1 {
        match mode {
            BmapMode::MapOnly => {}
            BmapMode::Create => {
                if entry == 0 {
                    let nb = io.alloc_block()?;
                    io.zero_data_block(nb)?;
                    entry = nb;
                    pointers[index] = entry;
                    io.write_pointers(holder, &pointers)?;
                    allocated += 1;
                }
            }
            BmapMode::Free => {
                if entry != 0 {
                    io.free_block(entry)?;
                    pointers[index] = 0;
                    io.write_pointers(holder, &pointers)?;
                }
                entry = 0;
            }
        }
    } else {
        let (child_result, new_child_holder, child_allocated) =
            walk(io, entry, ppb, &path[1..], mode)?;
        allocated += child_allocated;
        if new_child_holder != entry {
            pointers[index] = new_child_holder;
            io.write_pointers(holder, &pointers)?;
        }
        entry = if mode == BmapMode::Free { 0 } else { child_result };
    }

    if mode == BmapMode::Free {
        let pointers_now = io.read_pointers(holder, ppb)?;
        if pointers_now.iter().all(|&p| p == 0) {
            io.free_block(holder)?;
            holder = 0;
        }
    }

    Ok((entry, holder, allocated))
}

/// Translates `lblock` to a physical block per the mode requested.
///
/// The symlink fast path (§4.H.3) takes precedence over the indirect
/// tree entirely: a symlink whose target is still inline (`size <
/// INLINE_SYMLINK_MAX`) has no physical blocks at all, and `free`
/// degrades to zeroing all 15 pointers.
pub fn bmap(
    node: &mut IncoreInode,
    lblock: u64,
    mode: BmapMode,
    io: &mut dyn IndirectBlockIo,
    block_size: u32,
) -> FsResult<u32> {
    if node.is_symlink() && node.size < INLINE_SYMLINK_MAX as u64 {
        if mode == BmapMode::Free {
            node.zero_blocks();
        }
        return Ok(0);
    }

    let geo = Geometry::new(block_size);
    let ppb = geo.ppb;

    let (result, allocated) = match classify(lblock, &geo) {
        Band::Direct => {
            let idx = lblock as usize;
            let mut b = node.blocks[idx];
            let mut allocated = 0u32;
            match mode {
                BmapMode::MapOnly => {}
                BmapMode::Create => {
                    if b == 0 {
                        let nb = io.alloc_block()?;
                        io.zero_data_block(nb)?;
                        b = nb;
                        node.blocks[idx] = b;
                        allocated += 1;
                    }
                }
                BmapMode::Free => {
                    if b != 0 {
                        io.free_block(b)?;
                        node.blocks[idx] = 0;
                    }
                    b = 0;
                }
            }
            (b, allocated)
        }
        Band::Single => {
            let idx = (lblock - DIRECT_BLOCKS as u64) as usize;
            let (entry, new_holder, allocated) =
                walk(io, node.blocks[SINGLE_INDIRECT], ppb, &[idx], mode)?;
            node.blocks[SINGLE_INDIRECT] = new_holder;
            (entry, allocated)
        }
        Band::Double => {
            let rel = lblock - geo.single_end;
            let outer = (rel / ppb as u64) as usize;
            let inner = (rel % ppb as u64) as usize;
            let (entry, new_holder, allocated) =
                walk(io, node.blocks[DOUBLE_INDIRECT], ppb, &[outer, inner], mode)?;
            node.blocks[DOUBLE_INDIRECT] = new_holder;
            (entry, allocated)
        }
        Band::Triple => {
            let rel = lblock - geo.double_end;
            let ppb2 = ppb as u64 * ppb as u64;
            let l1 = (rel / ppb2) as usize;
            let rem = rel % ppb2;
            let l2 = (rem / ppb as u64) as usize;
            let l3 = (rem % ppb as u64) as usize;
            let (entry, new_holder, allocated) =
                walk(io, node.blocks[TRIPLE_INDIRECT], ppb, &[l1, l2, l3], mode)?;
            node.blocks[TRIPLE_INDIRECT] = new_holder;
            (entry, allocated)
        }
        Band::OutOfRange => (0, 0),
    };

    if allocated > 0 {
        node.disk_sectors = node
            .disk_sectors
            .saturating_add(allocated * (block_size / 512));
        node.ctime = io.now();
        node.dirty = true;
    }
    Ok(result)
}

/// `12 + PPB + PPB^2 + PPB^3 - 1`: the highest `lblock` `bmap` will
/// resolve for the given block size; anything beyond is out of range.
pub fn max_lblock(block_size: u32) -> u64 {
    Geometry::new(block_size).triple_end - 1
}

const _: () = assert!(BLOCK_POINTERS == 15);
