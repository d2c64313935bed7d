//! `getdents`: packs live directory entries spanning possibly many
//! directory blocks into a caller-supplied buffer, resuming from a
//! byte cursor across calls the way the real syscall does (§4.H.5).

use alloc::vec::Vec;

use crate::dirent::{parse_block, DirEntry};

/// One packed record as `getdents` hands it back: the entry plus the
/// cursor value the caller should pass back in to resume just past it.
#[derive(Debug, Clone)]
pub struct PackedEntry {
    pub entry: DirEntry,
    pub next_cursor: u64,
}

/// Walks `blocks` (already-read directory block buffers, in file
/// order) starting at `cursor` (a byte offset into the logical
/// directory file), filling records until either `blocks` is exhausted
/// or `max_bytes` worth of `(DirEntry, cursor)` pairs have been
/// produced. Tombstoned (`ino == 0`) records are skipped but still
/// advance the cursor past them.
pub fn read_entries(
    blocks: &[&[u8]],
    block_size: usize,
    cursor: u64,
    max_bytes: usize,
    has_filetype: bool,
) -> Vec<PackedEntry> {
    let mut out = Vec::new();
    let mut produced_bytes = 0usize;
    let mut file_offset = (cursor / block_size as u64) * block_size as u64;
    let start_block = (cursor / block_size as u64) as usize;
    let mut in_block_skip = (cursor % block_size as u64) as usize;

    for block in blocks.iter().skip(start_block) {
        let entries = parse_block(block, has_filetype);
        let mut local_offset = 0usize;
        for entry in entries {
            let rec_len = entry.rec_len as usize;
            if local_offset < in_block_skip {
                local_offset += rec_len;
                continue;
            }
            local_offset += rec_len;
            if entry.ino == 0 {
                continue;
            }
            let approx_record_bytes = 8 + entry.name.len();
            if produced_bytes + approx_record_bytes > max_bytes && !out.is_empty() {
                return out;
            }
            produced_bytes += approx_record_bytes;
            let next_cursor = file_offset + local_offset as u64;
            out.push(PackedEntry { entry, next_cursor });
        }
        file_offset += block_size as u64;
        in_block_skip = 0;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirent::{add, FileType};

    fn block_with(entries: &[(u32, &str)]) -> Vec<u8> {
        let mut block = alloc::vec![0u8; 64];
        block[4..6].copy_from_slice(&64u16.to_le_bytes());
        for (ino, name) in entries {
            add(&mut block, *ino, name, FileType::Regular, true).unwrap();
        }
        block
    }

    #[test]
    fn reads_all_entries_from_single_block() {
        let block = block_with(&[(11, "a"), (12, "b")]);
        let packed = read_entries(&[&block], 64, 0, 4096, true);
        assert_eq!(packed.len(), 2);
        assert_eq!(packed[0].entry.ino, 11);
        assert_eq!(packed[1].entry.ino, 12);
    }

    #[test]
    fn resumes_from_cursor_mid_block() {
        let block = block_with(&[(11, "a"), (12, "b"), (13, "c")]);
        let first = read_entries(&[&block], 64, 0, 4096, true);
        let cursor = first[0].next_cursor;
        let rest = read_entries(&[&block], 64, cursor, 4096, true);
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].entry.ino, 12);
    }

    #[test]
    fn spans_multiple_blocks() {
        let block_a = block_with(&[(11, "a")]);
        let block_b = block_with(&[(12, "b")]);
        let packed = read_entries(&[&block_a, &block_b], 64, 0, 4096, true);
        assert_eq!(packed.len(), 2);
        assert_eq!(packed[1].entry.ino, 12);
    }

    #[test]
    fn stops_early_when_buffer_budget_exhausted() {
        let block = block_with(&[(11, "aaaaaaaaaaaaaaaa"), (12, "bbbbbbbbbbbbbbbb")]);
        let packed = read_entries(&[&block], 64, 0, 10, true);
        assert_eq!(packed.len(), 1);
    }
}
