//! Directory entry records packed into directory-block pages (§4.H.4),
//! grounded on the reference allocator's `ext2_addir_internal` layout:
//! each record is a variable-length `(ino, rec_len, name_len, file_type,
//! name)` tuple, rounded up to a 4-byte boundary, with the last record
//! in a block absorbing any trailing slack.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{FsError, FsResult};

pub const DIRENT_HEADER_LEN: usize = 8;
pub const NAME_ALIGN: usize = 4;
pub const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileType {
    Unknown = 0,
    Regular = 1,
    Directory = 2,
    CharDevice = 3,
    BlockDevice = 4,
    Fifo = 5,
    Socket = 6,
    Symlink = 7,
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub ino: u32,
    pub rec_len: u16,
    pub file_type: FileType,
    pub name: String,
}

fn aligned_rec_len(name_len: usize) -> u16 {
    let raw = DIRENT_HEADER_LEN + name_len;
    (((raw + NAME_ALIGN - 1) / NAME_ALIGN) * NAME_ALIGN) as u16
}

/// Serializes one directory block's worth of entries, each packed
/// tightly except the last, which is stretched with `rec_len` to
/// consume the rest of the block — the on-disk convention that lets a
/// deleted entry be reclaimed by widening its predecessor instead of
/// shifting everything after it.
///
/// `has_filetype` mirrors `Superblock::supports_filetype()`: when the
/// feature is absent, byte 7 of each record is the high 8 bits of the
/// name length rather than a file-type code (§3.5/§4.H.4).
pub fn write_block(entries: &[DirEntry], block_size: usize, has_filetype: bool) -> FsResult<Vec<u8>> {
    let mut buf = alloc::vec![0u8; block_size];
    let mut offset = 0usize;
    for (i, entry) in entries.iter().enumerate() {
        if entry.name.len() > MAX_NAME_LEN {
            return Err(FsError::NameTooLong);
        }
        let tight_len = aligned_rec_len(entry.name.len()) as usize;
        let is_last = i == entries.len() - 1;
        let rec_len = if is_last {
            block_size - offset
        } else {
            tight_len
        };
        if offset + rec_len > block_size {
            return Err(FsError::NoSpace);
        }
        write_entry(&mut buf, offset, rec_len, entry.ino, &entry.name, entry.file_type, has_filetype);
        offset += rec_len;
    }
    Ok(buf)
}

/// Parses every record in a directory block, including zero-inode
/// "tombstone" slots left behind by `delete` — callers that want only
/// live entries should filter on `ino != 0`.
pub fn parse_block(block: &[u8], has_filetype: bool) -> Vec<DirEntry> {
    let mut entries = Vec::new();
    let mut offset = 0usize;
    while offset + DIRENT_HEADER_LEN <= block.len() {
        let ino = u32::from_le_bytes(block[offset..offset + 4].try_into().unwrap());
        let rec_len = u16::from_le_bytes(block[offset + 4..offset + 6].try_into().unwrap());
        if rec_len < DIRENT_HEADER_LEN as u16 {
            break;
        }
        let name_len_lsb = block[offset + 6] as usize;
        let byte7 = block[offset + 7];
        let (name_len, file_type) = if has_filetype {
            let file_type = match byte7 {
                1 => FileType::Regular,
                2 => FileType::Directory,
                3 => FileType::CharDevice,
                4 => FileType::BlockDevice,
                5 => FileType::Fifo,
                6 => FileType::Socket,
                7 => FileType::Symlink,
                _ => FileType::Unknown,
            };
            (name_len_lsb, file_type)
        } else {
            (name_len_lsb | ((byte7 as usize) << 8), FileType::Unknown)
        };
        let name_end = offset + DIRENT_HEADER_LEN + name_len;
        if name_end > block.len() {
            break;
        }
        let name = String::from_utf8_lossy(&block[offset + DIRENT_HEADER_LEN..name_end]).into_owned();
        entries.push(DirEntry {
            ino,
            rec_len,
            file_type,
            name,
        });
        offset += rec_len as usize;
    }
    entries
}

/// Finds a live entry by name, mirroring `ext2_finddir`'s linear scan.
pub fn find(block: &[u8], name: &str, has_filetype: bool) -> Option<DirEntry> {
    parse_block(block, has_filetype)
        .into_iter()
        .find(|e| e.ino != 0 && e.name == name)
}

/// Adds an entry in-place: either a free (`ino == 0`) slot with enough
/// room, or the slack at the end of an oversized last record is split
/// off into a new record. Returns `Err(FsError::NoSpace)` if neither
/// fits, signalling the caller should allocate a new directory block.
pub fn add(
    block: &mut [u8],
    new_ino: u32,
    name: &str,
    file_type: FileType,
    has_filetype: bool,
) -> FsResult<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(FsError::NameTooLong);
    }
    let needed = aligned_rec_len(name.len()) as usize;
    let mut offset = 0usize;
    while offset + DIRENT_HEADER_LEN <= block.len() {
        let ino = u32::from_le_bytes(block[offset..offset + 4].try_into().unwrap());
        let rec_len = u16::from_le_bytes(block[offset + 4..offset + 6].try_into().unwrap()) as usize;
        if rec_len < DIRENT_HEADER_LEN {
            break;
        }
        let used_len = if ino == 0 {
            0
        } else {
            aligned_rec_len(existing_name_len(block, offset, has_filetype)) as usize
        };
        let slack = rec_len - used_len;
        if slack >= needed {
            if used_len > 0 {
                // shrink the existing record to its tight length, freeing
                // the tail for the new entry to occupy.
                let name_len = existing_name_len(block, offset, has_filetype);
                let existing_name = String::from_utf8_lossy(
                    &block[offset + DIRENT_HEADER_LEN..offset + DIRENT_HEADER_LEN + name_len],
                )
                .into_owned();
                let existing_ino = ino_field(block, offset);
                let existing_byte7 = block[offset + 7];
                write_entry_raw(block, offset, used_len, existing_ino, &existing_name, existing_byte7);
            }
            let tail_offset = offset + used_len;
            let tail_len = rec_len - used_len;
            // leave the remainder as a free placeholder unless it's too
            // small to host any record of its own, in which case the new
            // entry just absorbs the whole tail.
            if tail_len >= needed + DIRENT_HEADER_LEN {
                write_entry(block, tail_offset, needed, new_ino, name, file_type, has_filetype);
                block[tail_offset + needed..tail_offset + needed + 4]
                    .copy_from_slice(&0u32.to_le_bytes());
                block[tail_offset + needed + 4..tail_offset + needed + 6]
                    .copy_from_slice(&((tail_len - needed) as u16).to_le_bytes());
            } else {
                write_entry(block, tail_offset, tail_len, new_ino, name, file_type, has_filetype);
            }
            return Ok(());
        }
        offset += rec_len;
    }
    Err(FsError::NoSpace)
}

fn ino_field(block: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(block[offset..offset + 4].try_into().unwrap())
}

/// Name length of the record at `offset`, decoded per `has_filetype`:
/// a single byte when the file-type feature owns byte 7, or a 16-bit
/// value split across bytes 6 (lsb) and 7 (msb) when it doesn't.
fn existing_name_len(block: &[u8], offset: usize, has_filetype: bool) -> usize {
    let lsb = block[offset + 6] as usize;
    if has_filetype {
        lsb
    } else {
        lsb | ((block[offset + 7] as usize) << 8)
    }
}

fn write_entry(
    block: &mut [u8],
    offset: usize,
    rec_len: usize,
    ino: u32,
    name: &str,
    file_type: FileType,
    has_filetype: bool,
) {
    let byte7 = if has_filetype {
        file_type as u8
    } else {
        ((name.len() >> 8) & 0xff) as u8
    };
    write_entry_raw(block, offset, rec_len, ino, name, byte7);
}

fn write_entry_raw(block: &mut [u8], offset: usize, rec_len: usize, ino: u32, name: &str, byte7: u8) {
    block[offset..offset + 4].copy_from_slice(&ino.to_le_bytes());
    block[offset + 4..offset + 6].copy_from_slice(&(rec_len as u16).to_le_bytes());
    block[offset + 6] = name.len() as u8;
    block[offset + 7] = byte7;
    block[offset + 8..offset + 8 + name.len()].copy_from_slice(name.as_bytes());
}

/// Deletes an entry by zeroing its inode field (a tombstone, not a
/// compaction) — `add` reclaims the slot on a later insert.
pub fn delete(block: &mut [u8], name: &str, has_filetype: bool) -> FsResult<()> {
    let mut offset = 0usize;
    while offset + DIRENT_HEADER_LEN <= block.len() {
        let ino = u32::from_le_bytes(block[offset..offset + 4].try_into().unwrap());
        let rec_len = u16::from_le_bytes(block[offset + 4..offset + 6].try_into().unwrap()) as usize;
        if rec_len < DIRENT_HEADER_LEN {
            break;
        }
        let name_len = existing_name_len(block, offset, has_filetype);
        if ino != 0 {
            let entry_name = &block[offset + DIRENT_HEADER_LEN..offset + DIRENT_HEADER_LEN + name_len];
            if entry_name == name.as_bytes() {
                block[offset..offset + 4].copy_from_slice(&0u32.to_le_bytes());
                return Ok(());
            }
        }
        offset += rec_len;
    }
    Err(FsError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_find_round_trips() {
        let mut block = alloc::vec![0u8; 64];
        let rec_len = block.len();
        block[4..6].copy_from_slice(&(rec_len as u16).to_le_bytes());
        add(&mut block, 11, "hello.txt", FileType::Regular, true).unwrap();
        let found = find(&block, "hello.txt", true).unwrap();
        assert_eq!(found.ino, 11);
        assert_eq!(found.file_type, FileType::Regular);
    }

    #[test]
    fn delete_tombstones_entry_without_compaction() {
        let mut block = alloc::vec![0u8; 64];
        block[4..6].copy_from_slice(&64u16.to_le_bytes());
        add(&mut block, 11, "a", FileType::Regular, true).unwrap();
        delete(&mut block, "a", true).unwrap();
        assert!(find(&block, "a", true).is_none());
    }

    #[test]
    fn add_reuses_freed_slot_after_delete() {
        let mut block = alloc::vec![0u8; 64];
        block[4..6].copy_from_slice(&64u16.to_le_bytes());
        add(&mut block, 11, "first", FileType::Regular, true).unwrap();
        add(&mut block, 12, "second", FileType::Regular, true).unwrap();
        delete(&mut block, "first", true).unwrap();
        add(&mut block, 13, "third", FileType::Regular, true).unwrap();
        assert_eq!(find(&block, "third", true).unwrap().ino, 13);
        assert_eq!(find(&block, "second", true).unwrap().ino, 12);
    }

    #[test]
    fn add_rejects_name_too_long() {
        let mut block = alloc::vec![0u8; 64];
        let too_long = "x".repeat(256);
        assert_eq!(
            add(&mut block, 1, &too_long, FileType::Regular, true).unwrap_err(),
            FsError::NameTooLong
        );
    }

    #[test]
    fn add_fails_when_block_is_full() {
        let mut block = alloc::vec![0u8; 16];
        block[4..6].copy_from_slice(&16u16.to_le_bytes());
        add(&mut block, 1, "abcdefg", FileType::Regular, true).unwrap();
        let err = add(&mut block, 2, "x", FileType::Regular, true).unwrap_err();
        assert_eq!(err, FsError::NoSpace);
    }

    #[test]
    fn add_and_find_without_filetype_feature_uses_name_len_msb() {
        let mut block = alloc::vec![0u8; 64];
        block[4..6].copy_from_slice(&64u16.to_le_bytes());
        add(&mut block, 11, "hello.txt", FileType::Regular, false).unwrap();
        let found = find(&block, "hello.txt", false).unwrap();
        assert_eq!(found.ino, 11);
        // byte 7 holds the name-length MSB, not a file-type code, so the
        // decoded type is unknown even though `file_type` was passed in.
        assert_eq!(found.file_type, FileType::Unknown);
        assert!(find(&block, "hello.txt", true).is_some());
    }
}
