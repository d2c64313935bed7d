//! Packet buffer: an owned byte buffer with two cursors (`data_begin`,
//! `data_end`) so a header can be pushed on without copying the
//! payload, and cloning is a cheap refcount bump (design note: "small-
//! buffer-optimized owned buffer").

use alloc::sync::Arc;
use alloc::vec::Vec;

/// The owned storage a [`Packet`] points into. Shared via `Arc`;
/// `Packet::make_unique` clones the underlying bytes only when a
/// mutation actually needs an exclusive copy.
#[derive(Debug, Clone)]
struct PacketStorage(Vec<u8>);

#[derive(Debug, Clone)]
pub struct Packet {
    storage: Arc<PacketStorage>,
    data_begin: usize,
    data_end: usize,
}

impl Packet {
    /// Builds a packet whose headroom is `headroom` bytes, so that
    /// later `add_header` calls up to that amount never need to
    /// reallocate.
    pub fn with_headroom(payload: &[u8], headroom: usize) -> Self {
        let mut buf = alloc::vec![0u8; headroom + payload.len()];
        buf[headroom..].copy_from_slice(payload);
        Packet {
            storage: Arc::new(PacketStorage(buf)),
            data_begin: headroom,
            data_end: headroom + payload.len(),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Packet {
            storage: Arc::new(PacketStorage(bytes)),
            data_begin: 0,
            data_end: len,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.storage.0[self.data_begin..self.data_end]
    }

    pub fn len(&self) -> usize {
        self.data_end - self.data_begin
    }

    pub fn is_empty(&self) -> bool {
        self.data_begin == self.data_end
    }

    /// Moves `data_begin` backward by `delta` bytes to make room for a
    /// header the caller then fills in through [`Packet::data_mut`].
    /// Forces uniqueness first since this mutates shared storage.
    pub fn add_header(&mut self, delta: usize) {
        self.make_unique();
        let storage = Arc::get_mut(&mut self.storage).expect("just made unique");
        if delta > self.data_begin {
            let shortfall = delta - self.data_begin;
            let mut grown = alloc::vec![0u8; storage.0.len() + shortfall];
            grown[shortfall..].copy_from_slice(&storage.0);
            storage.0 = grown;
            self.data_begin += shortfall;
            self.data_end += shortfall;
        }
        self.data_begin -= delta;
    }

    /// Trims `delta` bytes off the front without touching storage —
    /// the inverse of `add_header`, used when stripping a parsed
    /// header before handing the remainder to the next layer up.
    pub fn strip_header(&mut self, delta: usize) {
        self.data_begin = (self.data_begin + delta).min(self.data_end);
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.make_unique();
        let storage = Arc::get_mut(&mut self.storage).expect("just made unique");
        &mut storage.0[self.data_begin..self.data_end]
    }

    fn make_unique(&mut self) {
        if Arc::get_mut(&mut self.storage).is_none() {
            let copy = PacketStorage(self.storage.0.clone());
            self.storage = Arc::new(copy);
        }
    }

    /// Clone is a refcount bump only as long as the clone is never
    /// mutated; `data_mut`/`add_header` copy-on-write at that point.
    pub fn cheap_clone(&self) -> Self {
        Packet {
            storage: self.storage.clone(),
            data_begin: self.data_begin,
            data_end: self.data_end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_header_grows_into_headroom_without_moving_payload() {
        let mut p = Packet::with_headroom(&[1, 2, 3], 16);
        p.add_header(4);
        assert_eq!(p.len(), 7);
        assert_eq!(&p.data()[4..], &[1, 2, 3]);
    }

    #[test]
    fn add_header_beyond_headroom_reallocates() {
        let mut p = Packet::with_headroom(&[1, 2, 3], 2);
        p.add_header(10);
        assert_eq!(p.len(), 13);
        assert_eq!(&p.data()[10..], &[1, 2, 3]);
    }

    #[test]
    fn cheap_clone_shares_storage_until_mutated() {
        let p = Packet::from_bytes(alloc::vec![9, 9, 9]);
        let mut q = p.cheap_clone();
        q.data_mut()[0] = 1;
        assert_eq!(p.data()[0], 9);
        assert_eq!(q.data()[0], 1);
    }

    #[test]
    fn strip_header_advances_without_copy() {
        let mut p = Packet::from_bytes(alloc::vec![0xAA, 1, 2, 3]);
        p.strip_header(1);
        assert_eq!(p.data(), &[1, 2, 3]);
    }
}
