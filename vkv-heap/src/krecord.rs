//! In-place layout of a key record: a fixed header followed by the key's
//! inline bytes. Reads and writes go through `bytemuck`, so the header is
//! parsed out of a page's byte slice without any `unsafe` pointer casts.

use bytemuck::{Pod, Zeroable};

use crate::handle::Handle;
use crate::page::align8;

/// On-disk-shaped (but here, in-memory) header for a key record. `head_value`
/// is the packed bits of a `Handle`, `Handle::NONE` meaning the key is
/// currently deleted (no live value in its chain).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct KHeader {
    pub flags: u8,
    _pad: [u8; 3],
    pub hash: u32,
    pub key_len: u32,
    pub head_value: u64,
}

/// Size of the header, in bytes. The key bytes follow immediately after.
pub const KHEADER_SIZE: usize = core::mem::size_of::<KHeader>();

impl KHeader {
    pub fn new(hash: u32, key_len: u32, flags: u8) -> Self {
        Self {
            flags,
            _pad: [0; 3],
            hash,
            key_len,
            head_value: Handle::NONE.to_bits(),
        }
    }

    pub fn head_value(&self) -> Handle {
        Handle::from_bits(self.head_value)
    }

    pub fn set_head_value(&mut self, handle: Handle) {
        self.head_value = handle.to_bits();
    }
}

/// Total aligned size, in bytes, of a key record carrying `key_len` bytes of
/// key data.
#[inline]
pub fn record_len(key_len: usize) -> usize {
    align8(KHEADER_SIZE + key_len)
}

/// Read the header out of a record region (`region` must start at the
/// record's first byte and be at least `KHEADER_SIZE` long).
pub fn read_header(region: &[u8]) -> KHeader {
    bytemuck::pod_read_unaligned(&region[..KHEADER_SIZE])
}

/// Overwrite the header in place.
pub fn write_header(region: &mut [u8], header: &KHeader) {
    region[..KHEADER_SIZE].copy_from_slice(bytemuck::bytes_of(header));
}

/// Borrow the key bytes that follow the header.
pub fn key_bytes(region: &[u8], header: &KHeader) -> &[u8] {
    &region[KHEADER_SIZE..KHEADER_SIZE + header.key_len as usize]
}

/// Write a brand new key record (header + key bytes) into `region`, which
/// must be exactly `record_len(key.len())` bytes long.
pub fn init_record(region: &mut [u8], key: &[u8], hash: u32, flags: u8) {
    let header = KHeader::new(hash, key.len() as u32, flags);
    write_header(region, &header);
    region[KHEADER_SIZE..KHEADER_SIZE + key.len()].copy_from_slice(key);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrips() {
        let mut buf = [0u8; 64];
        init_record(&mut buf, b"hello", 0xDEAD_BEEF, crate::flags::k::NEW);
        let header = read_header(&buf);
        assert_eq!(header.hash, 0xDEAD_BEEF);
        assert_eq!(header.key_len, 5);
        assert_eq!(key_bytes(&buf, &header), b"hello");
        assert!(header.head_value().is_none());
    }

    #[test]
    fn record_len_is_aligned() {
        assert_eq!(record_len(0) % 8, 0);
        assert_eq!(record_len(1) % 8, 0);
        assert_eq!(record_len(64) % 8, 0);
    }
}
