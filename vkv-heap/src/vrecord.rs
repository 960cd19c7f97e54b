//! In-place layout of a value record: a fixed header, followed by the
//! payload bytes (absent for `Deletion` records).

use bytemuck::{Pod, Zeroable};

use crate::handle::Handle;
use crate::page::align8;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct VHeader {
    pub flags: u8,
    _pad: [u8; 3],
    pub size: u32,
    pub sequence: u64,
    pub prev: u64,
    pub parent: u64,
}

pub const VHEADER_SIZE: usize = core::mem::size_of::<VHeader>();

impl VHeader {
    pub fn new(sequence: u64, size: u32, flags: u8) -> Self {
        Self {
            flags,
            _pad: [0; 3],
            size,
            sequence,
            prev: Handle::NONE.to_bits(),
            parent: Handle::NONE.to_bits(),
        }
    }

    pub fn prev(&self) -> Handle {
        Handle::from_bits(self.prev)
    }

    pub fn set_prev(&mut self, handle: Handle) {
        self.prev = handle.to_bits();
    }

    pub fn parent(&self) -> Handle {
        Handle::from_bits(self.parent)
    }

    pub fn set_parent(&mut self, handle: Handle) {
        self.parent = handle.to_bits();
    }
}

#[inline]
pub fn record_len(payload_len: usize) -> usize {
    align8(VHEADER_SIZE + payload_len)
}

pub fn read_header(region: &[u8]) -> VHeader {
    bytemuck::pod_read_unaligned(&region[..VHEADER_SIZE])
}

pub fn write_header(region: &mut [u8], header: &VHeader) {
    region[..VHEADER_SIZE].copy_from_slice(bytemuck::bytes_of(header));
}

pub fn payload(region: &[u8], header: &VHeader) -> &[u8] {
    &region[VHEADER_SIZE..VHEADER_SIZE + header.size as usize]
}

/// Write a brand new value record (header + payload) into `region`, which
/// must be exactly `record_len(payload.len())` bytes long.
pub fn init_record(region: &mut [u8], sequence: u64, payload: &[u8], flags: u8) {
    let header = VHeader::new(sequence, payload.len() as u32, flags);
    write_header(region, &header);
    region[VHEADER_SIZE..VHEADER_SIZE + payload.len()].copy_from_slice(payload);
}
