use vkv_heap::{Handle, Heap, Kind, KEY_BUCKETS, VALUE_BUCKETS};

use crate::error::Result;

/// The two bucketed page heaps that back every key and value record.
pub struct Heaps {
    pub keys: Heap<4>,
    pub values: Heap<5>,
}

impl Heaps {
    pub fn new() -> Self {
        Self {
            keys: Heap::new(Kind::Key, KEY_BUCKETS),
            values: Heap::new(Kind::Value, VALUE_BUCKETS),
        }
    }

    /// Allocate and initialize a brand new key record, returning its handle.
    pub fn alloc_key(&mut self, key: &[u8], hash: u32, flags: u8) -> Result<Handle> {
        let len = vkv_heap::krecord::record_len(key.len());
        let handle = self.keys.append(len)?;
        let region = self.keys.get_mut(handle);
        vkv_heap::krecord::init_record(region, key, hash, flags);
        Ok(handle)
    }

    /// Allocate and initialize a brand new value record, returning its
    /// handle. `prev`/`parent` are left `Handle::NONE`; the caller links the
    /// chain (see [`crate::chain::prepend`]).
    pub fn alloc_value(&mut self, sequence: u64, payload: &[u8], flags: u8) -> Result<Handle> {
        let len = vkv_heap::vrecord::record_len(payload.len());
        let handle = self.values.append(len)?;
        let region = self.values.get_mut(handle);
        vkv_heap::vrecord::init_record(region, sequence, payload, flags);
        Ok(handle)
    }

    /// Release every page backing both heaps. Future access to any handle
    /// held from before this call is undefined; callers must ensure nothing
    /// else reaches into the engine concurrently.
    pub fn dispose(&mut self) {
        self.keys.dispose();
        self.values.dispose();
    }
}

impl Default for Heaps {
    fn default() -> Self {
        Self::new()
    }
}
