//! Size-classed buckets, each holding a growing list of pages. A `Heap`
//! groups a fixed number of buckets (four for keys, five for values) and
//! dispatches an allocation request to the smallest bucket whose
//! `max_record` can hold it.

use alloc::vec::Vec;

use crate::error::HeapError;
use crate::handle::{Handle, Kind};
use crate::page::Page;

#[derive(Debug, Clone, Copy)]
pub struct BucketConfig {
    /// Largest record (header + inline body) this bucket accepts.
    pub max_record: usize,
    pub page_size: usize,
}

/// Key heap buckets, sized for payloads up to 64, 256, 1024, and ~10000
/// bytes. The smallest bucket's page size is 32 KiB rather than the
/// illustrative 16 KiB default: a key record header is 20 bytes, so a 64-byte
/// key rounds up to an 88-byte record, and 16 KiB / 88 < 256 — short of the
/// "smallest bucket yields >= 256 entries per page" invariant. 32 KiB clears
/// it with room to spare.
pub const KEY_BUCKETS: [BucketConfig; 4] = [
    BucketConfig { max_record: 64, page_size: 32 * 1024 },
    BucketConfig { max_record: 256, page_size: 128 * 1024 },
    BucketConfig { max_record: 1_024, page_size: 512 * 1024 },
    BucketConfig { max_record: 10_000, page_size: 1024 * 1024 },
];

/// Value heap buckets, sized for small ints (~48 B), small documents
/// (~160 B), medium arrays (~512 B), small JSON (~4 KiB), and blobs up to
/// ~100 KiB. The smallest bucket's page is bumped to 32 KiB for the same
/// entries-per-page reason as `KEY_BUCKETS`.
pub const VALUE_BUCKETS: [BucketConfig; 5] = [
    BucketConfig { max_record: 48, page_size: 32 * 1024 },
    BucketConfig { max_record: 160, page_size: 64 * 1024 },
    BucketConfig { max_record: 512, page_size: 128 * 1024 },
    BucketConfig { max_record: 4 * 1024, page_size: 256 * 1024 },
    BucketConfig { max_record: 100_000, page_size: 1024 * 1024 },
];

pub struct Bucket {
    pub config: BucketConfig,
    pages: Vec<Page>,
}

impl Bucket {
    pub fn new(config: BucketConfig) -> Self {
        Self { config, pages: Vec::new() }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, idx: u32) -> &Page {
        &self.pages[idx as usize]
    }

    pub fn page_mut(&mut self, idx: u32) -> &mut Page {
        &mut self.pages[idx as usize]
    }

    /// Allocate `len` bytes, appending a new page if the current one is full.
    pub fn append(&mut self, len: usize) -> Result<(u32, u32), HeapError> {
        if len > self.config.max_record {
            return Err(HeapError::RecordTooLarge { len, max: self.config.max_record });
        }
        if let Some(page) = self.pages.last_mut() {
            if let Some(offset) = page.alloc(len) {
                return Ok(((self.pages.len() - 1) as u32, offset));
            }
        }
        let mut page = Page::new(self.config.page_size);
        let offset = page.alloc(len).ok_or(HeapError::OutOfMemory)?;
        self.pages.push(page);
        Ok(((self.pages.len() - 1) as u32, offset))
    }

    /// Replace the page at `idx` with `new_page`, returning the old one so
    /// the caller can drop it once it is sure no stale reader remains.
    pub fn swap(&mut self, idx: u32, new_page: Page) -> Page {
        core::mem::replace(&mut self.pages[idx as usize], new_page)
    }

    /// Release every page backing this bucket. Future access to any handle
    /// that pointed into it is undefined.
    pub fn dispose(&mut self) {
        self.pages.clear();
    }
}

/// A heap of `N` size-classed buckets, used for either the key records or
/// the value records. `Handle`s it hands out always carry `kind`.
pub struct Heap<const N: usize> {
    kind: Kind,
    buckets: [Bucket; N],
}

impl<const N: usize> Heap<N> {
    pub fn new(kind: Kind, configs: [BucketConfig; N]) -> Self {
        Self {
            kind,
            buckets: configs.map(Bucket::new),
        }
    }

    pub fn bucket_count(&self) -> usize {
        N
    }

    pub fn bucket(&self, idx: u8) -> &Bucket {
        &self.buckets[idx as usize]
    }

    pub fn bucket_mut(&mut self, idx: u8) -> &mut Bucket {
        &mut self.buckets[idx as usize]
    }

    /// Append a `len`-byte record, picking the smallest bucket that fits it.
    pub fn append(&mut self, len: usize) -> Result<Handle, HeapError> {
        for (i, bucket) in self.buckets.iter().enumerate() {
            if len <= bucket.config.max_record {
                let (page, offset) = self.buckets[i].append(len)?;
                return Ok(Handle::new(self.kind, i as u8, page, offset));
            }
        }
        Err(HeapError::RecordTooLarge {
            len,
            max: self.buckets[N - 1].config.max_record,
        })
    }

    pub fn get(&self, handle: Handle) -> &[u8] {
        debug_assert_eq!(handle.kind(), self.kind);
        &self.buckets[handle.bucket() as usize].page(handle.page()).bytes()[handle.offset() as usize..]
    }

    pub fn get_mut(&mut self, handle: Handle) -> &mut [u8] {
        debug_assert_eq!(handle.kind(), self.kind);
        &mut self.buckets[handle.bucket() as usize]
            .page_mut(handle.page())
            .bytes_mut()[handle.offset() as usize..]
    }

    /// Release every page in every bucket of this heap. Future access to
    /// any handle previously returned by `append` is undefined.
    pub fn dispose(&mut self) {
        for bucket in self.buckets.iter_mut() {
            bucket.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smallest_bucket_meets_entry_floor() {
        for cfg in KEY_BUCKETS.iter().take(1).chain(VALUE_BUCKETS.iter().take(1)) {
            let header_overhead = 32; // worst case of the two header sizes
            let record = cfg.max_record + header_overhead;
            assert!(cfg.page_size / record >= 256);
        }
    }

    #[test]
    fn append_picks_smallest_fitting_bucket() {
        let mut heap: Heap<4> = Heap::new(Kind::Key, KEY_BUCKETS);
        let h = heap.append(10).unwrap();
        assert_eq!(h.bucket(), 0);
        let h = heap.append(100).unwrap();
        assert_eq!(h.bucket(), 1);
    }

    #[test]
    fn new_page_allocated_when_current_is_full() {
        let mut heap: Heap<4> = Heap::new(Kind::Key, KEY_BUCKETS);
        let per_page = KEY_BUCKETS[0].page_size / 16;
        for _ in 0..per_page + 1 {
            heap.append(8).unwrap();
        }
        assert!(heap.bucket(0).page_count() >= 2);
    }

    #[test]
    fn dispose_releases_every_page() {
        let mut heap: Heap<4> = Heap::new(Kind::Key, KEY_BUCKETS);
        heap.append(10).unwrap();
        heap.append(300).unwrap();
        assert!(heap.bucket(0).page_count() > 0);
        assert!(heap.bucket(1).page_count() > 0);
        heap.dispose();
        assert_eq!(heap.bucket(0).page_count(), 0);
        assert_eq!(heap.bucket(1).page_count(), 0);
    }

    #[test]
    fn oversized_record_is_rejected() {
        let mut heap: Heap<4> = Heap::new(Kind::Key, KEY_BUCKETS);
        let err = heap.append(20_000).unwrap_err();
        assert!(matches!(err, HeapError::RecordTooLarge { .. }));
    }
}
