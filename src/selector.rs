//! Key selector resolution for `get_key`/`get_range`: resolve the
//! ordinal position `first_ge(ref_key)` or `first_gt(ref_key)`, then advance
//! by `offset` positions (negative is backward). Resolution walks the key
//! index's ordinal positions directly; it does not additionally filter by
//! whether a key's chain is live at the transaction's read sequence — offset
//! semantics describe index seeking only (see DESIGN.md).

use std::ops::Bound;

use vkv_bytes::Slice;

use crate::index::KeyIndex;

#[derive(Debug, Clone)]
pub struct KeySelector {
    pub reference: Slice,
    pub or_equal: bool,
    pub offset: i32,
}

impl KeySelector {
    pub fn first_greater_or_equal(reference: Slice) -> Self {
        Self { reference, or_equal: true, offset: 0 }
    }

    pub fn first_greater_than(reference: Slice) -> Self {
        Self { reference, or_equal: false, offset: 0 }
    }

    pub fn with_offset(mut self, offset: i32) -> Self {
        self.offset = offset;
        self
    }

    /// Resolve to a concrete key, or `None` if the walk runs off either end
    /// of the index.
    pub fn resolve(&self, index: &KeyIndex) -> Option<Slice> {
        let bound: Bound<&[u8]> = if self.or_equal {
            Bound::Included(self.reference.as_bytes())
        } else {
            Bound::Excluded(self.reference.as_bytes())
        };

        if self.offset >= 0 {
            let mut iter = index.nth_from(bound, false);
            iter.nth(self.offset as usize).map(|(k, _)| k.clone())
        } else {
            // Walk strictly-before the anchor position backward, then take
            // the (|offset| - 1)'th element, so offset == -1 lands exactly
            // one position before the anchor.
            let anchor_excluded: Bound<&[u8]> = match bound {
                Bound::Included(k) => Bound::Excluded(k),
                Bound::Excluded(k) => Bound::Included(k),
                Bound::Unbounded => Bound::Unbounded,
            };
            let mut iter = index.nth_from(anchor_excluded, true);
            let steps = (-self.offset) as usize - 1;
            iter.nth(steps).map(|(k, _)| k.clone())
        }
    }
}
