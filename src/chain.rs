//! Version chains: per-key singly-linked lists of value records,
//! ordered by strictly decreasing commit sequence.

use vkv_heap::{flags::v, vrecord, Handle, Heap};

/// Outcome of walking a chain for a given read sequence.
pub enum ReadResult<'a> {
    Present(&'a [u8], u64),
    Deleted,
    Absent,
}

/// Walk the chain rooted at `head` until a version with `sequence <= seq`
/// is found.
pub fn read_at(values: &Heap<5>, mut head: Handle, seq: u64) -> ReadResult<'_> {
    loop {
        if head.is_none() {
            return ReadResult::Absent;
        }
        let region = values.get(head);
        let header = vrecord::read_header(region);
        if header.sequence <= seq {
            if header.flags & v::DELETION != 0 {
                return ReadResult::Deleted;
            }
            return ReadResult::Present(vrecord::payload(region, &header), header.sequence);
        }
        head = header.prev();
    }
}

/// Prepend `new_value` to the chain owned by `key_handle`:
/// `new_v.prev := head_value; new_v.parent := key`, the previously-head V's
/// `parent` is retargeted to `new_v`, and the head-pointer store happens
/// last.
pub fn prepend(keys: &mut Heap<4>, values: &mut Heap<5>, key_handle: Handle, new_value: Handle) {
    let old_head = {
        let key_region = keys.get(key_handle);
        vkv_heap::krecord::read_header(key_region).head_value()
    };

    {
        let v_region = values.get_mut(new_value);
        let mut header = vrecord::read_header(v_region);
        header.set_prev(old_head);
        header.set_parent(key_handle);
        vrecord::write_header(v_region, &header);
    }

    if !old_head.is_none() {
        let old_region = values.get_mut(old_head);
        let mut old_header = vrecord::read_header(old_region);
        old_header.set_parent(new_value);
        vrecord::write_header(old_region, &old_header);
    }

    let key_region = keys.get_mut(key_handle);
    let mut key_header = vkv_heap::krecord::read_header(key_region);
    key_header.set_head_value(new_value);
    vkv_heap::krecord::write_header(key_region, &key_header);
}
