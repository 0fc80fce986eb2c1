//! Owner tags stored in the tail slack of a block.
//!
//! Every tracked request asks the base allocator for [`TAG_SIZE`] bytes more
//! than the caller wants. The tag lives in the last four bytes of the block's
//! *usable* capacity, which is always past the caller's region, so the pointer
//! handed out is never shifted and keeps the base allocator's alignment.

use crate::owner::OwnerId;
use std::ptr;

pub const TAG_SIZE: usize = size_of::<u32>();

/// Writes `owner` into the last [`TAG_SIZE`] bytes of `[block, block + capacity)`.
///
/// # Safety
///
/// `block` must be valid for writes of `capacity` bytes and `capacity` must be
/// at least [`TAG_SIZE`].
#[inline]
pub unsafe fn encode(block: *mut u8, capacity: usize, owner: OwnerId) {
    debug_assert!(capacity >= TAG_SIZE);
    unsafe {
        let slot = block.add(capacity - TAG_SIZE) as *mut u32;
        ptr::write_unaligned(slot, owner.get());
    }
}

/// Reads back the owner written by [`encode`] for the same `capacity`.
///
/// # Safety
///
/// `block` must be valid for reads of `capacity` bytes and `capacity` must be
/// at least [`TAG_SIZE`].
#[inline]
pub unsafe fn decode(block: *const u8, capacity: usize) -> OwnerId {
    debug_assert!(capacity >= TAG_SIZE);
    unsafe {
        let slot = block.add(capacity - TAG_SIZE) as *const u32;
        OwnerId::new(ptr::read_unaligned(slot))
    }
}
