//! Tracking wrapper around a [`BaseAllocator`]: every block is tagged with its
//! owner and recorded in a [`Ledger`].

use crate::base::{BaseAllocator, Mimalloc};
use crate::ledger::{LEDGER, Ledger};
use crate::owner::{OwnerId, OwnerSource, ThreadOwner};
use crate::tag::{self, TAG_SIZE};
use std::alloc::{GlobalAlloc, Layout};
use std::ffi::{CStr, c_char};
use std::ptr;

/// Allocator used by the C ABI and the `global-allocator` feature.
pub type DefaultAllocator = TaggedAllocator<Mimalloc, ThreadOwner>;

#[cfg_attr(feature = "global-allocator", global_allocator)]
pub static DEFAULT_ALLOCATOR: DefaultAllocator = TaggedAllocator::new(Mimalloc, ThreadOwner);

/// Attributes every block it hands out to the owner current at allocation
/// time, recording usable sizes in a [`Ledger`].
///
/// Tracked blocks must be released through the same allocator. Blocks from
/// [`allocate_aligned`](Self::allocate_aligned) are not tagged and must be
/// released with [`release_aligned`](Self::release_aligned).
pub struct TaggedAllocator<B, O> {
    base: B,
    owners: O,
    ledger: &'static Ledger,
}

impl<B: BaseAllocator, O: OwnerSource> TaggedAllocator<B, O> {
    /// Allocator recording into the process-wide [`LEDGER`].
    pub const fn new(base: B, owners: O) -> Self {
        Self::with_ledger(base, owners, &LEDGER)
    }

    pub const fn with_ledger(base: B, owners: O, ledger: &'static Ledger) -> Self {
        Self {
            base,
            owners,
            ledger,
        }
    }

    pub fn ledger(&self) -> &'static Ledger {
        self.ledger
    }

    pub fn base(&self) -> &B {
        &self.base
    }

    /// Never returns null: exhaustion aborts the process.
    pub fn allocate(&self, size: usize) -> *mut u8 {
        let Some(request) = size.checked_add(TAG_SIZE) else {
            out_of_memory(size);
        };
        let block = self.base.allocate(request);
        if block.is_null() {
            out_of_memory(size);
        }
        unsafe { self.track(block) }
    }

    /// Zero-initialised room for `count` elements of `size` bytes. Never
    /// returns null: overflow or exhaustion aborts the process.
    pub fn allocate_zeroed(&self, count: usize, size: usize) -> *mut u8 {
        let Some(request) = count
            .checked_mul(size)
            .and_then(|bytes| bytes.checked_add(TAG_SIZE))
        else {
            out_of_memory(count.saturating_mul(size));
        };
        let block = self.base.allocate_zeroed(1, request);
        if block.is_null() {
            out_of_memory(request - TAG_SIZE);
        }
        unsafe { self.track(block) }
    }

    /// Resizes a block, re-attributing it to the owner current now.
    ///
    /// The old block is released from its original owner and the new one is
    /// charged to the current owner, so a single resize can move bytes
    /// between owners. A null `ptr` behaves like [`allocate`](Self::allocate).
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live tracked block from this allocator.
    pub unsafe fn reallocate(&self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        if ptr.is_null() {
            return self.allocate(new_size);
        }
        let Some(request) = new_size.checked_add(TAG_SIZE) else {
            out_of_memory(new_size);
        };

        unsafe {
            self.untrack(ptr);
            let block = self.base.reallocate(ptr, request);
            if block.is_null() {
                out_of_memory(new_size);
            }
            self.track(block)
        }
    }

    /// No-op on null.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live tracked block from this allocator.
    pub unsafe fn release(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        unsafe {
            self.untrack(ptr);
            self.base.free(ptr);
        }
    }

    /// Aligned block straight from the base allocator, without a tag and
    /// without any accounting. Null for an invalid alignment or on exhaustion.
    pub fn allocate_aligned(&self, align: usize, size: usize) -> *mut u8 {
        self.base.allocate_aligned(align, size)
    }

    /// Releases a block from [`allocate_aligned`](Self::allocate_aligned).
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live block from `allocate_aligned`.
    pub unsafe fn release_aligned(&self, ptr: *mut u8) {
        if !ptr.is_null() {
            unsafe { self.base.free(ptr) };
        }
    }

    /// Copies a C string, terminator included, into a tracked block.
    pub fn duplicate_string(&self, s: &CStr) -> *mut c_char {
        let bytes = s.to_bytes_with_nul();
        let copy = self.allocate(bytes.len());
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), copy, bytes.len()) };
        copy as *mut c_char
    }

    /// Resize hook for embedded language runtimes: a `new_size` of zero
    /// releases the block and returns null, anything else reallocates.
    ///
    /// # Safety
    ///
    /// Same contract as [`reallocate`](Self::reallocate).
    pub unsafe fn runtime_resize(&self, ptr: *mut u8, _old_size: usize, new_size: usize) -> *mut u8 {
        if new_size == 0 {
            unsafe { self.release(ptr) };
            ptr::null_mut()
        } else {
            unsafe { self.reallocate(ptr, new_size) }
        }
    }

    /// Capacity available to the caller, excluding the tag. Zero for null.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live tracked block from this allocator.
    pub unsafe fn usable_size(&self, ptr: *const u8) -> usize {
        if ptr.is_null() {
            return 0;
        }
        unsafe { self.base.usable_size(ptr) - TAG_SIZE }
    }

    /// Owner recorded in a live tracked block.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live tracked block from this allocator.
    pub unsafe fn owner_of(&self, ptr: *const u8) -> OwnerId {
        unsafe { tag::decode(ptr, self.base.usable_size(ptr)) }
    }

    #[inline]
    unsafe fn track(&self, block: *mut u8) -> *mut u8 {
        let owner = self.owners.current_owner();
        unsafe {
            let capacity = self.base.usable_size(block);
            tag::encode(block, capacity, owner);
            self.ledger.record_alloc(owner, capacity);
        }
        block
    }

    #[inline]
    unsafe fn untrack(&self, block: *mut u8) {
        unsafe {
            let capacity = self.base.usable_size(block);
            let owner = tag::decode(block, capacity);
            self.ledger.record_free(owner, capacity);
        }
    }

    #[inline]
    fn is_tracked(layout: &Layout) -> bool {
        layout.align() <= B::MIN_ALIGN && layout.align() <= layout.size()
    }
}

#[cold]
#[inline(never)]
fn out_of_memory(size: usize) -> ! {
    eprintln!("[tagalloc] Out of memory trying to allocate {} bytes", size);
    std::process::abort()
}

// Layouts the base allocator cannot satisfy with its natural alignment take
// the untagged aligned path, so `dealloc` and `realloc` re-derive the path from
// the layout.
unsafe impl<B: BaseAllocator, O: OwnerSource> GlobalAlloc for TaggedAllocator<B, O> {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if Self::is_tracked(&layout) {
            self.allocate(layout.size())
        } else {
            self.allocate_aligned(layout.align(), layout.size())
        }
    }

    #[inline]
    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if Self::is_tracked(&layout) {
            self.allocate_zeroed(1, layout.size())
        } else {
            let block = self.allocate_aligned(layout.align(), layout.size());
            if !block.is_null() {
                unsafe { ptr::write_bytes(block, 0, layout.size()) };
            }
            block
        }
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if Self::is_tracked(&layout) {
            unsafe { self.release(ptr) }
        } else {
            unsafe { self.release_aligned(ptr) }
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_layout = unsafe { Layout::from_size_align_unchecked(new_size, layout.align()) };
        match (Self::is_tracked(&layout), Self::is_tracked(&new_layout)) {
            (true, true) => unsafe { self.reallocate(ptr, new_size) },
            _ => unsafe {
                let moved = self.alloc(new_layout);
                if !moved.is_null() {
                    ptr::copy_nonoverlapping(ptr, moved, layout.size().min(new_size));
                    self.dealloc(ptr, layout);
                }
                moved
            },
        }
    }
}
