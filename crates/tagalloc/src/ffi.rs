//! C ABI over [`DEFAULT_ALLOCATOR`] and the process-wide ledger, for runtime
//! components written in C.

use crate::allocator::DEFAULT_ALLOCATOR;
use crate::diagnostics;
use crate::owner::{self, OwnerId};
use std::ffi::{CStr, c_char, c_int, c_void};
use std::ptr;

#[unsafe(no_mangle)]
pub extern "C" fn tagalloc_malloc(size: usize) -> *mut c_void {
    DEFAULT_ALLOCATOR.allocate(size) as *mut c_void
}

/// # Safety
///
/// `ptr` must be null or a live block from `tagalloc_malloc`, `tagalloc_calloc`,
/// `tagalloc_realloc` or `tagalloc_strdup`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tagalloc_free(ptr: *mut c_void) {
    unsafe { DEFAULT_ALLOCATOR.release(ptr as *mut u8) }
}

/// # Safety
///
/// Same contract as [`tagalloc_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tagalloc_realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    unsafe { DEFAULT_ALLOCATOR.reallocate(ptr as *mut u8, size) as *mut c_void }
}

#[unsafe(no_mangle)]
pub extern "C" fn tagalloc_calloc(count: usize, size: usize) -> *mut c_void {
    DEFAULT_ALLOCATOR.allocate_zeroed(count, size) as *mut c_void
}

/// Untracked; release with [`tagalloc_aligned_free`].
#[unsafe(no_mangle)]
pub extern "C" fn tagalloc_memalign(alignment: usize, size: usize) -> *mut c_void {
    DEFAULT_ALLOCATOR.allocate_aligned(alignment, size) as *mut c_void
}

/// # Safety
///
/// `ptr` must be null or a live block from [`tagalloc_memalign`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tagalloc_aligned_free(ptr: *mut c_void) {
    unsafe { DEFAULT_ALLOCATOR.release_aligned(ptr as *mut u8) }
}

/// Null in, null out.
///
/// # Safety
///
/// `s` must be null or point to a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tagalloc_strdup(s: *const c_char) -> *mut c_char {
    if s.is_null() {
        return ptr::null_mut();
    }
    DEFAULT_ALLOCATOR.duplicate_string(unsafe { CStr::from_ptr(s) })
}

/// Allocation function for embedded language runtimes: frees when `nsize` is
/// zero, reallocates otherwise.
///
/// # Safety
///
/// Same contract as [`tagalloc_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tagalloc_lalloc(
    _ud: *mut c_void,
    ptr: *mut c_void,
    osize: usize,
    nsize: usize,
) -> *mut c_void {
    unsafe { DEFAULT_ALLOCATOR.runtime_resize(ptr as *mut u8, osize, nsize) as *mut c_void }
}

/// # Safety
///
/// Same contract as [`tagalloc_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tagalloc_usable_size(ptr: *const c_void) -> usize {
    unsafe { DEFAULT_ALLOCATOR.usable_size(ptr as *const u8) }
}

#[unsafe(no_mangle)]
pub extern "C" fn tagalloc_used_memory() -> usize {
    diagnostics::total_live_bytes()
}

#[unsafe(no_mangle)]
pub extern "C" fn tagalloc_memory_block() -> usize {
    diagnostics::total_live_blocks()
}

/// Sets the calling thread's owner and returns the previous one.
#[unsafe(no_mangle)]
pub extern "C" fn tagalloc_set_owner(owner: u32) -> u32 {
    owner::set_current_owner(OwnerId::new(owner)).get()
}

/// # Safety
///
/// `name` must point to a NUL-terminated string; `new_value` must be null or
/// point to a readable `i64`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tagalloc_ctl_int64(name: *const c_char, new_value: *const i64) -> i64 {
    let Some(name) = (unsafe { tunable_name(name) }) else {
        return 0;
    };
    let new_value = unsafe { new_value.as_ref() }.copied();
    diagnostics::integer_control(name, new_value)
}

/// # Safety
///
/// `name` must point to a NUL-terminated string; `new_value` must be null or
/// point to a readable `int`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tagalloc_ctl_opt(name: *const c_char, new_value: *const c_int) -> c_int {
    let Some(name) = (unsafe { tunable_name(name) }) else {
        return 0;
    };
    let new_value = unsafe { new_value.as_ref() }.map(|v| *v != 0);
    diagnostics::option_control(name, new_value) as c_int
}

#[unsafe(no_mangle)]
pub extern "C" fn tagalloc_dump_stats() {
    diagnostics::dump_base_stats();
}

unsafe fn tunable_name<'a>(name: *const c_char) -> Option<&'a str> {
    if name.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(name) }.to_str().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_round_trip() {
        let previous = tagalloc_set_owner(0x0000_CC01);
        unsafe {
            let block = tagalloc_calloc(4, 8) as *mut u8;
            assert!(tagalloc_usable_size(block as *const c_void) >= 32);
            assert_eq!(DEFAULT_ALLOCATOR.owner_of(block), OwnerId::new(0x0000_CC01));

            let grown = tagalloc_realloc(block as *mut c_void, 128);
            let copy = tagalloc_strdup(c"mailbox".as_ptr());
            assert_eq!(CStr::from_ptr(copy), c"mailbox");

            tagalloc_free(copy as *mut c_void);
            assert!(tagalloc_lalloc(ptr::null_mut(), grown, 128, 0).is_null());
            assert!(tagalloc_strdup(ptr::null()).is_null());
        }
        tagalloc_set_owner(previous);
    }

    #[test]
    fn test_ctl_with_null_name() {
        unsafe {
            assert_eq!(tagalloc_ctl_int64(ptr::null(), ptr::null()), 0);
            assert_eq!(tagalloc_ctl_opt(ptr::null(), ptr::null()), 0);
        }
    }
}
