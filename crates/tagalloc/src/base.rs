//! The general-purpose allocator underneath the accounting layer.

use libmimalloc_sys as ffi;
use std::error::Error;
use std::ffi::c_void;
use std::fmt;

/// Error returned when the base allocator refuses a tunable read or write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// No tunable with this name exists.
    UnknownName(String),
    /// The tunable exists but cannot be changed at runtime.
    ReadOnly { name: String, previous: i64 },
    /// The requested value does not fit the tunable's native type.
    OutOfRange { name: String, value: i64, previous: i64 },
    /// The base allocator exposes no tunables at all.
    Unsupported,
}

impl ControlError {
    /// Value the tunable held before the rejected write, when it could be read.
    pub fn previous(&self) -> Option<i64> {
        match self {
            ControlError::ReadOnly { previous, .. } | ControlError::OutOfRange { previous, .. } => {
                Some(*previous)
            }
            ControlError::UnknownName(_) | ControlError::Unsupported => None,
        }
    }
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::UnknownName(name) => write!(f, "unknown tunable '{}'", name),
            ControlError::ReadOnly { name, .. } => {
                write!(f, "tunable '{}' is only read at process start", name)
            }
            ControlError::OutOfRange { name, value, .. } => {
                write!(f, "value {} is out of range for tunable '{}'", value, name)
            }
            ControlError::Unsupported => write!(f, "base allocator has no tunables"),
        }
    }
}

impl Error for ControlError {}

/// Allocation primitives the accounting layer is built on.
///
/// Every pointer-returning method reports exhaustion with a null pointer; the
/// layer above decides whether that is fatal.
///
/// # Safety
///
/// Implementations must return blocks aligned to at least [`Self::MIN_ALIGN`]
/// from `allocate`, `allocate_zeroed` and `reallocate`, and `usable_size` must
/// report a capacity no smaller than the size last requested for the block.
pub unsafe trait BaseAllocator: Sync {
    /// Alignment every non-aligned allocation is guaranteed to meet.
    const MIN_ALIGN: usize;

    fn allocate(&self, size: usize) -> *mut u8;

    /// Zero-initialised block of `count * size` bytes.
    fn allocate_zeroed(&self, count: usize, size: usize) -> *mut u8;

    /// Null for an alignment that is not a power of two.
    fn allocate_aligned(&self, align: usize, size: usize) -> *mut u8;

    /// # Safety
    ///
    /// `ptr` must be a live block obtained from this allocator.
    unsafe fn reallocate(&self, ptr: *mut u8, size: usize) -> *mut u8;

    /// # Safety
    ///
    /// `ptr` must be a live block obtained from this allocator.
    unsafe fn free(&self, ptr: *mut u8);

    /// # Safety
    ///
    /// `ptr` must be a live block obtained from this allocator.
    unsafe fn usable_size(&self, ptr: *const u8) -> usize;

    /// Reads a numeric tunable and optionally replaces it, returning the value
    /// it held before.
    fn integer_control(&self, _name: &str, _new_value: Option<i64>) -> Result<i64, ControlError> {
        Err(ControlError::Unsupported)
    }

    /// Reads an on/off tunable and optionally flips it, returning the state it
    /// held before.
    fn option_control(&self, _name: &str, _new_value: Option<bool>) -> Result<bool, ControlError> {
        Err(ControlError::Unsupported)
    }

    /// Prints the allocator's own statistics to stderr.
    fn dump_stats(&self) {}
}

/// [mimalloc](https://github.com/microsoft/mimalloc) as the base allocator.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mimalloc;

struct Tunable {
    name: &'static str,
    option: ffi::mi_option_t,
    runtime_writable: bool,
}

const TUNABLES: &[Tunable] = &[
    Tunable { name: "show_errors", option: ffi::mi_option_show_errors, runtime_writable: true },
    Tunable { name: "show_stats", option: ffi::mi_option_show_stats, runtime_writable: true },
    Tunable { name: "verbose", option: ffi::mi_option_verbose, runtime_writable: true },
    Tunable {
        name: "large_os_pages",
        option: ffi::mi_option_large_os_pages,
        runtime_writable: false,
    },
    Tunable { name: "max_errors", option: ffi::mi_option_max_errors, runtime_writable: true },
    Tunable { name: "max_warnings", option: ffi::mi_option_max_warnings, runtime_writable: true },
    Tunable {
        name: "reserve_huge_os_pages",
        option: ffi::mi_option_reserve_huge_os_pages,
        runtime_writable: false,
    },
    Tunable {
        name: "reserve_os_memory",
        option: ffi::mi_option_reserve_os_memory,
        runtime_writable: false,
    },
];

impl Mimalloc {
    /// Names accepted by the tunable controls.
    pub fn tunable_names() -> impl Iterator<Item = &'static str> {
        TUNABLES.iter().map(|t| t.name)
    }

    fn tunable(name: &str) -> Result<&'static Tunable, ControlError> {
        TUNABLES
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ControlError::UnknownName(name.to_string()))
    }
}

unsafe impl BaseAllocator for Mimalloc {
    const MIN_ALIGN: usize = size_of::<usize>();

    #[inline]
    fn allocate(&self, size: usize) -> *mut u8 {
        unsafe { ffi::mi_malloc(size) as *mut u8 }
    }

    #[inline]
    fn allocate_zeroed(&self, count: usize, size: usize) -> *mut u8 {
        unsafe { ffi::mi_calloc(count, size) as *mut u8 }
    }

    #[inline]
    fn allocate_aligned(&self, align: usize, size: usize) -> *mut u8 {
        if !align.is_power_of_two() {
            return std::ptr::null_mut();
        }
        unsafe { ffi::mi_malloc_aligned(size, align) as *mut u8 }
    }

    #[inline]
    unsafe fn reallocate(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        unsafe { ffi::mi_realloc(ptr as *mut c_void, size) as *mut u8 }
    }

    #[inline]
    unsafe fn free(&self, ptr: *mut u8) {
        unsafe { ffi::mi_free(ptr as *mut c_void) }
    }

    #[inline]
    unsafe fn usable_size(&self, ptr: *const u8) -> usize {
        unsafe { ffi::mi_usable_size(ptr as *const c_void) }
    }

    fn integer_control(&self, name: &str, new_value: Option<i64>) -> Result<i64, ControlError> {
        let tunable = Self::tunable(name)?;
        let previous = unsafe { ffi::mi_option_get(tunable.option) } as i64;

        let Some(value) = new_value else {
            return Ok(previous);
        };
        if !tunable.runtime_writable {
            return Err(ControlError::ReadOnly {
                name: name.to_string(),
                previous,
            });
        }
        cfg_if::cfg_if! {
            if #[cfg(all(target_pointer_width = "64", not(windows)))] {
                let native: std::ffi::c_long = value;
            } else {
                let Ok(native) = std::ffi::c_long::try_from(value) else {
                    return Err(ControlError::OutOfRange {
                        name: name.to_string(),
                        value,
                        previous,
                    });
                };
            }
        }

        unsafe { ffi::mi_option_set(tunable.option, native) };
        Ok(previous)
    }

    fn option_control(&self, name: &str, new_value: Option<bool>) -> Result<bool, ControlError> {
        let tunable = Self::tunable(name)?;
        let previous = unsafe { ffi::mi_option_is_enabled(tunable.option) };

        let Some(enable) = new_value else {
            return Ok(previous);
        };
        if !tunable.runtime_writable {
            return Err(ControlError::ReadOnly {
                name: name.to_string(),
                previous: previous as i64,
            });
        }

        unsafe { ffi::mi_option_set_enabled(tunable.option, enable) };
        Ok(previous)
    }

    fn dump_stats(&self) {
        unsafe { ffi::mi_stats_print_out(None, std::ptr::null_mut()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_size_covers_request() {
        let base = Mimalloc;
        for size in [1, 4, 13, 100, 4096, 1 << 20] {
            let ptr = base.allocate(size);
            assert!(!ptr.is_null());
            assert_eq!(ptr as usize % Mimalloc::MIN_ALIGN, 0);
            assert!(unsafe { base.usable_size(ptr) } >= size);
            unsafe { base.free(ptr) };
        }
    }

    #[test]
    fn test_aligned_rejects_bad_alignment() {
        assert!(Mimalloc.allocate_aligned(48, 64).is_null());

        let ptr = Mimalloc.allocate_aligned(256, 64);
        assert!(!ptr.is_null());
        assert_eq!(ptr as usize % 256, 0);
        unsafe { Mimalloc.free(ptr) };
    }

    #[test]
    fn test_unknown_tunable() {
        assert_eq!(
            Mimalloc.integer_control("no_such_knob", None),
            Err(ControlError::UnknownName("no_such_knob".to_string()))
        );
        assert!(Mimalloc.option_control("no_such_knob", Some(true)).is_err());
    }

    #[test]
    fn test_startup_only_tunable_rejects_write() {
        let previous = Mimalloc.integer_control("reserve_os_memory", None).unwrap();
        let err = Mimalloc
            .integer_control("reserve_os_memory", Some(previous + 1))
            .unwrap_err();
        assert_eq!(err.previous(), Some(previous));
        assert_eq!(
            Mimalloc.integer_control("reserve_os_memory", None).unwrap(),
            previous
        );
    }

    #[test]
    fn test_writable_tunable_returns_previous() {
        let original = Mimalloc.integer_control("max_warnings", None).unwrap();
        assert_eq!(
            Mimalloc.integer_control("max_warnings", Some(original + 5)),
            Ok(original)
        );
        assert_eq!(
            Mimalloc.integer_control("max_warnings", Some(original)),
            Ok(original + 5)
        );
    }

    #[test]
    fn test_every_listed_tunable_is_readable() {
        let names: Vec<_> = Mimalloc::tunable_names().collect();
        assert!(names.contains(&"large_os_pages"));
        for name in names {
            assert!(
                Mimalloc.integer_control(name, None).is_ok(),
                "{name} could not be read"
            );
            assert!(Mimalloc.option_control(name, None).is_ok(), "{name}");
        }
    }
}
