//! Exhaustion in the base allocator is fatal: the layer prints a diagnostic
//! and aborts instead of returning null.
//!
//! `cargo run --example oom_abort -- <mode>` exercises one fatal path.

use clap::{Parser, ValueEnum};
use std::ptr;
use tagalloc::{BaseAllocator, Mimalloc, TaggedAllocator, ThreadOwner};

/// Requests above this many bytes fail, as they would on an exhausted heap.
const LIMIT: usize = 1 << 20;

/// Mimalloc for small requests, null for anything above [`LIMIT`].
struct Starved;

unsafe impl BaseAllocator for Starved {
    const MIN_ALIGN: usize = Mimalloc::MIN_ALIGN;

    fn allocate(&self, size: usize) -> *mut u8 {
        if size > LIMIT {
            return ptr::null_mut();
        }
        Mimalloc.allocate(size)
    }

    fn allocate_zeroed(&self, count: usize, size: usize) -> *mut u8 {
        match count.checked_mul(size) {
            Some(bytes) if bytes <= LIMIT => Mimalloc.allocate_zeroed(count, size),
            _ => ptr::null_mut(),
        }
    }

    fn allocate_aligned(&self, align: usize, size: usize) -> *mut u8 {
        if size > LIMIT {
            return ptr::null_mut();
        }
        Mimalloc.allocate_aligned(align, size)
    }

    unsafe fn reallocate(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        if size > LIMIT {
            return ptr::null_mut();
        }
        unsafe { Mimalloc.reallocate(ptr, size) }
    }

    unsafe fn free(&self, ptr: *mut u8) {
        unsafe { Mimalloc.free(ptr) }
    }

    unsafe fn usable_size(&self, ptr: *const u8) -> usize {
        unsafe { Mimalloc.usable_size(ptr) }
    }
}

static STARVED: TaggedAllocator<Starved, ThreadOwner> = TaggedAllocator::new(Starved, ThreadOwner);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// `allocate` of 2 MiB.
    Allocate,
    /// `allocate` whose size plus the tag overflows.
    SizeOverflow,
    /// `allocate_zeroed` of 4 x 1 MiB.
    Zeroed,
    /// `allocate_zeroed` whose count times size overflows.
    ZeroedOverflow,
    /// `reallocate` of a small block to 2 MiB.
    Reallocate,
}

#[derive(Debug, Parser)]
struct Args {
    #[arg(value_enum, default_value_t = Mode::Allocate)]
    mode: Mode,
}

fn main() {
    let args = Args::parse();

    let block = match args.mode {
        Mode::Allocate => STARVED.allocate(2 * LIMIT),
        Mode::SizeOverflow => STARVED.allocate(usize::MAX - 2),
        Mode::Zeroed => STARVED.allocate_zeroed(4, LIMIT),
        Mode::ZeroedOverflow => STARVED.allocate_zeroed(usize::MAX / 2, 3),
        Mode::Reallocate => {
            let small = STARVED.allocate(64);
            assert!(!small.is_null());
            unsafe { STARVED.reallocate(small, 2 * LIMIT) }
        }
    };

    println!("unreachable: got {:p}", block);
}
