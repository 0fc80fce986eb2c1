//! Builds `tagalloc` with the `global-allocator` feature; linking this crate
//! installs `tagalloc::DEFAULT_ALLOCATOR` for the whole process.

pub use tagalloc;
