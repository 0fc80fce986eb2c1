//! Per-owner memory accounting layered over a general-purpose allocator.
//!
//! Every tracked block carries a 4-byte owner tag in its trailing bytes, so a
//! release is credited to whoever allocated the block. Global totals are
//! exact; per-owner balances live in a fixed lock-free slot table and are
//! approximate when owners collide.
//!
//! Either enable the `global-allocator` feature, which installs
//! [`DEFAULT_ALLOCATOR`], or declare the allocator yourself:
//!
//! ```rust,no_run
//! use tagalloc::{DefaultAllocator, Mimalloc, OwnerId, OwnerScope, ThreadOwner, TaggedAllocator};
//!
//! #[cfg(not(feature = "global-allocator"))]
//! #[global_allocator]
//! static GLOBAL: DefaultAllocator = TaggedAllocator::new(Mimalloc, ThreadOwner);
//!
//! fn main() {
//!     let _scope = OwnerScope::enter(OwnerId::new(0x0100_0007));
//!     let buffer = vec![0u8; 4096];
//!     assert!(tagalloc::owner_balance(OwnerId::new(0x0100_0007)).unwrap_or(0) >= 4096);
//!     drop(buffer);
//! }
//! ```

pub use tagalloc_macros::owned_by;

pub mod allocator;
pub mod base;
pub mod config;
pub mod counters;
pub mod diagnostics;
pub mod ffi;
pub mod http_server;
pub mod ledger;
pub mod output;
pub mod owner;
pub mod slots;
pub mod tag;

pub use allocator::{DEFAULT_ALLOCATOR, DefaultAllocator, TaggedAllocator};
pub use base::{BaseAllocator, ControlError, Mimalloc};
pub use config::{Format, ReportConfig};
pub use diagnostics::{
    dump_base_stats, integer_control, option_control, owned_slots, owner_balance,
    total_live_blocks, total_live_bytes,
};
pub use http_server::start_metrics_server;
pub use ledger::{LEDGER, Ledger};
pub use output::{MemoryReport, OwnerUsage, Reporter, reporter_for};
pub use owner::{OwnerId, OwnerScope, OwnerSource, ThreadOwner, current_owner, set_current_owner};
pub use slots::SlotUsage;

/// Evaluates an expression with every allocation attributed to `owner`.
///
/// ```rust
/// let names = tagalloc::owned_block!(0x0100_0007, vec!["inbox".to_string()]);
/// assert_eq!(names.len(), 1);
/// ```
#[macro_export]
macro_rules! owned_block {
    ($owner:expr, $expr:expr) => {{
        let _scope = $crate::OwnerScope::enter($crate::OwnerId::new($owner));
        $expr
    }};
}

/// Prints a report of the process-wide ledger the way `config` asks for.
pub fn print_report(config: &ReportConfig) -> Result<(), Box<dyn std::error::Error>> {
    let report = MemoryReport::capture(&LEDGER, config.limit);
    reporter_for(config.format).report(&report)
}
