use crate::counters::GlobalStats;
use crate::owner::OwnerId;
use crate::slots::{OwnedSlots, SlotTable};

/// Exact totals plus the per-owner slot table.
///
/// The process-wide [`LEDGER`] backs the default allocator. Independent
/// ledgers are only useful as `static`s, since the slot table is 1 MiB.
pub struct Ledger {
    stats: GlobalStats,
    slots: SlotTable,
}

/// Ledger shared by every allocator built with [`TaggedAllocator::new`](crate::TaggedAllocator::new).
pub static LEDGER: Ledger = Ledger::new();

impl Ledger {
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            stats: GlobalStats::new(),
            slots: SlotTable::new(),
        }
    }

    #[inline]
    pub fn record_alloc(&self, owner: OwnerId, bytes: usize) {
        self.stats.add_block(bytes);
        self.slots.charge(owner, bytes);
    }

    #[inline]
    pub fn record_free(&self, owner: OwnerId, bytes: usize) {
        self.stats.remove_block(bytes);
        self.slots.credit(owner, bytes);
    }

    #[inline]
    pub fn live_bytes(&self) -> usize {
        self.stats.live_bytes()
    }

    #[inline]
    pub fn live_blocks(&self) -> usize {
        self.stats.live_blocks()
    }

    pub fn owned_slots(&self) -> OwnedSlots<'_> {
        self.slots.owned()
    }

    pub fn owner_balance(&self, owner: OwnerId) -> Option<isize> {
        self.slots.balance_of(owner)
    }

    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }
}
