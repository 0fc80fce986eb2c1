//! Fixed-size table of approximate per-owner byte balances.
//!
//! An unbounded population of owners shares [`SLOT_COUNT`] slots, indexed by
//! the low 16 bits of the owner id. A slot belongs to one owner at a time and
//! is only handed over once it is unowned or its balance has drained to zero
//! or below. Updates that lose a race or land on a slot held by another owner
//! are dropped: balances may undercount, and only updates in flight during a
//! handover can land on the wrong owner.

use crate::owner::OwnerId;
use std::sync::atomic::{AtomicIsize, AtomicU32, Ordering};

pub const SLOT_COUNT: usize = 0x10000;

pub struct Slot {
    owner: AtomicU32,
    balance: AtomicIsize,
}

impl Slot {
    const fn new() -> Self {
        Self {
            owner: AtomicU32::new(0),
            balance: AtomicIsize::new(0),
        }
    }
}

/// Point-in-time view of one slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotUsage {
    pub index: usize,
    pub owner: OwnerId,
    pub balance: isize,
}

pub struct SlotTable {
    slots: [Slot; SLOT_COUNT],
}

impl SlotTable {
    /// The table is 1 MiB; construct it in a `static`, not on the stack.
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            slots: [const { Slot::new() }; SLOT_COUNT],
        }
    }

    #[inline]
    pub fn index_of(owner: OwnerId) -> usize {
        owner.slot_index()
    }

    /// Returns the balance cell of the slot `owner` maps to, claiming the slot
    /// first if its previous owner has drained. `None` when the slot is held by
    /// someone else or the claim lost a race.
    pub fn claim(&self, owner: OwnerId) -> Option<&AtomicIsize> {
        let slot = &self.slots[Self::index_of(owner)];
        let current_owner = slot.owner.load(Ordering::Acquire);
        let current_balance = slot.balance.load(Ordering::Acquire);

        if current_owner == 0 || current_balance <= 0 {
            if slot
                .owner
                .compare_exchange(current_owner, owner.get(), Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                return None;
            }
            // Frees seen before any matching allocation leave a negative
            // balance behind; the new owner starts from zero.
            if current_balance < 0 {
                let _ = slot.balance.compare_exchange(
                    current_balance,
                    0,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                );
            }
        }

        if slot.owner.load(Ordering::Acquire) != owner.get() {
            return None;
        }
        Some(&slot.balance)
    }

    #[inline]
    pub fn charge(&self, owner: OwnerId, bytes: usize) {
        if let Some(balance) = self.claim(owner) {
            balance.fetch_add(signed(bytes), Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn credit(&self, owner: OwnerId, bytes: usize) {
        if let Some(balance) = self.claim(owner) {
            balance.fetch_sub(signed(bytes), Ordering::Relaxed);
        }
    }

    pub fn usage(&self, index: usize) -> SlotUsage {
        let slot = &self.slots[index];
        SlotUsage {
            index,
            owner: OwnerId::new(slot.owner.load(Ordering::Acquire)),
            balance: slot.balance.load(Ordering::Acquire),
        }
    }

    /// Balance currently recorded for `owner`, `None` if its slot is held by
    /// a different owner.
    pub fn balance_of(&self, owner: OwnerId) -> Option<isize> {
        let usage = self.usage(Self::index_of(owner));
        (usage.owner == owner).then_some(usage.balance)
    }

    /// Lazily walks slots with a non-zero owner and a non-zero balance.
    ///
    /// There is no snapshot isolation: slots updated while the walk is in
    /// progress may be seen before or after the update.
    pub fn owned(&self) -> OwnedSlots<'_> {
        OwnedSlots {
            table: self,
            next: 0,
        }
    }
}

#[inline]
fn signed(bytes: usize) -> isize {
    bytes.min(isize::MAX as usize) as isize
}

#[derive(Clone)]
pub struct OwnedSlots<'a> {
    table: &'a SlotTable,
    next: usize,
}

impl Iterator for OwnedSlots<'_> {
    type Item = SlotUsage;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < SLOT_COUNT {
            let usage = self.table.usage(self.next);
            self.next += 1;
            if !usage.owner.is_none() && usage.balance != 0 {
                return Some(usage);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(SLOT_COUNT - self.next))
    }
}
