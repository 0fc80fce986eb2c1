use std::ptr;
use tagalloc::tag::TAG_SIZE;
use tagalloc::{BaseAllocator, Ledger, Mimalloc, OwnerId, OwnerScope, TaggedAllocator, ThreadOwner};

type Tracked = TaggedAllocator<Mimalloc, ThreadOwner>;

static RELEASE_LEDGER: Ledger = Ledger::new();
static RELEASE: Tracked = TaggedAllocator::with_ledger(Mimalloc, ThreadOwner, &RELEASE_LEDGER);

static COLLIDE_LEDGER: Ledger = Ledger::new();
static COLLIDE: Tracked = TaggedAllocator::with_ledger(Mimalloc, ThreadOwner, &COLLIDE_LEDGER);

static HANDOVER_LEDGER: Ledger = Ledger::new();
static HANDOVER: Tracked = TaggedAllocator::with_ledger(Mimalloc, ThreadOwner, &HANDOVER_LEDGER);

static ALIGNED_LEDGER: Ledger = Ledger::new();
static ALIGNED: Tracked = TaggedAllocator::with_ledger(Mimalloc, ThreadOwner, &ALIGNED_LEDGER);

static NULL_LEDGER: Ledger = Ledger::new();
static NULL: Tracked = TaggedAllocator::with_ledger(Mimalloc, ThreadOwner, &NULL_LEDGER);

static CROSS_LEDGER: Ledger = Ledger::new();
static CROSS: Tracked = TaggedAllocator::with_ledger(Mimalloc, ThreadOwner, &CROSS_LEDGER);

fn capacity(ptr: *const u8) -> usize {
    unsafe { Mimalloc.usable_size(ptr) }
}

#[test]
fn test_release_restores_totals() {
    let bytes_before = RELEASE_LEDGER.live_bytes();
    let blocks_before = RELEASE_LEDGER.live_blocks();

    let _scope = OwnerScope::enter(OwnerId::new(7));
    let ptr = RELEASE.allocate(100);
    let cap = capacity(ptr);

    assert!(cap >= 100 + TAG_SIZE);
    assert_eq!(RELEASE_LEDGER.live_bytes(), bytes_before + cap);
    assert_eq!(RELEASE_LEDGER.live_blocks(), blocks_before + 1);
    assert_eq!(RELEASE_LEDGER.owner_balance(OwnerId::new(7)), Some(cap as isize));

    unsafe { RELEASE.release(ptr) };

    assert_eq!(RELEASE_LEDGER.live_bytes(), bytes_before);
    assert_eq!(RELEASE_LEDGER.live_blocks(), blocks_before);
    assert_eq!(RELEASE_LEDGER.owner_balance(OwnerId::new(7)), Some(0));
}

#[test]
fn test_colliding_owners_keep_exact_totals() {
    let first = OwnerId::new(1);
    let second = OwnerId::new(0x0001_0001);

    let a = {
        let _scope = OwnerScope::enter(first);
        COLLIDE.allocate(1000)
    };
    let b = {
        let _scope = OwnerScope::enter(second);
        COLLIDE.allocate(1000)
    };

    assert_eq!(COLLIDE_LEDGER.live_blocks(), 2);
    assert_eq!(COLLIDE_LEDGER.live_bytes(), capacity(a) + capacity(b));

    let attributed: Vec<_> = COLLIDE_LEDGER.owned_slots().collect();
    assert_eq!(attributed.len(), 1);
    assert_eq!(attributed[0].owner, first);
    assert_eq!(attributed[0].balance, capacity(a) as isize);
    assert_eq!(COLLIDE_LEDGER.owner_balance(second), None);

    unsafe {
        COLLIDE.release(b);
        COLLIDE.release(a);
    }
    assert_eq!(COLLIDE_LEDGER.live_blocks(), 0);
    assert_eq!(COLLIDE_LEDGER.live_bytes(), 0);
    assert_eq!(COLLIDE_LEDGER.owned_slots().count(), 0);
}

#[test]
fn test_reallocate_moves_bytes_between_owners() {
    let o1 = OwnerId::new(0x21);
    let o2 = OwnerId::new(0x22);

    let ptr = {
        let _scope = OwnerScope::enter(o1);
        HANDOVER.allocate(1000)
    };
    let old_cap = capacity(ptr);
    assert_eq!(HANDOVER_LEDGER.owner_balance(o1), Some(old_cap as isize));

    let moved = {
        let _scope = OwnerScope::enter(o2);
        unsafe { HANDOVER.reallocate(ptr, 100) }
    };
    let new_cap = capacity(moved);

    assert_eq!(HANDOVER_LEDGER.owner_balance(o1), Some(0));
    assert_eq!(HANDOVER_LEDGER.owner_balance(o2), Some(new_cap as isize));
    assert_eq!(HANDOVER_LEDGER.live_blocks(), 1);
    assert_eq!(HANDOVER_LEDGER.live_bytes(), new_cap);
    assert_eq!(unsafe { HANDOVER.owner_of(moved) }, o2);

    unsafe { HANDOVER.release(moved) };
    assert_eq!(HANDOVER_LEDGER.owner_balance(o2), Some(0));
    assert_eq!(HANDOVER_LEDGER.live_bytes(), 0);
}

#[test]
fn test_aligned_blocks_are_untracked() {
    let _scope = OwnerScope::enter(OwnerId::new(0x33));

    let ptr = ALIGNED.allocate_aligned(4096, 300);
    assert!(!ptr.is_null());
    assert_eq!(ptr as usize % 4096, 0);
    unsafe { ptr::write_bytes(ptr, 0xFF, 300) };

    assert_eq!(ALIGNED_LEDGER.live_blocks(), 0);
    assert_eq!(ALIGNED_LEDGER.live_bytes(), 0);
    assert_eq!(ALIGNED_LEDGER.owned_slots().count(), 0);

    unsafe { ALIGNED.release_aligned(ptr) };
    assert_eq!(ALIGNED_LEDGER.live_blocks(), 0);
}

#[test]
fn test_null_release_changes_nothing() {
    let keep = NULL.allocate(64);
    let bytes = NULL_LEDGER.live_bytes();

    for _ in 0..10 {
        unsafe { NULL.release(ptr::null_mut()) };
    }

    assert_eq!(NULL_LEDGER.live_bytes(), bytes);
    assert_eq!(NULL_LEDGER.live_blocks(), 1);
    unsafe { NULL.release(keep) };
}

#[test]
fn test_release_from_another_thread_credits_allocating_owner() {
    let owner = OwnerId::new(0x0200_0044);
    let ptr = {
        let _scope = OwnerScope::enter(owner);
        CROSS.allocate(2048) as usize
    };
    let cap = capacity(ptr as *const u8);
    assert_eq!(CROSS_LEDGER.owner_balance(owner), Some(cap as isize));

    std::thread::spawn(move || {
        let _scope = OwnerScope::enter(OwnerId::new(0x0300_0099));
        unsafe { CROSS.release(ptr as *mut u8) };
    })
    .join()
    .unwrap();

    assert_eq!(CROSS_LEDGER.owner_balance(owner), Some(0));
    assert_eq!(CROSS_LEDGER.owner_balance(OwnerId::new(0x0300_0099)), None);
    assert_eq!(CROSS_LEDGER.live_bytes(), 0);
}
