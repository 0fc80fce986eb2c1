use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;

/// Identifier of the actor or service an allocation is attributed to.
///
/// `0` is reserved for "no owner".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(u32);

impl OwnerId {
    pub const NONE: OwnerId = OwnerId(0);

    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Slot this owner maps to: the low 16 bits.
    #[inline]
    pub const fn slot_index(self) -> usize {
        (self.0 & 0xFFFF) as usize
    }
}

impl From<u32> for OwnerId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{:08x}", self.0)
    }
}

/// Supplies the owner of the logical task running on the calling thread.
///
/// Called on every allocation, so implementations must be O(1) and must not
/// allocate.
pub trait OwnerSource: Sync {
    fn current_owner(&self) -> OwnerId;
}

impl<F> OwnerSource for F
where
    F: Fn() -> OwnerId + Sync,
{
    #[inline]
    fn current_owner(&self) -> OwnerId {
        self()
    }
}

thread_local! {
    static CURRENT_OWNER: Cell<u32> = const { Cell::new(0) };
}

/// Owner source backed by a thread-local, set through [`OwnerScope`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadOwner;

impl OwnerSource for ThreadOwner {
    #[inline]
    fn current_owner(&self) -> OwnerId {
        current_owner()
    }
}

/// Owner currently attributed on this thread, `OwnerId::NONE` outside any scope.
#[inline]
pub fn current_owner() -> OwnerId {
    CURRENT_OWNER
        .try_with(|owner| OwnerId(owner.get()))
        .unwrap_or(OwnerId::NONE)
}

/// Replaces the calling thread's owner without a guard and returns the
/// previous one. Used by the C ABI, where callers manage the lifetime.
pub fn set_current_owner(owner: OwnerId) -> OwnerId {
    CURRENT_OWNER
        .try_with(|current| OwnerId(current.replace(owner.0)))
        .unwrap_or(OwnerId::NONE)
}

/// Attributes allocations on the current thread to an owner until dropped.
///
/// Scopes nest; dropping restores whichever owner was active before.
#[must_use = "the owner is reset as soon as the scope is dropped"]
pub struct OwnerScope {
    previous: OwnerId,
    // Scopes restore thread-local state, so they must stay on their thread.
    _not_send: std::marker::PhantomData<*const ()>,
}

impl OwnerScope {
    #[inline]
    pub fn enter(owner: OwnerId) -> Self {
        Self {
            previous: set_current_owner(owner),
            _not_send: std::marker::PhantomData,
        }
    }
}

impl Drop for OwnerScope {
    #[inline]
    fn drop(&mut self) {
        set_current_owner(self.previous);
    }
}
