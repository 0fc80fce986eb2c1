//! Read-only and administrative access to the process-wide accounting state
//! and to the base allocator behind [`DEFAULT_ALLOCATOR`].

use crate::allocator::DEFAULT_ALLOCATOR;
use crate::base::{BaseAllocator, ControlError};
use crate::ledger::LEDGER;
use crate::owner::OwnerId;
use crate::slots::OwnedSlots;
use colored::Colorize;
use std::fmt::Display;

/// Exact number of bytes held by live tracked blocks, trailers included.
pub fn total_live_bytes() -> usize {
    LEDGER.live_bytes()
}

pub fn total_live_blocks() -> usize {
    LEDGER.live_blocks()
}

/// Slots with an owner and a non-zero balance. Call again to restart.
pub fn owned_slots() -> OwnedSlots<'static> {
    LEDGER.owned_slots()
}

/// Approximate bytes held by `owner`, `None` if its slot is claimed by
/// another owner.
pub fn owner_balance(owner: OwnerId) -> Option<isize> {
    LEDGER.owner_balance(owner)
}

pub fn try_integer_control(name: &str, new_value: Option<i64>) -> Result<i64, ControlError> {
    DEFAULT_ALLOCATOR.base().integer_control(name, new_value)
}

pub fn try_option_control(name: &str, new_value: Option<bool>) -> Result<bool, ControlError> {
    DEFAULT_ALLOCATOR.base().option_control(name, new_value)
}

/// Reads a numeric base-allocator tunable, replacing it when `new_value` is
/// given. Returns the previous value. Every write is reported on stderr; a
/// rejected one leaves the tunable unchanged.
pub fn integer_control(name: &str, new_value: Option<i64>) -> i64 {
    let result = try_integer_control(name, new_value);
    report_control(name, new_value, result.as_ref().err());
    result.unwrap_or_else(|err| err.previous().unwrap_or(0))
}

/// On/off counterpart of [`integer_control`].
pub fn option_control(name: &str, new_value: Option<bool>) -> bool {
    let result = try_option_control(name, new_value);
    report_control(name, new_value, result.as_ref().err());
    result.unwrap_or_else(|err| err.previous().is_some_and(|previous| previous != 0))
}

/// Has the base allocator print its own statistics to stderr.
pub fn dump_base_stats() {
    DEFAULT_ALLOCATOR.base().dump_stats();
}

fn report_control<V: Display>(name: &str, new_value: Option<V>, failure: Option<&ControlError>) {
    let Some(message) = control_message(name, new_value, failure) else {
        return;
    };
    let prefix = if failure.is_some() {
        "[tagalloc]".yellow().bold()
    } else {
        "[tagalloc]".green().bold()
    };
    eprintln!("{} {}", prefix, message);
}

/// Plain reads that succeed stay silent.
pub(crate) fn control_message<V: Display>(
    name: &str,
    new_value: Option<V>,
    failure: Option<&ControlError>,
) -> Option<String> {
    match (new_value, failure) {
        (Some(value), None) => Some(format!("set new value({}) for ({}) succeeded", value, name)),
        (Some(value), Some(err)) => Some(format!(
            "set new value({}) for ({}) failed: {}",
            value, name, err
        )),
        (None, Some(err)) => Some(format!("read of ({}) failed: {}", name, err)),
        (None, None) => None,
    }
}
