use tagalloc::{LEDGER, OwnerId, ReportConfig, owned_by};

// With the `global-allocator` feature the library installs its own instance.
cfg_if::cfg_if! {
    if #[cfg(not(feature = "global-allocator"))] {
        use tagalloc::{DefaultAllocator, Mimalloc, TaggedAllocator, ThreadOwner};

        #[global_allocator]
        static GLOBAL: DefaultAllocator = TaggedAllocator::new(Mimalloc, ThreadOwner);
    }
}

const MAILBOX: u32 = 0x0100_0007;
const TIMERS: u32 = 0x0100_0008;

#[owned_by(MAILBOX)]
fn fill_mailbox(messages: usize) -> Vec<String> {
    (0..messages).map(|i| format!("message #{i}")).collect()
}

#[owned_by(TIMERS)]
fn schedule(count: usize) -> Vec<u64> {
    (0..count as u64).map(|i| i * 1_000).collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mailbox = fill_mailbox(1_000);
    let timers = schedule(512);
    let scratch = tagalloc::owned_block!(TIMERS, vec![0u8; 64 * 1024]);

    tagalloc::print_report(&ReportConfig::from_env())?;

    // Freed from an unowned context, still credited to the allocating owners.
    drop(mailbox);
    drop(timers);
    drop(scratch);

    for owner in [MAILBOX, TIMERS] {
        let balance = LEDGER.owner_balance(OwnerId::new(owner)).unwrap_or(0);
        if balance != 0 {
            return Err(format!("owner {} still holds {} bytes", OwnerId::new(owner), balance).into());
        }
    }
    println!("All owners drained.");

    Ok(())
}
