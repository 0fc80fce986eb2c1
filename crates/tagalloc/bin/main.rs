mod cmd;
use clap::{Parser, Subcommand};
use cmd::{stats::StatsArgs, stress::StressArgs, tunable::TunableArgs};
use eyre::Result;

cfg_if::cfg_if! {
    if #[cfg(not(feature = "global-allocator"))] {
        use tagalloc::{DefaultAllocator, Mimalloc, TaggedAllocator, ThreadOwner};

        #[global_allocator]
        static GLOBAL: DefaultAllocator = TaggedAllocator::new(Mimalloc, ThreadOwner);
    }
}

#[derive(Subcommand, Debug)]
pub enum TASubcommand {
    #[command(about = "Allocate from many owners on worker threads and verify the books balance")]
    Stress(StressArgs),
    #[command(about = "Read or change a base allocator tunable")]
    Tunable(TunableArgs),
    #[command(about = "Print accounting totals and base allocator statistics")]
    Stats(StatsArgs),
}

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "tagalloc CLI: per-owner memory accounting over mimalloc

https://github.com/pawurb/tagalloc"
)]
pub struct TAArgs {
    #[command(subcommand)]
    pub cmd: TASubcommand,
}

fn main() -> Result<()> {
    let root_args = TAArgs::parse();

    match root_args.cmd {
        TASubcommand::Stress(args) => args.run()?,
        TASubcommand::Tunable(args) => args.run()?,
        TASubcommand::Stats(args) => args.run()?,
    }

    Ok(())
}
