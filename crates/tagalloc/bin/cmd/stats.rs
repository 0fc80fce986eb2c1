use clap::Parser;
use eyre::{Result, eyre};
use tagalloc::{Format, ReportConfig, dump_base_stats, print_report};

/// Reports on this process: handy for checking that the layer is wired in
/// and for seeing what the base allocator prints.
#[derive(Debug, Parser)]
pub struct StatsArgs {
    #[arg(long, value_enum, help = "Report format (default: TAGALLOC_FORMAT or table)")]
    format: Option<Format>,

    #[arg(long, help = "Also dump the base allocator's own statistics to stderr")]
    base: bool,
}

impl StatsArgs {
    pub fn run(&self) -> Result<()> {
        let mut config = ReportConfig::from_env();
        if let Some(format) = self.format {
            config.format = format;
        }

        print_report(&config).map_err(|e| eyre!("failed to print report: {}", e))?;

        if self.base {
            dump_base_stats();
        }
        Ok(())
    }
}
