use crate::config::Format;
use crate::ledger::Ledger;
use crate::owner::OwnerId;
use colored::*;
use prettytable::{Attr, Cell, Row, Table, color};
use serde::{Deserialize, Serialize};
use std::error::Error;

/// Approximate bytes held by one owner, as recorded in its slot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OwnerUsage {
    pub owner: OwnerId,
    pub slot: usize,
    pub bytes: i64,
}

/// Snapshot of a ledger for display or export.
///
/// `live_bytes` and `live_blocks` are exact. Owner rows come from the slot
/// table and are approximate; `attributed_bytes` sums every owned slot, even
/// those cut off by the row limit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MemoryReport {
    pub live_bytes: u64,
    pub live_blocks: u64,
    pub attributed_bytes: i64,
    pub total_owners: usize,
    pub owners: Vec<OwnerUsage>,
}

impl MemoryReport {
    /// Captures `ledger`, keeping the `limit` largest owners (0 keeps all).
    pub fn capture(ledger: &Ledger, limit: usize) -> Self {
        let mut owners: Vec<OwnerUsage> = ledger
            .owned_slots()
            .map(|usage| OwnerUsage {
                owner: usage.owner,
                slot: usage.index,
                bytes: usage.balance as i64,
            })
            .collect();

        let attributed_bytes = owners.iter().map(|o| o.bytes).sum();
        let total_owners = owners.len();

        owners.sort_by(|a, b| b.bytes.cmp(&a.bytes).then(a.owner.cmp(&b.owner)));
        if limit > 0 {
            owners.truncate(limit);
        }

        Self {
            live_bytes: ledger.live_bytes() as u64,
            live_blocks: ledger.live_blocks() as u64,
            attributed_bytes,
            total_owners,
            owners,
        }
    }

    pub fn owner(&self, owner: OwnerId) -> Option<&OwnerUsage> {
        self.owners.iter().find(|o| o.owner == owner)
    }

    fn share_of_live(&self, bytes: i64) -> f64 {
        if self.live_bytes == 0 || bytes <= 0 {
            0.0
        } else {
            bytes as f64 / self.live_bytes as f64 * 100.0
        }
    }
}

/// Renders a [`MemoryReport`].
///
/// # Examples
///
/// ```rust
/// use tagalloc::{MemoryReport, Reporter};
/// use std::error::Error;
///
/// struct OneLine;
///
/// impl Reporter for OneLine {
///     fn report(&self, report: &MemoryReport) -> Result<(), Box<dyn Error>> {
///         println!("{} bytes in {} blocks", report.live_bytes, report.live_blocks);
///         Ok(())
///     }
/// }
/// ```
pub trait Reporter {
    fn report(&self, report: &MemoryReport) -> Result<(), Box<dyn Error>>;
}

pub fn reporter_for(format: Format) -> Box<dyn Reporter> {
    match format {
        Format::Table => Box::new(TableReporter),
        Format::Json => Box::new(JsonReporter),
        Format::JsonPretty => Box::new(JsonPrettyReporter),
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log(THRESHOLD).floor() as usize).min(UNITS.len() - 1);
    let unit_value = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", unit_value, UNITS[unit_index])
    }
}

/// Like [`format_bytes`], keeping the sign of drained-below-zero balances.
pub fn format_signed_bytes(bytes: i64) -> String {
    if bytes < 0 {
        format!("-{}", format_bytes(bytes.unsigned_abs()))
    } else {
        format_bytes(bytes as u64)
    }
}

pub(crate) fn build_table(report: &MemoryReport, use_colors: bool) -> Table {
    let mut table = Table::new();

    let header_cells: Vec<Cell> = ["Owner", "Slot", "Bytes", "% Live"]
        .into_iter()
        .map(|header| {
            if use_colors {
                Cell::new(header)
                    .with_style(Attr::Bold)
                    .with_style(Attr::ForegroundColor(color::CYAN))
            } else {
                Cell::new(header).with_style(Attr::Bold)
            }
        })
        .collect();
    table.add_row(Row::new(header_cells));

    for usage in &report.owners {
        table.add_row(Row::new(vec![
            Cell::new(&usage.owner.to_string()),
            Cell::new(&format!("{:#06x}", usage.slot)),
            Cell::new(&format_signed_bytes(usage.bytes)),
            Cell::new(&format!("{:.2}%", report.share_of_live(usage.bytes))),
        ]));
    }

    table
}

pub struct TableReporter;

impl Reporter for TableReporter {
    fn report(&self, report: &MemoryReport) -> Result<(), Box<dyn Error>> {
        let use_colors = std::env::var("NO_COLOR").is_err();

        println!(
            "{} {} live in {} blocks",
            "[tagalloc]".blue().bold(),
            format_bytes(report.live_bytes).yellow().bold(),
            report.live_blocks
        );

        if report.owners.is_empty() {
            println!("No owner has attributed memory.");
            return Ok(());
        }

        build_table(report, use_colors).printstd();

        if report.owners.len() < report.total_owners {
            println!(
                "({}/{} owners shown)",
                report.owners.len(),
                report.total_owners
            );
        }
        println!("+total: {}", format_signed_bytes(report.attributed_bytes));
        Ok(())
    }
}

pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn report(&self, report: &MemoryReport) -> Result<(), Box<dyn Error>> {
        println!("{}", serde_json::to_string(report)?);
        Ok(())
    }
}

pub struct JsonPrettyReporter;

impl Reporter for JsonPrettyReporter {
    fn report(&self, report: &MemoryReport) -> Result<(), Box<dyn Error>> {
        println!("{}", serde_json::to_string_pretty(report)?);
        Ok(())
    }
}
