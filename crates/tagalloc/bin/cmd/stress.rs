use clap::Parser;
use colored::Colorize;
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use eyre::{Result, eyre};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::thread;
use tagalloc::{
    Format, LEDGER, MemoryReport, OwnerId, OwnerScope, ReportConfig, output::format_bytes,
    reporter_for, start_metrics_server,
};

/// Stress owners live in their own id range, starting at slot 1 so they never
/// share slot 0 with unowned allocations.
const OWNER_BASE: u32 = 0x5700_0001;

#[derive(Debug, Parser)]
pub struct StressArgs {
    #[arg(long, default_value_t = 8, help = "Worker threads")]
    workers: usize,

    #[arg(long, default_value_t = 64, help = "Distinct owners to allocate for")]
    owners: u32,

    #[arg(long, default_value_t = 2_000, help = "Allocations per job")]
    allocations: usize,

    #[arg(long, default_value_t = 4, help = "Jobs queued per owner")]
    rounds: usize,

    #[arg(long, default_value_t = 4096, help = "Largest single allocation in bytes")]
    max_size: usize,

    #[arg(long, help = "Seed for reproducible runs")]
    seed: Option<u64>,

    #[arg(long, value_enum, help = "Report format (default: TAGALLOC_FORMAT or table)")]
    format: Option<Format>,

    #[arg(long, help = "Show only the N largest owners")]
    limit: Option<usize>,

    #[arg(long, help = "Serve the ledger over HTTP while the run is in progress")]
    http_port: Option<u16>,
}

struct Job {
    owner: OwnerId,
    allocations: usize,
    seed: u64,
}

/// Buffers a job keeps alive until every worker is done, so the report shows
/// live per-owner balances.
type Retained = Vec<Vec<u8>>;

impl StressArgs {
    pub fn run(&self) -> Result<()> {
        if self.workers == 0 || self.owners == 0 {
            return Err(eyre!("--workers and --owners must be at least 1"));
        }
        if self.owners > u16::MAX as u32 {
            return Err(eyre!("--owners must be at most {}", u16::MAX));
        }

        let mut config = ReportConfig::from_env();
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(limit) = self.limit {
            config.limit = limit;
        }
        if let Some(port) = self.http_port.or(config.http_port) {
            start_metrics_server(port, &LEDGER);
        }

        let seed = self.seed.unwrap_or_else(|| rand::thread_rng().r#gen());
        let baseline = LEDGER.live_bytes();
        let start = quanta::Instant::now();

        let (job_tx, job_rx) = bounded::<Job>(self.workers * 2);
        let (retained_tx, retained_rx) = unbounded::<Retained>();

        let handles = (0..self.workers)
            .map(|i| {
                let job_rx = job_rx.clone();
                let retained_tx = retained_tx.clone();
                let max_size = self.max_size.max(1);
                thread::Builder::new()
                    .name(format!("tagalloc-stress-{}", i))
                    .spawn(move || worker(job_rx, retained_tx, max_size))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| eyre!("failed to spawn stress worker: {}", e))?;
        drop(job_rx);
        drop(retained_tx);

        for round in 0..self.rounds {
            for i in 0..self.owners {
                let job = Job {
                    owner: OwnerId::new(OWNER_BASE + i),
                    allocations: self.allocations,
                    seed: seed ^ (((round as u64) << 32) | i as u64),
                };
                job_tx.send(job).map_err(|_| eyre!("stress workers exited early"))?;
            }
        }
        drop(job_tx);

        let retained: Vec<Retained> = retained_rx.iter().collect();
        for handle in handles {
            handle
                .join()
                .map_err(|_| eyre!("a stress worker panicked"))?;
        }
        let elapsed = start.elapsed();

        let report = MemoryReport::capture(&LEDGER, config.limit);
        println!(
            "{} {} jobs on {} workers in {:.2?} (seed {})",
            "[tagalloc]".blue().bold(),
            self.owners as usize * self.rounds,
            self.workers,
            elapsed,
            seed
        );
        reporter_for(config.format)
            .report(&report)
            .map_err(|e| eyre!("failed to print report: {}", e))?;

        let retained_buffers: usize = retained.iter().map(Vec::len).sum();
        drop(retained);

        let unbalanced: Vec<(OwnerId, isize)> = (0..self.owners)
            .map(|i| OwnerId::new(OWNER_BASE + i))
            .filter_map(|owner| match LEDGER.owner_balance(owner) {
                Some(0) | None => None,
                Some(balance) => Some((owner, balance)),
            })
            .collect();

        if !unbalanced.is_empty() {
            for (owner, balance) in &unbalanced {
                eprintln!(
                    "{} owner {} still holds {} bytes",
                    "[tagalloc]".red().bold(),
                    owner,
                    balance
                );
            }
            return Err(eyre!("{} owners did not return to zero", unbalanced.len()));
        }

        println!(
            "{} released {} retained buffers, {} live ({} at start)",
            "[tagalloc]".green().bold(),
            retained_buffers,
            format_bytes(LEDGER.live_bytes() as u64),
            format_bytes(baseline as u64)
        );
        Ok(())
    }
}

fn worker(jobs: Receiver<Job>, retained: Sender<Retained>, max_size: usize) {
    for job in jobs {
        let mut rng = StdRng::seed_from_u64(job.seed);
        let buffers = {
            let _scope = OwnerScope::enter(job.owner);
            churn(&mut rng, job.allocations, max_size)
        };
        // Sent outside the scope: the channel's own blocks stay unattributed.
        if retained.send(buffers).is_err() {
            return;
        }
    }
}

/// Allocates, grows and frees buffers at random, returning the survivors.
fn churn(rng: &mut StdRng, allocations: usize, max_size: usize) -> Vec<Vec<u8>> {
    let mut live: Vec<Vec<u8>> = Vec::with_capacity(64);
    for _ in 0..allocations {
        match rng.gen_range(0..10) {
            0..=5 => live.push(vec![0xA5; rng.gen_range(1..=max_size)]),
            6 | 7 if !live.is_empty() => {
                let idx = rng.gen_range(0..live.len());
                live.swap_remove(idx);
            }
            8 if !live.is_empty() => {
                let idx = rng.gen_range(0..live.len());
                let extra = rng.gen_range(1..=max_size);
                live[idx].extend(std::iter::repeat_n(0x5A, extra));
            }
            _ => {
                if let Some(buffer) = live.last_mut() {
                    buffer.truncate(buffer.len() / 2);
                    buffer.shrink_to_fit();
                }
            }
        }
    }
    live.truncate(16);
    live
}
