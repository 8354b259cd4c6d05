//! Throughput and failure summary of a benchmark run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use bytesize::ByteSize;
use sketches_ddsketch::DDSketch;
use swiftprof_copier::FailureKind;
use yansi::Paint;

use crate::dispatch::Dispatched;

/// A file that could not be copied.
#[derive(Debug)]
pub struct FailedCopy {
    pub path: PathBuf,
    pub kind: FailureKind,
    pub message: String,
}

/// Totals of a finished run.
pub struct ThroughputReport {
    /// Files handed to a worker.
    pub file_count: u64,
    /// Sum of the local sizes of all handed off files.
    pub total_bytes: u64,
    /// Time from the first handoff until the last worker exited.
    pub elapsed: Duration,
    pub succeeded: u64,
    /// Bytes uploaded by successful copies.
    pub bytes_written: u64,
    pub failures: Vec<FailedCopy>,
    /// Upload latency of successful copies in seconds.
    latency: DDSketch,
}

impl ThroughputReport {
    pub fn new(dispatched: Dispatched, elapsed: Duration) -> Self {
        let mut report = Self {
            file_count: dispatched.file_count,
            total_bytes: dispatched.total_bytes,
            elapsed,
            succeeded: 0,
            bytes_written: 0,
            failures: Vec::new(),
            latency: DDSketch::default(),
        };

        for outcome in dispatched.outcomes {
            match outcome.error {
                None => {
                    report.succeeded += 1;
                    report.bytes_written += outcome.bytes_written;
                    report.latency.add(outcome.elapsed.as_secs_f64());
                }
                Some(err) => report.failures.push(FailedCopy {
                    path: outcome.path,
                    kind: err.kind(),
                    message: err.to_string(),
                }),
            }
        }

        report.failures.sort_by(|a, b| a.path.cmp(&b.path));
        report
    }

    pub fn failed(&self) -> u64 {
        self.failures.len() as u64
    }

    /// Files that were handed off but never reported back, because their worker panicked.
    pub fn lost(&self) -> u64 {
        self.file_count
            .saturating_sub(self.succeeded)
            .saturating_sub(self.failed())
    }

    pub fn failures_by_kind(&self) -> BTreeMap<FailureKind, u64> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.kind).or_default() += 1;
        }
        counts
    }

    /// Attempted bytes per second. Zero if no time elapsed.
    pub fn throughput(&self) -> f64 {
        per_second(self.total_bytes, self.elapsed)
    }

    /// Attempted files per second. Zero if no time elapsed.
    pub fn files_per_second(&self) -> f64 {
        per_second(self.file_count, self.elapsed)
    }

    /// Latency quantile of successful copies, if any succeeded.
    pub fn latency(&self, quantile: f64) -> Option<Duration> {
        self.latency
            .quantile(quantile)
            .ok()
            .flatten()
            .map(Duration::from_secs_f64)
    }

    /// Emits the summary as a single log event.
    pub fn log_summary(&self) {
        tracing::info!(
            file_count = self.file_count,
            total_bytes = self.total_bytes,
            elapsed = ?self.elapsed,
            throughput = %ByteSize::b(self.throughput() as u64),
            succeeded = self.succeeded,
            failed = self.failed(),
            lost = self.lost(),
            "benchmark finished"
        );
    }

    /// Prints the report to stdout.
    pub fn print(&self) {
        println!();
        println!(
            "{} ({} files, {})",
            "## COPY".bold(),
            self.file_count.bold(),
            ByteSize::b(self.total_bytes).bold()
        );
        println!(
            "  {:.2} files/s, {}/s in {:.2?}",
            self.files_per_second().bold(),
            ByteSize::b(self.throughput() as u64).bold(),
            self.elapsed
        );

        if let (Some(p50), Some(p90), Some(p99)) =
            (self.latency(0.5), self.latency(0.9), self.latency(0.99))
        {
            println!("  latency p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}");
        }

        println!(
            "  {} succeeded ({})",
            self.succeeded.green(),
            ByteSize::b(self.bytes_written)
        );

        if self.failures.is_empty() && self.lost() == 0 {
            return;
        }

        println!(
            "{}",
            format!("{} FAILURES", self.failed()).bold().red()
        );
        for (kind, count) in self.failures_by_kind() {
            println!("  {kind}: {}", count.bold());
        }
        if self.lost() > 0 {
            println!("  lost to worker panics: {}", self.lost().bold());
        }
        for failure in &self.failures {
            println!(
                "  {} ({}): {}",
                failure.path.display(),
                failure.kind,
                failure.message
            );
        }
    }
}

impl fmt::Debug for ThroughputReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThroughputReport")
            .field("file_count", &self.file_count)
            .field("total_bytes", &self.total_bytes)
            .field("elapsed", &self.elapsed)
            .field("succeeded", &self.succeeded)
            .field("bytes_written", &self.bytes_written)
            .field("failures", &self.failures)
            .finish_non_exhaustive()
    }
}

fn per_second(total: u64, elapsed: Duration) -> f64 {
    if elapsed.is_zero() {
        return 0.0;
    }
    total as f64 / elapsed.as_secs_f64()
}
