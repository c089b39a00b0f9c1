//! Per-method rollups and proportional power attribution
//!
//! A thread's power estimate is split across its methods in proportion to
//! each method's share of the total CPU time observed across all of the
//! thread's invocations. Zero totals and zero cycle durations yield zero
//! power, never an error.

use crate::invocation::MethodInvocation;
use crate::thread_clock::Tid;
use crate::timer::format_nanos;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// Aggregate of every invocation of one method on one thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodStatistics {
    pub thread_id: Tid,
    pub name: String,
    /// Cumulative wall time (nanoseconds)
    pub total_time_ns: u64,
    /// Cumulative CPU time (nanoseconds)
    pub cpu_time_ns: u64,
    pub count: u64,
    pub min_ns: u64,
    pub max_ns: u64,
    pub attributed_power: f64,
}

impl MethodStatistics {
    pub fn new(name: impl Into<String>, thread_id: Tid) -> Self {
        Self {
            thread_id,
            name: name.into(),
            total_time_ns: 0,
            cpu_time_ns: 0,
            count: 0,
            min_ns: 0,
            max_ns: 0,
            attributed_power: 0.0,
        }
    }

    /// Record one invocation's wall time
    pub fn add_time(&mut self, wall_ns: u64) {
        if self.count == 0 {
            self.min_ns = wall_ns;
            self.max_ns = wall_ns;
        } else {
            self.min_ns = self.min_ns.min(wall_ns);
            self.max_ns = self.max_ns.max(wall_ns);
        }
        self.count += 1;
        self.total_time_ns = self.total_time_ns.saturating_add(wall_ns);
    }

    pub fn add_cpu_time(&mut self, cpu_ns: u64) {
        self.cpu_time_ns = self.cpu_time_ns.saturating_add(cpu_ns);
    }

    pub fn avg_ns(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.total_time_ns / self.count
        }
    }

    /// Order by total wall time, heaviest first
    pub fn by_total_time_desc(a: &Self, b: &Self) -> Ordering {
        b.total_time_ns
            .cmp(&a.total_time_ns)
            .then_with(|| a.name.cmp(&b.name))
    }
}

impl fmt::Display for MethodStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} time: {}ms cpu: {}ms (min: {}ms, max: {}ms) - {} invocations, power: {:.6}",
            self.name,
            self.total_time_ns / 1_000_000,
            self.cpu_time_ns / 1_000_000,
            self.min_ns / 1_000_000,
            self.max_ns / 1_000_000,
            self.count,
            self.attributed_power
        )
    }
}

/// `rating × cpu / cycle`, guarded to zero for a zero cycle
pub fn thread_power(power_rating: f64, thread_cpu_ns: u64, cycle_ns: u64) -> f64 {
    if cycle_ns == 0 {
        return 0.0;
    }
    let power = power_rating * thread_cpu_ns as f64 / cycle_ns as f64;
    if power.is_finite() && power > 0.0 {
        power
    } else {
        0.0
    }
}

/// `(cpu / total) × power`, zero when the total is zero
pub fn power_share(cpu_ns: u64, total_cpu_ns: u64, thread_power: f64) -> f64 {
    if total_cpu_ns == 0 {
        return 0.0;
    }
    cpu_ns as f64 / total_cpu_ns as f64 * thread_power
}

/// Fold every invocation recorded under `name` into one aggregate
pub fn fold_method<'a, I>(tid: Tid, name: &str, invocations: I) -> MethodStatistics
where
    I: IntoIterator<Item = &'a MethodInvocation>,
{
    invocations
        .into_iter()
        .fold(MethodStatistics::new(name, tid), |mut stats, inv| {
            stats.add_time(inv.wall_ns());
            stats.add_cpu_time(inv.cpu_ns());
            stats
        })
}

/// Distribute `thread_power` across the aggregates by CPU share
///
/// Returns the total method CPU time used as the denominator.
pub fn attribute_power(stats: &mut HashMap<String, MethodStatistics>, thread_power: f64) -> u64 {
    let total_cpu_ns = stats
        .values()
        .fold(0u64, |acc, s| acc.saturating_add(s.cpu_time_ns));
    for method in stats.values_mut() {
        method.attributed_power = power_share(method.cpu_time_ns, total_cpu_ns, thread_power);
    }
    total_cpu_ns
}

/// Method statistics sorted by total wall time, heaviest first
pub fn sorted_by_total_time(stats: &HashMap<String, MethodStatistics>) -> Vec<MethodStatistics> {
    let mut sorted: Vec<_> = stats.values().cloned().collect();
    sorted.sort_by(MethodStatistics::by_total_time_desc);
    sorted
}

/// Print a per-method summary table to stderr
pub fn print_summary(tid: Tid, stats: &[MethodStatistics]) {
    if stats.is_empty() {
        eprintln!("\nNo method profiling data collected for thread {}.", tid);
        return;
    }

    eprintln!("\n╔════════════════════════════════════════════════════════════════════════════════╗");
    eprintln!("║  Method Power Attribution (thread {:<10})                                    ║", tid);
    eprintln!("╚════════════════════════════════════════════════════════════════════════════════╝");
    eprintln!();
    eprintln!(
        "{:<40} {:>8} {:>12} {:>12} {:>12}",
        "Method", "Calls", "Wall Time", "CPU Time", "Power"
    );
    eprintln!("{}", "─".repeat(88));

    for method in stats {
        eprintln!(
            "{:<40} {:>8} {:>11.6}s {:>11.6}s {:>12.6}",
            method.name,
            method.count,
            method.total_time_ns as f64 / 1e9,
            method.cpu_time_ns as f64 / 1e9,
            method.attributed_power
        );
    }

    eprintln!("{}", "─".repeat(88));
    let slowest = &stats[0];
    eprintln!(
        "Heaviest: {} ({})",
        slowest.name,
        format_nanos(slowest.total_time_ns)
    );
}
