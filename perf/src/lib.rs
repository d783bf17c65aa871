//! Measurement helpers shared by the ring benches and the `perf_report` binary.

use serde::Serialize;
use std::time::Instant;
use zero_events::Tick;

/// Latency distribution of one measurement, in whatever unit the samples use.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LatencyStats {
    pub samples: usize,
    pub min: u64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub p999: u64,
    pub max: u64,
    pub mean: f64,
}

impl LatencyStats {
    /// Sorts `samples` in place and summarizes them. `None` if there are none.
    pub fn from_samples(samples: &mut [u64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        samples.sort_unstable();
        let total: u128 = samples.iter().map(|&s| s as u128).sum();
        Some(Self {
            samples: samples.len(),
            min: samples[0],
            p50: nearest_rank(samples, 0.50),
            p90: nearest_rank(samples, 0.90),
            p99: nearest_rank(samples, 0.99),
            p999: nearest_rank(samples, 0.999),
            max: samples[samples.len() - 1],
            mean: total as f64 / samples.len() as f64,
        })
    }
}

/// Nearest-rank quantile of an ascending, non-empty slice.
fn nearest_rank(sorted: &[u64], q: f64) -> u64 {
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// One named row of the report.
#[derive(Debug, Clone, Serialize)]
pub struct Measurement {
    pub name: String,
    pub unit: &'static str,
    pub stats: LatencyStats,
}

impl Measurement {
    pub fn print_row(&self) {
        let s = &self.stats;
        println!(
            "  {:<32} {:>7} {:>7} {:>7} {:>7} {:>7} {:>8}  {}",
            self.name, s.min, s.p50, s.p90, s.p99, s.p999, s.max, self.unit
        );
    }
}

/// Runs `op` in `rounds` timed rounds of `per_round` calls each, after one
/// untimed round, and reports the average cost of a call per round.
///
/// Single stage/commit calls are far below timer resolution, so they are
/// only ever timed in bulk.
pub fn time_per_op(
    name: &str,
    rounds: usize,
    per_round: usize,
    mut op: impl FnMut(),
) -> Measurement {
    let per_round = per_round.max(1);
    for _ in 0..per_round {
        op();
    }

    let mut samples: Vec<u64> = (0..rounds.max(1))
        .map(|_| {
            let t = Instant::now();
            for _ in 0..per_round {
                op();
            }
            (t.elapsed().as_nanos() / per_round as u128).max(1) as u64
        })
        .collect();

    Measurement {
        name: name.to_string(),
        unit: "ns/op",
        stats: LatencyStats::from_samples(&mut samples).unwrap_or_default(),
    }
}

pub fn print_header(title: &str) {
    println!("\n== {title} ==");
    println!(
        "  {:<32} {:>7} {:>7} {:>7} {:>7} {:>7} {:>8}  unit",
        "", "min", "p50", "p90", "p99", "p99.9", "max"
    );
}

/// Counters from `getrusage(RUSAGE_SELF)`.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Rusage {
    pub max_rss_kib: i64,
    pub minor_faults: i64,
    pub major_faults: i64,
    pub voluntary_switches: i64,
    pub involuntary_switches: i64,
}

impl Rusage {
    pub fn now() -> Self {
        // SAFETY: rusage is plain data and getrusage only writes into it.
        let mut ru: libc::rusage = unsafe { std::mem::zeroed() };
        if unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut ru) } != 0 {
            return Self::default();
        }
        Self {
            max_rss_kib: ru.ru_maxrss,
            minor_faults: ru.ru_minflt,
            major_faults: ru.ru_majflt,
            voluntary_switches: ru.ru_nvcsw,
            involuntary_switches: ru.ru_nivcsw,
        }
    }

    /// Counter growth since `earlier`. Peak RSS is carried over, not subtracted.
    pub fn since(&self, earlier: &Self) -> Self {
        Self {
            max_rss_kib: self.max_rss_kib,
            minor_faults: self.minor_faults - earlier.minor_faults,
            major_faults: self.major_faults - earlier.major_faults,
            voluntary_switches: self.voluntary_switches - earlier.voluntary_switches,
            involuntary_switches: self.involuntary_switches - earlier.involuntary_switches,
        }
    }
}

/// CLOCK_MONOTONIC in nanoseconds. Comparable across threads and processes
/// on the same host, which `Instant` does not promise for raw values.
#[inline(always)]
pub fn mono_now_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: ts is a valid out-parameter.
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}

pub fn sample_tick(seq: u64) -> Tick {
    Tick::new(seq, mono_now_ns())
}

/// `1234567` → `1.23M`.
pub fn human_count(n: u64) -> String {
    match n {
        0..1_000 => n.to_string(),
        1_000..1_000_000 => format!("{:.1}K", n as f64 / 1e3),
        _ => format!("{:.2}M", n as f64 / 1e6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_over_one_to_hundred() {
        let mut samples: Vec<u64> = (1..=100).rev().collect();
        let s = LatencyStats::from_samples(&mut samples).unwrap();
        assert_eq!((s.min, s.max), (1, 100));
        assert_eq!((s.p50, s.p90, s.p99, s.p999), (50, 90, 99, 100));
        assert_eq!(s.samples, 100);
        assert!((s.mean - 50.5).abs() < 1e-9);
    }

    #[test]
    fn no_samples_no_stats() {
        assert!(LatencyStats::from_samples(&mut []).is_none());
    }

    #[test]
    fn single_sample_fills_every_quantile() {
        let s = LatencyStats::from_samples(&mut [7]).unwrap();
        assert_eq!((s.min, s.p50, s.p999, s.max), (7, 7, 7, 7));
    }

    #[test]
    fn time_per_op_runs_every_round() {
        let mut calls = 0usize;
        let m = time_per_op("count", 5, 10, || calls += 1);
        assert_eq!(calls, 60);
        assert_eq!(m.stats.samples, 5);
        assert!(m.stats.min >= 1);
    }

    #[test]
    fn human_count_scales() {
        assert_eq!(human_count(999), "999");
        assert_eq!(human_count(1_500), "1.5K");
        assert_eq!(human_count(2_500_000), "2.50M");
    }

    #[test]
    fn rusage_delta_keeps_peak() {
        let a = Rusage {
            max_rss_kib: 10,
            minor_faults: 5,
            ..Default::default()
        };
        let b = Rusage {
            max_rss_kib: 20,
            minor_faults: 8,
            ..Default::default()
        };
        let d = b.since(&a);
        assert_eq!((d.max_rss_kib, d.minor_faults), (20, 3));
    }
}
