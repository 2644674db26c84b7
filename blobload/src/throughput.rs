//! This module provides the cumulative throughput of a benchmark phase.
//!
//! A single aggregator per phase consumes the completions of all its workers, so running totals are never shared.

use std::fmt;
use std::time::{Duration, Instant};

use humansize::{format_size, DECIMAL};

use crate::Direction;

/// Running totals of a phase, fed in completion order.
#[derive(Debug)]
pub struct Throughput {
    direction: Direction,
    total: usize,
    completed: usize,
    bytes: u64,
    start: Instant,
}

impl Throughput {
    /// Start aggregating a phase of `total` units started at `start`.
    pub fn new(direction: Direction, total: usize, start: Instant) -> Self {
        Self {
            direction,
            total,
            completed: 0,
            bytes: 0,
            start,
        }
    }

    /// Account for one completed unit.
    pub fn record(&mut self, bytes: u64, now: Instant) -> Observation {
        self.completed += 1;
        self.bytes += bytes;

        Observation {
            direction: self.direction,
            completed: self.completed,
            total: self.total,
            bytes: self.bytes,
            elapsed: now.saturating_duration_since(self.start),
        }
    }

    pub fn summary(&self, now: Instant) -> PhaseSummary {
        PhaseSummary {
            direction: self.direction,
            completed: self.completed,
            bytes: self.bytes,
            elapsed: now.saturating_duration_since(self.start),
        }
    }
}

/// Cumulative state right after a unit completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub direction: Direction,
    pub completed: usize,
    pub total: usize,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl Observation {
    #[inline]
    pub fn bytes_per_second(&self) -> u64 {
        bytes_per_second(self.bytes, self.elapsed)
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<9} [{}/{}] {} size: {}  avg throughput: {}/s",
            self.direction,
            self.completed,
            self.total,
            verb(self.direction),
            format_size(self.bytes, DECIMAL),
            format_size(self.bytes_per_second(), DECIMAL),
        )
    }
}

/// Totals of a completed phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseSummary {
    pub direction: Direction,
    pub completed: usize,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl PhaseSummary {
    #[inline]
    pub fn bytes_per_second(&self) -> u64 {
        bytes_per_second(self.bytes, self.elapsed)
    }
}

impl fmt::Display for PhaseSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} finished: {} units, {} {} in {:.2?}, avg throughput: {}/s",
            self.direction,
            self.completed,
            format_size(self.bytes, DECIMAL),
            verb(self.direction),
            self.elapsed,
            format_size(self.bytes_per_second(), DECIMAL),
        )
    }
}

fn verb(direction: Direction) -> &'static str {
    match direction {
        Direction::Download => "downloaded",
        Direction::Upload => "uploaded",
    }
}

/// Average rate, `0` until some time has elapsed.
fn bytes_per_second(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();

    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}
