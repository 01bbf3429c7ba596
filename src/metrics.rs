//! Per-frame processing time accounting.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Frames kept in the rolling window by default.
pub const DEFAULT_HISTORY: usize = 60;

/// One processed frame's timing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceSample {
    pub recorded_at: Instant,
    pub duration: Duration,
}

/// Snapshot of the tracker, as polled by diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PerformanceStats {
    pub last: Duration,
    pub average: Duration,
    pub frame_count: u64,
}

impl PerformanceStats {
    /// Frames per second the average processing time would sustain.
    pub fn sustainable_fps(&self) -> f64 {
        let secs = self.average.as_secs_f64();
        if secs > 0.0 {
            1.0 / secs
        } else {
            0.0
        }
    }
}

/// Rolling window of processing times.
///
/// The window total is maintained incrementally, so recording a sample
/// is O(1) regardless of capacity.
#[derive(Debug, Clone)]
pub struct PerformanceTracker {
    capacity: usize,
    history: VecDeque<PerformanceSample>,
    window_total: Duration,
    frame_count: u64,
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

impl PerformanceTracker {
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            history: VecDeque::with_capacity(capacity),
            window_total: Duration::ZERO,
            frame_count: 0,
        }
    }

    pub fn record_sample(&mut self, duration: Duration) {
        if self.history.len() == self.capacity {
            if let Some(evicted) = self.history.pop_front() {
                self.window_total -= evicted.duration;
            }
        }
        self.history.push_back(PerformanceSample {
            recorded_at: Instant::now(),
            duration,
        });
        self.window_total += duration;
        self.frame_count += 1;
    }

    pub fn last(&self) -> Duration {
        self.history
            .back()
            .map(|sample| sample.duration)
            .unwrap_or_default()
    }

    /// Mean over the samples currently in the window.
    pub fn average(&self) -> Duration {
        match u32::try_from(self.history.len()) {
            Ok(0) => Duration::ZERO,
            Ok(len) => self.window_total / len,
            Err(_) => Duration::from_secs_f64(
                self.window_total.as_secs_f64() / self.history.len() as f64,
            ),
        }
    }

    /// Frames recorded since construction or the last reset.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn samples(&self) -> impl Iterator<Item = &PerformanceSample> {
        self.history.iter()
    }

    pub fn stats(&self) -> PerformanceStats {
        PerformanceStats {
            last: self.last(),
            average: self.average(),
            frame_count: self.frame_count,
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.window_total = Duration::ZERO;
        self.frame_count = 0;
    }
}
