//! # Perf Statistics
//!
//! Rolling window of runner durations.

use crate::lock;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

pub const DEFAULT_WINDOW: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PerfSummary {
    pub last: Duration,
    pub average: Duration,
    pub samples: usize,
}

#[derive(Debug)]
pub struct PerfStat {
    window: usize,
    inner: Mutex<PerfWindow>,
}

#[derive(Debug, Default)]
struct PerfWindow {
    samples: VecDeque<Duration>,
    total: Duration,
    last: Duration,
}

impl Default for PerfStat {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl PerfStat {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            inner: Mutex::new(PerfWindow::default()),
        }
    }

    pub fn record(&self, elapsed: Duration) {
        let mut inner = lock(&self.inner);
        inner.last = elapsed;
        inner.total += elapsed;
        inner.samples.push_back(elapsed);
        if inner.samples.len() > self.window {
            if let Some(evicted) = inner.samples.pop_front() {
                inner.total -= evicted;
            }
        }
    }

    pub fn summary(&self) -> PerfSummary {
        let inner = lock(&self.inner);
        let samples = inner.samples.len();
        let average = match u32::try_from(samples) {
            Ok(n) if n > 0 => inner.total / n,
            _ => Duration::ZERO,
        };
        PerfSummary {
            last: inner.last,
            average,
            samples,
        }
    }
}
