use embassy_time::{Duration, Instant};
use heapless::Vec;

use super::CHART_WINDOW;

/// Fixed-capacity, time-gated FIFO of recent values for one metric.
///
/// Appends closer together than `window / N` are dropped so the buffer
/// always spans the same wall-clock duration no matter how often the metric
/// arrives. Once full, the oldest sample is evicted for each new one.
///
/// `min`/`max` are running extremes over every sample ever stored. They
/// never shrink, even after the extreme sample has been evicted.
#[derive(Debug, Clone)]
pub struct HistoryBuffer<const N: usize> {
    samples: Vec<f32, N>,
    last_added: Option<Instant>,
    min_spacing: Duration,
    range: Option<(f32, f32)>,
}

/// Read-only view handed to the chart renderer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartSnapshot<'a> {
    /// Samples oldest to newest
    pub samples: &'a [f32],
    pub min: f32,
    pub max: f32,
}

impl ChartSnapshot<'_> {
    /// With fewer than two samples the chart is a single point, not a line.
    pub fn is_single_point(&self) -> bool {
        self.samples.len() < 2
    }
}

impl<const N: usize> HistoryBuffer<N> {
    /// Empty history covering [`CHART_WINDOW`].
    pub fn new() -> Self {
        Self::with_window(CHART_WINDOW)
    }

    /// Empty history whose `N` slots cover `window`.
    pub fn with_window(window: Duration) -> Self {
        let slots = if N == 0 { 1 } else { N as u64 };
        Self {
            samples: Vec::new(),
            last_added: None,
            min_spacing: Duration::from_ticks(window.as_ticks() / slots),
            range: None,
        }
    }

    /// Seed the chart scale so early charts are not zoomed onto a single
    /// value. The seeded range only ever widens.
    pub fn with_initial_range(mut self, min: f32, max: f32) -> Self {
        self.range = Some((min, max));
        self
    }

    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Store `value` if the spacing since the last stored sample allows it.
    ///
    /// Returns whether the sample was stored. Non-finite values are never
    /// stored.
    pub fn append(&mut self, value: f32, now: Instant) -> bool {
        if !value.is_finite() {
            return false;
        }
        if let Some(last) = self.last_added {
            if now < last || now - last < self.min_spacing {
                return false;
            }
        }
        if N == 0 {
            return false;
        }

        if self.samples.is_full() {
            self.samples.remove(0);
        }
        // Cannot fail: a slot was freed above if the buffer was full.
        let _ = self.samples.push(value);
        self.last_added = Some(now);

        self.range = Some(match self.range {
            Some((min, max)) => (min.min(value), max.max(value)),
            None => (value, value),
        });
        true
    }

    /// Samples oldest to newest.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn min(&self) -> Option<f32> {
        self.range.map(|(min, _)| min)
    }

    pub fn max(&self) -> Option<f32> {
        self.range.map(|(_, max)| max)
    }

    /// Chart view, `None` until there is both a sample and a scale.
    pub fn snapshot(&self) -> Option<ChartSnapshot<'_>> {
        if self.samples.is_empty() {
            return None;
        }
        let (min, max) = self.range?;
        Some(ChartSnapshot {
            samples: &self.samples,
            min,
            max,
        })
    }
}

impl<const N: usize> Default for HistoryBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
