// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Percentile Estimator
//!
//! Timestamped latency samples folded into a [`TieredRing`] of slots, each
//! holding exact count/sum/min/max plus a [`DDSketch`]. A window query merges
//! the slots that end inside the window.
//!
//! Accuracy: count, average, min and max are exact over the slots included
//! in the window. Quantiles carry the sketch's relative error (`alpha`,
//! default 1%) and are clamped to the exact min/max. Window edges are
//! resolved to slot boundaries (see [`crate::ring`]).

use crate::ring::{Mergeable, RingLayout, TieredRing};
use crate::sketches::DDSketch;

/// One slot of latency samples.
#[derive(Debug, Clone)]
pub struct LatencySlot {
    count: u64,
    sum_ms: f64,
    min_ms: f64,
    max_ms: f64,
    sketch: DDSketch,
}

impl LatencySlot {
    pub fn new(alpha: f64) -> Self {
        Self {
            count: 0,
            sum_ms: 0.0,
            min_ms: f64::INFINITY,
            max_ms: 0.0,
            sketch: DDSketch::new(alpha),
        }
    }

    #[inline]
    fn record(&mut self, value_ms: f64) {
        self.count += 1;
        self.sum_ms += value_ms;
        self.min_ms = self.min_ms.min(value_ms);
        self.max_ms = self.max_ms.max(value_ms);
        self.sketch.add(value_ms);
    }
}

impl Mergeable for LatencySlot {
    fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        self.count += other.count;
        self.sum_ms += other.sum_ms;
        self.min_ms = self.min_ms.min(other.min_ms);
        self.max_ms = self.max_ms.max(other.max_ms);
        self.sketch.merge(&other.sketch);
    }
}

/// Latency statistics over one window.
#[derive(Debug, Clone)]
pub struct LatencySummary {
    inner: LatencySlot,
}

impl LatencySummary {
    pub fn empty(alpha: f64) -> Self {
        Self {
            inner: LatencySlot::new(alpha),
        }
    }

    pub fn count(&self) -> u64 {
        self.inner.count
    }

    pub fn is_empty(&self) -> bool {
        self.inner.count == 0
    }

    pub fn sum_ms(&self) -> f64 {
        self.inner.sum_ms
    }

    pub fn avg_ms(&self) -> f64 {
        if self.inner.count == 0 {
            0.0
        } else {
            self.inner.sum_ms / self.inner.count as f64
        }
    }

    pub fn min_ms(&self) -> f64 {
        if self.inner.count == 0 {
            0.0
        } else {
            self.inner.min_ms
        }
    }

    pub fn max_ms(&self) -> f64 {
        if self.inner.count == 0 {
            0.0
        } else {
            self.inner.max_ms
        }
    }

    /// Approximate quantile, clamped to the exact min/max. 0 when empty.
    pub fn quantile(&self, q: f64) -> f64 {
        if self.inner.count == 0 {
            return 0.0;
        }
        self.inner
            .sketch
            .quantile(q)
            .clamp(self.inner.min_ms, self.inner.max_ms)
    }

    pub fn p50(&self) -> f64 {
        self.quantile(0.50)
    }

    pub fn p95(&self) -> f64 {
        self.quantile(0.95)
    }

    pub fn merge(&mut self, other: &LatencySummary) {
        self.inner.merge(&other.inner);
    }
}

/// Aggregated latency over one series bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyPoint {
    pub start_us: u64,
    pub count: u64,
    pub avg_ms: f64,
}

/// Bounded-memory latency estimator for one tool (or the all-tools view).
#[derive(Debug, Clone)]
pub struct PercentileEstimator {
    ring: TieredRing<LatencySlot>,
    alpha: f64,
}

impl PercentileEstimator {
    pub fn new(layout: RingLayout, alpha: f64) -> Self {
        Self {
            ring: TieredRing::new(layout),
            alpha,
        }
    }

    /// Record one sample. Returns false when the sample is older than the
    /// retained horizon and was dropped.
    pub fn ingest(&mut self, value_ms: f64, ts_us: u64, now_us: u64) -> bool {
        let value_ms = if value_ms.is_finite() { value_ms.max(0.0) } else { 0.0 };
        let alpha = self.alpha;
        match self.ring.slot_mut(ts_us, now_us, || LatencySlot::new(alpha)) {
            Some(slot) => {
                slot.record(value_ms);
                true
            }
            None => false,
        }
    }

    /// Summary of slots ending in `(after_us, until_us]`.
    pub fn summary(&self, after_us: u64, until_us: u64) -> LatencySummary {
        let mut inner = LatencySlot::new(self.alpha);
        for slot in self.ring.iter_ending_in(after_us, until_us) {
            inner.merge(slot);
        }
        LatencySummary { inner }
    }

    /// Summary of everything newer than `lookback_start_us`.
    pub fn summary_since(&self, lookback_start_us: u64) -> LatencySummary {
        self.summary(lookback_start_us, u64::MAX)
    }

    pub fn quantile_since(&self, q: f64, lookback_start_us: u64) -> f64 {
        self.summary_since(lookback_start_us).quantile(q)
    }

    /// Non-empty buckets of `bucket_us` width since `lookback_start_us`,
    /// oldest first.
    pub fn series_since(&self, lookback_start_us: u64, bucket_us: u64) -> Vec<LatencyPoint> {
        let bucket_us = bucket_us.max(1);
        let mut points: Vec<LatencyPoint> = Vec::new();
        let mut sums: Vec<f64> = Vec::new();
        for (start_us, slot) in self.ring.iter_slots(lookback_start_us, u64::MAX) {
            if slot.count == 0 {
                continue;
            }
            let bucket = start_us - start_us % bucket_us;
            match points.binary_search_by_key(&bucket, |p| p.start_us) {
                Ok(i) => {
                    points[i].count += slot.count;
                    sums[i] += slot.sum_ms;
                }
                Err(i) => {
                    points.insert(
                        i,
                        LatencyPoint {
                            start_us: bucket,
                            count: slot.count,
                            avg_ms: 0.0,
                        },
                    );
                    sums.insert(i, slot.sum_ms);
                }
            }
        }
        for (point, sum) in points.iter_mut().zip(sums) {
            point.avg_ms = sum / point.count as f64;
        }
        points
    }

    pub fn compact(&mut self, now_us: u64) -> usize {
        self.ring.compact(now_us)
    }

    pub fn slot_counts(&self) -> (usize, usize) {
        self.ring.slot_counts()
    }

    pub fn memory_usage(&self) -> usize {
        self.ring
            .iter_ending_in(0, u64::MAX)
            .map(|s| std::mem::size_of::<LatencySlot>() + s.sketch.memory_usage())
            .sum()
    }
}
