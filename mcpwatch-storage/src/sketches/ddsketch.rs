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

//! DDSketch - Relative-Error Quantile Sketch
//!
//! A streaming quantile sketch with:
//! - O(log b) insert where b = number of non-empty buckets
//! - O(b) quantile query
//! - Relative error guarantee: every quantile estimate `x'` of a true
//!   sample `x` satisfies `|x' - x| <= alpha * x`
//! - Fully mergeable (bucket-wise addition), so per-slot sketches can be
//!   combined into any window at read time
//!
//! Reference: Masson, Rim, Lee. "DDSketch: A Fast and Fully-Mergeable
//! Quantile Sketch with Relative-Error Guarantees" (VLDB 2019).
//!
//! Buckets are sparse: a latency stream between 1ms and 10s at alpha = 0.01
//! touches at most ~460 buckets. The bucket count is additionally capped;
//! when the cap is hit the lowest buckets are collapsed together, which
//! only degrades accuracy for the smallest values.

use std::collections::BTreeMap;

/// Values at or below this are counted in the zero bucket.
const MIN_INDEXABLE: f64 = 1e-9;

/// Default bucket cap.
pub const DEFAULT_MAX_BUCKETS: usize = 2048;

#[derive(Debug, Clone)]
pub struct DDSketch {
    alpha: f64,
    gamma: f64,
    ln_gamma: f64,
    max_buckets: usize,
    buckets: BTreeMap<i32, u64>,
    zero_count: u64,
    count: u64,
}

impl DDSketch {
    /// Create with relative accuracy `alpha`, clamped into (0, 1).
    pub fn new(alpha: f64) -> Self {
        Self::with_max_buckets(alpha, DEFAULT_MAX_BUCKETS)
    }

    pub fn with_max_buckets(alpha: f64, max_buckets: usize) -> Self {
        let alpha = if alpha.is_finite() {
            alpha.clamp(1e-6, 0.5)
        } else {
            0.01
        };
        let gamma = (1.0 + alpha) / (1.0 - alpha);
        Self {
            alpha,
            gamma,
            ln_gamma: gamma.ln(),
            max_buckets: max_buckets.max(16),
            buckets: BTreeMap::new(),
            zero_count: 0,
            count: 0,
        }
    }

    pub fn relative_accuracy(&self) -> f64 {
        self.alpha
    }

    #[inline]
    fn index(&self, value: f64) -> i32 {
        (value.ln() / self.ln_gamma).ceil() as i32
    }

    /// Representative value of bucket `i`: the midpoint (in relative terms)
    /// of `(gamma^(i-1), gamma^i]`.
    #[inline]
    fn value_at(&self, index: i32) -> f64 {
        2.0 * self.gamma.powi(index) / (self.gamma + 1.0)
    }

    /// Add one sample. Negative and NaN samples count as zero.
    pub fn add(&mut self, value: f64) {
        self.add_n(value, 1);
    }

    pub fn add_n(&mut self, value: f64, n: u64) {
        if n == 0 {
            return;
        }
        self.count += n;
        if !(value > MIN_INDEXABLE) {
            self.zero_count += n;
            return;
        }
        let idx = self.index(value);
        *self.buckets.entry(idx).or_insert(0) += n;
        self.collapse_if_needed();
    }

    /// Bucket-wise merge. Both sketches should share the same accuracy;
    /// a sketch with a different gamma is re-bucketed by value.
    pub fn merge(&mut self, other: &DDSketch) {
        if other.count == 0 {
            return;
        }
        if (self.gamma - other.gamma).abs() > f64::EPSILON {
            self.zero_count += other.zero_count;
            self.count += other.zero_count;
            for (&idx, &n) in &other.buckets {
                self.add_n(other.value_at(idx), n);
            }
            return;
        }
        self.count += other.count;
        self.zero_count += other.zero_count;
        for (&idx, &n) in &other.buckets {
            *self.buckets.entry(idx).or_insert(0) += n;
        }
        self.collapse_if_needed();
    }

    fn collapse_if_needed(&mut self) {
        while self.buckets.len() > self.max_buckets {
            // Fold the lowest bucket into the next one up.
            let Some((low_idx, low_n)) = self.buckets.pop_first() else {
                return;
            };
            match self.buckets.iter_mut().next() {
                Some((_, n)) => *n += low_n,
                None => {
                    self.buckets.insert(low_idx, low_n);
                    return;
                }
            }
        }
    }

    /// Estimated value at quantile `q` in [0, 1]. Returns 0 when empty.
    pub fn quantile(&self, q: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let q = if q.is_nan() { 0.5 } else { q.clamp(0.0, 1.0) };
        let rank = (q * (self.count - 1) as f64).floor() as u64;

        let mut seen = self.zero_count;
        if seen > rank {
            return 0.0;
        }
        for (&idx, &n) in &self.buckets {
            seen += n;
            if seen > rank {
                return self.value_at(idx);
            }
        }
        // Unreachable when counts are consistent.
        self.buckets
            .keys()
            .next_back()
            .map(|&idx| self.value_at(idx))
            .unwrap_or(0.0)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Approximate heap footprint in bytes.
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>() + self.buckets.len() * (std::mem::size_of::<(i32, u64)>() + 16)
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.zero_count = 0;
        self.count = 0;
    }
}

impl Default for DDSketch {
    fn default() -> Self {
        Self::new(0.01)
    }
}
