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

//! Tiered Slot Ring - Bounded Time-Ordered Storage
//!
//! The shared backbone of the percentile estimator and the rolling counter.
//! Values are folded into time slots; slots are kept in start order and
//! aged out in two stages:
//! - Fine slots (default 10s) while younger than the fine horizon
//! - Coarse slots (default 5min) once the fine slots are rolled up
//! - Dropped entirely past the retention horizon
//!
//! ## Window semantics
//! A slot belongs to a window `(after, until]` when its end instant falls in
//! that range. An event is therefore visible in a window for at least the
//! window length and at most the window length plus one slot width. That
//! slot width is the eviction tolerance of every window query.
//!
//! ## Memory
//! `retention / coarse + fine_horizon / fine` slots at most, independent of
//! the event rate.
//!
//! ```text
//! TieredRing
//! ├── coarse slots  [now - retention, now - fine_horizon)
//! └── fine slots    [now - fine_horizon, now]
//! ```

use mcpwatch_core::EstimatorConfig;
use std::collections::VecDeque;

/// Slot payloads that can be combined during rollup.
pub trait Mergeable {
    fn merge(&mut self, other: &Self);
}

/// Slot widths and horizons in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingLayout {
    pub fine_us: u64,
    pub coarse_us: u64,
    pub fine_horizon_us: u64,
    pub retention_us: u64,
}

impl RingLayout {
    pub fn from_config(config: &EstimatorConfig) -> Self {
        Self {
            fine_us: config.fine_resolution_us().max(1),
            coarse_us: config.coarse_resolution_us().max(1),
            fine_horizon_us: config.fine_horizon_us(),
            retention_us: config.retention_us(),
        }
    }

    /// Upper bound on retained slots.
    pub fn max_slots(&self) -> usize {
        let fine = self.fine_horizon_us.min(self.retention_us) / self.fine_us + 1;
        let coarse = self.retention_us / self.coarse_us + 1;
        (fine + coarse) as usize
    }

    #[inline]
    fn align(ts_us: u64, width_us: u64) -> u64 {
        ts_us - (ts_us % width_us)
    }
}

impl Default for RingLayout {
    fn default() -> Self {
        Self::from_config(&EstimatorConfig::default())
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    start_us: u64,
    width_us: u64,
    value: T,
}

impl<T> Slot<T> {
    #[inline]
    fn end_us(&self) -> u64 {
        self.start_us.saturating_add(self.width_us)
    }

    #[inline]
    fn key(&self) -> (u64, u64) {
        (self.start_us, self.width_us)
    }
}

/// Time-ordered ring of mergeable slots.
#[derive(Debug, Clone)]
pub struct TieredRing<T> {
    layout: RingLayout,
    /// Sorted by `(start_us, width_us)`.
    slots: VecDeque<Slot<T>>,
    last_compaction_us: u64,
}

impl<T: Mergeable> TieredRing<T> {
    pub fn new(layout: RingLayout) -> Self {
        Self {
            layout,
            slots: VecDeque::new(),
            last_compaction_us: 0,
        }
    }

    pub fn layout(&self) -> &RingLayout {
        &self.layout
    }

    /// Slot for an event at `ts_us`, created with `make` on first use.
    ///
    /// Future timestamps are clamped to `now_us`. Returns `None` when the
    /// event is already past the retention horizon; such events are
    /// excluded rather than rejected.
    pub fn slot_mut(&mut self, ts_us: u64, now_us: u64, make: impl FnOnce() -> T) -> Option<&mut T> {
        self.maybe_compact(now_us);

        let ts_us = ts_us.min(now_us);
        let age = now_us - ts_us;
        if age >= self.layout.retention_us {
            return None;
        }

        let width = if age < self.layout.fine_horizon_us {
            self.layout.fine_us
        } else {
            self.layout.coarse_us
        };
        let key = (RingLayout::align(ts_us, width), width);

        // Hot path: the newest slot.
        let is_newest = matches!(self.slots.back(), Some(last) if last.key() == key);
        let idx = if is_newest {
            self.slots.len() - 1
        } else {
            match self.slots.binary_search_by_key(&key, Slot::key) {
                Ok(i) => i,
                Err(i) => {
                    self.slots.insert(
                        i,
                        Slot {
                            start_us: key.0,
                            width_us: key.1,
                            value: make(),
                        },
                    );
                    i
                }
            }
        };

        self.slots.get_mut(idx).map(|s| &mut s.value)
    }

    /// Slots whose end falls in `(after_us, until_us]`.
    pub fn iter_ending_in(&self, after_us: u64, until_us: u64) -> impl Iterator<Item = &T> {
        self.iter_slots(after_us, until_us).map(|(_, v)| v)
    }

    /// Like [`iter_ending_in`](Self::iter_ending_in) but with each slot's start instant.
    pub fn iter_slots(&self, after_us: u64, until_us: u64) -> impl Iterator<Item = (u64, &T)> {
        self.slots
            .iter()
            .filter(move |s| {
                let end = s.end_us();
                end > after_us && end <= until_us
            })
            .map(|s| (s.start_us, &s.value))
    }

    /// Drop slots past retention and roll fine slots older than the fine
    /// horizon into coarse ones. Runs at most once per fine slot width
    /// unless forced.
    pub fn compact(&mut self, now_us: u64) -> usize {
        self.last_compaction_us = now_us;

        let retention_cutoff = now_us.saturating_sub(self.layout.retention_us);
        let horizon_cutoff = now_us.saturating_sub(self.layout.fine_horizon_us);
        let rolls_up = self.layout.fine_us < self.layout.coarse_us;

        let needs_work = self.slots.iter().any(|s| {
            s.end_us() <= retention_cutoff
                || (rolls_up && s.width_us == self.layout.fine_us && s.end_us() <= horizon_cutoff)
        });
        if !needs_work {
            return 0;
        }

        let before = self.slots.len();
        let mut kept: VecDeque<Slot<T>> = VecDeque::with_capacity(before);
        for slot in self.slots.drain(..) {
            if slot.end_us() <= retention_cutoff {
                continue;
            }
            if rolls_up && slot.width_us == self.layout.fine_us && slot.end_us() <= horizon_cutoff {
                let key = (
                    RingLayout::align(slot.start_us, self.layout.coarse_us),
                    self.layout.coarse_us,
                );
                match kept.binary_search_by_key(&key, Slot::key) {
                    Ok(i) => kept[i].value.merge(&slot.value),
                    Err(i) => kept.insert(
                        i,
                        Slot {
                            start_us: key.0,
                            width_us: key.1,
                            value: slot.value,
                        },
                    ),
                }
                continue;
            }
            kept.push_back(slot);
        }
        self.slots = kept;

        before - self.slots.len()
    }

    #[inline]
    fn maybe_compact(&mut self, now_us: u64) {
        if now_us >= self.last_compaction_us.saturating_add(self.layout.fine_us) {
            self.compact(now_us);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// `(fine, coarse)` slot counts.
    pub fn slot_counts(&self) -> (usize, usize) {
        let fine = self
            .slots
            .iter()
            .filter(|s| s.width_us == self.layout.fine_us)
            .count();
        (fine, self.slots.len() - fine)
    }

    /// Newest slot end, if any.
    pub fn latest_end_us(&self) -> Option<u64> {
        self.slots.iter().map(|s| s.end_us()).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: u64 = 1_000_000;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Count(u64);

    impl Mergeable for Count {
        fn merge(&mut self, other: &Self) {
            self.0 += other.0;
        }
    }

    fn layout() -> RingLayout {
        RingLayout {
            fine_us: 10 * SEC,
            coarse_us: 300 * SEC,
            fine_horizon_us: 7_500 * SEC,
            retention_us: 172_800 * SEC,
        }
    }

    fn add(ring: &mut TieredRing<Count>, ts: u64, now: u64) -> bool {
        match ring.slot_mut(ts, now, Count::default) {
            Some(c) => {
                c.0 += 1;
                true
            }
            None => false,
        }
    }

    fn total(ring: &TieredRing<Count>, after: u64, until: u64) -> u64 {
        ring.iter_ending_in(after, until).map(|c| c.0).sum()
    }

    #[test]
    fn test_same_slot_reused() {
        let mut ring = TieredRing::new(layout());
        let now = 1_000_000 * SEC;
        for i in 0..5 {
            assert!(add(&mut ring, now + i, now + i));
        }
        assert_eq!(ring.len(), 1);
        assert_eq!(total(&ring, 0, u64::MAX), 5);
    }

    #[test]
    fn test_out_of_order_inserts_stay_sorted() {
        let mut ring = TieredRing::new(layout());
        let now = 1_000_000 * SEC;
        add(&mut ring, now - 100 * SEC, now);
        add(&mut ring, now - 300 * SEC, now);
        add(&mut ring, now - 200 * SEC, now);
        let starts: Vec<u64> = ring.iter_slots(0, u64::MAX).map(|(s, _)| s).collect();
        let mut sorted = starts.clone();
        sorted.sort_unstable();
        assert_eq!(starts, sorted);
        assert_eq!(starts.len(), 3);
    }

    #[test]
    fn test_future_timestamp_clamped() {
        let mut ring = TieredRing::new(layout());
        let now = 1_000_000 * SEC;
        add(&mut ring, now + 3_600 * SEC, now);
        assert_eq!(ring.latest_end_us(), Some(now + 10 * SEC));
    }

    #[test]
    fn test_too_old_is_dropped() {
        let mut ring = TieredRing::new(layout());
        let now = 1_000_000 * SEC;
        assert!(!add(&mut ring, now - 172_800 * SEC, now));
        assert!(ring.is_empty());
    }

    #[test]
    fn test_window_inclusion_tolerance() {
        let mut ring = TieredRing::new(layout());
        let t = 1_000_000 * SEC;
        add(&mut ring, t, t);

        // Visible for the whole window.
        let now = t + 299 * SEC;
        assert_eq!(total(&ring, now - 300 * SEC, u64::MAX), 1);

        // Gone once older than window + one fine slot.
        let now = t + 310 * SEC;
        assert_eq!(total(&ring, now - 300 * SEC, u64::MAX), 0);
    }

    #[test]
    fn test_rollup_preserves_totals() {
        let mut ring = TieredRing::new(layout());
        let start = 1_000_000 * SEC;
        for i in 0..600 {
            add(&mut ring, start + i * SEC, start + i * SEC);
        }
        let (fine_before, coarse_before) = ring.slot_counts();
        assert_eq!(fine_before, 60);
        assert_eq!(coarse_before, 0);

        let later = start + 10_000 * SEC;
        ring.compact(later);
        let (fine_after, coarse_after) = ring.slot_counts();
        assert_eq!(fine_after, 0);
        assert!(coarse_after >= 2 && coarse_after <= 3);
        assert_eq!(total(&ring, 0, u64::MAX), 600);
    }

    #[test]
    fn test_retention_eviction() {
        let mut ring = TieredRing::new(layout());
        let start = 1_000_000 * SEC;
        add(&mut ring, start, start);
        let evicted = ring.compact(start + 200_000 * SEC);
        assert_eq!(evicted, 1);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_late_event_goes_to_coarse_slot() {
        let mut ring = TieredRing::new(layout());
        let now = 1_000_000 * SEC;
        add(&mut ring, now - 10_000 * SEC, now);
        let (fine, coarse) = ring.slot_counts();
        assert_eq!((fine, coarse), (0, 1));
    }

    #[test]
    fn test_slot_count_bounded() {
        let l = layout();
        let mut ring = TieredRing::new(l);
        let start = 1_000_000 * SEC;
        // One event every 20 seconds for three days.
        let mut ts = start;
        while ts < start + 3 * 86_400 * SEC {
            add(&mut ring, ts, ts);
            ts += 20 * SEC;
        }
        assert!(ring.len() <= l.max_slots(), "{} > {}", ring.len(), l.max_slots());
    }
}
