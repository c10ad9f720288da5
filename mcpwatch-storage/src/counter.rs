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

//! Rolling Counter
//!
//! Counts discrete events per kind over sliding windows. Each ring slot
//! holds one `u64` per kind, so memory is bounded by the ring layout and
//! the number of kinds, never by the event rate.

use crate::ring::{Mergeable, RingLayout, TieredRing};
use mcpwatch_core::{ConnectionEventKind, ToolOutcome};
use std::marker::PhantomData;

/// Maps an event kind to its column in a counter slot.
pub trait CounterKind: Copy {
    fn index(self) -> usize;
}

impl CounterKind for ToolOutcome {
    #[inline]
    fn index(self) -> usize {
        match self {
            ToolOutcome::Success => 0,
            ToolOutcome::Error => 1,
        }
    }
}

impl CounterKind for ConnectionEventKind {
    #[inline]
    fn index(self) -> usize {
        match self {
            ConnectionEventKind::Connected => 0,
            ConnectionEventKind::Initialized => 1,
            ConnectionEventKind::Heartbeat => 2,
            ConnectionEventKind::Reconnect => 3,
            ConnectionEventKind::Error => 4,
            ConnectionEventKind::Disconnected => 5,
            ConnectionEventKind::Expired => 6,
        }
    }
}

/// Single-kind counter key, for plain "how many" counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit;

impl CounterKind for Hit {
    #[inline]
    fn index(self) -> usize {
        0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CounterSlot<const N: usize> {
    counts: [u64; N],
}

impl<const N: usize> CounterSlot<N> {
    fn new() -> Self {
        Self { counts: [0; N] }
    }
}

impl<const N: usize> Mergeable for CounterSlot<N> {
    fn merge(&mut self, other: &Self) {
        for (a, b) in self.counts.iter_mut().zip(other.counts.iter()) {
            *a += *b;
        }
    }
}

/// Sliding-window event counter over `N` kinds.
#[derive(Debug, Clone)]
pub struct RollingCounter<K, const N: usize> {
    ring: TieredRing<CounterSlot<N>>,
    _kind: PhantomData<K>,
}

/// Success/error counter for tool calls.
pub type CallCounter = RollingCounter<ToolOutcome, 2>;

/// Per-kind counter for connection lifecycle events.
pub type ConnectionCounter = RollingCounter<ConnectionEventKind, 7>;

/// Plain event counter.
pub type HitCounter = RollingCounter<Hit, 1>;

impl<K: CounterKind, const N: usize> RollingCounter<K, N> {
    pub fn new(layout: RingLayout) -> Self {
        Self {
            ring: TieredRing::new(layout),
            _kind: PhantomData,
        }
    }

    /// Count one event. Returns false when the timestamp is past retention.
    pub fn increment(&mut self, kind: K, ts_us: u64, now_us: u64) -> bool {
        self.add(kind, 1, ts_us, now_us)
    }

    pub fn add(&mut self, kind: K, n: u64, ts_us: u64, now_us: u64) -> bool {
        let idx = kind.index();
        match self.ring.slot_mut(ts_us, now_us, CounterSlot::new) {
            Some(slot) => match slot.counts.get_mut(idx) {
                Some(c) => {
                    *c += n;
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// Events of `kind` newer than `lookback_start_us`.
    pub fn count_since(&self, kind: K, lookback_start_us: u64) -> u64 {
        self.count_between(kind, lookback_start_us, u64::MAX)
    }

    /// Events of `kind` in slots ending in `(after_us, until_us]`.
    pub fn count_between(&self, kind: K, after_us: u64, until_us: u64) -> u64 {
        let idx = kind.index();
        self.ring
            .iter_ending_in(after_us, until_us)
            .map(|s| s.counts.get(idx).copied().unwrap_or(0))
            .sum()
    }

    /// Every kind's count in one pass.
    pub fn counts_between(&self, after_us: u64, until_us: u64) -> [u64; N] {
        let mut out = [0u64; N];
        for slot in self.ring.iter_ending_in(after_us, until_us) {
            for (o, c) in out.iter_mut().zip(slot.counts.iter()) {
                *o += *c;
            }
        }
        out
    }

    pub fn counts_since(&self, lookback_start_us: u64) -> [u64; N] {
        self.counts_between(lookback_start_us, u64::MAX)
    }

    pub fn compact(&mut self, now_us: u64) -> usize {
        self.ring.compact(now_us)
    }

    pub fn slot_counts(&self) -> (usize, usize) {
        self.ring.slot_counts()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn memory_usage(&self) -> usize {
        self.ring.len() * std::mem::size_of::<CounterSlot<N>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: u64 = 1_000_000;
    const NOW: u64 = 1_700_000_000 * SEC;

    #[test]
    fn test_increment_and_count() {
        let mut c = CallCounter::new(RingLayout::default());
        for _ in 0..7 {
            c.increment(ToolOutcome::Success, NOW, NOW);
        }
        for _ in 0..3 {
            c.increment(ToolOutcome::Error, NOW, NOW);
        }
        assert_eq!(c.count_since(ToolOutcome::Success, NOW - 300 * SEC), 7);
        assert_eq!(c.count_since(ToolOutcome::Error, NOW - 300 * SEC), 3);
        assert_eq!(c.counts_since(NOW - 300 * SEC), [7, 3]);
    }

    #[test]
    fn test_windows_are_nested() {
        let mut c = CallCounter::new(RingLayout::default());
        for age in [10, 200, 1_000, 5_000, 50_000] {
            c.increment(ToolOutcome::Success, NOW - age * SEC, NOW);
        }
        let five = c.count_since(ToolOutcome::Success, NOW - 300 * SEC);
        let hour = c.count_since(ToolOutcome::Success, NOW - 3_600 * SEC);
        let day = c.count_since(ToolOutcome::Success, NOW - 86_400 * SEC);
        assert_eq!((five, hour, day), (2, 3, 5));
    }

    #[test]
    fn test_count_between_previous_window() {
        let mut c = CallCounter::new(RingLayout::default());
        c.increment(ToolOutcome::Success, NOW - 400 * SEC, NOW);
        c.increment(ToolOutcome::Success, NOW - 50 * SEC, NOW);
        let prev = c.count_between(ToolOutcome::Success, NOW - 600 * SEC, NOW - 300 * SEC);
        assert_eq!(prev, 1);
    }

    #[test]
    fn test_connection_kinds_have_distinct_columns() {
        let mut c = ConnectionCounter::new(RingLayout::default());
        for kind in ConnectionEventKind::ALL {
            c.increment(kind, NOW, NOW);
        }
        assert_eq!(c.counts_since(0), [1; 7]);
    }

    #[test]
    fn test_expired_data_not_counted() {
        let mut c = HitCounter::new(RingLayout::default());
        assert!(c.increment(Hit, NOW - 100 * SEC, NOW));
        let later = NOW + 200_000 * SEC;
        assert_eq!(c.count_since(Hit, later - 86_400 * SEC), 0);
        c.compact(later);
        assert!(c.is_empty());
    }
}
