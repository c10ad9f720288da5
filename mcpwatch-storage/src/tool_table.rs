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

//! Tool Metrics Table - Sharded Per-Tool Aggregation State
//!
//! The central mutable state of the engine:
//! - DashMap keyed by tool name, so unrelated tools never share a lock
//! - One mutex per tool guarding its estimator, counter and error ring
//! - An "all tools" aggregate fed in parallel, itself split into shards by
//!   tool-name hash so it does not become a global write lock
//!
//! ## Locking
//! ```text
//! write: map shard (read) -> tool mutex            (-> aggregate shard mutex)
//! read:  clone Arc<ToolEntry> list, release map -> one tool mutex at a time
//! sweep: tool mutex (compact)  ... then map shard (write) for idle removal
//! ```
//! No path holds two tool mutexes at once. Cross-tool reads therefore see
//! each tool at a slightly different instant; totals are consistent per
//! tool, not across tools.

use crate::counter::CallCounter;
use crate::latency::{LatencyPoint, LatencySummary, PercentileEstimator};
use crate::ring::RingLayout;
use ahash::RandomState;
use dashmap::DashMap;
use mcpwatch_core::{EstimatorConfig, ToolCallEvent};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Shards of the all-tools aggregate.
const AGGREGATE_SHARDS: usize = 16;

/// Longest retained error message, in bytes.
const MAX_ERROR_MESSAGE_LEN: usize = 1024;

/// One retained tool failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentError {
    pub occurred_at_us: u64,
    pub message: String,
    pub session_id: Option<String>,
    pub duration_ms: u64,
}

/// Raw statistics of one tool (or all tools) over one window.
#[derive(Debug, Clone)]
pub struct WindowStats {
    pub successes: u64,
    pub errors: u64,
    pub latency: LatencySummary,
}

impl WindowStats {
    pub fn requests(&self) -> u64 {
        self.successes + self.errors
    }

    /// Fraction in [0, 1]; 0 when there were no requests.
    pub fn error_rate(&self) -> f64 {
        match self.requests() {
            0 => 0.0,
            n => self.errors as f64 / n as f64,
        }
    }

    pub fn success_rate(&self) -> f64 {
        match self.requests() {
            0 => 0.0,
            n => self.successes as f64 / n as f64,
        }
    }

    pub fn merge(&mut self, other: &WindowStats) {
        self.successes += other.successes;
        self.errors += other.errors;
        self.latency.merge(&other.latency);
    }
}

#[derive(Debug)]
struct ToolState {
    latency: PercentileEstimator,
    calls: CallCounter,
    recent_errors: VecDeque<RecentError>,
    last_seen_us: u64,
}

impl ToolState {
    fn is_idle(&self) -> bool {
        self.calls.is_empty()
    }
}

/// Aggregation state for one tool.
#[derive(Debug)]
pub struct ToolEntry {
    name: String,
    alpha: f64,
    error_capacity: usize,
    retention_us: u64,
    state: Mutex<ToolState>,
}

impl ToolEntry {
    fn new(name: String, layout: RingLayout, alpha: f64, error_capacity: usize) -> Self {
        Self {
            name,
            alpha,
            error_capacity,
            retention_us: layout.retention_us,
            state: Mutex::new(ToolState {
                latency: PercentileEstimator::new(layout, alpha),
                calls: CallCounter::new(layout),
                recent_errors: VecDeque::with_capacity(error_capacity.min(64)),
                last_seen_us: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn record(&self, event: &ToolCallEvent, now_us: u64) -> bool {
        let mut state = self.state.lock();
        let ts = event.occurred_at_us;
        if !state.latency.ingest(event.duration_ms as f64, ts, now_us) {
            return false;
        }
        state.calls.increment(event.outcome, ts, now_us);
        state.last_seen_us = state.last_seen_us.max(ts.min(now_us));

        if self.error_capacity > 0 {
            if let Some(message) = event.retained_error() {
                if state.recent_errors.len() >= self.error_capacity {
                    state.recent_errors.pop_front();
                }
                state.recent_errors.push_back(RecentError {
                    occurred_at_us: ts.min(now_us),
                    message: truncate_message(message),
                    session_id: event.session_id.clone(),
                    duration_ms: event.duration_ms,
                });
            }
        }
        true
    }

    /// Statistics over slots ending in `(after_us, until_us]`.
    pub fn stats(&self, after_us: u64, until_us: u64) -> WindowStats {
        let state = self.state.lock();
        let [successes, errors] = state.calls.counts_between(after_us, until_us);
        WindowStats {
            successes,
            errors,
            latency: state.latency.summary(after_us, until_us),
        }
    }

    /// Retained errors newer than `since_us`, most recent first.
    pub fn recent_errors(&self, since_us: u64, limit: usize) -> Vec<RecentError> {
        let state = self.state.lock();
        let mut errors: Vec<RecentError> = state
            .recent_errors
            .iter()
            .filter(|e| e.occurred_at_us > since_us)
            .cloned()
            .collect();
        errors.sort_by(|a, b| b.occurred_at_us.cmp(&a.occurred_at_us));
        errors.truncate(limit);
        errors
    }

    pub fn latency_series(&self, since_us: u64, bucket_us: u64) -> Vec<LatencyPoint> {
        self.state.lock().latency.series_since(since_us, bucket_us)
    }

    pub fn last_seen_us(&self) -> u64 {
        self.state.lock().last_seen_us
    }

    fn compact(&self, now_us: u64) -> (usize, bool) {
        let mut state = self.state.lock();
        let freed = state.latency.compact(now_us) + state.calls.compact(now_us);
        let retention_cutoff = now_us.saturating_sub(self.retention_us);
        state
            .recent_errors
            .retain(|e| e.occurred_at_us > retention_cutoff);
        (freed, state.is_idle())
    }

    fn footprint(&self) -> (usize, usize, usize) {
        let state = self.state.lock();
        let (fine_l, coarse_l) = state.latency.slot_counts();
        let (fine_c, coarse_c) = state.calls.slot_counts();
        let errors: usize = state
            .recent_errors
            .iter()
            .map(|e| std::mem::size_of::<RecentError>() + e.message.len())
            .sum();
        let bytes = std::mem::size_of::<Self>()
            + self.name.len()
            + state.latency.memory_usage()
            + state.calls.memory_usage()
            + errors;
        (fine_l + fine_c, coarse_l + coarse_c, bytes)
    }

    fn empty_stats(&self) -> WindowStats {
        WindowStats {
            successes: 0,
            errors: 0,
            latency: LatencySummary::empty(self.alpha),
        }
    }
}

fn truncate_message(message: &str) -> String {
    if message.len() <= MAX_ERROR_MESSAGE_LEN {
        return message.to_string();
    }
    let mut end = MAX_ERROR_MESSAGE_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &message[..end])
}

/// Footprint of the table, for engine statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    pub tools: usize,
    pub fine_slots: usize,
    pub coarse_slots: usize,
    pub memory_bytes: usize,
}

/// Per-tool aggregation state keyed by tool name.
pub struct ToolMetricsTable {
    tools: DashMap<String, Arc<ToolEntry>, RandomState>,
    aggregate: Box<[ToolEntry]>,
    hasher: RandomState,
    layout: RingLayout,
    alpha: f64,
    error_capacity: usize,
}

impl ToolMetricsTable {
    pub fn new(config: &EstimatorConfig) -> Self {
        let layout = RingLayout::from_config(config);
        let alpha = config.relative_accuracy;
        let aggregate = (0..AGGREGATE_SHARDS)
            .map(|_| ToolEntry::new(String::new(), layout, alpha, 0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            tools: DashMap::with_hasher(RandomState::new()),
            aggregate,
            hasher: RandomState::new(),
            layout,
            alpha,
            error_capacity: config.recent_errors,
        }
    }

    /// Fold one call into its tool's entry and the all-tools aggregate.
    ///
    /// Creates the entry on first sight. Returns false when the event was
    /// too old to retain.
    pub fn record_call(&self, event: &ToolCallEvent, now_us: u64) -> bool {
        let name = event.tool_name.as_str();

        // The map guard is held while recording so idle-entry removal
        // cannot orphan an in-flight write.
        let recorded = match self.tools.get(name) {
            Some(entry) => entry.record(event, now_us),
            None => {
                let entry = self.tools.entry(name.to_string()).or_insert_with(|| {
                    tracing::debug!(tool = %name, "tracking new tool");
                    Arc::new(ToolEntry::new(
                        name.to_string(),
                        self.layout,
                        self.alpha,
                        self.error_capacity,
                    ))
                });
                entry.record(event, now_us)
            }
        };

        if recorded {
            self.aggregate_shard(name).record(event, now_us);
        } else {
            tracing::trace!(tool = %name, ts = event.occurred_at_us, "tool call past retention, excluded");
        }
        recorded
    }

    fn aggregate_shard(&self, name: &str) -> &ToolEntry {
        let idx = (self.hasher.hash_one(name) as usize) % self.aggregate.len();
        &self.aggregate[idx]
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolEntry>> {
        self.tools.get(name).map(|e| Arc::clone(e.value()))
    }

    /// Snapshot of entry handles. Map shards are released before returning.
    pub fn entries(&self) -> Vec<Arc<ToolEntry>> {
        self.tools.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Statistics for one tool; all zeros for a tool never seen.
    pub fn tool_stats(&self, name: &str, after_us: u64, until_us: u64) -> WindowStats {
        match self.get(name) {
            Some(entry) => entry.stats(after_us, until_us),
            None => self.aggregate[0].empty_stats(),
        }
    }

    /// Statistics across every tool, merged shard by shard.
    pub fn overall_stats(&self, after_us: u64, until_us: u64) -> WindowStats {
        let mut total = self.aggregate[0].empty_stats();
        for shard in self.aggregate.iter() {
            total.merge(&shard.stats(after_us, until_us));
        }
        total
    }

    pub fn recent_errors(&self, name: &str, since_us: u64, limit: usize) -> Vec<RecentError> {
        self.get(name)
            .map(|e| e.recent_errors(since_us, limit))
            .unwrap_or_default()
    }

    pub fn latency_series(&self, name: &str, since_us: u64, bucket_us: u64) -> Vec<LatencyPoint> {
        self.get(name)
            .map(|e| e.latency_series(since_us, bucket_us))
            .unwrap_or_default()
    }

    /// Tracked tool names, sorted.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|e| e.key().clone()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Evict expired slots, roll up fine slots and forget tools with no
    /// retained data. Returns the number of slots freed.
    pub fn compact(&self, now_us: u64) -> usize {
        let mut freed = 0;
        let mut idle: Vec<String> = Vec::new();
        for entry in self.entries() {
            let (n, is_idle) = entry.compact(now_us);
            freed += n;
            if is_idle {
                idle.push(entry.name().to_string());
            }
        }
        for shard in self.aggregate.iter() {
            freed += shard.compact(now_us).0;
        }
        for name in idle {
            // Re-check under the map's write lock; a write may have landed.
            let removed = self
                .tools
                .remove_if(&name, |_, e| e.state.lock().is_idle())
                .is_some();
            if removed {
                tracing::debug!(tool = %name, "dropped idle tool");
            }
        }
        freed
    }

    pub fn stats(&self) -> TableStats {
        let mut stats = TableStats {
            tools: self.tools.len(),
            ..Default::default()
        };
        let all = self.entries();
        for entry in all.iter().map(|e| e.as_ref()).chain(self.aggregate.iter()) {
            let (fine, coarse, bytes) = entry.footprint();
            stats.fine_slots += fine;
            stats.coarse_slots += coarse;
            stats.memory_bytes += bytes;
        }
        stats
    }
}

impl std::fmt::Debug for ToolMetricsTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolMetricsTable")
            .field("tools", &self.tools.len())
            .field("layout", &self.layout)
            .field("alpha", &self.alpha)
            .finish()
    }
}
