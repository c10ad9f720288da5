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

//! mcpwatch Storage
//!
//! Bounded in-memory aggregation state. Nothing in this crate performs I/O;
//! every structure is sized by its ring layout, not by event volume.

pub mod counter;
pub mod latency;
pub mod reconciler;
pub mod ring;
pub mod sessions;
pub mod sketches;
pub mod tool_table;

pub use counter::{CallCounter, ConnectionCounter, CounterKind, Hit, HitCounter, RollingCounter};
pub use latency::{LatencyPoint, LatencySummary, PercentileEstimator};
pub use reconciler::{spawn_reconciler, Reconcile, ReconcilerHandle};
pub use ring::{Mergeable, RingLayout, TieredRing};
pub use sessions::{
    ClientCount, ConnectionRegistry, RegistryStats, Session, SessionStatus, Transition,
    OVERFLOW_CLIENT, UNKNOWN_CLIENT,
};
pub use sketches::DDSketch;
pub use tool_table::{RecentError, TableStats, ToolEntry, ToolMetricsTable, WindowStats};
