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

//! Monitor facade
//!
//! Owns the tool table and the connection registry and exposes both halves
//! of the engine:
//!
//! - **write path**: [`MonitoringSink`] plus the typed `record_*` methods.
//!   Never returns an error and never panics into the caller; bad input and
//!   internal failures are logged at `warn` and dropped.
//! - **read path**: snapshot queries. Unknown window names are surfaced as
//!   [`MonitorError::InvalidWindow`].
//!
//! The clock is read once per operation.

use crate::projection::Projector;
use crate::snapshot::{
    ClientUsageSnapshot, EngineStats, GroupSnapshot, OverviewSnapshot, ReconcileReport,
    ToolDetailSnapshot, WindowedMetric,
};
use mcpwatch_core::{
    BucketClock, ClientInfo, Clock, ConnectionEvent, ConnectionEventKind, MonitorConfig,
    MonitorError, MonitoringSink, Result, SystemClock, ToolCallEvent, ToolOutcome, Window,
};
use mcpwatch_storage::{
    spawn_reconciler, ConnectionRegistry, Reconcile, ReconcilerHandle, Session, ToolMetricsTable,
    Transition,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Telemetry engine for one process.
pub struct Monitor {
    config: MonitorConfig,
    clock: Arc<dyn Clock>,
    bucket_clock: BucketClock,
    table: ToolMetricsTable,
    registry: ConnectionRegistry,
}

impl Monitor {
    /// Create a monitor reading wall-clock time.
    pub fn new(config: MonitorConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a monitor with an explicit time source.
    pub fn with_clock(config: MonitorConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let table = ToolMetricsTable::new(&config.estimator);
        let registry = ConnectionRegistry::new(&config.registry, &config.estimator);
        info!(
            relative_accuracy = config.estimator.relative_accuracy,
            retention_secs = config.estimator.retention_secs,
            liveness_timeout_secs = config.registry.liveness_timeout_secs,
            "monitor initialized"
        );
        Ok(Self {
            bucket_clock: BucketClock::new(config.windows),
            config,
            clock,
            table,
            registry,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn now_us(&self) -> u64 {
        self.clock.now_us()
    }

    fn projector(&self) -> Projector<'_> {
        Projector {
            table: &self.table,
            registry: &self.registry,
            clock: &self.bucket_clock,
            top_tools: self.config.top_tools,
            series_bucket_us: self.config.estimator.coarse_resolution_us(),
            recent_error_limit: self.config.estimator.recent_errors,
        }
    }

    // ---- write path ----

    /// Record a completed tool invocation.
    pub fn record_tool_event(&self, event: ToolCallEvent) {
        if let Err(e) = event.validate() {
            warn!(error = %e, "dropping tool call");
            return;
        }
        let now = self.clock.now_us();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.table.record_call(&event, now);
            if let Some(session_id) = &event.session_id {
                self.registry.touch(session_id, event.occurred_at_us, now);
            }
        }));
        if outcome.is_err() {
            warn!(tool = %event.tool_name, "tool call recording panicked, event dropped");
        }
    }

    /// Record a connection lifecycle event.
    pub fn record_connection(&self, event: ConnectionEvent) {
        if let Err(e) = event.validate() {
            warn!(error = %e, "dropping connection event");
            return;
        }
        let now = self.clock.now_us();
        match catch_unwind(AssertUnwindSafe(|| self.registry.record(&event, now))) {
            Ok(Transition::Ignored) => {
                debug!(session_id = %event.session_id, kind = %event.kind, "event for unknown session")
            }
            Ok(_) => {}
            Err(_) => warn!(
                session_id = %event.session_id,
                kind = %event.kind,
                "connection event recording panicked, event dropped"
            ),
        }
    }

    // ---- read path ----

    /// Aggregate view across all tools.
    pub fn get_overview(&self, window: Window) -> OverviewSnapshot {
        self.projector().overview(window, self.clock.now_us())
    }

    pub fn get_overview_by_name(&self, window: &str) -> Result<OverviewSnapshot> {
        Ok(self.get_overview(Window::from_str(window)?))
    }

    /// Detail for one tool. A tool never seen yields an all-zero snapshot.
    pub fn get_tool_detail(&self, tool_name: &str, window: Window) -> ToolDetailSnapshot {
        self.projector()
            .tool_detail(tool_name, window, self.clock.now_us())
    }

    pub fn get_tool_detail_by_name(
        &self,
        tool_name: &str,
        window: &str,
    ) -> Result<ToolDetailSnapshot> {
        Ok(self.get_tool_detail(tool_name, Window::from_str(window)?))
    }

    /// Window metric for one tool with its trend.
    pub fn get_tool_metric(&self, tool_name: &str, window: Window) -> WindowedMetric {
        self.projector()
            .windowed_metric(tool_name, window, self.clock.now_us())
    }

    /// Request-weighted summary over a caller-chosen set of tools.
    pub fn get_group_summary<S: AsRef<str>>(
        &self,
        tool_names: &[S],
        window: Window,
    ) -> GroupSnapshot {
        self.projector()
            .group_summary(tool_names, window, self.clock.now_us())
    }

    pub fn get_group_summary_by_name<S: AsRef<str>>(
        &self,
        tool_names: &[S],
        window: &str,
    ) -> Result<GroupSnapshot> {
        Ok(self.get_group_summary(tool_names, Window::from_str(window)?))
    }

    /// Names of every tool with retained data, sorted.
    pub fn list_tracked_tools(&self) -> Vec<String> {
        self.table.tool_names()
    }

    pub fn tool_metrics(&self, window: Window) -> Vec<WindowedMetric> {
        self.projector().tool_metrics(window, self.clock.now_us())
    }

    pub fn tool_groups(&self, window: Window) -> Vec<GroupSnapshot> {
        self.projector().tool_groups(window, self.clock.now_us())
    }

    pub fn client_usage(&self) -> ClientUsageSnapshot {
        self.projector().client_usage(self.clock.now_us())
    }

    pub fn active_connections(&self) -> u64 {
        self.registry.active_count()
    }

    /// Connection events of `kind` within `window`.
    pub fn connection_events(&self, kind: ConnectionEventKind, window: Window) -> u64 {
        let since = self
            .bucket_clock
            .lookback_start(window, self.clock.now_us());
        self.registry.events_since(kind, since)
    }

    /// Active sessions, most recently active first.
    pub fn sessions(&self) -> Vec<Session> {
        self.registry.sessions()
    }

    pub fn engine_stats(&self) -> EngineStats {
        self.projector().engine_stats()
    }

    // ---- maintenance ----

    /// Expire idle sessions and compact retained slots.
    pub fn reconcile_now(&self) -> ReconcileReport {
        let now = self.clock.now_us();
        let expired = self.registry.reconcile(now);
        let freed_slots = self.table.compact(now);
        for session in &expired {
            debug!(session_id = %session.id, idle_us = session.idle_us(now), "session expired");
        }
        ReconcileReport {
            expired_sessions: expired.len(),
            freed_slots,
        }
    }

    /// Run [`reconcile_now`](Self::reconcile_now) periodically on the
    /// current tokio runtime.
    pub fn spawn_reconciler(self: &Arc<Self>) -> ReconcilerHandle {
        let period = self.config.registry.reconcile_interval();
        spawn_reconciler(Arc::clone(self), period)
    }
}

impl Reconcile for Monitor {
    fn reconcile_pass(&self) -> usize {
        self.reconcile_now().expired_sessions
    }
}

impl MonitoringSink for Monitor {
    fn record_tool_call(
        &self,
        tool_name: &str,
        duration_ms: i64,
        outcome: ToolOutcome,
        error_message: Option<&str>,
    ) {
        let duration_ms = match u64::try_from(duration_ms) {
            Ok(d) => d,
            Err(_) => {
                let e = MonitorError::InvalidEvent(format!("negative duration {}ms", duration_ms));
                warn!(tool = %tool_name, error = %e, "dropping tool call");
                return;
            }
        };
        let now = self.clock.now_us();
        self.record_tool_event(ToolCallEvent {
            tool_name: tool_name.to_string(),
            occurred_at_us: now,
            duration_ms,
            outcome,
            error_message: error_message
                .filter(|_| outcome.is_error())
                .map(str::to_string),
            session_id: None,
        });
    }

    fn record_connection_event(
        &self,
        session_id: &str,
        kind: ConnectionEventKind,
        client_info: &ClientInfo,
        protocol_version: Option<&str>,
    ) {
        let mut event = ConnectionEvent::new(session_id, kind, self.clock.now_us())
            .with_client_info(client_info.clone());
        if let Some(v) = protocol_version {
            event = event.with_protocol_version(v);
        }
        self.record_connection(event);
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("tools", &self.table.len())
            .field("active_sessions", &self.registry.active_count())
            .finish()
    }
}
