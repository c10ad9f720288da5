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

//! Connection Registry
//!
//! Tracks open sessions and counts connection lifecycle events.
//!
//! Per-session lifecycle:
//! ```text
//! (none) --connected/reconnect--> active --disconnected--> closed (removed)
//!                                   |  ^
//!                                   |  +-- connected / initialized / heartbeat / error
//!                                   +--reconcile (idle > liveness)--> expired (removed)
//! ```
//! A session is removed from the map in the same critical section that
//! marks it expired or closed, so readers never see it in both states.

use crate::counter::{ConnectionCounter, Hit, HitCounter};
use crate::ring::RingLayout;
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mcpwatch_core::{
    ClientInfo, ConnectionEvent, ConnectionEventKind, EstimatorConfig, RegistryConfig,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Client key used once `max_tracked_clients` distinct clients are tracked.
pub const OVERFLOW_CLIENT: &str = "other";

/// Client key for connections without a user agent.
pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Expired,
}

/// What an event does to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// New session created.
    Opened,
    /// Existing session's activity refreshed.
    Refreshed,
    /// Error recorded on an existing session.
    ErrorRecorded,
    /// Session removed after a disconnect.
    Closed,
    /// Counted only; no session state exists for it.
    Ignored,
}

impl Transition {
    /// Transition for `kind` given whether the session is currently active.
    pub fn for_event(active: bool, kind: ConnectionEventKind) -> Transition {
        use ConnectionEventKind::*;

        match (active, kind) {
            (false, Connected | Reconnect) => Transition::Opened,
            (true, Connected | Reconnect | Initialized | Heartbeat) => Transition::Refreshed,
            (true, Error) => Transition::ErrorRecorded,
            (true, Disconnected) => Transition::Closed,
            (false, Initialized | Heartbeat | Error | Disconnected) => Transition::Ignored,
            (_, Expired) => Transition::Ignored,
        }
    }
}

/// One tracked client session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub connected_at_us: u64,
    pub last_activity_us: u64,
    pub status: SessionStatus,
    pub client_info: ClientInfo,
    pub protocol_version: Option<String>,
    pub error_count: u64,
    pub last_error: Option<String>,
}

impl Session {
    fn open(event: &ConnectionEvent, ts_us: u64) -> Self {
        Self {
            id: event.session_id.clone(),
            connected_at_us: ts_us,
            last_activity_us: ts_us,
            status: SessionStatus::Active,
            client_info: event.client_info.clone(),
            protocol_version: event.protocol_version.clone(),
            error_count: 0,
            last_error: None,
        }
    }

    fn refresh(&mut self, event: &ConnectionEvent, ts_us: u64) {
        self.last_activity_us = self.last_activity_us.max(ts_us);
        if !event.client_info.is_empty() {
            self.client_info.merge_from(&event.client_info);
        }
        if let Some(v) = &event.protocol_version {
            self.protocol_version = Some(v.clone());
        }
    }

    /// Idle time at `now_us`.
    pub fn idle_us(&self, now_us: u64) -> u64 {
        now_us.saturating_sub(self.last_activity_us)
    }
}

/// Connections per client over a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCount {
    pub user_agent: String,
    pub connections: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub active_sessions: u64,
    pub tracked_clients: usize,
    pub event_slots: usize,
    pub memory_bytes: usize,
}

/// Open sessions plus connection event history.
pub struct ConnectionRegistry {
    sessions: DashMap<String, Session, RandomState>,
    active: AtomicU64,
    events: Mutex<ConnectionCounter>,
    clients: DashMap<String, HitCounter, RandomState>,
    client_overflow: Mutex<HitCounter>,
    layout: RingLayout,
    liveness_timeout_us: u64,
    max_tracked_clients: usize,
}

impl ConnectionRegistry {
    pub fn new(registry: &RegistryConfig, estimator: &EstimatorConfig) -> Self {
        let layout = RingLayout::from_config(estimator);
        Self {
            sessions: DashMap::with_hasher(RandomState::new()),
            active: AtomicU64::new(0),
            events: Mutex::new(ConnectionCounter::new(layout)),
            clients: DashMap::with_hasher(RandomState::new()),
            client_overflow: Mutex::new(HitCounter::new(layout)),
            layout,
            liveness_timeout_us: registry.liveness_timeout_us(),
            max_tracked_clients: registry.max_tracked_clients,
        }
    }

    pub fn liveness_timeout_us(&self) -> u64 {
        self.liveness_timeout_us
    }

    /// Apply one connection event. The event is always counted; session
    /// state changes per [`Transition::for_event`].
    pub fn record(&self, event: &ConnectionEvent, now_us: u64) -> Transition {
        let ts = event.occurred_at_us.min(now_us);

        let transition = match self.sessions.entry(event.session_id.clone()) {
            Entry::Vacant(vacant) => match Transition::for_event(false, event.kind) {
                Transition::Opened => {
                    // Gauge moves while the shard guard is held.
                    let _guard = vacant.insert(Session::open(event, ts));
                    self.active.fetch_add(1, Ordering::AcqRel);
                    Transition::Opened
                }
                other => other,
            },
            Entry::Occupied(mut occupied) => match Transition::for_event(true, event.kind) {
                Transition::Refreshed => {
                    occupied.get_mut().refresh(event, ts);
                    Transition::Refreshed
                }
                Transition::ErrorRecorded => {
                    let session = occupied.get_mut();
                    session.refresh(event, ts);
                    session.error_count += 1;
                    let message = event
                        .client_info
                        .get(ClientInfo::LAST_ERROR)
                        .unwrap_or("connection error")
                        .to_string();
                    session
                        .client_info
                        .insert(ClientInfo::LAST_ERROR, message.clone());
                    session.last_error = Some(message);
                    Transition::ErrorRecorded
                }
                Transition::Closed => {
                    self.active.fetch_sub(1, Ordering::AcqRel);
                    occupied.remove();
                    Transition::Closed
                }
                other => other,
            },
        };

        self.events.lock().increment(event.kind, ts, now_us);
        if event.kind == ConnectionEventKind::Connected {
            self.count_client(event.client_info.user_agent(), ts, now_us);
        }

        tracing::debug!(
            session_id = %event.session_id,
            kind = %event.kind,
            ?transition,
            "connection event"
        );
        transition
    }

    fn count_client(&self, user_agent: Option<&str>, ts_us: u64, now_us: u64) {
        let key = user_agent.unwrap_or(UNKNOWN_CLIENT);
        if let Some(mut counter) = self.clients.get_mut(key) {
            counter.increment(Hit, ts_us, now_us);
            return;
        }
        if self.clients.len() >= self.max_tracked_clients {
            self.client_overflow.lock().increment(Hit, ts_us, now_us);
            return;
        }
        self.clients
            .entry(key.to_string())
            .or_insert_with(|| HitCounter::new(self.layout))
            .increment(Hit, ts_us, now_us);
    }

    /// Refresh a session's activity from a tool call. No-op for unknown ids.
    pub fn touch(&self, session_id: &str, ts_us: u64, now_us: u64) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(mut session) => {
                let ts = ts_us.min(now_us);
                session.last_activity_us = session.last_activity_us.max(ts);
                true
            }
            None => false,
        }
    }

    /// Expire sessions idle longer than the liveness timeout.
    ///
    /// Each expired session is removed, decrements the active gauge and is
    /// counted as an `Expired` event. Connection history is left intact.
    pub fn reconcile(&self, now_us: u64) -> Vec<Session> {
        let mut expired = Vec::new();
        self.sessions.retain(|_, session| {
            if session.idle_us(now_us) > self.liveness_timeout_us {
                session.status = SessionStatus::Expired;
                expired.push(session.clone());
                self.active.fetch_sub(1, Ordering::AcqRel);
                false
            } else {
                true
            }
        });

        {
            let mut events = self.events.lock();
            for _ in &expired {
                events.increment(ConnectionEventKind::Expired, now_us, now_us);
            }
            events.compact(now_us);
        }
        self.compact_clients(now_us);

        if expired.is_empty() {
            tracing::debug!(active = self.active_count(), "reconciliation found no idle sessions");
        } else {
            tracing::info!(
                expired = expired.len(),
                active = self.active_count(),
                "expired idle sessions"
            );
        }
        expired
    }

    fn compact_clients(&self, now_us: u64) {
        self.clients.retain(|_, counter| {
            counter.compact(now_us);
            !counter.is_empty()
        });
        self.client_overflow.lock().compact(now_us);
    }

    /// Number of active sessions. O(1).
    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::Acquire)
    }

    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }

    /// Snapshot of active sessions, most recently active first.
    pub fn sessions(&self) -> Vec<Session> {
        let mut all: Vec<Session> = self.sessions.iter().map(|s| s.value().clone()).collect();
        all.sort_by(|a, b| b.last_activity_us.cmp(&a.last_activity_us));
        all
    }

    /// Events of `kind` newer than `lookback_start_us`.
    pub fn events_since(&self, kind: ConnectionEventKind, lookback_start_us: u64) -> u64 {
        self.events.lock().count_since(kind, lookback_start_us)
    }

    /// Count of every kind newer than `lookback_start_us`, in
    /// [`ConnectionEventKind::ALL`] order.
    pub fn event_counts_since(&self, lookback_start_us: u64) -> Vec<(ConnectionEventKind, u64)> {
        let counts = self.events.lock().counts_since(lookback_start_us);
        ConnectionEventKind::ALL
            .iter()
            .zip(counts)
            .map(|(k, c)| (*k, c))
            .collect()
    }

    /// Connections per client newer than `lookback_start_us`, busiest first.
    /// Clients beyond the tracking cap are reported as [`OVERFLOW_CLIENT`].
    pub fn client_counts_since(&self, lookback_start_us: u64) -> Vec<ClientCount> {
        let mut out: Vec<ClientCount> = self
            .clients
            .iter()
            .map(|c| ClientCount {
                user_agent: c.key().clone(),
                connections: c.value().count_since(Hit, lookback_start_us),
            })
            .filter(|c| c.connections > 0)
            .collect();

        let overflow = self.client_overflow.lock().count_since(Hit, lookback_start_us);
        if overflow > 0 {
            out.push(ClientCount {
                user_agent: OVERFLOW_CLIENT.to_string(),
                connections: overflow,
            });
        }

        out.sort_by(|a, b| {
            b.connections
                .cmp(&a.connections)
                .then_with(|| a.user_agent.cmp(&b.user_agent))
        });
        out
    }

    pub fn stats(&self) -> RegistryStats {
        let events = self.events.lock();
        let (fine, coarse) = events.slot_counts();
        let client_bytes: usize = self
            .clients
            .iter()
            .map(|c| c.key().len() + c.value().memory_usage())
            .sum();
        let session_bytes = self.sessions.len() * std::mem::size_of::<Session>();
        RegistryStats {
            active_sessions: self.active_count(),
            tracked_clients: self.clients.len(),
            event_slots: fine + coarse,
            memory_bytes: events.memory_usage() + client_bytes + session_bytes,
        }
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("active", &self.active_count())
            .field("liveness_timeout_us", &self.liveness_timeout_us)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const SEC: u64 = 1_000_000;
    const NOW: u64 = 1_700_000_000 * SEC;

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(&RegistryConfig::default(), &EstimatorConfig::default())
    }

    fn ev(id: &str, kind: ConnectionEventKind, ts: u64) -> ConnectionEvent {
        ConnectionEvent::new(id, kind, ts)
    }

    #[test]
    fn test_transition_table() {
        use ConnectionEventKind::*;
        assert_eq!(Transition::for_event(false, Connected), Transition::Opened);
        assert_eq!(Transition::for_event(true, Connected), Transition::Refreshed);
        assert_eq!(Transition::for_event(true, Error), Transition::ErrorRecorded);
        assert_eq!(Transition::for_event(false, Error), Transition::Ignored);
        assert_eq!(Transition::for_event(true, Disconnected), Transition::Closed);
        assert_eq!(Transition::for_event(false, Disconnected), Transition::Ignored);
        assert_eq!(Transition::for_event(true, Expired), Transition::Ignored);
    }

    #[test]
    fn test_connect_disconnect() {
        let r = registry();
        assert_eq!(r.record(&ev("s1", ConnectionEventKind::Connected, NOW), NOW), Transition::Opened);
        assert_eq!(r.active_count(), 1);
        assert_eq!(
            r.record(&ev("s1", ConnectionEventKind::Disconnected, NOW), NOW),
            Transition::Closed
        );
        assert_eq!(r.active_count(), 0);
        assert!(r.session("s1").is_none());
    }

    #[test]
    fn test_duplicate_connect_refreshes() {
        let r = registry();
        r.record(&ev("s1", ConnectionEventKind::Connected, NOW), NOW);
        r.record(&ev("s1", ConnectionEventKind::Connected, NOW + SEC), NOW + SEC);
        assert_eq!(r.active_count(), 1);
        let s = r.session("s1").unwrap();
        assert_eq!(s.connected_at_us, NOW);
        assert_eq!(s.last_activity_us, NOW + SEC);
        assert_eq!(r.events_since(ConnectionEventKind::Connected, 0), 2);
    }

    #[test]
    fn test_error_keeps_session_active() {
        let r = registry();
        r.record(&ev("s1", ConnectionEventKind::Connected, NOW), NOW);
        let err = ev("s1", ConnectionEventKind::Error, NOW + SEC)
            .with_client_info(ClientInfo::new().with(ClientInfo::LAST_ERROR, "broken pipe"));
        assert_eq!(r.record(&err, NOW + SEC), Transition::ErrorRecorded);
        let s = r.session("s1").unwrap();
        assert_eq!(s.status, SessionStatus::Active);
        assert_eq!(s.error_count, 1);
        assert_eq!(s.last_error.as_deref(), Some("broken pipe"));
        assert_eq!(s.client_info.get(ClientInfo::LAST_ERROR), Some("broken pipe"));
        assert_eq!(r.active_count(), 1);
    }

    #[test]
    fn test_unknown_session_events_are_counted_only() {
        let r = registry();
        r.record(&ev("ghost", ConnectionEventKind::Error, NOW), NOW);
        r.record(&ev("ghost", ConnectionEventKind::Disconnected, NOW), NOW);
        r.record(&ev("ghost", ConnectionEventKind::Heartbeat, NOW), NOW);
        assert_eq!(r.active_count(), 0);
        assert!(r.session("ghost").is_none());
        assert_eq!(r.events_since(ConnectionEventKind::Error, 0), 1);
        assert_eq!(r.events_since(ConnectionEventKind::Disconnected, 0), 1);
    }

    #[test]
    fn test_reconcile_expires_idle_sessions() {
        let r = registry();
        r.record(&ev("idle", ConnectionEventKind::Connected, NOW), NOW);
        r.record(&ev("busy", ConnectionEventKind::Connected, NOW), NOW);
        r.record(&ev("busy", ConnectionEventKind::Heartbeat, NOW + 60 * SEC), NOW + 60 * SEC);

        let later = NOW + 100 * SEC;
        let expired = r.reconcile(later);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, "idle");
        assert_eq!(expired[0].status, SessionStatus::Expired);
        assert_eq!(r.active_count(), 1);
        assert_eq!(r.events_since(ConnectionEventKind::Expired, 0), 1);
        assert_eq!(r.events_since(ConnectionEventKind::Connected, 0), 2);
    }

    #[test]
    fn test_not_expired_at_exact_threshold() {
        let r = registry();
        r.record(&ev("s1", ConnectionEventKind::Connected, NOW), NOW);
        assert!(r.reconcile(NOW + 90 * SEC).is_empty());
        assert_eq!(r.reconcile(NOW + 91 * SEC).len(), 1);
    }

    #[test]
    fn test_touch_keeps_session_alive() {
        let r = registry();
        r.record(&ev("s1", ConnectionEventKind::Connected, NOW), NOW);
        assert!(r.touch("s1", NOW + 80 * SEC, NOW + 80 * SEC));
        assert!(!r.touch("nope", NOW, NOW));
        assert!(r.reconcile(NOW + 120 * SEC).is_empty());
    }

    #[test]
    fn test_client_usage_cap() {
        let config = RegistryConfig {
            max_tracked_clients: 2,
            ..Default::default()
        };
        let r = ConnectionRegistry::new(&config, &EstimatorConfig::default());
        for (i, ua) in ["cursor/1.0", "cursor/1.0", "claude-code/2.0", "vscode/1.9", "zed/0.1"]
            .iter()
            .enumerate()
        {
            let e = ev(&format!("s{}", i), ConnectionEventKind::Connected, NOW)
                .with_client_info(ClientInfo::new().with(ClientInfo::USER_AGENT, *ua));
            r.record(&e, NOW);
        }
        let usage = r.client_counts_since(NOW - 86_400 * SEC);
        assert_eq!(usage[0], ClientCount { user_agent: "cursor/1.0".into(), connections: 2 });
        assert_eq!(usage[1], ClientCount { user_agent: "other".into(), connections: 2 });
        assert_eq!(usage.len(), 3);
    }

    #[test]
    fn test_concurrent_connect_disconnect() {
        let r = Arc::new(registry());
        let mut handles = vec![];
        for t in 0..8 {
            let r = Arc::clone(&r);
            handles.push(thread::spawn(move || {
                for i in 0..500 {
                    let id = format!("t{}-{}", t, i);
                    r.record(&ev(&id, ConnectionEventKind::Connected, NOW), NOW);
                    r.record(&ev(&id, ConnectionEventKind::Connected, NOW), NOW);
                    if i % 2 == 0 {
                        r.record(&ev(&id, ConnectionEventKind::Disconnected, NOW), NOW);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(r.active_count(), 8 * 250);
        assert_eq!(r.sessions().len(), 8 * 250);
    }

    #[test]
    fn test_gauge_bounded_when_one_session_churns() {
        use std::sync::atomic::AtomicBool;

        let r = Arc::new(registry());
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let r = Arc::clone(&r);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut max_seen = 0;
                while !done.load(Ordering::Acquire) {
                    max_seen = max_seen.max(r.active_count());
                }
                max_seen.max(r.active_count())
            })
        };

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let r = Arc::clone(&r);
                thread::spawn(move || {
                    for _ in 0..20_000 {
                        r.record(&ev("shared", ConnectionEventKind::Connected, NOW), NOW);
                        r.record(&ev("shared", ConnectionEventKind::Disconnected, NOW), NOW);
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }
        done.store(true, Ordering::Release);

        assert!(reader.join().unwrap() <= 1);
        assert_eq!(r.active_count(), r.sessions().len() as u64);
    }

    #[test]
    fn test_gauge_bounded_under_reconcile_churn() {
        let r = Arc::new(registry());
        let stale = NOW - 600 * SEC;

        let reconciler = {
            let r = Arc::clone(&r);
            thread::spawn(move || {
                for _ in 0..5_000 {
                    r.reconcile(NOW);
                    assert!(r.active_count() <= 1);
                }
            })
        };
        for _ in 0..20_000 {
            r.record(&ev("stale", ConnectionEventKind::Connected, stale), NOW);
            assert!(r.active_count() <= 1);
        }
        reconciler.join().unwrap();
        r.reconcile(NOW);
        assert_eq!(r.active_count(), 0);
    }
}
