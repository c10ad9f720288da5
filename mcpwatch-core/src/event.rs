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

//! Ingested events
//!
//! Events are ephemeral: they are folded into the aggregation structures on
//! arrival and never stored verbatim (except the bounded recent-error ring).

use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of a completed tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolOutcome {
    Success,
    Error,
}

impl ToolOutcome {
    pub fn is_error(self) -> bool {
        matches!(self, ToolOutcome::Error)
    }
}

/// One completed tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEvent {
    pub tool_name: String,
    /// Completion instant, microseconds since the Unix epoch.
    pub occurred_at_us: u64,
    pub duration_ms: u64,
    pub outcome: ToolOutcome,
    /// Only kept when `outcome` is `Error`.
    pub error_message: Option<String>,
    /// Session the call arrived on, when the transport knows it.
    pub session_id: Option<String>,
}

impl ToolCallEvent {
    pub fn success(tool_name: impl Into<String>, duration_ms: u64, occurred_at_us: u64) -> Self {
        Self {
            tool_name: tool_name.into(),
            occurred_at_us,
            duration_ms,
            outcome: ToolOutcome::Success,
            error_message: None,
            session_id: None,
        }
    }

    pub fn error(
        tool_name: impl Into<String>,
        duration_ms: u64,
        occurred_at_us: u64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            occurred_at_us,
            duration_ms,
            outcome: ToolOutcome::Error,
            error_message: Some(message.into()),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Reject events that cannot be attributed to a tool.
    pub fn validate(&self) -> Result<()> {
        if self.tool_name.trim().is_empty() {
            return Err(MonitorError::InvalidEvent(
                "tool name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Error message to retain; success events never carry one.
    pub fn retained_error(&self) -> Option<&str> {
        match self.outcome {
            ToolOutcome::Error => Some(self.error_message.as_deref().unwrap_or("unknown error")),
            ToolOutcome::Success => None,
        }
    }
}

/// Connection lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionEventKind {
    Connected,
    /// MCP handshake completed on an open session.
    Initialized,
    Heartbeat,
    Reconnect,
    Error,
    Disconnected,
    /// Emitted by the reconciliation pass, never by the transport.
    Expired,
}

impl ConnectionEventKind {
    pub const ALL: [ConnectionEventKind; 7] = [
        ConnectionEventKind::Connected,
        ConnectionEventKind::Initialized,
        ConnectionEventKind::Heartbeat,
        ConnectionEventKind::Reconnect,
        ConnectionEventKind::Error,
        ConnectionEventKind::Disconnected,
        ConnectionEventKind::Expired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionEventKind::Connected => "connected",
            ConnectionEventKind::Initialized => "initialized",
            ConnectionEventKind::Heartbeat => "heartbeat",
            ConnectionEventKind::Reconnect => "reconnect",
            ConnectionEventKind::Error => "error",
            ConnectionEventKind::Disconnected => "disconnected",
            ConnectionEventKind::Expired => "expired",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ConnectionEventKind::Connected => "Connected",
            ConnectionEventKind::Initialized => "Initialized",
            ConnectionEventKind::Heartbeat => "Heartbeat",
            ConnectionEventKind::Reconnect => "Reconnect",
            ConnectionEventKind::Error => "Error",
            ConnectionEventKind::Disconnected => "Disconnected",
            ConnectionEventKind::Expired => "Timeout",
        }
    }

    /// Kinds that open (or re-open) a session.
    pub fn opens_session(self) -> bool {
        matches!(
            self,
            ConnectionEventKind::Connected | ConnectionEventKind::Reconnect
        )
    }

    pub fn is_negative(self) -> bool {
        matches!(
            self,
            ConnectionEventKind::Error | ConnectionEventKind::Expired
        )
    }
}

impl fmt::Display for ConnectionEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form client metadata captured by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientInfo(BTreeMap<String, String>);

impl ClientInfo {
    pub const USER_AGENT: &'static str = "userAgent";
    pub const REMOTE_ADDR: &'static str = "remoteAddr";
    pub const REMOTE_HOST: &'static str = "remoteHost";
    pub const PROTOCOL: &'static str = "protocol";
    pub const ORIGIN: &'static str = "origin";
    pub const API_KEY_NAME: &'static str = "apiKeyName";
    pub const LAST_ERROR: &'static str = "lastError";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.get(Self::USER_AGENT).filter(|ua| !ua.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overlay `other` on top of `self`; keys in `other` win.
    pub fn merge_from(&mut self, other: &ClientInfo) {
        for (k, v) in other.iter() {
            self.0.insert(k.to_string(), v.to_string());
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ClientInfo {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Split a user agent such as `claude-code/2.0.70 (darwin)` into
/// `("claude-code", Some("2.0.70"))`.
pub fn parse_user_agent(user_agent: &str) -> (String, Option<String>) {
    let head = user_agent
        .split_whitespace()
        .next()
        .unwrap_or(user_agent);
    match head.split_once('/') {
        Some((name, version))
            if !name.is_empty()
                && !version.is_empty()
                && version.chars().all(|c| c.is_ascii_digit() || c == '.') =>
        {
            (name.to_string(), Some(version.to_string()))
        }
        Some((name, _)) if !name.is_empty() => (name.to_string(), None),
        _ => (head.to_string(), None),
    }
}

/// One connection lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub session_id: String,
    pub kind: ConnectionEventKind,
    pub occurred_at_us: u64,
    #[serde(default)]
    pub client_info: ClientInfo,
    pub protocol_version: Option<String>,
}

impl ConnectionEvent {
    pub fn new(session_id: impl Into<String>, kind: ConnectionEventKind, occurred_at_us: u64) -> Self {
        Self {
            session_id: session_id.into(),
            kind,
            occurred_at_us,
            client_info: ClientInfo::default(),
            protocol_version: None,
        }
    }

    pub fn with_client_info(mut self, client_info: ClientInfo) -> Self {
        self.client_info = client_info;
        self
    }

    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = Some(version.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_id.trim().is_empty() {
            return Err(MonitorError::InvalidEvent(
                "session id must not be empty".to_string(),
            ));
        }
        if self.kind == ConnectionEventKind::Expired {
            return Err(MonitorError::InvalidEvent(
                "expired events are produced by reconciliation only".to_string(),
            ));
        }
        Ok(())
    }
}
