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

//! Write-side contract for collaborators
//!
//! Tool dispatchers and transports hold an `Arc<dyn MonitoringSink>` and call
//! it at the two instrumentation points: after a tool invocation completes,
//! and on every connection transition. Both calls are fire-and-forget.

use crate::event::{ClientInfo, ConnectionEventKind, ToolOutcome};
use std::fmt::Display;
use std::time::Instant;

/// Receives tool-call and connection events. Implementations must never
/// panic into the caller and never block on I/O.
pub trait MonitoringSink: Send + Sync {
    fn record_tool_call(
        &self,
        tool_name: &str,
        duration_ms: i64,
        outcome: ToolOutcome,
        error_message: Option<&str>,
    );

    fn record_connection_event(
        &self,
        session_id: &str,
        kind: ConnectionEventKind,
        client_info: &ClientInfo,
        protocol_version: Option<&str>,
    );
}

/// Sink that drops everything. Useful when monitoring is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MonitoringSink for NoopSink {
    fn record_tool_call(&self, _: &str, _: i64, _: ToolOutcome, _: Option<&str>) {}

    fn record_connection_event(&self, _: &str, _: ConnectionEventKind, _: &ClientInfo, _: Option<&str>) {}
}

/// Run a tool invocation and record its duration and outcome.
///
/// The invocation's result is returned untouched; an `Err` is recorded with
/// its display text as the error message.
pub fn instrument<S, T, E, F>(sink: &S, tool_name: &str, invoke: F) -> Result<T, E>
where
    S: MonitoringSink + ?Sized,
    E: Display,
    F: FnOnce() -> Result<T, E>,
{
    let started = Instant::now();
    let result = invoke();
    let duration_ms = started.elapsed().as_millis().min(i64::MAX as u128) as i64;

    match &result {
        Ok(_) => sink.record_tool_call(tool_name, duration_ms, ToolOutcome::Success, None),
        Err(e) => {
            let message = e.to_string();
            sink.record_tool_call(tool_name, duration_ms, ToolOutcome::Error, Some(&message))
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(String, ToolOutcome, Option<String>)>>,
    }

    impl MonitoringSink for RecordingSink {
        fn record_tool_call(
            &self,
            tool_name: &str,
            _duration_ms: i64,
            outcome: ToolOutcome,
            error_message: Option<&str>,
        ) {
            self.calls.lock().unwrap().push((
                tool_name.to_string(),
                outcome,
                error_message.map(str::to_string),
            ));
        }

        fn record_connection_event(
            &self,
            _: &str,
            _: ConnectionEventKind,
            _: &ClientInfo,
            _: Option<&str>,
        ) {
        }
    }

    #[test]
    fn test_instrument_records_outcome() {
        let sink = RecordingSink::default();

        let ok: Result<u32, String> = instrument(&sink, "search", || Ok(7));
        assert_eq!(ok, Ok(7));

        let err: Result<u32, String> = instrument(&sink, "lookup", || Err("not found".into()));
        assert!(err.is_err());

        let calls = sink.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], ("search".to_string(), ToolOutcome::Success, None));
        assert_eq!(
            calls[1],
            (
                "lookup".to_string(),
                ToolOutcome::Error,
                Some("not found".to_string())
            )
        );
    }

    #[test]
    fn test_instrument_through_trait_object() {
        let sink: Box<dyn MonitoringSink> = Box::new(NoopSink);
        let out: Result<&str, String> = instrument(sink.as_ref(), "search", || Ok("done"));
        assert_eq!(out, Ok("done"));
    }
}
